//! Best-match selection among installed runtimes.

use crate::error::VersionError;
use crate::version::{GREATER_OR_EQUAL, RuntimeVersion, WILDCARD};

/// Returns whether a specifier needs a lookup among installed runtimes.
///
/// Blank specifiers and literal versions are used as written.
#[must_use]
pub fn needs_match(specifier: &str) -> bool {
    if specifier.trim().is_empty() {
        return false;
    }
    let lowered = specifier.to_lowercase();
    lowered.contains(WILDCARD) || lowered.contains(GREATER_OR_EQUAL)
}

/// Picks the highest candidate accepted by `specifier`.
///
/// Candidates are ordered by major, minor and patch, highest first; equal
/// versions keep their input order.
///
/// # Errors
///
/// Returns [`VersionError::NoMatch`] listing every candidate when none is
/// accepted.
pub fn select_best(
    specifier: &RuntimeVersion,
    candidates: &[RuntimeVersion],
) -> Result<String, VersionError> {
    let mut sorted: Vec<&RuntimeVersion> = candidates.iter().collect();
    sorted.sort_by(|left, right| right.cmp_numeric(left));

    sorted
        .iter()
        .find(|candidate| specifier.matches(candidate))
        .map(ToString::to_string)
        .ok_or_else(|| VersionError::NoMatch {
            specifier: specifier.to_string(),
            candidates: sorted.iter().map(ToString::to_string).collect(),
        })
}

/// Resolves a specifier string against candidates.
///
/// Literal specifiers are returned unchanged without looking at
/// `candidates`.
///
/// # Errors
///
/// Returns a parse error for malformed specifiers and
/// [`VersionError::NoMatch`] when nothing matches.
pub fn match_version(specifier: &str, candidates: &[RuntimeVersion]) -> Result<String, VersionError> {
    if !needs_match(specifier) {
        return Ok(specifier.to_owned());
    }
    let parsed: RuntimeVersion = specifier.parse()?;
    select_best(&parsed, candidates)
}
