//! Parsed runtime versions and version specifiers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::error::VersionError;


/// Token accepted in place of a numeric component.
pub(crate) const WILDCARD: &str = "x";

/// Marker placed after the patch number to accept that patch or newer.
pub(crate) const GREATER_OR_EQUAL: char = '+';

const COMPONENT_SEPARATOR: char = '.';
const SUFFIX_SEPARATOR: &str = "-";

/// Numeric position within a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Component {
    /// First component.
    Major,
    /// Second component.
    Minor,
    /// Third component.
    Patch,
}

/// How the patch component of a specifier compares against a candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchingType {
    /// The candidate patch must be identical.
    #[default]
    Equal,
    /// The candidate patch must be at least the specified one.
    GreaterOrEqual,
}

/// A runtime version or version specifier.
///
/// Components set to `None` are wildcards: they were written as `x` or left
/// out. Installed runtimes parse to fully concrete values; specifiers may use
/// wildcards, a trailing `+` on the patch number, and a pre-release suffix
/// introduced by `-`. Input is lower-cased before parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeVersion {
    major: Option<u32>,
    minor: Option<u32>,
    patch: Option<u32>,
    patch_matching: MatchingType,
    suffix: Option<String>,
}

impl RuntimeVersion {
    /// Returns the major component, or `None` for a wildcard.
    #[must_use]
    pub const fn major(&self) -> Option<u32> {
        self.major
    }

    /// Returns the minor component, or `None` for a wildcard.
    #[must_use]
    pub const fn minor(&self) -> Option<u32> {
        self.minor
    }

    /// Returns the patch component, or `None` for a wildcard.
    #[must_use]
    pub const fn patch(&self) -> Option<u32> {
        self.patch
    }

    /// Returns how the patch component is compared.
    #[must_use]
    pub const fn patch_matching(&self) -> MatchingType {
        self.patch_matching
    }

    /// Returns the pre-release suffix, if any.
    #[must_use]
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Returns whether `candidate` satisfies this specifier.
    #[must_use]
    pub fn matches(&self, candidate: &Self) -> bool {
        if self.major.is_some() && self.major != candidate.major {
            return false;
        }
        if self.minor.is_some() && self.minor != candidate.minor {
            return false;
        }
        if let Some(patch) = self.patch {
            let accepted = match (self.patch_matching, candidate.patch) {
                (MatchingType::Equal, Some(other)) => other == patch,
                (MatchingType::GreaterOrEqual, Some(other)) => other >= patch,
                (_, None) => false,
            };
            if !accepted {
                return false;
            }
        }
        self.suffix == candidate.suffix
    }

    /// Orders versions by major, minor and patch, ignoring suffix and marker.
    pub(crate) fn cmp_numeric(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }

    fn set(&mut self, component: Component, value: &str) -> Result<(), VersionError> {
        if value.contains(WILDCARD) {
            if value == WILDCARD {
                return Ok(());
            }
            return Err(VersionError::WildcardMixed {
                value: value.to_owned(),
            });
        }

        let (digits, matching) = match value.strip_suffix(GREATER_OR_EQUAL) {
            Some(digits) => (digits, MatchingType::GreaterOrEqual),
            None => (value, MatchingType::Equal),
        };

        if matching == MatchingType::GreaterOrEqual {
            if let Some(suffix) = &self.suffix {
                return Err(VersionError::MarkerWithSuffix {
                    component,
                    value: value.to_owned(),
                    suffix: suffix.clone(),
                });
            }
            if component != Component::Patch {
                return Err(VersionError::MarkerNotAllowed {
                    component,
                    value: value.to_owned(),
                });
            }
        }

        let number = digits
            .parse::<u32>()
            .map_err(|source| VersionError::InvalidNumber {
                component,
                value: value.to_owned(),
                source,
            })?;

        match component {
            Component::Major => self.major = Some(number),
            Component::Minor => self.minor = Some(number),
            Component::Patch => {
                self.patch = Some(number);
                self.patch_matching = matching;
            }
        }
        Ok(())
    }
}

impl FromStr for RuntimeVersion {
    type Err = VersionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_lowercase();
        let mut parts = lowered
            .split(SUFFIX_SEPARATOR)
            .filter(|part| !part.trim().is_empty());
        let numbers = parts.next().ok_or(VersionError::Empty)?;
        let rest: Vec<&str> = parts.collect();

        let mut version = Self {
            suffix: (!rest.is_empty()).then(|| rest.join(SUFFIX_SEPARATOR)),
            ..Self::default()
        };

        let values: Vec<&str> = numbers
            .split(COMPONENT_SEPARATOR)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .collect();
        if values.is_empty() {
            return Err(VersionError::Empty);
        }
        if values.len() > Component::iter().count() {
            return Err(VersionError::TooManyComponents { value: lowered });
        }

        for (component, value) in Component::iter().zip(values) {
            version.set(component, value)?;
        }
        Ok(version)
    }
}

fn write_component(f: &mut fmt::Formatter<'_>, value: Option<u32>) -> fmt::Result {
    match value {
        Some(number) => write!(f, "{number}"),
        None => f.write_str(WILDCARD),
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_component(f, self.major)?;
        write!(f, "{COMPONENT_SEPARATOR}")?;
        write_component(f, self.minor)?;
        write!(f, "{COMPONENT_SEPARATOR}")?;
        write_component(f, self.patch)?;
        if self.patch.is_some() && self.patch_matching == MatchingType::GreaterOrEqual {
            write!(f, "{GREATER_OR_EQUAL}")?;
        }
        if let Some(suffix) = &self.suffix {
            write!(f, "{SUFFIX_SEPARATOR}{suffix}")?;
        }
        Ok(())
    }
}
