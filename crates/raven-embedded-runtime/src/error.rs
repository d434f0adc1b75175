//! Errors raised while parsing, matching and discovering runtime versions.

use std::num::ParseIntError;
use std::sync::Arc;

use thiserror::Error;

use crate::version::Component;

/// Errors arising from version specifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The version string had no numeric part.
    #[error("version string cannot be blank")]
    Empty,

    /// A wildcard was combined with other characters in one component.
    #[error("Wildcard character must be a sole part of the version string, but was '{value}'.")]
    WildcardMixed {
        /// Offending component text.
        value: String,
    },

    /// The `+` marker was used on a version carrying a pre-release suffix.
    #[error(
        "Cannot set '{component}' with value '{value}' because '+' is not allowed when suffix ('{suffix}') is set."
    )]
    MarkerWithSuffix {
        /// Component carrying the marker.
        component: Component,
        /// Offending component text.
        value: String,
        /// Suffix that forbids the marker.
        suffix: String,
    },

    /// The `+` marker was used on the major or minor component.
    #[error("Cannot set '{component}' with value '{value}' because '+' is not allowed.")]
    MarkerNotAllowed {
        /// Component carrying the marker.
        component: Component,
        /// Offending component text.
        value: String,
    },

    /// A component was neither a wildcard nor an unsigned integer.
    #[error("invalid {component} component '{value}': {source}")]
    InvalidNumber {
        /// Component being parsed.
        component: Component,
        /// Offending component text.
        value: String,
        /// Integer parse failure.
        #[source]
        source: ParseIntError,
    },

    /// The version had more than major, minor and patch components.
    #[error("version '{value}' has more than three components")]
    TooManyComponents {
        /// Full version text.
        value: String,
    },

    /// No candidate satisfied the specifier.
    #[error(
        "Could not find a matching runtime for '{specifier}'. Available runtimes:{}",
        render_candidates(.candidates)
    )]
    NoMatch {
        /// Specifier that was matched.
        specifier: String,
        /// Every candidate considered, highest first.
        candidates: Vec<String>,
    },
}

fn render_candidates(candidates: &[String]) -> String {
    candidates
        .iter()
        .map(|candidate| format!("\n- {candidate}"))
        .collect()
}

/// Errors arising while resolving the runtime installed on the host.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime host could not be executed.
    #[error("Unable to execute {dotnet} to retrieve list of installed runtimes: {source}")]
    Discovery {
        /// Runtime executable that was invoked.
        dotnet: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A runtime listing line did not have the expected shape.
    #[error("Invalid runtime line. Expected 'Microsoft.NETCore.App x.x.x', but was '{line}'")]
    InvalidRuntimeLine {
        /// Offending line.
        line: String,
    },

    /// A version specifier or listed version was invalid, or nothing matched.
    #[error(transparent)]
    Version(#[from] VersionError),
}
