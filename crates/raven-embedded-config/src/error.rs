//! Errors raised while assembling or loading server options.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors arising from option validation and loading.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// A required path or executable setting was empty.
    #[error("{field} cannot be blank")]
    Blank {
        /// Name of the offending option.
        field: &'static str,
    },

    /// Security was configured twice on the same options value.
    #[error("the security has already been configured")]
    SecurityAlreadyConfigured,

    /// An options or certificate file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// An options document was not valid TOML or had unknown keys.
    #[error("failed to parse server options: {source}")]
    Parse {
        /// Underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },
}

impl OptionsError {
    pub(crate) fn read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
