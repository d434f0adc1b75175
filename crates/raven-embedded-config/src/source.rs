//! Where the server files come from before launch.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Origin of the server installation copied into the target location.
///
/// In TOML the source is a table tagged by `kind`:
///
/// ```toml
/// [server_source]
/// kind = "archive"
/// path = "/opt/ravendb/RavenDB.zip"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ServerSource {
    /// The target location already holds a runnable installation.
    #[default]
    Provisioned,
    /// Copy an unpacked installation from a directory.
    Directory {
        /// Directory containing the server binary.
        path: Utf8PathBuf,
    },
    /// Extract a zip archive into the target location.
    Archive {
        /// Path to the zip archive.
        path: Utf8PathBuf,
    },
    /// Inspect the path and pick directory copy or archive extraction.
    External {
        /// Directory or zip archive.
        path: Utf8PathBuf,
    },
}

impl ServerSource {
    /// Returns the filesystem path the source reads from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Provisioned => None,
            Self::Directory { path } | Self::Archive { path } | Self::External { path } => {
                Some(path)
            }
        }
    }
}
