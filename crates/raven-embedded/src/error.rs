//! Errors surfaced by [`EmbeddedServer`](crate::EmbeddedServer).

use std::io;
use std::sync::Arc;

use raven_embedded_process::LaunchError;
use thiserror::Error;

use crate::client::ClientError;
use crate::telemetry::TelemetryError;

/// Errors returned by the embedded server handle.
#[derive(Debug, Clone, Error)]
pub enum EmbeddedError {
    /// `start` was called on a handle that has already been started.
    #[error("the embedded server has already been started")]
    AlreadyStarted,
    /// The server was used before `start` completed.
    #[error("the embedded server has not been started; call start() first")]
    NotStarted,
    /// The handle has been closed.
    #[error("the embedded server has been closed")]
    Closed,
    /// An earlier start attempt failed; the handle cannot be reused.
    #[error("the embedded server failed to start and cannot be used")]
    StartFailed,
    /// A database name was blank.
    #[error("database name cannot be blank")]
    BlankDatabaseName,
    /// Preparing the server files failed.
    #[error("failed to provision server files into {target}: {source}")]
    Provision {
        /// Target server location being prepared.
        target: String,
        /// Underlying I/O failure.
        #[source]
        source: Arc<io::Error>,
    },
    /// The configured logging could not be applied.
    #[error(transparent)]
    Telemetry(Arc<TelemetryError>),
    /// Launching the server failed.
    #[error(transparent)]
    Launch(#[from] Arc<LaunchError>),
    /// Building the store for a database failed.
    #[error("failed to open store for database '{database}': {source}")]
    Store {
        /// Database the store was requested for.
        database: String,
        /// Client failure, shared with every caller waiting on the same store.
        #[source]
        source: Arc<ClientError>,
    },
    /// The platform browser opener could not be run.
    #[error("failed to open {url} in a browser: {source}")]
    Browser {
        /// URL that was being opened.
        url: String,
        /// Underlying spawn failure.
        #[source]
        source: Arc<io::Error>,
    },
}

impl From<LaunchError> for EmbeddedError {
    fn from(error: LaunchError) -> Self {
        Self::Launch(Arc::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_names_database() {
        let error = EmbeddedError::Store {
            database: "Orders".to_owned(),
            source: Arc::new(ClientError::Closed {
                database: "Orders".to_owned(),
            }),
        };

        assert_eq!(
            error.to_string(),
            "failed to open store for database 'Orders': document store for 'Orders' is closed"
        );
    }

    #[test]
    fn launch_errors_are_transparent() {
        let error = EmbeddedError::from(LaunchError::ServerBinaryMissing {
            path: "/srv/Raven.Server.dll".into(),
        });

        assert_eq!(
            error.to_string(),
            "Server file was not found: /srv/Raven.Server.dll"
        );
    }
}
