//! Client collaborators used to talk to the running server.
//!
//! The handle never speaks the server protocol itself. It asks a
//! [`StoreConnector`] for a [`DocumentStore`] bound to one database and lets
//! the store create that database when it is missing.

mod http;

use camino::Utf8Path;
use raven_embedded_config::{ClientCertificate, DatabaseRecord};
use serde_json::Value;
use thiserror::Error;

pub use http::{HttpConnector, HttpDocumentStore};

/// Errors raised by client collaborators.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The database already exists on the server.
    #[error("database '{database}' already exists")]
    DatabaseExists {
        /// Database that was being created.
        database: String,
    },
    /// The endpoint announced by the server is not a usable URL.
    #[error("invalid server endpoint '{endpoint}': {reason}")]
    Endpoint {
        /// Endpoint as announced by the server.
        endpoint: String,
        /// Why the endpoint was refused.
        reason: String,
    },
    /// The connector cannot present the configured client certificate.
    #[error("client certificates are not supported by this connector")]
    CertificatesUnsupported,
    /// The request never produced a response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Request URL.
        url: String,
        /// Transport failure description.
        message: String,
    },
    /// The server answered with an unexpected status.
    #[error("server rejected {method} {url} with status {status}")]
    Rejected {
        /// HTTP method of the request.
        method: &'static str,
        /// Request URL.
        url: String,
        /// Status code returned by the server.
        status: u16,
    },
    /// The response body could not be interpreted.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse {
        /// Request URL.
        url: String,
        /// What was wrong with the body.
        message: String,
    },
    /// The store was used after it was closed.
    #[error("document store for '{database}' is closed")]
    Closed {
        /// Database the store is bound to.
        database: String,
    },
    /// A store backed by local files failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and how a store should connect.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionTarget<'a> {
    /// Endpoint announced by the server.
    pub endpoint: &'a str,
    /// Database the store is bound to.
    pub database: &'a str,
    /// Client certificate to present, when the server is secured.
    pub certificate: Option<&'a ClientCertificate>,
    /// Trusted CA bundle, when the server certificate is not publicly trusted.
    pub trust_store: Option<&'a Utf8Path>,
}

/// Builds stores bound to a single database.
pub trait StoreConnector: Send + Sync {
    /// Store type produced by this connector.
    type Store: DocumentStore;

    /// Opens a store for `target.database` at `target.endpoint`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the connection cannot be set up.
    fn connect(&self, target: &ConnectionTarget<'_>) -> Result<Self::Store, ClientError>;
}

/// A connection bound to one database.
pub trait DocumentStore: Send + Sync {
    /// Returns the database this store is bound to.
    fn database(&self) -> &str;

    /// Creates the database described by `record`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DatabaseExists`] when the database is already
    /// present, or another [`ClientError`] on failure.
    fn create_database(&self, record: &DatabaseRecord) -> Result<(), ClientError>;

    /// Stores `document` under `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the write fails.
    fn put(&self, id: &str, document: &Value) -> Result<(), ClientError>;

    /// Loads the document stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the read fails. A missing document is
    /// `Ok(None)`.
    fn get(&self, id: &str) -> Result<Option<Value>, ClientError>;

    /// Releases the connection. Later calls fail with [`ClientError::Closed`].
    ///
    /// A store closed by its caller is dropped from the handle's cache, so
    /// the next request for the database connects afresh.
    fn close(&self);

    /// Returns whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}

/// Creates the database unless it already exists.
///
/// # Errors
///
/// Returns any [`ClientError`] other than [`ClientError::DatabaseExists`].
pub fn create_database_if_absent<S>(store: &S, record: &DatabaseRecord) -> Result<(), ClientError>
where
    S: DocumentStore + ?Sized,
{
    match store.create_database(record) {
        Ok(()) | Err(ClientError::DatabaseExists { .. }) => Ok(()),
        Err(error) => Err(error),
    }
}
