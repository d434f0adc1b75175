//! Host-facing handle for an embedded RavenDB server.
//!
//! [`EmbeddedServer`] owns one server process for its lifetime. It prepares
//! the server files through a [`ServerFilesProvider`], launches and
//! supervises the process, and hands out per-database stores built by a
//! [`StoreConnector`]. Stores are memoized by database name: concurrent
//! requests for the same name share a single construction.
//!
//! ```no_run
//! use raven_embedded::{DocumentStore, EmbeddedServer};
//! use raven_embedded_config::ServerOptions;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = EmbeddedServer::new();
//! server.start(&ServerOptions::default())?;
//! let store = server.get_store("Orders")?;
//! store.put("orders/1", &serde_json::json!({ "Total": 12 }))?;
//! server.close();
//! # Ok(())
//! # }
//! ```

mod browser;
mod cache;
mod client;
mod error;
pub mod provider;
mod server;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use client::{
    ClientError, ConnectionTarget, DocumentStore, HttpConnector, HttpDocumentStore,
    StoreConnector, create_database_if_absent,
};
pub use error::EmbeddedError;
pub use provider::ServerFilesProvider;
pub use server::{EmbeddedServer, ServerState};

/// Log target for the server handle.
pub(crate) const SERVER_TARGET: &str = "raven_embedded::server";
