//! Blocking HTTP client for the server's REST surface.

use std::sync::atomic::{AtomicBool, Ordering};

use raven_embedded_config::DatabaseRecord;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use ureq::{Agent, AgentBuilder, Response};
use url::Url;

use super::{ClientError, ConnectionTarget, DocumentStore, StoreConnector};

const CLIENT_TARGET: &str = "raven_embedded::client";

const STATUS_NOT_FOUND: u16 = 404;
const STATUS_CONFLICT: u16 = 409;

/// Connector issuing plain HTTP requests through a shared [`Agent`].
///
/// Client certificates are not presented; secured servers need a connector
/// that can perform mutual TLS.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    agent: Agent,
}

impl HttpConnector {
    /// Creates a connector with a default agent.
    #[must_use]
    pub fn new() -> Self {
        Self::with_agent(AgentBuilder::new().build())
    }

    /// Creates a connector that sends requests through `agent`.
    #[must_use]
    pub const fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreConnector for HttpConnector {
    type Store = HttpDocumentStore;

    fn connect(&self, target: &ConnectionTarget<'_>) -> Result<Self::Store, ClientError> {
        if target.certificate.is_some() {
            return Err(ClientError::CertificatesUnsupported);
        }
        let base = Url::parse(target.endpoint).map_err(|error| ClientError::Endpoint {
            endpoint: target.endpoint.to_owned(),
            reason: error.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Endpoint {
                endpoint: target.endpoint.to_owned(),
                reason: "URL cannot carry a path".to_owned(),
            });
        }

        Ok(HttpDocumentStore {
            agent: self.agent.clone(),
            base,
            database: target.database.to_owned(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Store talking to one database over HTTP.
#[derive(Debug)]
pub struct HttpDocumentStore {
    agent: Agent,
    base: Url,
    database: String,
    closed: AtomicBool,
}

impl HttpDocumentStore {
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed {
                database: self.database.clone(),
            });
        }
        Ok(())
    }

    fn send(
        &self,
        method: &'static str,
        url: &Url,
        body: Option<&impl Serialize>,
    ) -> Result<Response, ClientError> {
        self.ensure_open()?;
        debug!(target: CLIENT_TARGET, method, url = %url, "sending request");
        let request = self.agent.request_url(method, url);
        let result = match body {
            Some(payload) => request.send_json(payload),
            None => request.call(),
        };
        result.map_err(|error| match error {
            ureq::Error::Status(status, _) => ClientError::Rejected {
                method,
                url: url.to_string(),
                status,
            },
            ureq::Error::Transport(transport) => ClientError::Transport {
                url: url.to_string(),
                message: transport.to_string(),
            },
        })
    }
}

impl DocumentStore for HttpDocumentStore {
    fn database(&self) -> &str {
        &self.database
    }

    fn create_database(&self, record: &DatabaseRecord) -> Result<(), ClientError> {
        let url = self.url(
            &["admin", "databases"],
            &[
                ("name", record.database_name()),
                ("replicationFactor", "1"),
            ],
        );
        match self.send("PUT", &url, Some(record)) {
            Ok(_) => Ok(()),
            Err(ClientError::Rejected {
                status: STATUS_CONFLICT,
                ..
            }) => Err(ClientError::DatabaseExists {
                database: record.database_name().to_owned(),
            }),
            Err(error) => Err(error),
        }
    }

    fn put(&self, id: &str, document: &Value) -> Result<(), ClientError> {
        let url = self.url(&["databases", &self.database, "docs"], &[("id", id)]);
        self.send("PUT", &url, Some(document)).map(drop)
    }

    fn get(&self, id: &str) -> Result<Option<Value>, ClientError> {
        let url = self.url(&["databases", &self.database, "docs"], &[("id", id)]);
        let response = match self.send("GET", &url, None::<&Value>) {
            Ok(response) => response,
            Err(ClientError::Rejected {
                status: STATUS_NOT_FOUND,
                ..
            }) => return Ok(None),
            Err(error) => return Err(error),
        };

        let body: Value = response
            .into_json()
            .map_err(|error| ClientError::InvalidResponse {
                url: url.to_string(),
                message: error.to_string(),
            })?;
        let results = body
            .get("Results")
            .and_then(Value::as_array)
            .ok_or_else(|| ClientError::InvalidResponse {
                url: url.to_string(),
                message: "missing Results array".to_owned(),
            })?;
        Ok(results.first().cloned())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
