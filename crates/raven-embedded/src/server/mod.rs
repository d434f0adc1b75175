//! The caller-owned handle that starts, serves and stops one server.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use raven_embedded_config::{DatabaseOptions, SecurityOptions, ServerOptions};
use raven_embedded_process::{RunningServer, launch};
use raven_embedded_runtime::{DotNetInfo, RuntimeCatalog};
use tracing::{debug, info, warn};

use crate::SERVER_TARGET;
use crate::browser;
use crate::cache::SingleFlight;
use crate::client::{
    ClientError, ConnectionTarget, DocumentStore, HttpConnector, StoreConnector,
    create_database_if_absent,
};
use crate::error::EmbeddedError;
use crate::provider::{self, ServerFilesProvider};
use crate::telemetry;

/// Observable lifecycle state of an [`EmbeddedServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// `start` has not been called.
    Idle,
    /// `start` is provisioning or launching the server.
    Starting,
    /// The server announced its endpoint and accepts store requests.
    Running,
    /// The start attempt failed. The handle stays unusable.
    Failed,
    /// The handle has been closed.
    Stopped,
}

struct Active {
    server: RunningServer,
    security: Option<Arc<SecurityOptions>>,
}

enum Phase {
    Idle,
    Starting,
    Running(Box<Active>),
    Failed,
    Stopped,
}

impl Phase {
    const fn state(&self) -> ServerState {
        match self {
            Self::Idle => ServerState::Idle,
            Self::Starting => ServerState::Starting,
            Self::Running(_) => ServerState::Running,
            Self::Failed => ServerState::Failed,
            Self::Stopped => ServerState::Stopped,
        }
    }
}

/// Handle owning one embedded server process.
///
/// The handle moves through `Idle -> Starting -> Running -> Stopped`. A
/// failed start leaves it in [`ServerState::Failed`] for good. Stores are
/// built on first request per database name and reused until released or
/// until the handle closes. Dropping the handle closes it.
pub struct EmbeddedServer<C: StoreConnector = HttpConnector> {
    connector: C,
    provider: Option<Box<dyn ServerFilesProvider>>,
    catalog: Option<Box<dyn RuntimeCatalog + Send + Sync>>,
    phase: Mutex<Phase>,
    stores: SingleFlight<C::Store, ClientError>,
}

impl EmbeddedServer<HttpConnector> {
    /// Creates an idle handle whose stores talk HTTP to the server.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(HttpConnector::new())
    }
}

impl Default for EmbeddedServer<HttpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: StoreConnector> EmbeddedServer<C> {
    /// Creates an idle handle that builds stores with `connector`.
    #[must_use]
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            provider: None,
            catalog: None,
            phase: Mutex::new(Phase::Idle),
            stores: SingleFlight::new(),
        }
    }

    /// Uses `provider` instead of the one implied by the configured
    /// server source.
    #[must_use]
    pub fn with_server_files_provider(
        mut self,
        provider: impl ServerFilesProvider + 'static,
    ) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Resolves framework version specifiers against `catalog` instead of
    /// querying the configured runtime executable.
    #[must_use]
    pub fn with_runtime_catalog(
        mut self,
        catalog: impl RuntimeCatalog + Send + Sync + 'static,
    ) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    /// Returns the connector used to build stores.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.lock_phase().state()
    }

    /// Prepares the server files, launches the server and waits for it to
    /// announce its endpoint.
    ///
    /// Blocks for at most the configured startup timeout once the process
    /// is spawned. Only the first call on a handle can launch anything. When
    /// `options` carry a logging configuration the global subscriber is
    /// installed first, unless one is already in place.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::AlreadyStarted`] on a second call,
    /// [`EmbeddedError::Closed`] when the handle was closed before or during
    /// the start, and provisioning or launch failures otherwise.
    pub fn start(&self, options: &ServerOptions) -> Result<(), EmbeddedError> {
        {
            let mut phase = self.lock_phase();
            match *phase {
                Phase::Idle => *phase = Phase::Starting,
                Phase::Stopped => return Err(EmbeddedError::Closed),
                Phase::Starting | Phase::Running(_) | Phase::Failed => {
                    return Err(EmbeddedError::AlreadyStarted);
                }
            }
        }

        let outcome = apply_logging(options)
            .and_then(|()| self.provision(options))
            .and_then(|()| self.launch_server(options));

        let mut phase = self.lock_phase();
        match outcome {
            Ok(server) if matches!(*phase, Phase::Starting) => {
                info!(
                    target: SERVER_TARGET,
                    url = server.url(),
                    pid = server.pid(),
                    "embedded server running"
                );
                *phase = Phase::Running(Box::new(Active {
                    server,
                    security: options.security().cloned().map(Arc::new),
                }));
                Ok(())
            }
            Ok(server) => {
                drop(phase);
                warn!(
                    target: SERVER_TARGET,
                    pid = server.pid(),
                    "handle closed during start; stopping the new server"
                );
                let stopped = server.shutdown();
                debug!(target: SERVER_TARGET, outcome = ?stopped, "late server stopped");
                Err(EmbeddedError::Closed)
            }
            Err(error) => {
                if matches!(*phase, Phase::Starting) {
                    *phase = Phase::Failed;
                }
                warn!(target: SERVER_TARGET, %error, "embedded server failed to start");
                Err(error)
            }
        }
    }

    /// Returns the endpoint the server announced.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::NotStarted`] before the server is running,
    /// [`EmbeddedError::StartFailed`] after a failed start and
    /// [`EmbeddedError::Closed`] after `close`.
    pub fn server_url(&self) -> Result<String, EmbeddedError> {
        self.with_active(|active| active.server.url().to_owned())
    }

    /// Returns the store for `database`, creating the database on first use.
    ///
    /// # Errors
    ///
    /// See [`EmbeddedServer::get_store_with`].
    pub fn get_store(&self, database: &str) -> Result<Arc<C::Store>, EmbeddedError> {
        self.get_store_with(&DatabaseOptions::new(database))
    }

    /// Returns the store for the database named in `options`.
    ///
    /// The first request for a name connects a store and, unless
    /// `options` opts out, creates the database, treating an existing one as
    /// success. Concurrent requests for the same name share that single
    /// construction, and its outcome is reused by later requests until the
    /// store is released or closed by a caller. Later requests ignore
    /// `options`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedError::BlankDatabaseName`] for a blank name, a
    /// lifecycle error when the server is not running, and
    /// [`EmbeddedError::Store`] when the store could not be built.
    pub fn get_store_with(&self, options: &DatabaseOptions) -> Result<Arc<C::Store>, EmbeddedError> {
        let database = options.database_name();
        if database.trim().is_empty() {
            return Err(EmbeddedError::BlankDatabaseName);
        }
        let (endpoint, security) = self.with_active(|active| {
            (active.server.url().to_owned(), active.security.clone())
        })?;

        loop {
            let store = self
                .stores
                .get_or_build(database, |cached| cached.is_closed(), || {
                    self.build_store(&endpoint, security.as_deref(), options)
                })
                .map_err(|source| EmbeddedError::Store {
                    database: database.to_owned(),
                    source,
                })?;

            if matches!(*self.lock_phase(), Phase::Stopped) {
                if let Some(cached) = self.stores.remove(database) {
                    cached.close();
                }
                store.close();
                return Err(EmbeddedError::Closed);
            }
            if self.stores.holds(database, &store) {
                return Ok(store);
            }
            debug!(
                target: SERVER_TARGET,
                database,
                "store released while it was being built; rebuilding"
            );
            store.close();
        }
    }

    /// Closes the cached store for `database` and forgets it, so the next
    /// request builds a fresh one. Returns whether a built store was cached.
    ///
    /// Releasing while the store is still being built returns `false`; the
    /// store that build produces is closed and the waiting requests build a
    /// fresh one.
    pub fn release_store(&self, database: &str) -> bool {
        match self.stores.remove(database) {
            Some(store) => {
                debug!(target: SERVER_TARGET, database, "releasing store");
                store.close();
                true
            }
            None => false,
        }
    }

    /// Opens the server's web studio in the default browser.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error when the server is not running and
    /// [`EmbeddedError::Browser`] when the opener cannot be launched.
    pub fn open_studio_in_browser(&self) -> Result<(), EmbeddedError> {
        let url = self.server_url()?;
        browser::open(&url).map_err(|source| EmbeddedError::Browser {
            url,
            source: Arc::new(source),
        })
    }

    /// Stops the server and closes every cached store.
    ///
    /// Safe to call repeatedly; only the first call does any work. Closing a
    /// handle that never started simply marks it stopped.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_phase(), Phase::Stopped);
        match previous {
            Phase::Stopped => return,
            Phase::Running(active) => {
                info!(
                    target: SERVER_TARGET,
                    pid = active.server.pid(),
                    "stopping embedded server"
                );
                let outcome = active.server.shutdown();
                debug!(target: SERVER_TARGET, ?outcome, "embedded server stopped");
            }
            Phase::Idle | Phase::Starting | Phase::Failed => {}
        }

        for store in self.stores.drain() {
            debug!(target: SERVER_TARGET, database = store.database(), "closing store");
            store.close();
        }
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_active<T>(&self, read: impl FnOnce(&Active) -> T) -> Result<T, EmbeddedError> {
        match &*self.lock_phase() {
            Phase::Running(active) => Ok(read(active)),
            Phase::Idle | Phase::Starting => Err(EmbeddedError::NotStarted),
            Phase::Failed => Err(EmbeddedError::StartFailed),
            Phase::Stopped => Err(EmbeddedError::Closed),
        }
    }

    fn provision(&self, options: &ServerOptions) -> Result<(), EmbeddedError> {
        info!(
            target: SERVER_TARGET,
            target_dir = %options.target_server_location(),
            data_dir = %options.data_directory(),
            "starting embedded server"
        );
        let target = options.target_server_location();
        let failed = |source| EmbeddedError::Provision {
            target: target.to_string(),
            source: Arc::new(source),
        };

        if options.clear_target_server_location() {
            provider::clear_target(target.as_std_path()).map_err(failed)?;
        }
        let provided = match &self.provider {
            Some(custom) => custom.provide(target.as_std_path()),
            None => provider::provider_for(options.server_source())
                .and_then(|configured| configured.provide(target.as_std_path())),
        };
        provided.map_err(failed)
    }

    fn launch_server(&self, options: &ServerOptions) -> Result<RunningServer, EmbeddedError> {
        let server = match &self.catalog {
            Some(catalog) => launch(options, &**catalog)?,
            None => launch(options, &DotNetInfo::new(options.dotnet_path()))?,
        };
        Ok(server)
    }

    fn build_store(
        &self,
        endpoint: &str,
        security: Option<&SecurityOptions>,
        options: &DatabaseOptions,
    ) -> Result<C::Store, ClientError> {
        let target = ConnectionTarget {
            endpoint,
            database: options.database_name(),
            certificate: security.map(SecurityOptions::client_certificate),
            trust_store: security.and_then(SecurityOptions::trust_store),
        };
        let store = self.connector.connect(&target)?;

        let created = if options.skip_creating_database() {
            Ok(())
        } else {
            create_database_if_absent(&store, options.record())
        };
        if let Err(error) = created {
            store.close();
            return Err(error);
        }
        debug!(
            target: SERVER_TARGET,
            database = options.database_name(),
            "store ready"
        );
        Ok(store)
    }
}

fn apply_logging(options: &ServerOptions) -> Result<(), EmbeddedError> {
    let Some(logging) = options.logging() else {
        return Ok(());
    };
    let applied =
        telemetry::initialise(logging).map_err(|error| EmbeddedError::Telemetry(Arc::new(error)))?;
    debug!(target: SERVER_TARGET, ?applied, "telemetry configured");
    Ok(())
}

impl<C: StoreConnector> Drop for EmbeddedServer<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: StoreConnector> fmt::Debug for EmbeddedServer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedServer")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
