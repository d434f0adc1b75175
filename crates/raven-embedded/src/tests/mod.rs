//! Shared doubles for handle tests.
//!
//! The server is a shell script run with `/bin/sh`. It announces a `file://`
//! endpoint pointing at its data directory, and [`FileConnector`] stores
//! documents below that directory, so data written in one run is visible to
//! the next run over the same data directory.

#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use raven_embedded_config::{DatabaseRecord, ServerOptions};
use raven_embedded_runtime::{RuntimeCatalog, RuntimeError, RuntimeVersion};
use serde_json::Value;
use tempfile::TempDir;
use url::Url;

use crate::client::{ClientError, ConnectionTarget, DocumentStore, StoreConnector};
use crate::server::EmbeddedServer;

mod behaviour;

/// Announces a `file://` endpoint and leaves a marker after a graceful stop.
pub(crate) const READY_SCRIPT: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --DataDir=*) data="${arg#--DataDir=}" ;;
  esac
done
mkdir -p "$data"
rm -f "$data/stopped"
echo "Server available on: file://$data"
read quit
read confirm
if [ "$quit" = q ] && [ "$confirm" = y ]; then
  : > "$data/stopped"
  exit 0
fi
exit 3
"#;

/// Fails before announcing an endpoint.
pub(crate) const CRASH_SCRIPT: &str = r#"
echo "fatal: data directory locked" >&2
exit 1
"#;

/// Catalog used when no framework version is pinned.
pub(crate) struct NoRuntimes;

impl RuntimeCatalog for NoRuntimes {
    fn installed_runtimes(&self) -> Result<Vec<RuntimeVersion>, RuntimeError> {
        Ok(Vec::new())
    }
}

/// A temporary directory holding a server installation and its data.
pub(crate) struct FakeInstall {
    pub(crate) root: TempDir,
}

impl FakeInstall {
    /// Installs `script` as the server binary in the `server` directory.
    pub(crate) fn new(script: &str) -> Self {
        let install = Self::empty();
        install.write_installation("server", script);
        install
    }

    /// Creates the directory without installing anything.
    pub(crate) fn empty() -> Self {
        Self {
            root: TempDir::new().expect("create temp dir"),
        }
    }

    pub(crate) fn write_installation(&self, name: &str, script: &str) {
        let directory = self.root.path().join(name);
        fs::create_dir_all(&directory).expect("create installation dir");
        fs::write(directory.join("Raven.Server.dll"), script).expect("write server script");
    }

    pub(crate) fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.root.path().join(name)).expect("utf-8 temp path")
    }

    pub(crate) fn stopped_gracefully(&self) -> bool {
        self.path("data").join("stopped").is_file()
    }

    pub(crate) fn options(&self) -> ServerOptions {
        ServerOptions::default()
            .without_framework_version()
            .with_dotnet_path("/bin/sh")
            .with_target_server_location(self.path("server"))
            .with_data_directory(self.path("data"))
            .with_logs_path(self.path("logs"))
            .with_startup_timeout(Duration::from_secs(10))
            .with_graceful_shutdown_timeout(Duration::from_secs(5))
            .with_register_exit_hook(false)
    }
}

/// Builds a handle wired to a fresh [`FileConnector`].
pub(crate) fn file_server() -> EmbeddedServer<FileConnector> {
    EmbeddedServer::with_connector(FileConnector::default()).with_runtime_catalog(NoRuntimes)
}

/// Connector storing each database as a directory below the endpoint path.
#[derive(Default)]
pub(crate) struct FileConnector {
    connects: AtomicUsize,
    connect_delay: Option<Duration>,
}

impl FileConnector {
    pub(crate) const fn with_connect_delay(delay: Duration) -> Self {
        Self {
            connects: AtomicUsize::new(0),
            connect_delay: Some(delay),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl StoreConnector for FileConnector {
    type Store = FileStore;

    fn connect(&self, target: &ConnectionTarget<'_>) -> Result<FileStore, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            thread::sleep(delay);
        }
        let root = Url::parse(target.endpoint)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| ClientError::Endpoint {
                endpoint: target.endpoint.to_owned(),
                reason: "expected a file URL".to_owned(),
            })?;
        Ok(FileStore {
            directory: root.join("databases").join(target.database),
            database: target.database.to_owned(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Store keeping one JSON file per document.
pub(crate) struct FileStore {
    directory: PathBuf,
    database: String,
    closed: AtomicBool,
}

impl FileStore {
    pub(crate) fn database_exists(&self) -> bool {
        self.directory.is_dir()
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", id.replace('/', "_")))
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed {
                database: self.database.clone(),
            });
        }
        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn database(&self) -> &str {
        &self.database
    }

    fn create_database(&self, record: &DatabaseRecord) -> Result<(), ClientError> {
        self.ensure_open()?;
        if self.directory.is_dir() {
            return Err(ClientError::DatabaseExists {
                database: record.database_name().to_owned(),
            });
        }
        fs::create_dir_all(&self.directory)?;
        Ok(())
    }

    fn put(&self, id: &str, document: &Value) -> Result<(), ClientError> {
        self.ensure_open()?;
        fs::write(self.document_path(id), document.to_string())?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Value>, ClientError> {
        self.ensure_open()?;
        let path = self.document_path(id);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|error| ClientError::InvalidResponse {
                url: id.to_owned(),
                message: error.to_string(),
            })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[test]
fn log_targets_use_the_crate_path() {
    let crate_path = env!("CARGO_PKG_NAME").replace('-', "_");
    for target in [crate::SERVER_TARGET, crate::provider::PROVIDER_TARGET] {
        assert!(target.starts_with(&format!("{crate_path}::")), "{target}");
    }
}
