//! Crate-level launch tests driving a scripted stand-in for the server.
//!
//! The stand-in is a shell script saved as the server entry point and run
//! with `/bin/sh` in place of the runtime executable.

#![cfg(unix)]

use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use raven_embedded_config::ServerOptions;
use raven_embedded_runtime::{RuntimeCatalog, RuntimeError, RuntimeVersion};
use tempfile::TempDir;

use crate::error::{LaunchError, StartupFailureReason};
use crate::launch::launch;
use crate::supervisor::ShutdownOutcome;


/// Prints the readiness line, records its arguments, and honours the stop
/// sequence.
pub(crate) const READY_SCRIPT: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --DataDir=*) data="${arg#--DataDir=}" ;;
  esac
done
mkdir -p "$data"
printf '%s\n' "$@" > "$data/argv"
echo "booting"
echo "Server available on: file://$data"
read quit
read confirm
[ "$quit" = q ] && [ "$confirm" = y ] && exit 0
exit 3
"#;

/// Writes to both streams, then exits before becoming ready.
pub(crate) const CRASH_SCRIPT: &str = r#"
echo "booting"
echo "loading license"
echo "fatal: license rejected" >&2
exit 1
"#;

/// Never becomes ready and ignores the stop sequence.
pub(crate) const SILENT_SCRIPT: &str = r#"
echo "booting"
echo "warming up" >&2
exec sleep 30
"#;

/// Catalog used when no framework version is pinned.
pub(crate) struct NoRuntimes;

impl RuntimeCatalog for NoRuntimes {
    fn installed_runtimes(&self) -> Result<Vec<RuntimeVersion>, RuntimeError> {
        Ok(Vec::new())
    }
}

/// A temporary installation holding a scripted server.
pub(crate) struct FakeInstall {
    pub(crate) root: TempDir,
}

impl FakeInstall {
    pub(crate) fn new(script: &str) -> Self {
        let root = TempDir::new().expect("create temp dir");
        let server_dir = root.path().join("server");
        fs::create_dir_all(&server_dir).expect("create server dir");
        fs::write(server_dir.join("Raven.Server.dll"), script).expect("write server script");
        Self { root }
    }

    pub(crate) fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.root.path().join(name)).expect("utf-8 temp path")
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

#[test]
fn ready_server_reports_endpoint_and_stops_gracefully() {
    let install = FakeInstall::new(READY_SCRIPT);
    let server = launch(&install.options(), &NoRuntimes).expect("launch server");

    assert_eq!(server.url(), format!("file://{}", install.path("data")));
    assert!(server.process().is_running());
    assert!(!server.has_exit_hook());
    assert_eq!(server.shutdown(), ShutdownOutcome::Graceful);
    assert_eq!(server.shutdown(), ShutdownOutcome::AlreadyShutDown);
}

#[test]
fn server_receives_flags_in_order() {
    let install = FakeInstall::new(READY_SCRIPT);
    let options = install
        .options()
        .with_accept_eula(false)
        .with_command_line_arg("--Extra=1");
    let server = launch(&options, &NoRuntimes).expect("launch server");
    server.shutdown();

    let argv = fs::read_to_string(install.path("data").join("argv")).expect("read argv");
    let flags: Vec<&str> = argv
        .lines()
        .map(|line| line.split('=').next().unwrap_or(line))
        .collect();
    assert_eq!(
        flags,
        [
            "--Embedded.ParentProcessId",
            "--License.Eula.Accepted",
            "--Setup.Mode",
            "--DataDir",
            "--Logs.Path",
            "--ServerUrl",
            "--Extra",
        ]
    );
    assert!(argv.contains(&format!("--Embedded.ParentProcessId={}", std::process::id())));
    assert!(argv.contains("--License.Eula.Accepted=false"));
}

#[test]
fn early_exit_reports_stdout_and_stderr() {
    let install = FakeInstall::new(CRASH_SCRIPT);
    let error = launch(&install.options(), &NoRuntimes).expect_err("launch must fail");

    let LaunchError::Startup(failure) = error else {
        panic!("expected startup failure, got {error}");
    };
    assert_eq!(failure.reason(), StartupFailureReason::StreamClosed);
    assert_eq!(failure.stdout(), "booting\nloading license\n");
    assert_eq!(failure.stderr(), "fatal: license rejected\n");
    let message = failure.to_string();
    assert!(message.contains("booting\nloading license"), "{message}");
    assert!(message.contains("fatal: license rejected"), "{message}");
}

#[test]
fn silent_server_times_out_and_is_stopped() {
    let install = FakeInstall::new(SILENT_SCRIPT);
    let options = install
        .options()
        .with_startup_timeout(Duration::from_millis(300))
        .with_graceful_shutdown_timeout(Duration::from_millis(100));
    let error = launch(&options, &NoRuntimes).expect_err("launch must fail");

    let LaunchError::Startup(failure) = error else {
        panic!("expected startup failure, got {error}");
    };
    assert_eq!(failure.reason(), StartupFailureReason::DeadlineExceeded);
    assert_eq!(failure.stdout(), "booting\n");
    assert_eq!(failure.stderr(), "warming up\n");
}

#[test]
fn missing_server_binary_fails_before_spawning() {
    let install = FakeInstall::new(READY_SCRIPT);
    let options = install
        .options()
        .with_target_server_location(install.path("elsewhere"));
    let error = launch(&options, &NoRuntimes).expect_err("launch must fail");
    assert!(
        error
            .to_string()
            .starts_with("Server file was not found: "),
        "{error}"
    );
}

#[test]
fn blank_data_directory_fails_validation() {
    let install = FakeInstall::new(READY_SCRIPT);
    let options = install.options().with_data_directory("");
    let error = launch(&options, &NoRuntimes).expect_err("launch must fail");
    assert!(matches!(error, LaunchError::Options(_)));
}

#[test]
fn spawn_failure_includes_command_line() {
    let install = FakeInstall::new(READY_SCRIPT);
    let options = install.options().with_dotnet_path("/nonexistent/dotnet");
    let error = launch(&options, &NoRuntimes).expect_err("launch must fail");
    let LaunchError::Spawn { command_line, .. } = &error else {
        panic!("expected spawn failure, got {error}");
    };
    assert!(command_line.starts_with("/nonexistent/dotnet "));
    assert!(error.to_string().contains("Command was:"));
}

#[test]
fn log_targets_use_the_crate_path() {
    let crate_path = env!("CARGO_PKG_NAME").replace('-', "_");
    for target in [crate::PROCESS_TARGET, crate::SERVER_OUTPUT_TARGET] {
        assert!(target.starts_with(&format!("{crate_path}::")), "{target}");
    }
}
