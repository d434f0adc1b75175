//! Launching the server and waiting for its readiness line.

use std::ops::ControlFlow;
use std::process::{Child, ChildStderr};
use std::sync::Arc;
use std::time::Duration;

use raven_embedded_config::ServerOptions;
use raven_embedded_runtime::{RuntimeCatalog, resolve_framework_version};
use tracing::{debug, info, warn};

use crate::PROCESS_TARGET;
use crate::command::{ServerCommand, ServerLayout};
use crate::error::{LaunchError, StartupFailure, StartupFailureReason};
use crate::exit_hook::{ExitHookGuard, register_exit_hook};
use crate::output::{Deadline, OutputReader, WatchStop};
use crate::supervisor::{ShutdownOutcome, SupervisedProcess};

/// Prefix of the stdout line announcing the server endpoint.
pub const READY_PREFIX: &str = "Server available on: ";

/// Time allowed for stderr to close after a failed start.
const STDERR_DRAIN_BUDGET: Duration = Duration::from_secs(5);

/// A server that reported its endpoint.
#[derive(Debug)]
pub struct RunningServer {
    url: String,
    process: Arc<SupervisedProcess>,
    exit_hook: Option<ExitHookGuard>,
}

impl RunningServer {
    /// Returns the endpoint the server announced.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the server's process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Returns the supervised process.
    #[must_use]
    pub const fn process(&self) -> &Arc<SupervisedProcess> {
        &self.process
    }

    /// Returns whether an exit hook covers this server.
    #[must_use]
    pub const fn has_exit_hook(&self) -> bool {
        self.exit_hook.is_some()
    }

    /// Runs the shutdown protocol. Later calls are no-ops.
    pub fn shutdown(&self) -> ShutdownOutcome {
        self.process.shutdown()
    }
}

/// Starts the server described by `options` and waits until it is ready.
///
/// The framework version specifier is resolved through `catalog` when it
/// needs a lookup. If readiness is not reached the process is shut down
/// before the failure is returned.
///
/// # Errors
///
/// Returns a [`LaunchError`] for invalid options, a missing server binary,
/// runtime resolution failures, spawn failures and startup failures.
pub fn launch(
    options: &ServerOptions,
    catalog: &dyn RuntimeCatalog,
) -> Result<RunningServer, LaunchError> {
    options.validate()?;
    let layout = ServerLayout::resolve(options)?;
    if !layout.server_binary().is_file() {
        return Err(LaunchError::ServerBinaryMissing {
            path: layout.server_binary().to_path_buf(),
        });
    }

    let framework_version = resolve_framework_version(options.framework_version(), catalog)?;
    let command = ServerCommand::build(
        options,
        &layout,
        framework_version.as_deref(),
        std::process::id(),
    );

    info!(
        target: PROCESS_TARGET,
        command_line = %command.command_line(),
        "starting server"
    );
    let child = command
        .to_command()
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            working_directory: std::env::current_dir()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
            command_line: command.command_line(),
            source: Arc::new(source),
        })?;

    supervise(child, options)
}

/// Takes over a freshly spawned server and waits for its readiness line.
///
/// The child must have piped stdin, stdout and stderr. Timeouts and exit
/// hook registration come from `options`.
///
/// # Errors
///
/// Returns [`LaunchError::Startup`] when stdout closes or the startup
/// timeout passes before the readiness line, carrying both output streams.
pub fn supervise(mut child: Child, options: &ServerOptions) -> Result<RunningServer, LaunchError> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let process = Arc::new(SupervisedProcess::new(
        child,
        options.graceful_shutdown_timeout(),
    ));
    let exit_hook = options
        .register_exit_hook()
        .then(|| register_exit_hook(&process));

    let Some(stdout) = stdout else {
        process.shutdown();
        return Err(LaunchError::MissingPipe { stream: "stdout" });
    };

    let deadline = Deadline::after(options.startup_timeout());
    let stdout_reader = match OutputReader::spawn("stdout", stdout) {
        Ok(reader) => reader,
        Err(source) => {
            process.shutdown();
            return Err(LaunchError::OutputReader {
                stream: "stdout",
                source: Arc::new(source),
            });
        }
    };

    let outcome = stdout_reader.watch(&deadline, readiness_marker);
    let reason = match outcome.stop {
        WatchStop::Stopped(url) => {
            info!(target: PROCESS_TARGET, pid = process.pid(), %url, "server is ready");
            stdout_reader.forward_to_log();
            forward_stderr(stderr);
            return Ok(RunningServer {
                url,
                process,
                exit_hook,
            });
        }
        WatchStop::EndOfStream => StartupFailureReason::StreamClosed,
        WatchStop::DeadlineExceeded => StartupFailureReason::DeadlineExceeded,
    };

    warn!(
        target: PROCESS_TARGET,
        pid = process.pid(),
        %reason,
        "server failed to start"
    );
    process.shutdown();
    let stderr_text = drain_stderr(stderr);
    Err(StartupFailure::new(reason, outcome.transcript, stderr_text).into())
}

fn readiness_marker(line: Option<&str>, _transcript: &str) -> ControlFlow<String> {
    match line.and_then(|text| text.strip_prefix(READY_PREFIX)) {
        Some(url) => ControlFlow::Break(url.trim_end().to_owned()),
        None => ControlFlow::Continue(()),
    }
}

fn forward_stderr(stderr: Option<ChildStderr>) {
    let Some(stream) = stderr else {
        return;
    };
    match OutputReader::spawn("stderr", stream) {
        Ok(reader) => reader.forward_to_log(),
        Err(error) => warn!(
            target: PROCESS_TARGET,
            %error,
            "failed to start server stderr reader"
        ),
    }
}

fn drain_stderr(stderr: Option<ChildStderr>) -> String {
    let Some(stream) = stderr else {
        return String::new();
    };
    match OutputReader::spawn("stderr", stream) {
        Ok(reader) => reader.drain(&Deadline::after(STDERR_DRAIN_BUDGET)),
        Err(error) => {
            debug!(
                target: PROCESS_TARGET,
                %error,
                "failed to start server stderr reader"
            );
            String::new()
        }
    }
}
