//! Errors raised while launching the server process.
//!
//! Shutdown never fails from the caller's point of view: signalling and kill
//! failures are logged and reported through
//! [`ShutdownOutcome`](crate::ShutdownOutcome).

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use raven_embedded_config::OptionsError;
use raven_embedded_runtime::RuntimeError;
use thiserror::Error;

/// Why the server failed to report readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupFailureReason {
    /// Standard output closed before the readiness line appeared.
    StreamClosed,
    /// The startup timeout elapsed before the readiness line appeared.
    DeadlineExceeded,
}

impl fmt::Display for StartupFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamClosed => f.write_str("the server output closed before it became ready"),
            Self::DeadlineExceeded => {
                f.write_str("the server did not become ready within the startup timeout")
            }
        }
    }
}

/// Diagnostic raised when the server never became ready.
///
/// Carries everything the server wrote to both streams up to the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unable to start the RavenDB Server: {reason}{}", render_sections(.stderr, .stdout))]
pub struct StartupFailure {
    reason: StartupFailureReason,
    stdout: String,
    stderr: String,
}

fn render_sections(stderr: &str, stdout: &str) -> String {
    let mut rendered = String::new();
    for (title, body) in [("Error", stderr), ("Output", stdout)] {
        if !body.trim().is_empty() {
            rendered.push_str(&format!("\n{title}:\n{}", body.trim_end()));
        }
    }
    rendered
}

impl StartupFailure {
    pub(crate) const fn new(reason: StartupFailureReason, stdout: String, stderr: String) -> Self {
        Self {
            reason,
            stdout,
            stderr,
        }
    }

    /// Returns why startup failed.
    #[must_use]
    pub const fn reason(&self) -> StartupFailureReason {
        self.reason
    }

    /// Returns the standard output captured during startup.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Returns the standard error drained after the failure.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}

/// Errors arising from [`launch`](crate::launch).
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The options failed validation.
    #[error(transparent)]
    Options(#[from] OptionsError),

    /// The server entry point does not exist in the target location.
    #[error("Server file was not found: {path}")]
    ServerBinaryMissing {
        /// Expected location of the entry point.
        path: Utf8PathBuf,
    },

    /// Relative paths could not be resolved against the working directory.
    #[error("unable to resolve the working directory: {source}")]
    WorkingDirectory {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The runtime framework version could not be resolved.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The operating system refused to start the server.
    #[error("Unable to execute server. Command was: {working_directory}> {command_line}")]
    Spawn {
        /// Directory the command was launched from.
        working_directory: String,
        /// Rendered command line.
        command_line: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A standard stream of the child was not captured.
    #[error("failed to capture server {stream}")]
    MissingPipe {
        /// Name of the stream.
        stream: &'static str,
    },

    /// The output reader thread could not be started.
    #[error("failed to start the {stream} reader: {source}")]
    OutputReader {
        /// Name of the stream.
        stream: &'static str,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The server did not report readiness.
    #[error(transparent)]
    Startup(#[from] StartupFailure),
}
