//! Supervision of the embedded server process.
//!
//! [`launch`] turns [`ServerOptions`](raven_embedded_config::ServerOptions)
//! into a running child process and blocks until the server announces its
//! endpoint on standard output, the output stream closes, or the startup
//! deadline passes. A successful launch yields a [`RunningServer`]; the child
//! is then owned by a [`SupervisedProcess`] whose shutdown protocol asks the
//! server to stop over standard input before falling back to a forced kill.
//!
//! Output is consumed through an [`OutputReader`]: a background thread that
//! feeds lines into a bounded channel so the consumer can poll it against a
//! cumulative [`Deadline`].

mod command;
mod error;
mod exit_hook;
mod launch;
mod output;
mod supervisor;

#[cfg(test)]
mod tests;

pub use command::{ServerCommand, ServerLayout, escape_single_arg};
pub use error::{LaunchError, StartupFailure, StartupFailureReason};
pub use exit_hook::{ExitHookGuard, register_exit_hook, run_exit_hooks};
pub use launch::{READY_PREFIX, RunningServer, launch, supervise};
pub use output::{Deadline, OutputLine, OutputReader, WatchOutcome, WatchStop};
pub use supervisor::{ShutdownOutcome, SupervisedProcess};

/// Log target for process supervision.
pub(crate) const PROCESS_TARGET: &str = "raven_embedded_process::process";

/// Log target used for lines the server writes after startup.
pub(crate) const SERVER_OUTPUT_TARGET: &str = "raven_embedded_process::server_output";
