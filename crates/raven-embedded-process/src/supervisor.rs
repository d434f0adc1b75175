//! Ownership and shutdown of the server child process.

use std::fmt;
use std::io::Write;
use std::process::{Child, ExitStatus};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::PROCESS_TARGET;

/// Interval between exit checks while waiting for a graceful stop.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lines written to the server's stdin to request a stop: quit, then confirm.
const STOP_SEQUENCE: &[u8] = b"q\ny\n";

/// What a call to [`SupervisedProcess::shutdown`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// An earlier shutdown already ran.
    AlreadyShutDown,
    /// The process had exited before shutdown began.
    AlreadyExited,
    /// The process exited after the stop sequence.
    Graceful,
    /// The process was killed after the graceful attempt failed or timed out.
    Killed,
    /// The kill itself failed; the process may still be running.
    KillFailed,
}

struct ProcessSlot {
    child: Child,
    terminated: bool,
}

/// A server child process that is shut down at most once.
///
/// The child sits behind a mutex so an explicit shutdown and an exit hook
/// cannot signal or kill it concurrently. Dropping a process that was never
/// shut down kills it.
pub struct SupervisedProcess {
    pid: u32,
    graceful_timeout: Duration,
    slot: Mutex<ProcessSlot>,
}

impl SupervisedProcess {
    /// Takes ownership of a spawned child.
    ///
    /// The child's stdin must still be attached for the graceful stop to be
    /// attempted.
    #[must_use]
    pub fn new(child: Child, graceful_timeout: Duration) -> Self {
        Self {
            pid: child.id(),
            graceful_timeout,
            slot: Mutex::new(ProcessSlot {
                child,
                terminated: false,
            }),
        }
    }

    /// Returns the operating system process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns whether a shutdown has run.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .terminated
    }

    /// Returns whether the process is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(slot.child.try_wait(), Ok(None))
    }

    /// Stops the process: stop sequence on stdin, bounded wait, then kill.
    ///
    /// Only the first call does any work. Failures are logged and reflected
    /// in the returned outcome.
    pub fn shutdown(&self) -> ShutdownOutcome {
        // Recover from poisoning so the child is still stopped after a panic.
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.terminated {
            return ShutdownOutcome::AlreadyShutDown;
        }
        slot.terminated = true;

        let outcome = self.stop_child(&mut slot.child);
        info!(
            target: PROCESS_TARGET,
            pid = self.pid,
            ?outcome,
            "server process shut down"
        );
        outcome
    }

    fn stop_child(&self, child: &mut Child) -> ShutdownOutcome {
        if let Ok(Some(status)) = child.try_wait() {
            debug!(target: PROCESS_TARGET, pid = self.pid, ?status, "server already exited");
            return ShutdownOutcome::AlreadyExited;
        }

        info!(
            target: PROCESS_TARGET,
            pid = self.pid,
            timeout_ms = u64::try_from(self.graceful_timeout.as_millis()).unwrap_or(u64::MAX),
            "requesting graceful server shutdown"
        );
        match request_stop(child) {
            Ok(()) => {
                if let Some(status) = self.wait_for_exit(child) {
                    debug!(target: PROCESS_TARGET, pid = self.pid, ?status, "server exited");
                    return ShutdownOutcome::Graceful;
                }
                warn!(
                    target: PROCESS_TARGET,
                    pid = self.pid,
                    "server did not exit within the graceful shutdown timeout"
                );
            }
            Err(error) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid = self.pid,
                    %error,
                    "failed to send stop sequence to server"
                );
            }
        }

        kill(self.pid, child)
    }

    fn wait_for_exit(&self, child: &mut Child) -> Option<ExitStatus> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if started.elapsed() < self.graceful_timeout => {
                    thread::sleep(EXIT_POLL_INTERVAL);
                }
                Ok(None) => return None,
                Err(error) => {
                    warn!(
                        target: PROCESS_TARGET,
                        pid = self.pid,
                        %error,
                        "failed to poll server process status"
                    );
                    return None;
                }
            }
        }
    }
}

fn request_stop(child: &mut Child) -> std::io::Result<()> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("server stdin is not attached"))?;
    stdin.write_all(STOP_SEQUENCE)?;
    stdin.flush()
    // Dropping stdin closes the pipe.
}

fn kill(pid: u32, child: &mut Child) -> ShutdownOutcome {
    info!(target: PROCESS_TARGET, pid, "killing server process");
    if let Err(error) = child.kill() {
        if let Ok(Some(_)) = child.try_wait() {
            return ShutdownOutcome::Killed;
        }
        warn!(target: PROCESS_TARGET, pid, %error, "failed to kill server process");
        return ShutdownOutcome::KillFailed;
    }
    if let Err(error) = child.wait() {
        warn!(
            target: PROCESS_TARGET,
            pid,
            %error,
            "failed to reap killed server process"
        );
    }
    ShutdownOutcome::Killed
}

impl Drop for SupervisedProcess {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if slot.terminated {
            return;
        }
        slot.terminated = true;
        if matches!(slot.child.try_wait(), Ok(None)) {
            warn!(
                target: PROCESS_TARGET,
                pid = self.pid,
                "server process dropped without shutdown, killing"
            );
            drop(slot.child.kill());
            drop(slot.child.wait());
        }
    }
}

impl fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("pid", &self.pid)
            .field("graceful_timeout", &self.graceful_timeout)
            .finish_non_exhaustive()
    }
}
