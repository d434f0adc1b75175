//! Stops supervised servers when the host process goes away.
//!
//! Registered processes are held weakly in a process-wide list. On Unix the
//! list is flushed from an `atexit` callback and from a signal thread watching
//! `SIGTERM`, `SIGINT`, `SIGHUP` and `SIGQUIT`; after flushing, the signal's
//! default action is re-raised so the host still terminates. Nothing runs if
//! the host is killed outright.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use once_cell::sync::{Lazy, OnceCell};
use tracing::debug;

use crate::PROCESS_TARGET;
use crate::supervisor::SupervisedProcess;

static REGISTRY: Lazy<Mutex<Vec<(u64, Weak<SupervisedProcess>)>>> =
    Lazy::new(|| Mutex::new(Vec::new()));
static NEXT_ID: AtomicU64 = AtomicU64::new(0);
static INSTALLED: OnceCell<()> = OnceCell::new();

/// Keeps a process registered for exit-time shutdown until dropped.
#[derive(Debug)]
pub struct ExitHookGuard {
    id: u64,
}

impl Drop for ExitHookGuard {
    fn drop(&mut self) {
        let mut entries = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(id, _)| *id != self.id);
    }
}

/// Registers `process` to be shut down when the host exits or is signalled.
#[must_use = "the process is deregistered when the guard is dropped"]
pub fn register_exit_hook(process: &Arc<SupervisedProcess>) -> ExitHookGuard {
    install_triggers();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((id, Arc::downgrade(process)));
    debug!(target: PROCESS_TARGET, pid = process.pid(), "registered exit hook");
    ExitHookGuard { id }
}

/// Shuts down every registered process that is still alive.
///
/// Returns how many processes were asked to stop. Entries are removed as
/// they are run, so a second call only sees newly registered processes.
pub fn run_exit_hooks() -> usize {
    let entries = std::mem::take(&mut *REGISTRY.lock().unwrap_or_else(PoisonError::into_inner));
    let mut stopped = 0;
    for process in entries.iter().filter_map(|(_, weak)| weak.upgrade()) {
        debug!(target: PROCESS_TARGET, pid = process.pid(), "running exit hook");
        process.shutdown();
        stopped += 1;
    }
    stopped
}

fn install_triggers() {
    INSTALLED.get_or_init(platform::install);
}

#[cfg(unix)]
mod platform {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
    use signal_hook::iterator::Signals;
    use tracing::{info, warn};

    use super::run_exit_hooks;
    use crate::PROCESS_TARGET;

    extern "C" fn on_exit() {
        run_exit_hooks();
    }

    pub(super) fn install() {
        // SAFETY: `on_exit` is a plain function that never unwinds across the
        // FFI boundary.
        if unsafe { libc::atexit(on_exit) } != 0 {
            warn!(target: PROCESS_TARGET, "failed to register atexit handler");
        }

        let mut signals = match Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP]) {
            Ok(signals) => signals,
            Err(error) => {
                warn!(target: PROCESS_TARGET, %error, "failed to install signal handlers");
                return;
            }
        };
        let spawned = std::thread::Builder::new()
            .name("raven-exit-signals".to_owned())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!(target: PROCESS_TARGET, signal, "termination signal received");
                    run_exit_hooks();
                    if let Err(error) = signal_hook::low_level::emulate_default_handler(signal) {
                        warn!(
                            target: PROCESS_TARGET,
                            signal,
                            %error,
                            "failed to re-raise termination signal"
                        );
                    }
                }
            });
        if let Err(error) = spawned {
            warn!(target: PROCESS_TARGET, %error, "failed to start signal thread");
        }
    }
}

#[cfg(not(unix))]
mod platform {
    pub(super) const fn install() {}
}
