//! Process-wide tracing subscriber for hosts that let the handle own logging.
//!
//! [`EmbeddedServer::start`](crate::EmbeddedServer::start) calls
//! [`initialise`] when the options carry a [`LoggingConfig`]. The first
//! configuration installed stays in force for the life of the process; a
//! host that set its own global subscriber first keeps it.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use raven_embedded_config::{LogFormat, LoggingConfig};
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

static INSTALLED: OnceCell<LoggingConfig> = OnceCell::new();

/// What [`initialise`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telemetry {
    /// This call installed the subscriber.
    Installed,
    /// An earlier call installed a subscriber with this configuration.
    AlreadyInstalled(LoggingConfig),
    /// The host installed its own global subscriber; nothing was changed.
    HostSubscriber,
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The filter expression could not be parsed.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Expression as configured.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// The subscriber could not be registered globally.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

enum Skipped {
    HostSubscriber,
    Failed(TelemetryError),
}

/// Installs the subscriber described by `config` unless one is already set.
///
/// The filter is checked on every call, so an invalid expression is reported
/// even after another configuration was installed.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an invalid filter expression and
/// [`TelemetryError::Subscriber`] when registration fails.
pub fn initialise(config: &LoggingConfig) -> Result<Telemetry, TelemetryError> {
    let filter = parse_filter(config)?;
    let mut installed_now = false;
    let active = INSTALLED.get_or_try_init(|| {
        if tracing::dispatcher::has_been_set() {
            return Err(Skipped::HostSubscriber);
        }
        install_subscriber(filter, config.format()).map_err(Skipped::Failed)?;
        installed_now = true;
        Ok(config.clone())
    });

    match active {
        Ok(_) if installed_now => Ok(Telemetry::Installed),
        Ok(existing) => Ok(Telemetry::AlreadyInstalled(existing.clone())),
        Err(Skipped::HostSubscriber) => Ok(Telemetry::HostSubscriber),
        Err(Skipped::Failed(error)) => Err(error),
    }
}

fn parse_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(config.filter()).map_err(|error| TelemetryError::Filter {
        filter: config.filter().to_owned(),
        message: error.to_string(),
    })
}

fn install_subscriber(filter: EnvFilter, format: LogFormat) -> Result<(), TelemetryError> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
