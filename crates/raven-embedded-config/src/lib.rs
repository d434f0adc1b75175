//! Shared configuration for the embedded RavenDB server supervisor.
//!
//! The crate owns the option types consumed by the process supervisor and the
//! host-facing facade: [`ServerOptions`] describes how the server binary is
//! provisioned and launched, [`SecurityOptions`] carries certificate material
//! for secured servers, and [`DatabaseOptions`] controls how per-database
//! client handles are created. Options can be assembled with the builder
//! setters or loaded from a TOML document with [`ServerOptions::load`].

mod database;
mod defaults;
mod error;
mod logging;
mod options;
mod security;
mod source;

pub use database::{DatabaseOptions, DatabaseRecord};
pub use defaults::{
    DEFAULT_DATA_DIRECTORY, DEFAULT_DOTNET_PATH, DEFAULT_FRAMEWORK_VERSION,
    DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT, DEFAULT_LOG_FILTER, DEFAULT_LOGS_PATH,
    DEFAULT_STARTUP_TIMEOUT, DEFAULT_TARGET_SERVER_LOCATION, SERVER_BINARY_NAME,
};
pub use error::OptionsError;
pub use logging::{LogFormat, LogFormatParseError, LoggingConfig};
pub use options::ServerOptions;
pub use security::{CertificateSource, ClientCertificate, SecurityOptions};
pub use source::ServerSource;
