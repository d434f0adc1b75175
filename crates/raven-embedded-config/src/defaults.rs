//! Default values applied when options are not overridden.

use std::time::Duration;

/// Runtime framework specifier used when none is configured.
pub const DEFAULT_FRAMEWORK_VERSION: &str = "7.0.2+";

/// Executable used to host the server binary.
pub const DEFAULT_DOTNET_PATH: &str = "dotnet";

/// Directory that receives the server files, relative to the working directory.
pub const DEFAULT_TARGET_SERVER_LOCATION: &str = "RavenDBServer";

/// Directory holding the server's databases, relative to the working directory.
pub const DEFAULT_DATA_DIRECTORY: &str = "RavenDB";

/// Directory receiving server log files, relative to the working directory.
pub const DEFAULT_LOGS_PATH: &str = "RavenDB/Logs";

/// File name of the server entry point inside the target location.
pub const SERVER_BINARY_NAME: &str = "Raven.Server.dll";

/// Time allowed for the server to exit after the stop handshake.
pub const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for the server to report its endpoint after spawning.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default tracing filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";
