//! Launch options for the embedded server.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer};

use crate::defaults::{
    DEFAULT_DATA_DIRECTORY, DEFAULT_DOTNET_PATH, DEFAULT_FRAMEWORK_VERSION,
    DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT, DEFAULT_LOGS_PATH, DEFAULT_STARTUP_TIMEOUT,
    DEFAULT_TARGET_SERVER_LOCATION,
};
use crate::error::OptionsError;
use crate::logging::LoggingConfig;
use crate::security::SecurityOptions;
use crate::source::ServerSource;


const UNSECURED_DEFAULT_URL: &str = "http://127.0.0.1:0";
const SECURED_DEFAULT_URL: &str = "https://127.0.0.1:0";

/// Everything needed to provision and launch the server process.
///
/// Relative paths are resolved against the host's working directory at launch
/// time. Security material is never read from TOML; attach it with
/// [`ServerOptions::secured`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerOptions {
    framework_version: Option<String>,
    dotnet_path: Utf8PathBuf,
    target_server_location: Utf8PathBuf,
    data_directory: Utf8PathBuf,
    logs_path: Utf8PathBuf,
    accept_eula: bool,
    server_url: Option<String>,
    #[serde(
        rename = "graceful_shutdown_timeout_secs",
        deserialize_with = "duration_from_secs"
    )]
    graceful_shutdown_timeout: Duration,
    #[serde(rename = "startup_timeout_secs", deserialize_with = "duration_from_secs")]
    startup_timeout: Duration,
    command_line_args: Vec<String>,
    clear_target_server_location: bool,
    register_exit_hook: bool,
    server_source: ServerSource,
    logging: Option<LoggingConfig>,
    #[serde(skip)]
    security: Option<SecurityOptions>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            framework_version: Some(DEFAULT_FRAMEWORK_VERSION.to_owned()),
            dotnet_path: Utf8PathBuf::from(DEFAULT_DOTNET_PATH),
            target_server_location: Utf8PathBuf::from(DEFAULT_TARGET_SERVER_LOCATION),
            data_directory: Utf8PathBuf::from(DEFAULT_DATA_DIRECTORY),
            logs_path: Utf8PathBuf::from(DEFAULT_LOGS_PATH),
            accept_eula: true,
            server_url: None,
            graceful_shutdown_timeout: DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            command_line_args: Vec::new(),
            clear_target_server_location: false,
            register_exit_hook: true,
            server_source: ServerSource::default(),
            logging: None,
            security: None,
        }
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl ServerOptions {
    /// Parses options from a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml_str(document: &str) -> Result<Self, OptionsError> {
        toml::from_str(document).map_err(|source| OptionsError::Parse {
            source: Box::new(source),
        })
    }

    /// Reads and parses a TOML options file.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::Read`] when the file cannot be read and
    /// [`OptionsError::Parse`] when its contents are invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, OptionsError> {
        let document =
            std::fs::read_to_string(path).map_err(|source| OptionsError::read(path, source))?;
        Self::from_toml_str(&document)
    }

    /// Checks that every required path setting is non-blank.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::Blank`] naming the first empty setting.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let required = [
            ("target server location", &self.target_server_location),
            ("data directory", &self.data_directory),
            ("logs path", &self.logs_path),
            ("dotnet path", &self.dotnet_path),
        ];
        for (field, value) in required {
            if value.as_str().trim().is_empty() {
                return Err(OptionsError::Blank { field });
            }
        }
        Ok(())
    }

    /// Pins the runtime framework version specifier.
    #[must_use]
    pub fn with_framework_version(mut self, version: impl Into<String>) -> Self {
        self.framework_version = Some(version.into());
        self
    }

    /// Lets the runtime host choose its framework version.
    #[must_use]
    pub fn without_framework_version(mut self) -> Self {
        self.framework_version = None;
        self
    }

    /// Sets the executable used to host the server binary.
    #[must_use]
    pub fn with_dotnet_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.dotnet_path = path.into();
        self
    }

    /// Sets the directory holding the server installation.
    #[must_use]
    pub fn with_target_server_location(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.target_server_location = path.into();
        self
    }

    /// Sets the directory holding the server's databases.
    #[must_use]
    pub fn with_data_directory(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.data_directory = path.into();
        self
    }

    /// Sets the directory receiving server logs.
    #[must_use]
    pub fn with_logs_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.logs_path = path.into();
        self
    }

    /// Records whether the server EULA is accepted.
    #[must_use]
    pub const fn with_accept_eula(mut self, accept: bool) -> Self {
        self.accept_eula = accept;
        self
    }

    /// Binds the server to an explicit URL.
    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Sets how long the server may take to exit after the stop handshake.
    #[must_use]
    pub const fn with_graceful_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_shutdown_timeout = timeout;
        self
    }

    /// Sets how long the server may take to report readiness.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Appends a raw flag passed to the server after the generated ones.
    #[must_use]
    pub fn with_command_line_arg(mut self, arg: impl Into<String>) -> Self {
        self.command_line_args.push(arg.into());
        self
    }

    /// Removes the target location before provisioning.
    #[must_use]
    pub const fn with_clear_target_server_location(mut self, clear: bool) -> Self {
        self.clear_target_server_location = clear;
        self
    }

    /// Controls whether host exit and termination signals stop the server.
    #[must_use]
    pub const fn with_register_exit_hook(mut self, register: bool) -> Self {
        self.register_exit_hook = register;
        self
    }

    /// Selects where the server files come from.
    #[must_use]
    pub fn with_server_source(mut self, source: ServerSource) -> Self {
        self.server_source = source;
        self
    }

    /// Sets the logging configuration. Starting a server with it set installs
    /// the global tracing subscriber it describes.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Attaches security settings.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::SecurityAlreadyConfigured`] if security was
    /// already attached.
    pub fn secured(mut self, security: SecurityOptions) -> Result<Self, OptionsError> {
        if self.security.is_some() {
            return Err(OptionsError::SecurityAlreadyConfigured);
        }
        self.security = Some(security);
        Ok(self)
    }

    /// Returns the framework version specifier, if pinned.
    #[must_use]
    pub fn framework_version(&self) -> Option<&str> {
        self.framework_version.as_deref()
    }

    /// Returns the runtime executable.
    #[must_use]
    pub fn dotnet_path(&self) -> &Utf8Path {
        &self.dotnet_path
    }

    /// Returns the server installation directory.
    #[must_use]
    pub fn target_server_location(&self) -> &Utf8Path {
        &self.target_server_location
    }

    /// Returns the path of the server entry point inside the target location.
    #[must_use]
    pub fn server_binary(&self) -> Utf8PathBuf {
        self.target_server_location
            .join(crate::defaults::SERVER_BINARY_NAME)
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_directory(&self) -> &Utf8Path {
        &self.data_directory
    }

    /// Returns the logs directory.
    #[must_use]
    pub fn logs_path(&self) -> &Utf8Path {
        &self.logs_path
    }

    /// Returns whether the EULA is accepted.
    #[must_use]
    pub const fn accept_eula(&self) -> bool {
        self.accept_eula
    }

    /// Returns the explicitly configured URL, if any.
    #[must_use]
    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    /// Returns the URL passed to the server: the configured one, or a
    /// loopback address with an OS-assigned port.
    #[must_use]
    pub fn effective_server_url(&self) -> &str {
        match (&self.server_url, &self.security) {
            (Some(url), _) => url.as_str(),
            (None, Some(_)) => SECURED_DEFAULT_URL,
            (None, None) => UNSECURED_DEFAULT_URL,
        }
    }

    /// Returns the graceful shutdown timeout.
    #[must_use]
    pub const fn graceful_shutdown_timeout(&self) -> Duration {
        self.graceful_shutdown_timeout
    }

    /// Returns the startup timeout.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Returns the extra flags appended to the server command line.
    #[must_use]
    pub fn command_line_args(&self) -> &[String] {
        &self.command_line_args
    }

    /// Returns whether the target location is cleared before provisioning.
    #[must_use]
    pub const fn clear_target_server_location(&self) -> bool {
        self.clear_target_server_location
    }

    /// Returns whether an exit hook is registered for the server process.
    #[must_use]
    pub const fn register_exit_hook(&self) -> bool {
        self.register_exit_hook
    }

    /// Returns the server files source.
    #[must_use]
    pub const fn server_source(&self) -> &ServerSource {
        &self.server_source
    }

    /// Returns the logging configuration, when one was given.
    ///
    /// Absent by default so hosts keep whatever subscriber they installed.
    #[must_use]
    pub const fn logging(&self) -> Option<&LoggingConfig> {
        self.logging.as_ref()
    }

    /// Returns the security settings, if any.
    #[must_use]
    pub const fn security(&self) -> Option<&SecurityOptions> {
        self.security.as_ref()
    }
}
