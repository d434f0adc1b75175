//! Construction of the server command line.

use std::process::{Command, Stdio};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use raven_embedded_config::{CertificateSource, ServerOptions};

use crate::error::LaunchError;

/// Absolute locations the server is launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLayout {
    server_binary: Utf8PathBuf,
    data_directory: Utf8PathBuf,
    logs_path: Utf8PathBuf,
}

impl ServerLayout {
    /// Resolves the option paths against the current working directory.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::WorkingDirectory`] when a relative path is
    /// configured and the working directory cannot be determined or is not
    /// valid UTF-8.
    pub fn resolve(options: &ServerOptions) -> Result<Self, LaunchError> {
        Ok(Self {
            server_binary: absolute(&options.server_binary())?,
            data_directory: absolute(options.data_directory())?,
            logs_path: absolute(options.logs_path())?,
        })
    }

    /// Returns the server entry point.
    #[must_use]
    pub fn server_binary(&self) -> &Utf8Path {
        &self.server_binary
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
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, LaunchError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| LaunchError::WorkingDirectory {
        source: Arc::new(source),
    })?;
    let base = Utf8PathBuf::from_path_buf(cwd).map_err(|_| LaunchError::WorkingDirectory {
        source: Arc::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "working directory is not valid UTF-8",
        )),
    })?;
    Ok(base.join(path))
}

/// The runtime invocation that starts the server.
///
/// Arguments are kept as separate values and handed to the operating system
/// verbatim; [`ServerCommand::command_line`] renders them with
/// [`escape_single_arg`] for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    program: Utf8PathBuf,
    args: Vec<String>,
}

impl ServerCommand {
    /// Builds the argument vector in the order the server expects:
    /// optional framework pin, entry point, generated flags, security flags,
    /// bind URL, then any extra flags from the options.
    #[must_use]
    pub fn build(
        options: &ServerOptions,
        layout: &ServerLayout,
        framework_version: Option<&str>,
        parent_pid: u32,
    ) -> Self {
        let mut args = Vec::new();
        if let Some(version) = framework_version {
            args.push("--fx-version".to_owned());
            args.push(version.to_owned());
        }
        args.push(layout.server_binary.to_string());
        args.push(format!("--Embedded.ParentProcessId={parent_pid}"));
        args.push(format!("--License.Eula.Accepted={}", options.accept_eula()));
        args.push("--Setup.Mode=None".to_owned());
        args.push(format!("--DataDir={}", layout.data_directory));
        args.push(format!("--Logs.Path={}", layout.logs_path));

        if let Some(security) = options.security() {
            match security.certificate() {
                CertificateSource::File { path, password } => {
                    args.push(format!("--Security.Certificate.Path={path}"));
                    if let Some(password) = password {
                        args.push(format!("--Security.Certificate.Password={password}"));
                    }
                }
                CertificateSource::Exec {
                    command, arguments, ..
                } => {
                    args.push(format!("--Security.Certificate.Exec={command}"));
                    args.push(format!("--Security.Certificate.Exec.Arguments={arguments}"));
                }
            }
            args.push(format!(
                "--Security.WellKnownCertificates.Admin={}",
                security.admin_thumbprint()
            ));
        }

        args.push(format!("--ServerUrl={}", options.effective_server_url()));
        args.extend(options.command_line_args().iter().cloned());

        Self {
            program: options.dotnet_path().to_path_buf(),
            args,
        }
    }

    /// Returns the runtime executable.
    #[must_use]
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Returns the arguments passed to the runtime.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Renders the command with every argument escaped for display.
    ///
    /// Certificate passwords are masked.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|arg| {
                if arg.starts_with("--Security.Certificate.Password=") {
                    "--Security.Certificate.Password=***".to_owned()
                } else {
                    escape_single_arg(arg)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns a [`Command`] with all three standard streams piped.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

/// Quotes an argument so a command-line parser reads it back as one value.
///
/// Arguments without whitespace or double quotes are returned unchanged.
/// Otherwise the value is wrapped in double quotes, embedded quotes are
/// backslash-escaped, and backslashes that precede a quote or the closing
/// quote are doubled.
#[must_use]
pub fn escape_single_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        return arg.to_owned();
    }

    let mut escaped = String::with_capacity(arg.len() + 2);
    escaped.push('"');
    let mut backslashes = 0_usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                escaped.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                escaped.push('"');
                backslashes = 0;
            }
            other => {
                escaped.extend(std::iter::repeat_n('\\', backslashes));
                escaped.push(other);
                backslashes = 0;
            }
        }
    }
    escaped.extend(std::iter::repeat_n('\\', backslashes * 2));
    escaped.push('"');
    escaped
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use raven_embedded_config::{ClientCertificate, SecurityOptions};

    use super::*;

    #[fixture]
    fn layout() -> ServerLayout {
        ServerLayout {
            server_binary: "/opt/raven/Raven.Server.dll".into(),
            data_directory: "/var/lib/raven".into(),
            logs_path: "/var/log/raven".into(),
        }
    }

    #[rstest]
    fn builds_unsecured_argv_in_fixed_order(layout: ServerLayout) {
        let options = ServerOptions::default();
        let command = ServerCommand::build(&options, &layout, Some("7.0.14"), 4242);
        assert_eq!(command.program(), "dotnet");
        assert_eq!(
            command.args(),
            [
                "--fx-version",
                "7.0.14",
                "/opt/raven/Raven.Server.dll",
                "--Embedded.ParentProcessId=4242",
                "--License.Eula.Accepted=true",
                "--Setup.Mode=None",
                "--DataDir=/var/lib/raven",
                "--Logs.Path=/var/log/raven",
                "--ServerUrl=http://127.0.0.1:0",
            ]
        );
    }

    #[rstest]
    fn omits_framework_pin_and_appends_extra_flags(layout: ServerLayout) {
        let options = ServerOptions::default()
            .with_accept_eula(false)
            .with_server_url("http://0.0.0.0:8080")
            .with_command_line_arg("--Features.Availability=Experimental");
        let command = ServerCommand::build(&options, &layout, None, 0);
        let args = command.args();
        assert_eq!(args.first().map(String::as_str), Some("/opt/raven/Raven.Server.dll"));
        assert!(args.contains(&"--License.Eula.Accepted=false".to_owned()));
        assert_eq!(
            args.iter().rev().take(2).collect::<Vec<_>>(),
            ["--Features.Availability=Experimental", "--ServerUrl=http://0.0.0.0:8080"]
        );
    }

    #[rstest]
    fn certificate_file_security_precedes_url(layout: ServerLayout) {
        let client = ClientCertificate::from_der(b"abc".to_vec());
        let options = ServerOptions::default()
            .secured(SecurityOptions::from_certificate_file(
                "/certs/server.pfx",
                Some("s3cret".to_owned()),
                client,
            ))
            .expect("secure options");
        let command = ServerCommand::build(&options, &layout, None, 1);
        let tail: Vec<&str> = command.args().iter().skip(6).map(String::as_str).collect();
        assert_eq!(
            tail,
            [
                "--Security.Certificate.Path=/certs/server.pfx",
                "--Security.Certificate.Password=s3cret",
                "--Security.WellKnownCertificates.Admin=A9993E364706816ABA3E25717850C26C9CD0D89D",
                "--ServerUrl=https://127.0.0.1:0",
            ]
        );
        assert!(!command.command_line().contains("s3cret"));
    }

    #[rstest]
    fn certificate_exec_security_emits_command_and_arguments(layout: ServerLayout) {
        let options = ServerOptions::default()
            .secured(SecurityOptions::from_certificate_exec(
                "powershell",
                "C:\\secrets\\cert.ps1",
                "ABCDEF",
                ClientCertificate::from_der(vec![1]),
            ))
            .expect("secure options");
        let command = ServerCommand::build(&options, &layout, None, 1);
        assert!(
            command
                .args()
                .contains(&"--Security.Certificate.Exec=powershell".to_owned())
        );
        assert!(
            command
                .args()
                .contains(&"--Security.Certificate.Exec.Arguments=C:\\secrets\\cert.ps1".to_owned())
        );
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("", "\"\"")]
    #[case("with space", "\"with space\"")]
    #[case("say \"hi\"", "\"say \\\"hi\\\"\"")]
    #[case("C:\\Program Files\\", "\"C:\\Program Files\\\\\"")]
    #[case("C:\\no_spaces\\", "C:\\no_spaces\\")]
    fn escapes_single_arguments(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(escape_single_arg(raw), expected);
    }

    #[test]
    fn command_line_escapes_each_argument() {
        let layout = ServerLayout {
            server_binary: "/opt/raven server/Raven.Server.dll".into(),
            data_directory: "/data".into(),
            logs_path: "/logs".into(),
        };
        let command = ServerCommand::build(&ServerOptions::default(), &layout, None, 7);
        assert!(
            command
                .command_line()
                .starts_with("dotnet \"/opt/raven server/Raven.Server.dll\" --Embedded")
        );
    }

    #[test]
    fn relative_paths_resolve_against_working_directory() {
        let layout = ServerLayout::resolve(&ServerOptions::default()).expect("resolve layout");
        assert!(layout.data_directory().is_absolute());
        assert!(layout.server_binary().ends_with("RavenDBServer/Raven.Server.dll"));
    }
}
