//! Certificate material for secured servers.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use sha1::{Digest, Sha1};

use crate::error::OptionsError;

/// How the server obtains its own certificate.
#[derive(Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// Load a PFX file, optionally password protected.
    File {
        /// Path to the certificate file.
        path: Utf8PathBuf,
        /// Password protecting the file.
        password: Option<String>,
    },
    /// Ask an external command to produce the certificate.
    Exec {
        /// Executable invoked by the server.
        command: String,
        /// Arguments passed to the executable.
        arguments: String,
        /// Thumbprint of the certificate the command yields.
        server_thumbprint: String,
    },
}

impl fmt::Debug for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path, password } => f
                .debug_struct("File")
                .field("path", path)
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Exec {
                command,
                arguments,
                server_thumbprint,
            } => f
                .debug_struct("Exec")
                .field("command", command)
                .field("arguments", arguments)
                .field("server_thumbprint", server_thumbprint)
                .finish(),
        }
    }
}

/// DER-encoded client certificate registered as the server's administrator.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    der: Vec<u8>,
}

impl ClientCertificate {
    /// Wraps DER-encoded certificate bytes.
    #[must_use]
    pub const fn from_der(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// Reads a DER-encoded certificate from disk.
    ///
    /// # Errors
    ///
    /// Returns [`OptionsError::Read`] when the file cannot be read.
    pub fn from_der_file(path: &Utf8Path) -> Result<Self, OptionsError> {
        std::fs::read(path)
            .map(Self::from_der)
            .map_err(|source| OptionsError::read(path, source))
    }

    /// Returns the raw DER bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the certificate thumbprint: the uppercase hex SHA-1 of the DER
    /// encoding.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        hex::encode_upper(Sha1::digest(&self.der))
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("thumbprint", &self.thumbprint())
            .finish()
    }
}

/// Security settings for a server bound to an `https` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityOptions {
    certificate: CertificateSource,
    client_certificate: ClientCertificate,
    trust_store: Option<Utf8PathBuf>,
}

impl SecurityOptions {
    /// Secures the server with a certificate file.
    #[must_use]
    pub fn from_certificate_file(
        path: impl Into<Utf8PathBuf>,
        password: Option<String>,
        client_certificate: ClientCertificate,
    ) -> Self {
        Self {
            certificate: CertificateSource::File {
                path: path.into(),
                password,
            },
            client_certificate,
            trust_store: None,
        }
    }

    /// Secures the server with a certificate produced by an external command.
    #[must_use]
    pub fn from_certificate_exec(
        command: impl Into<String>,
        arguments: impl Into<String>,
        server_thumbprint: impl Into<String>,
        client_certificate: ClientCertificate,
    ) -> Self {
        Self {
            certificate: CertificateSource::Exec {
                command: command.into(),
                arguments: arguments.into(),
                server_thumbprint: server_thumbprint.into(),
            },
            client_certificate,
            trust_store: None,
        }
    }

    /// Adds the CA certificate clients should trust when connecting.
    #[must_use]
    pub fn with_trust_store(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.trust_store = Some(path.into());
        self
    }

    /// Returns the server certificate source.
    #[must_use]
    pub const fn certificate(&self) -> &CertificateSource {
        &self.certificate
    }

    /// Returns the administrator client certificate.
    #[must_use]
    pub const fn client_certificate(&self) -> &ClientCertificate {
        &self.client_certificate
    }

    /// Returns the CA certificate path, if configured.
    #[must_use]
    pub fn trust_store(&self) -> Option<&Utf8Path> {
        self.trust_store.as_deref()
    }

    /// Returns the thumbprint registered as a well-known administrator.
    #[must_use]
    pub fn admin_thumbprint(&self) -> String {
        self.client_certificate.thumbprint()
    }
}
