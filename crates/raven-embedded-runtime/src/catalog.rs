//! Discovery of the runtimes installed on the host.

use std::process::{Command, Stdio};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::RuntimeError;
use crate::matcher::{needs_match, select_best};
use crate::version::RuntimeVersion;

/// Log target for runtime discovery.
const RUNTIME_TARGET: &str = "raven_embedded_runtime::catalog";

const RUNTIME_SECTION_HEADERS: [&str; 2] =
    [".NET runtimes installed:", ".NET Core runtimes installed:"];
const SHARED_FRAMEWORK: &str = "Microsoft.NETCore.App";

/// Source of installed runtime versions.
#[cfg_attr(test, mockall::automock)]
pub trait RuntimeCatalog {
    /// Lists the runtimes installed on the host.
    ///
    /// # Errors
    ///
    /// Returns a [`RuntimeError`] when the listing cannot be produced or
    /// parsed.
    fn installed_runtimes(&self) -> Result<Vec<RuntimeVersion>, RuntimeError>;
}

/// Catalog backed by the output of `<dotnet> --info`.
#[derive(Debug, Clone)]
pub struct DotNetInfo {
    dotnet_path: Utf8PathBuf,
}

impl DotNetInfo {
    /// Creates a catalog that queries the given runtime executable.
    #[must_use]
    pub fn new(dotnet_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dotnet_path: dotnet_path.into(),
        }
    }

    /// Returns the runtime executable queried by this catalog.
    #[must_use]
    pub fn dotnet_path(&self) -> &Utf8Path {
        &self.dotnet_path
    }
}

impl RuntimeCatalog for DotNetInfo {
    fn installed_runtimes(&self) -> Result<Vec<RuntimeVersion>, RuntimeError> {
        let output = Command::new(&self.dotnet_path)
            .arg("--info")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| RuntimeError::Discovery {
                dotnet: self.dotnet_path.to_string(),
                source: Arc::new(source),
            })?;

        let listing = String::from_utf8_lossy(&output.stdout);
        let runtimes = parse_runtime_listing(&listing)?;
        debug!(
            target: RUNTIME_TARGET,
            dotnet = %self.dotnet_path,
            count = runtimes.len(),
            "discovered installed runtimes"
        );
        Ok(runtimes)
    }
}

/// Extracts shared framework versions from `dotnet --info` output.
///
/// Only lines following a runtimes section header that name the shared
/// framework are considered; the version is the second whitespace token.
///
/// # Errors
///
/// Returns [`RuntimeError::InvalidRuntimeLine`] for a framework line without
/// a version and a version error when the version cannot be parsed.
pub fn parse_runtime_listing(listing: &str) -> Result<Vec<RuntimeVersion>, RuntimeError> {
    let mut inside_runtimes = false;
    let mut runtimes = Vec::new();

    for line in listing.lines().map(str::trim) {
        if RUNTIME_SECTION_HEADERS
            .iter()
            .any(|header| line.starts_with(header))
        {
            inside_runtimes = true;
            continue;
        }
        if !inside_runtimes || !line.starts_with(SHARED_FRAMEWORK) {
            continue;
        }
        let version = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| RuntimeError::InvalidRuntimeLine {
                line: line.to_owned(),
            })?;
        runtimes.push(version.parse()?);
    }

    Ok(runtimes)
}

/// Turns the configured framework specifier into the version pinned on the
/// server command line.
///
/// Blank or absent specifiers yield `None`. Literal versions are returned as
/// written without consulting `catalog`.
///
/// # Errors
///
/// Propagates catalog failures, specifier parse errors and
/// [`crate::VersionError::NoMatch`].
pub fn resolve_framework_version(
    configured: Option<&str>,
    catalog: &dyn RuntimeCatalog,
) -> Result<Option<String>, RuntimeError> {
    let Some(specifier) = configured.filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    if !needs_match(specifier) {
        return Ok(Some(specifier.to_owned()));
    }

    let parsed: RuntimeVersion = specifier.parse()?;
    let installed = catalog.installed_runtimes()?;
    let selected = select_best(&parsed, &installed)?;
    debug!(
        target: RUNTIME_TARGET,
        specifier,
        selected = %selected,
        "resolved framework version"
    );
    Ok(Some(selected))
}
