//! Preparing server files in the target location before launch.
//!
//! A [`ServerFilesProvider`] must leave a runnable installation, meaning
//! one containing the server binary, in the directory it is given.
//! [`provider_for`] maps the configured [`ServerSource`] to one of the
//! providers in this module; callers can also supply their own.

use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use raven_embedded_config::{SERVER_BINARY_NAME, ServerSource};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

pub(crate) const PROVIDER_TARGET: &str = "raven_embedded::provider";

/// Places a server installation into a target directory.
pub trait ServerFilesProvider: Send + Sync {
    /// Fills `target` with a complete server installation.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while copying or extracting.
    fn provide(&self, target: &Path) -> io::Result<()>;
}

/// Leaves the target untouched; the server is already installed there.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionedProvider;

impl ServerFilesProvider for ProvisionedProvider {
    fn provide(&self, target: &Path) -> io::Result<()> {
        debug!(
            target: PROVIDER_TARGET,
            target_dir = %target.display(),
            "using pre-provisioned server files"
        );
        Ok(())
    }
}

/// Copies an unpacked installation from a directory.
#[derive(Debug, Clone)]
pub struct CopyServerProvider {
    source: PathBuf,
}

impl CopyServerProvider {
    /// Creates a provider copying from `source`.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl ServerFilesProvider for CopyServerProvider {
    fn provide(&self, target: &Path) -> io::Result<()> {
        info!(
            target: PROVIDER_TARGET,
            source = %self.source.display(),
            target_dir = %target.display(),
            "copying server files"
        );
        fs::create_dir_all(target)?;
        for walked in WalkDir::new(&self.source).min_depth(1) {
            let entry = walked.map_err(io::Error::other)?;
            let relative = entry
                .path()
                .strip_prefix(&self.source)
                .map_err(io::Error::other)?;
            let destination = target.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination)?;
            } else {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &destination)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum ArchiveSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// Extracts a zip archive, from disk or memory.
#[derive(Debug, Clone)]
pub struct ExtractZipProvider {
    source: ArchiveSource,
}

impl ExtractZipProvider {
    /// Creates a provider extracting the archive at `path`.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: ArchiveSource::File(path.into()),
        }
    }

    /// Creates a provider extracting an archive held in memory.
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            source: ArchiveSource::Bytes(bytes),
        }
    }
}

impl ServerFilesProvider for ExtractZipProvider {
    fn provide(&self, target: &Path) -> io::Result<()> {
        info!(
            target: PROVIDER_TARGET,
            target_dir = %target.display(),
            "extracting server archive"
        );
        match &self.source {
            ArchiveSource::File(path) => extract(File::open(path)?, target),
            ArchiveSource::Bytes(bytes) => extract(Cursor::new(bytes.as_slice()), target),
        }
    }
}

fn extract<R: Read + Seek>(reader: R, target: &Path) -> io::Result<()> {
    let mut archive = ZipArchive::new(reader).map_err(io::Error::other)?;
    fs::create_dir_all(target)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(io::Error::other)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("archive entry '{}' escapes the target directory", entry.name()),
            ));
        };
        let destination = target.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&destination)?;
        io::copy(&mut entry, &mut file)?;
        restore_mode(&destination, entry.unix_mode())?;
    }
    Ok(())
}

#[cfg(unix)]
fn restore_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    match mode {
        Some(bits) => fs::set_permissions(path, fs::Permissions::from_mode(bits)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn restore_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// Picks directory copy or archive extraction based on what `path` holds.
#[derive(Debug, Clone)]
pub struct ExternalServerProvider {
    inner: ExternalSource,
}

#[derive(Debug, Clone)]
enum ExternalSource {
    Directory(CopyServerProvider),
    Archive(ExtractZipProvider),
}

impl ExternalServerProvider {
    /// Inspects `path` and selects the matching provider.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidInput`] unless `path` is a `.zip` file
    /// or a directory containing the server binary.
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let location = path.into();
        let is_zip = location
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("zip"));
        let inner = if location.is_file() && is_zip {
            ExternalSource::Archive(ExtractZipProvider::from_path(location))
        } else if location.join(SERVER_BINARY_NAME).is_file() {
            ExternalSource::Directory(CopyServerProvider::new(location))
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "expected a zip archive or a directory containing {SERVER_BINARY_NAME}: {}",
                    location.display()
                ),
            ));
        };
        Ok(Self { inner })
    }
}

impl ServerFilesProvider for ExternalServerProvider {
    fn provide(&self, target: &Path) -> io::Result<()> {
        match &self.inner {
            ExternalSource::Directory(provider) => provider.provide(target),
            ExternalSource::Archive(provider) => provider.provide(target),
        }
    }
}

/// Builds the provider for a configured source.
///
/// # Errors
///
/// Propagates [`ExternalServerProvider::new`] failures.
pub fn provider_for(source: &ServerSource) -> io::Result<Box<dyn ServerFilesProvider>> {
    Ok(match source {
        ServerSource::Provisioned => Box::new(ProvisionedProvider),
        ServerSource::Directory { path } => Box::new(CopyServerProvider::new(path.as_std_path())),
        ServerSource::Archive { path } => {
            Box::new(ExtractZipProvider::from_path(path.as_std_path()))
        }
        ServerSource::External { path } => {
            Box::new(ExternalServerProvider::new(path.as_std_path())?)
        }
    })
}

/// Removes `target` and everything below it. A missing directory is fine.
///
/// # Errors
///
/// Returns any other I/O error from the removal.
pub fn clear_target(target: &Path) -> io::Result<()> {
    match fs::remove_dir_all(target) {
        Ok(()) => {
            info!(
                target: PROVIDER_TARGET,
                target_dir = %target.display(),
                "cleared target server location"
            );
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}
