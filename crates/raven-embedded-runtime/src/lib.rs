//! Runtime framework version selection for the embedded server.
//!
//! The server binary runs on a shared framework runtime. Callers pin that
//! runtime with a specifier such as `8.0.x` or `7.0.2+`; this crate parses the
//! specifier into a [`RuntimeVersion`], lists the runtimes installed on the
//! host through a [`RuntimeCatalog`], and picks the highest installed version
//! the specifier accepts.
//!
//! ```rust
//! use raven_embedded_runtime::{RuntimeVersion, match_version};
//!
//! let installed: Vec<RuntimeVersion> = ["3.1.0", "3.1.3", "3.2.3"]
//!     .iter()
//!     .map(|raw| raw.parse().expect("valid version"))
//!     .collect();
//! assert_eq!(match_version("3.1.x", &installed).expect("match"), "3.1.3");
//! ```

mod catalog;
mod error;
mod matcher;
mod version;

#[cfg(test)]
mod tests;

pub use catalog::{DotNetInfo, RuntimeCatalog, parse_runtime_listing, resolve_framework_version};
pub use error::{RuntimeError, VersionError};
pub use matcher::{match_version, needs_match, select_best};
pub use version::{Component, MatchingType, RuntimeVersion};
