//! Error types for guard operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by guard components.
///
/// Verdicts (admit, reject, deny) are values, not errors; these variants
/// cover failures of the collaborators a guard talks to.
#[derive(Debug, Error)]
pub enum GuardError {
    /// The host load source could not be queried.
    #[error("load source unavailable: {0}")]
    LoadSource(String),
    /// Filesystem failure with the path it happened on.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A report could not be delivered to its channel.
    #[error("report delivery failed: {0}")]
    Report(String),
}

impl GuardError {
    /// Wrap an I/O error together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
