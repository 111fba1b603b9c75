//! Error types for e2e-ci-report

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during report generation
#[derive(Debug, Error)]
pub enum Error {
    /// IO error (from std::io)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The report destination could not be opened or written
    #[error("Could not write report to {}: {source}", path.display())]
    WriteFailed {
        /// Destination path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
