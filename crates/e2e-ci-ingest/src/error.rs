//! Error types for e2e-ci-ingest

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading CI artifacts
#[derive(Debug, Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// IO error tied to a specific input file
    #[error("Could not read {}: {source}", path.display())]
    ReadFailed {
        /// File that could not be read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// XML document could not be parsed
    #[error("Could not parse {source_name}: {reason}")]
    XmlParse {
        /// File name or label of the document
        source_name: String,
        /// Parser message
        reason: String,
    },

    /// Document parsed but is not a JUnit report
    #[error("Unexpected root element <{root}> in {source_name}")]
    UnexpectedRoot {
        /// File name or label of the document
        source_name: String,
        /// Tag that was found instead of testsuite/testsuites
        root: String,
    },
}
