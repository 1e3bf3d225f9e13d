//! Error types for the corpus pipeline.
//!
//! Per-item acquisition problems (network hiccups, challenge pages, HTTP 429)
//! are not errors: they travel as [`crate::fetch::FetchOutcome`] variants and
//! never leave the current item. The variants here are the ones that stop a
//! stage.

use std::path::PathBuf;

/// Top-level error type for every pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    /// Config file or a required key is missing. Fatal at startup.
    #[error("configuration missing: {message}")]
    ConfigurationMissing { message: String },

    /// A document could not be persisted. Fatal, the store would be inconsistent.
    #[error("failed to write document {id} to {path:?}: {source}")]
    StorageWrite {
        id: String,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem I/O error outside of document writes.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// HTTP client construction or transport error.
    #[error("network error: {0}")]
    Network(String),

    /// Browser launch, navigation or page read error.
    #[error("browser error: {0}")]
    Browser(String),

    /// HTML could not be turned into article text.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Malformed or inconsistent tabular data.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// The operator refused to regenerate the split assignment.
    #[error("split assignment regeneration declined by operator")]
    Declined,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CorpusError>;

impl CorpusError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            message: msg.into(),
        }
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Wrap a `std::io::Error` with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<csv::Error> for CorpusError {
    fn from(e: csv::Error) -> Self {
        Self::Dataset(e.to_string())
    }
}
