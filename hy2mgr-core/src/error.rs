//! Error types for hy2mgr-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from state persistence.
#[derive(Debug, Error)]
pub enum StateError {
    /// Underlying I/O failure, annotated with the path being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted record exists but is not a structurally valid state document.
    #[error("failed to decode state at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (save path).
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.into(),
        source,
    }
}
