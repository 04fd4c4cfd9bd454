//! Error types for hy2mgr-sync.

use std::path::PathBuf;

use thiserror::Error;

use hy2mgr_core::{NodeId, StateError};
use hy2mgr_host::HostError;
use hy2mgr_render::RenderError;

/// Certificate generation and parsing failures.
#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM in {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {path}")]
    NoCertificate { path: PathBuf },
}

/// All errors that abort a reconcile run or a state operation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("certificate error: {0}")]
    Cert(#[from] CertError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("no config backup found in {dir}")]
    NoBackup { dir: PathBuf },

    #[error(transparent)]
    Host(#[from] HostError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReconcileError {
    ReconcileError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn cert_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CertError {
    CertError::Io {
        path: path.into(),
        source,
    }
}
