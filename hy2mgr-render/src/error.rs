//! Error types for hy2mgr-render.

use thiserror::Error;

/// All errors that can arise from rendering or validating a daemon config.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (building tera context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The document is not parseable YAML of the expected shape.
    #[error("config does not parse: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document parsed but is missing a required field.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}
