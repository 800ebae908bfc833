//! Crate-wide error types

use thiserror::Error;

/// Errors surfaced by the retrieval and orchestration pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Inference endpoint error: {0}")]
    Endpoint(#[from] crate::ollama::OllamaError),

    #[error("No compatible index for embedding model '{0}'")]
    NoCompatibleIndex(String),

    #[error("Embedding dimensionality mismatch for model '{model}': expected {expected}, got {actual}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Index storage error: {0}")]
    Storage(String),

    #[error("Unsupported index schema revision {found} (current is {current})")]
    SchemaRevision { found: u32, current: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Wrap an arbitrary message as a stage failure
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
