//! Error types for the model layer.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while introspecting models or translating records.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The adapter or a model is misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No model is registered under the given name.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A record could not be flattened into a document.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
