//! Error taxonomy for the assistant pipeline.
//!
//! Every failure a user can see falls into one of four classes. The HTTP
//! layer maps each class to a status code and a machine-readable error code;
//! the CLI just prints the message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistError {
    /// Index directory or database could not be created, opened, or written.
    #[error("storage error: {0}")]
    Storage(anyhow::Error),

    /// The embedding service call failed (index build or query embedding).
    #[error("embedding service error: {0}")]
    EmbeddingService(anyhow::Error),

    /// The chat-completion service call failed.
    #[error("generation service error: {0}")]
    GenerationService(anyhow::Error),

    /// Missing instruction or code. Raised before any network call.
    #[error("{0}")]
    InputValidation(String),
}

impl AssistError {
    /// Machine-readable code used in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AssistError::Storage(_) => "storage",
            AssistError::EmbeddingService(_) => "embedding_service",
            AssistError::GenerationService(_) => "generation_service",
            AssistError::InputValidation(_) => "input_validation",
        }
    }
}

pub type AssistResult<T> = std::result::Result<T, AssistError>;
