//! Error types for AskDesk.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Embedding or LLM provider unreachable, timed out, or over quota.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The provider failed every attempt of a batch; the batch was abandoned.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Provider(_) | Error::ProviderUnavailable(_) | Error::Http(_)
        )
    }

    /// Stable machine-readable code used at the HTTP boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Provider(_) | Error::ProviderUnavailable(_) | Error::Http(_) => {
                "PROVIDER_ERROR"
            }
            _ => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
