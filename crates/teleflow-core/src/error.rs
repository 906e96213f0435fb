use crate::validation::ValidationFailure;

/// Teleflow error types
#[derive(Debug, thiserror::Error)]
pub enum TeleflowError {
    #[error("declaration is invalid: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("normalization error: {0}")]
    Normalize(String),

    #[error("logging init failed: {0}")]
    Logging(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
