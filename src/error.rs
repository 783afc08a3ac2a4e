use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerChatError {
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Thread store error: {0}")]
    StoreError(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LedgerChatError>;
