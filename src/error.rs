// src/error.rs
// Standardized error types for obrolan

use thiserror::Error;

/// Main error type for the obrolan library
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Convenience type alias for Result using ChatError
pub type Result<T> = std::result::Result<T, ChatError>;

impl From<String> for ChatError {
    fn from(s: String) -> Self {
        ChatError::Provider(s)
    }
}
