//! Error types for the training job launcher

use thiserror::Error;

/// Result type alias using the launcher Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the training job launcher
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Credential errors
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // Transport errors (connection refused, reset, DNS)
    #[error("HTTP transport error: {message}")]
    Http { message: String },

    // Remote API rejected the request
    #[error("Job API returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    // Timeout errors
    #[error("Operation timeout: {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Shorthand for an `InvalidConfig` error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http { .. } | Error::Timeout { .. } => true,
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Minimum wait before retrying this error, in milliseconds
    pub fn retry_delay_hint_ms(&self) -> Option<u64> {
        match self {
            Error::Api { status: 429, .. } => Some(2000),
            Error::Api { status, .. } if *status >= 500 => Some(500),
            Error::Http { .. } => Some(200),
            Error::Timeout { .. } => Some(1000),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
