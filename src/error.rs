//! Custom error types for citegap.
//!
//! All library functions return `Result<T, GapError>` instead of using `unwrap()`.
//! Only bibliography/document read failures are meant to abort a run; every
//! other variant is scoped to a single lookup.

use thiserror::Error;

/// Main error type for citegap operations.
#[derive(Debug, Error)]
pub enum GapError {
    /// Network/HTTP request error (timeout, connection failure)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed or unexpected response body
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider kept answering 429 after every retry
    #[error("Rate limited, gave up after {attempts} attempts")]
    RateLimited {
        /// Number of attempts made
        attempts: u32,
    },

    /// External API returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Bibliography or document could not be read
    #[error("Bibliography error: {0}")]
    Bibliography(String),
}

/// Result type alias using `GapError`
pub type Result<T> = std::result::Result<T, GapError>;
