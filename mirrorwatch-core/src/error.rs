//! Error types for mirrorwatch-core

use thiserror::Error;

/// Main error type for the mirrorwatch-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Durable storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Durable storage refused a write that would exceed its quota
    #[error("storage quota exceeded for {key}: {size} bytes exceeds limit of {limit}")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },

    /// Collector transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// No async runtime available to schedule flushes
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for mirrorwatch-core
pub type Result<T> = std::result::Result<T, Error>;
