//! Common error types for NHX

use thiserror::Error;

/// Common result type for NHX operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across NHX crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited table read/write error
    #[error("Table error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML document could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Configuration errors abort a run; everything else is per-item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
