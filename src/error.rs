//! Error types for quotaguard.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for quota operations.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy that cannot be evaluated (e.g. a zero-length window)
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// A backing counter store failed and no fallback applies
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for QuotaError {
    fn from(err: config::ConfigError) -> Self {
        QuotaError::Config(err.to_string())
    }
}

/// Result type alias for quota operations.
pub type Result<T> = std::result::Result<T, QuotaError>;
