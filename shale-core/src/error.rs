//! Error types for Shale

use thiserror::Error;

/// Result type for Shale operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Shale
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
