//! Error types shared by the flipchain crates.

use thiserror::Error;

/// Errors raised outside the GPU layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Invalid or unparsable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
