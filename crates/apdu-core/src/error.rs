//! Core error types for APDU operations

use thiserror::Error;

/// Result type for core APDU operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for core APDU operations
#[derive(Debug, Error)]
pub enum Error {
    /// Command bytes do not form a valid short APDU
    #[error("invalid command length: {0} bytes")]
    InvalidCommandLength(usize),

    /// Response shorter than a status word
    #[error("response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Create a transport error with a message
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
