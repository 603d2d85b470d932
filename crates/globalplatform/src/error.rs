//! Error types for GlobalPlatform operations

use ironcard_apdu_core::{Error as ApduError, StatusWord};
use thiserror::Error;

/// Result type for GlobalPlatform operations
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for GlobalPlatform operations
#[derive(Debug, Error)]
pub enum Error {
    /// APDU command or transport error
    #[error("APDU error: {0}")]
    Apdu(#[from] ApduError),

    /// No security domain AID could be selected
    #[error("no security domain could be selected (last status: {last_sw:?})")]
    Selection {
        /// Status word of the last failed SELECT, if any was answered
        last_sw: Option<StatusWord>,
    },

    /// Card announced a different SCP than requested, or the INITIALIZE
    /// UPDATE response was malformed
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(&'static str),

    /// Card authentication failed
    #[error("card authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// Response MAC verification failed or was impossible
    #[error("security violation: {0}")]
    Security(&'static str),

    /// Wrapping would exceed the short-APDU payload limit
    #[error("wrapped command data would be {length} bytes, exceeding 255")]
    WouldOverflow {
        /// Data length the wrapped command would have had
        length: usize,
    },

    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(&'static str),

    /// A privileged command returned a non-success status word
    #[error("{operation} failed with status {status}")]
    CommandFailed {
        /// Operation that failed
        operation: &'static str,
        /// Status word returned by the card
        status: StatusWord,
    },

    /// Operation attempted on an invalidated secure channel
    #[error("secure channel is closed")]
    ChannelClosed,

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// Wrong data length
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid or unexpected response data
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
}

impl Error {
    /// Whether this error leaves the secure channel unusable
    ///
    /// Transport failures and MAC or crypto failures poison the channel;
    /// command status words and overflow rejections do not.
    pub(crate) const fn invalidates_channel(&self) -> bool {
        matches!(
            self,
            Self::Apdu(_) | Self::AuthenticationFailed(_) | Self::Security(_) | Self::Crypto(_)
        )
    }
}
