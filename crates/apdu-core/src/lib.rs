//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types for working with smart card
//! APDU commands and responses according to ISO/IEC 7816-4:
//!
//! - Creating, serializing, and parsing short-form APDU commands
//! - Parsing responses and interpreting status words
//! - The [`CardTransport`] trait through which commands reach a card
//! - The [`ExchangeObserver`] trait for passive monitoring of card traffic
//!
//! Higher-level protocols (secure channels, card management command sets)
//! build on these types but live in their own crates.

#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod status;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use command::Command;
pub use response::Response;
pub use status::StatusWord;
pub use transport::{CardTransport, ExchangeObserver};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Command, Error, Response, Result, StatusWord,
        transport::{CardTransport, ExchangeObserver},
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let cmd = Command::new(0x00, 0xA4, 0x04, 0x00);
        assert_eq!(cmd.class(), 0x00);
        assert_eq!(cmd.instruction(), 0xA4);
        assert_eq!(cmd.p1(), 0x04);
        assert_eq!(cmd.p2(), 0x00);

        let resp = Response::success(Bytes::from_static(&[0x01, 0x02, 0x03]));
        assert!(resp.is_success());
        assert_eq!(resp.payload(), &[0x01, 0x02, 0x03]);
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
    }
}
