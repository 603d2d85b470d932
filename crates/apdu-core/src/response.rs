//! APDU response definitions
//!
//! This module provides the [`Response`] type for parsing APDU responses
//! according to ISO/IEC 7816-4: a payload of zero or more bytes followed by
//! a two-byte status word.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{Error, status::StatusWord};

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data (may be empty)
    payload: Bytes,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Create a success (90 00) response
    pub fn success(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, StatusWord::new(0x90, 0x00))
    }

    /// Parse a response from raw bytes (payload followed by SW1-SW2)
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 2 {
            return Err(Error::ResponseTooShort(data.len()));
        }

        let status = StatusWord::new(data[data.len() - 2], data[data.len() - 1]);
        let payload = Bytes::copy_from_slice(&data[..data.len() - 2]);

        trace!(
            sw = %status,
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self { payload, status })
    }

    /// Get the response payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success (90 00)
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        let mut buf = BytesMut::with_capacity(response.payload.len() + 2);
        buf.put_slice(&response.payload);
        buf.put_slice(&response.status.bytes());
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_response_from_bytes() {
        let resp = Response::from_bytes(&hex!("0102039000")).unwrap();
        assert_eq!(resp.payload(), &hex!("010203"));
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
        assert!(resp.is_success());

        let resp = Response::from_bytes(&hex!("6A82")).unwrap();
        assert!(resp.payload().is_empty());
        assert_eq!(resp.status().to_u16(), 0x6A82);
        assert!(!resp.is_success());

        assert!(Response::from_bytes(&[0x90]).is_err());
        assert!(Response::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_response_to_bytes() {
        let resp = Response::success(Bytes::from_static(&hex!("AABB")));
        let bytes: Bytes = resp.into();
        assert_eq!(bytes.as_ref(), &hex!("AABB9000"));
    }
}
