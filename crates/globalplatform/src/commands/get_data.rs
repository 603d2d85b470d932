//! GET DATA command for GlobalPlatform
//!
//! Reads a card data object identified by the P1-P2 pair, and parses the
//! two objects the secure channel layer depends on: the key information
//! template consulted during implicit channel initiation, and the SCP02
//! sequence counter.

use derive_more::{Deref, DerefMut};
use ironcard_apdu_core::{Command, Response, StatusWord};

use crate::{
    Error, Result,
    constants::{cla, ins, status, tags},
    crypto::SequenceCounter,
};

/// GET DATA command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GetDataCommand(Command);

impl GetDataCommand {
    /// Create a new GET DATA command for a data object identifier
    pub fn with_identifier(identifier: (u8, u8)) -> Self {
        Self(Command::new(cla::GP, ins::GET_DATA, identifier.0, identifier.1).with_le(0))
    }
}

/// Response to a GET DATA command
#[derive(Debug, Clone)]
pub enum GetDataResponse {
    /// Success response (9000)
    Success {
        /// The data object value
        data: Vec<u8>,
    },
    /// Referenced data not found (6A88)
    ReferencedDataNotFound,
    /// Other error
    OtherError {
        /// Status word returned by the card
        sw: StatusWord,
    },
}

impl GetDataResponse {
    /// Parse from a raw response
    pub fn from_response(response: &Response) -> Self {
        match response.status() {
            status::SUCCESS => Self::Success {
                data: response.payload().to_vec(),
            },
            status::REFERENCED_DATA_NOT_FOUND => Self::ReferencedDataNotFound,
            sw => Self::OtherError { sw },
        }
    }

    /// Get the data object value if the command succeeded
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Success { data } => Some(data),
            _ => None,
        }
    }
}

/// One key as listed in the card's key information template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInformation {
    /// Key identifier within the set
    pub key_id: u8,
    /// Key set version the card authenticates against by default
    pub version: u8,
}

/// Find the first data object carrying `tag` in a one-byte-tag,
/// one-byte-length object list
fn data_object(mut data: &[u8], tag: u8) -> Option<&[u8]> {
    while let [current, len, rest @ ..] = data {
        let len = *len as usize;
        if rest.len() < len {
            return None;
        }
        let (value, tail) = rest.split_at(len);
        if *current == tag {
            return Some(value);
        }
        data = tail;
    }
    None
}

/// Extract the first key's identifier and set version from a key
/// information template (an `E0` object wrapping `C0` entries)
pub fn parse_key_information(data: &[u8]) -> Result<KeyInformation> {
    let template = data_object(data, tags::KEY_INFORMATION_TEMPLATE)
        .ok_or(Error::InvalidResponse("missing key information template"))?;
    let entry = data_object(template, tags::KEY_INFORMATION)
        .ok_or(Error::InvalidResponse("missing key information entry"))?;

    match entry {
        [key_id, version, ..] => Ok(KeyInformation {
            key_id: *key_id,
            version: *version,
        }),
        _ => Err(Error::InvalidResponse("short key information entry")),
    }
}

/// Extract the SCP02 sequence counter from a `C1` data object
pub fn parse_sequence_counter(data: &[u8]) -> Result<SequenceCounter> {
    match data_object(data, tags::SEQUENCE_COUNTER) {
        Some(&[high, low]) => Ok([high, low]),
        Some(_) => Err(Error::InvalidResponse("sequence counter must be 2 bytes")),
        None => Err(Error::InvalidResponse("missing sequence counter")),
    }
}
