//! SELECT command for GlobalPlatform
//!
//! This command is used to select an application or security domain by its
//! AID.

use derive_more::{Deref, DerefMut};
use ironcard_apdu_core::{Command, Response, StatusWord};

use crate::constants::{cla, ins, select_p1, status};

/// SELECT command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct SelectCommand(Command);

impl SelectCommand {
    /// Create a new SELECT by name command for an AID
    pub fn with_aid(aid: impl AsRef<[u8]>) -> Self {
        Self(
            Command::new(cla::ISO7816, ins::SELECT, select_p1::BY_NAME, 0x00)
                .with_data(aid.as_ref().to_vec())
                .with_le(0x00),
        )
    }
}

/// Response to a SELECT command
#[derive(Debug, Clone)]
pub enum SelectResponse {
    /// Success response (9000)
    Success {
        /// File control information returned by the application, if any
        fci: Option<Vec<u8>>,
    },
    /// File or application not found (6A82)
    NotFound,
    /// Other error
    OtherError {
        /// Status word returned by the card
        sw: StatusWord,
    },
}

impl SelectResponse {
    /// Parse from a raw response
    pub fn from_response(response: &Response) -> Self {
        match response.status() {
            status::SUCCESS => Self::Success {
                fci: (!response.payload().is_empty()).then(|| response.payload().to_vec()),
            },
            status::FILE_NOT_FOUND => Self::NotFound,
            sw => Self::OtherError { sw },
        }
    }

    /// Returns true if the selection was successful
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Get the file control information if available
    pub fn fci(&self) -> Option<&[u8]> {
        match self {
            Self::Success { fci } => fci.as_deref(),
            _ => None,
        }
    }
}
