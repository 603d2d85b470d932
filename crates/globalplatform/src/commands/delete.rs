//! DELETE command for GlobalPlatform
//!
//! This command is used to delete applications, packages, and other objects.

use derive_more::{Deref, DerefMut};
use iso7816_tlv::simple::Tlv;
use ironcard_apdu_core::{Command, Response, StatusWord};

use crate::constants::{cla, delete_p2, ins, status, tags};

/// DELETE command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct DeleteCommand(Command);

impl DeleteCommand {
    /// Create a DELETE command for an AID with the given P2
    pub fn with_aid(aid: impl AsRef<[u8]>, p2: u8) -> Self {
        let data = Tlv::new(tags::AID.try_into().unwrap(), aid.as_ref().to_vec()).unwrap();
        Self(
            Command::new(cla::GP, ins::DELETE, 0x00, p2)
                .with_data(data.to_vec())
                .with_le(0),
        )
    }

    /// Create a DELETE command for a single object
    pub fn delete_object(aid: impl AsRef<[u8]>) -> Self {
        Self::with_aid(aid, delete_p2::OBJECT)
    }

    /// Create a DELETE command cascading to related objects
    pub fn delete_object_and_related(aid: impl AsRef<[u8]>) -> Self {
        Self::with_aid(aid, delete_p2::OBJECT_AND_RELATED)
    }
}

/// Response to a DELETE command
#[derive(Debug, Clone)]
pub enum DeleteResponse {
    /// Success response (9000)
    Success,
    /// Referenced data not found (6A88)
    ReferencedDataNotFound,
    /// Security condition not satisfied (6982)
    SecurityConditionNotSatisfied,
    /// Other error
    OtherError {
        /// Status word returned by the card
        sw: StatusWord,
    },
}

impl DeleteResponse {
    /// Parse from a raw response
    pub fn from_response(response: &Response) -> Self {
        match response.status() {
            status::SUCCESS => Self::Success,
            status::REFERENCED_DATA_NOT_FOUND => Self::ReferencedDataNotFound,
            status::SECURITY_CONDITION_NOT_SATISFIED => Self::SecurityConditionNotSatisfied,
            sw => Self::OtherError { sw },
        }
    }

    /// Whether the command succeeded
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
