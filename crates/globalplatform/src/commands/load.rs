//! LOAD command for GlobalPlatform
//!
//! Transfers one block of an executable load file. Blocks are numbered from
//! zero in P2; the final block is marked in P1.

use derive_more::{Deref, DerefMut};
use ironcard_apdu_core::{Command, Response, StatusWord};

use crate::constants::{cla, ins, load_p1, status};

/// LOAD command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct LoadCommand(Command);

impl LoadCommand {
    /// Create a LOAD command for a block
    pub fn with_block_data(p1: u8, block_number: u8, data: Vec<u8>) -> Self {
        Self(
            Command::new(cla::GP, ins::LOAD, p1, block_number)
                .with_data(data)
                .with_le(0),
        )
    }

    /// Create a LOAD command for a non-terminal block
    pub fn more_blocks(block_number: u8, data: Vec<u8>) -> Self {
        Self::with_block_data(load_p1::MORE_BLOCKS, block_number, data)
    }

    /// Create a LOAD command for the final block
    pub fn last_block(block_number: u8, data: Vec<u8>) -> Self {
        Self::with_block_data(load_p1::LAST_BLOCK, block_number, data)
    }
}

/// Response to a LOAD command
#[derive(Debug, Clone)]
pub enum LoadResponse {
    /// Success response (9000)
    Success,
    /// Security condition not satisfied (6982)
    SecurityConditionNotSatisfied,
    /// Wrong length (6700)
    WrongLength,
    /// Other error
    OtherError {
        /// Status word returned by the card
        sw: StatusWord,
    },
}

impl LoadResponse {
    /// Parse from a raw response
    pub fn from_response(response: &Response) -> Self {
        match response.status() {
            status::SUCCESS => Self::Success,
            status::SECURITY_CONDITION_NOT_SATISFIED => Self::SecurityConditionNotSatisfied,
            status::WRONG_LENGTH => Self::WrongLength,
            sw => Self::OtherError { sw },
        }
    }

    /// Whether the command succeeded
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
