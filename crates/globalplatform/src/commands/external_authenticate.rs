//! EXTERNAL AUTHENTICATE command for GlobalPlatform
//!
//! This command presents the host cryptogram to the card and commits the
//! session security level. It is always transmitted through the secure
//! channel wrapper in MAC-only mode, so the command built here carries the
//! plaintext cryptogram.

use derive_more::{Deref, DerefMut};
use ironcard_apdu_core::{Command, Response, StatusWord};

use crate::{
    constants::{cla, ins, status},
    crypto::Cryptogram,
    scp::SecurityLevel,
};

/// EXTERNAL AUTHENTICATE command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct ExternalAuthenticateCommand(Command);

impl ExternalAuthenticateCommand {
    /// Create a new EXTERNAL AUTHENTICATE command
    ///
    /// P1 carries the requested security level bits; the data is the 8-byte
    /// host cryptogram.
    pub fn with_host_cryptogram(host_cryptogram: &Cryptogram, level: SecurityLevel) -> Self {
        Self(
            Command::new(cla::MAC, ins::EXTERNAL_AUTHENTICATE, level.bits(), 0x00)
                .with_data(host_cryptogram.to_vec()),
        )
    }
}

/// Response to an EXTERNAL AUTHENTICATE command
#[derive(Debug, Clone)]
pub enum ExternalAuthenticateResponse {
    /// Success response (9000)
    Success,
    /// Security condition not satisfied (6982)
    SecurityConditionNotSatisfied,
    /// Authentication method blocked (6983)
    AuthenticationMethodBlocked,
    /// Other error
    OtherError {
        /// Status word returned by the card
        sw: StatusWord,
    },
}

impl ExternalAuthenticateResponse {
    /// Parse from a raw response
    pub fn from_response(response: &Response) -> Self {
        match response.status() {
            status::SUCCESS => Self::Success,
            status::SECURITY_CONDITION_NOT_SATISFIED => Self::SecurityConditionNotSatisfied,
            status::AUTHENTICATION_METHOD_BLOCKED => Self::AuthenticationMethodBlocked,
            sw => Self::OtherError { sw },
        }
    }

    /// Whether authentication succeeded
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
