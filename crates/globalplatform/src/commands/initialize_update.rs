//! INITIALIZE UPDATE command for GlobalPlatform
//!
//! This command starts an explicit secure channel session. The card answers
//! with 28 bytes: its key diversification data, key information, sequence
//! counter and challenge, and the card cryptogram.

use derive_more::{Deref, DerefMut};
use ironcard_apdu_core::{Command, Response, StatusWord};
use rand::RngCore;

use crate::{
    Error, Result,
    constants::{cla, ins, status},
    crypto::HostChallenge,
};

/// INITIALIZE UPDATE command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct InitializeUpdateCommand(Command);

impl InitializeUpdateCommand {
    /// Create a new INITIALIZE UPDATE command with a host challenge
    ///
    /// P1 is the requested key set version (0 for the card default) and P2
    /// the key identifier.
    pub fn with_challenge(key_set: u8, key_id: u8, host_challenge: &HostChallenge) -> Self {
        Self(
            Command::new(cla::GP, ins::INITIALIZE_UPDATE, key_set, key_id)
                .with_data(host_challenge.to_vec())
                .with_le(0),
        )
    }

    /// Create a new INITIALIZE UPDATE command with a random host challenge
    pub fn with_random_challenge(key_set: u8, key_id: u8) -> Self {
        let mut challenge = [0u8; 8];
        rand::rng().fill_bytes(&mut challenge);
        Self::with_challenge(key_set, key_id, &challenge)
    }
}

/// Response to an INITIALIZE UPDATE command
#[derive(Debug, Clone)]
pub enum InitializeUpdateResponse {
    /// Success response (9000)
    Success {
        /// Key diversification data (bytes 0..10)
        key_diversification_data: [u8; 10],
        /// Key version number and SCP major version (bytes 10..12)
        key_info: [u8; 2],
        /// Sequence counter and card challenge (bytes 12..20); for SCP02 the
        /// first two bytes are the sequence counter
        card_challenge: [u8; 8],
        /// Card cryptogram (bytes 20..28)
        card_cryptogram: [u8; 8],
    },
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

impl InitializeUpdateResponse {
    /// Parse from a raw response
    ///
    /// A success status with anything but a 28-byte payload is a protocol
    /// violation.
    pub fn from_response(response: &Response) -> Result<Self> {
        match response.status() {
            status::SUCCESS => {
                let payload = response.payload();
                if payload.len() != 28 {
                    return Err(Error::ProtocolMismatch(
                        "INITIALIZE UPDATE response must be 28 bytes",
                    ));
                }

                Ok(Self::Success {
                    key_diversification_data: payload[0..10].try_into().unwrap(),
                    key_info: payload[10..12].try_into().unwrap(),
                    card_challenge: payload[12..20].try_into().unwrap(),
                    card_cryptogram: payload[20..28].try_into().unwrap(),
                })
            }
            status::SECURITY_CONDITION_NOT_SATISFIED => Ok(Self::SecurityConditionNotSatisfied),
            status::AUTHENTICATION_METHOD_BLOCKED => Ok(Self::AuthenticationMethodBlocked),
            sw => Ok(Self::OtherError { sw }),
        }
    }

    /// Whether the command succeeded
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// SCP major version announced by the card
    pub const fn scp_version(&self) -> Option<u8> {
        match self {
            Self::Success { key_info, .. } => Some(key_info[1]),
            _ => None,
        }
    }

    /// Key version number announced by the card
    pub const fn key_version_number(&self) -> Option<u8> {
        match self {
            Self::Success { key_info, .. } => Some(key_info[0]),
            _ => None,
        }
    }

    /// SCP02 sequence counter (first two bytes of the challenge field)
    pub fn sequence_counter(&self) -> Option<[u8; 2]> {
        match self {
            Self::Success { card_challenge, .. } => Some([card_challenge[0], card_challenge[1]]),
            _ => None,
        }
    }

    /// Diversification seed: the first 16 bytes of the response
    pub fn diversification_seed(&self) -> Option<[u8; 16]> {
        match self {
            Self::Success {
                key_diversification_data,
                key_info,
                card_challenge,
                ..
            } => {
                let mut seed = [0u8; 16];
                seed[0..10].copy_from_slice(key_diversification_data);
                seed[10..12].copy_from_slice(key_info);
                seed[12..16].copy_from_slice(&card_challenge[0..4]);
                Some(seed)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_initialize_update_command() {
        let challenge = hex!("0001020304050607");
        let cmd = InitializeUpdateCommand::with_challenge(0x00, 0x00, &challenge);

        assert_eq!(cmd.class(), cla::GP);
        assert_eq!(cmd.instruction(), ins::INITIALIZE_UPDATE);
        assert_eq!(cmd.p1(), 0x00);
        assert_eq!(cmd.p2(), 0x00);
        assert_eq!(cmd.data(), Some(challenge.as_ref()));

        let raw = cmd.to_bytes();
        assert_eq!(raw.as_ref(), hex!("8050000008000102030405060700"));
    }

    #[test]
    fn test_initialize_update_random_challenge() {
        let cmd = InitializeUpdateCommand::with_random_challenge(0x20, 0x00);
        assert_eq!(cmd.p1(), 0x20);
        assert_eq!(cmd.data().map(<[u8]>::len), Some(8));
    }

    #[test]
    fn test_initialize_update_response() {
        // Captured from a real SCP02 card
        let raw = hex!("000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce49000");
        let response = Response::from_bytes(&raw).unwrap();
        let response = InitializeUpdateResponse::from_response(&response).unwrap();

        assert!(response.is_success());
        assert_eq!(response.scp_version(), Some(0x02));
        assert_eq!(response.key_version_number(), Some(0x20));
        assert_eq!(response.sequence_counter(), Some([0x00, 0x0D]));

        if let InitializeUpdateResponse::Success {
            key_diversification_data,
            key_info,
            card_challenge,
            card_cryptogram,
        } = response
        {
            assert_eq!(key_diversification_data, hex!("00000265018303953662"));
            assert_eq!(key_info, hex!("2002"));
            assert_eq!(card_challenge, hex!("000de9c62ba1c4c8"));
            assert_eq!(card_cryptogram, hex!("e55fcb91b6654ce4"));
        } else {
            panic!("expected success variant");
        }
    }

    #[test]
    fn test_initialize_update_response_wrong_length() {
        let raw = hex!("0102039000");
        let response = Response::from_bytes(&raw).unwrap();
        assert!(matches!(
            InitializeUpdateResponse::from_response(&response),
            Err(Error::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn test_initialize_update_response_error_status() {
        let response = Response::from_bytes(&hex!("6982")).unwrap();
        let response = InitializeUpdateResponse::from_response(&response).unwrap();
        assert!(matches!(
            response,
            InitializeUpdateResponse::SecurityConditionNotSatisfied
        ));
    }
}
