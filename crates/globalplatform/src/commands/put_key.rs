//! PUT KEY command for GlobalPlatform
//!
//! This command loads or replaces a secure channel key set on the card.
//! Key components travel encrypted under the session DEK and are
//! accompanied by 3-byte key check values.

use derive_more::{Deref, DerefMut};
use ironcard_apdu_core::{Command, Response, StatusWord};

use crate::{
    Result,
    constants::{cla, ins, status},
    crypto::{key_check_value, tdes_ecb_encrypt},
    keys::KeySet,
};

/// Key type identifier for DES keys in the PUT KEY data field
const KEY_TYPE_DES: u8 = 0x80;

/// PUT KEY command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct PutKeyCommand(Command);

impl PutKeyCommand {
    /// Create a PUT KEY command adding a new key version
    pub fn add_key_version(key_data: Vec<u8>) -> Self {
        Self(Command::new(cla::GP, ins::PUT_KEY, 0x00, 0x81).with_data(key_data))
    }

    /// Create a PUT KEY command replacing an existing key version
    pub fn replace_key_version(old_version: u8, key_data: Vec<u8>) -> Self {
        Self(Command::new(cla::GP, ins::PUT_KEY, old_version, 0x81).with_data(key_data))
    }
}

/// Build the PUT KEY data field for a full ENC/MAC/KEK key set
///
/// The field is the new key version followed, for each key, by the DES key
/// type tag, the encrypted component (3DES-ECB under the session DEK), and
/// its key check value.
pub fn build_key_set_data(new_version: u8, dek: &[u8; 16], keys: &KeySet) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(1 + 3 * 22);
    data.push(new_version);

    for key in [keys.enc(), keys.mac(), keys.kek()] {
        let encrypted = tdes_ecb_encrypt(dek, key)?;
        let kcv = key_check_value(key);

        data.push(KEY_TYPE_DES);
        data.push(encrypted.len() as u8);
        data.extend_from_slice(&encrypted);
        data.push(kcv.len() as u8);
        data.extend_from_slice(&kcv);
    }

    Ok(data)
}

/// Response to a PUT KEY command
#[derive(Debug, Clone)]
pub enum PutKeyResponse {
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

impl PutKeyResponse {
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

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_put_key_command() {
        let cmd = PutKeyCommand::add_key_version(vec![0x20, 0x80, 0x10]);

        assert_eq!(cmd.class(), cla::GP);
        assert_eq!(cmd.instruction(), ins::PUT_KEY);
        assert_eq!(cmd.p1(), 0x00);
        assert_eq!(cmd.p2(), 0x81);

        let cmd = PutKeyCommand::replace_key_version(0x20, vec![0x21]);
        assert_eq!(cmd.p1(), 0x20);
    }

    #[test]
    fn test_build_key_set_data() {
        let dek = hex!("404142434445464748494a4b4c4d4e4f");
        let keys = KeySet::new([0x11; 16], [0x22; 16], [0x33; 16]);

        let data = build_key_set_data(0x20, &dek, &keys).unwrap();

        // Version byte plus three 22-byte key structures
        assert_eq!(data.len(), 1 + 3 * 22);
        assert_eq!(data[0], 0x20);
        assert_eq!(data[1], KEY_TYPE_DES);
        assert_eq!(data[2], 0x10);

        // The first component decrypts back to the ENC key
        let encrypted = &data[3..19];
        let expected = tdes_ecb_encrypt(&dek, keys.enc()).unwrap();
        assert_eq!(encrypted, expected);

        // KCV length and value
        assert_eq!(data[19], 0x03);
        assert_eq!(&data[20..23], &key_check_value(keys.enc()));
    }

    #[test]
    fn test_put_key_response() {
        let response = Response::from_bytes(&hex!("9000")).unwrap();
        assert!(PutKeyResponse::from_response(&response).is_success());

        let response = Response::from_bytes(&hex!("6982")).unwrap();
        assert!(matches!(
            PutKeyResponse::from_response(&response),
            PutKeyResponse::SecurityConditionNotSatisfied
        ));
    }
}
