//! Session state and key derivation for SCP01/SCP02 secure channels
//!
//! This module derives the per-session subkeys from the static key set and
//! the handshake material, and verifies the card cryptogram before any
//! channel is considered open.

use tracing::trace;
use zeroize::Zeroize;

use crate::{
    Error, Result,
    commands::initialize_update::InitializeUpdateResponse,
    constants::scp,
    crypto::{
        self, Cryptogram, HostChallenge, NULL_BYTES_8, SequenceCounter, pad80, retail_mac,
        tdes_cbc_encrypt, tdes_ecb_encrypt,
    },
    keys::KeySet,
    scp::ScpVariant,
};

/// Derivation constant for the SCP02 session MAC key
pub const DERIVATION_MAC: [u8; 2] = [0x01, 0x01];
/// Derivation constant for the SCP02 session RMAC key
pub const DERIVATION_RMAC: [u8; 2] = [0x01, 0x02];
/// Derivation constant for the SCP02 session encryption key
pub const DERIVATION_ENC: [u8; 2] = [0x01, 0x82];
/// Derivation constant for the SCP02 session data encryption key
pub const DERIVATION_DEK: [u8; 2] = [0x01, 0x81];

/// Per-session subkeys derived from the static key set
///
/// Indexed ENC, MAC, DEK, RMAC; the RMAC key only exists for SCP02
/// sessions. Destroyed when the secure channel is dropped.
#[derive(Debug, Clone, Zeroize)]
#[zeroize(drop)]
pub struct SessionKeys {
    enc: [u8; 16],
    mac: [u8; 16],
    dek: [u8; 16],
    rmac: Option<[u8; 16]>,
}

impl SessionKeys {
    /// Get the session encryption key
    pub const fn enc(&self) -> &[u8; 16] {
        &self.enc
    }

    /// Get the session MAC key
    pub const fn mac(&self) -> &[u8; 16] {
        &self.mac
    }

    /// Get the session data encryption key
    pub const fn dek(&self) -> &[u8; 16] {
        &self.dek
    }

    /// Get the session RMAC key, if the protocol defines one
    pub const fn rmac(&self) -> Option<&[u8; 16]> {
        self.rmac.as_ref()
    }
}

/// Derive one SCP02 session key
///
/// The derivation input is a 16-byte block carrying the two-byte purpose
/// constant at offset 0 and the sequence counter at offset 2, encrypted with
/// 3DES-CBC under the static key with a zero IV.
pub fn derive_scp02_key(
    base_key: &[u8; 16],
    seq: &SequenceCounter,
    purpose: &[u8; 2],
) -> Result<[u8; 16]> {
    let mut input = [0u8; 16];
    input[0..2].copy_from_slice(purpose);
    input[2..4].copy_from_slice(seq);

    let out = tdes_cbc_encrypt(base_key, &NULL_BYTES_8, &input)?;
    out.try_into()
        .map_err(|_| Error::Crypto("session key derivation output has wrong length"))
}

/// Increment an SCP02 sequence counter
///
/// The carry propagates from the low byte; 0xFFFF wraps around to 0x0000.
pub fn increment_sequence(seq: &SequenceCounter) -> SequenceCounter {
    let value = u16::from_be_bytes(*seq).wrapping_add(1);
    value.to_be_bytes()
}

fn derive_scp02_set(keys: &KeySet, seq: &SequenceCounter, variant: ScpVariant) -> Result<SessionKeys> {
    let flags = variant.flags();
    // One-base-key variants derive every session key from the ENC slot
    let (enc_base, mac_base, kek_base) = if flags.three_base_keys {
        (keys.enc(), keys.mac(), keys.kek())
    } else {
        (keys.enc(), keys.enc(), keys.enc())
    };

    let rmac_seq = if flags.explicit_initiation {
        *seq
    } else {
        increment_sequence(seq)
    };

    Ok(SessionKeys {
        enc: derive_scp02_key(enc_base, seq, &DERIVATION_ENC)?,
        mac: derive_scp02_key(mac_base, seq, &DERIVATION_MAC)?,
        dek: derive_scp02_key(kek_base, seq, &DERIVATION_DEK)?,
        rmac: Some(derive_scp02_key(mac_base, &rmac_seq, &DERIVATION_RMAC)?),
    })
}

fn derive_scp01_set(
    keys: &KeySet,
    card_challenge: &[u8; 8],
    host_challenge: &HostChallenge,
) -> Result<SessionKeys> {
    // card[16..20] ‖ host[0..4] ‖ card[12..16] ‖ host[4..8], with the card
    // bytes indexed from the start of the INITIALIZE UPDATE response
    let mut input = [0u8; 16];
    input[0..4].copy_from_slice(&card_challenge[4..8]);
    input[4..8].copy_from_slice(&host_challenge[0..4]);
    input[8..12].copy_from_slice(&card_challenge[0..4]);
    input[12..16].copy_from_slice(&host_challenge[4..8]);

    let derive = |key: &[u8; 16]| -> Result<[u8; 16]> {
        tdes_ecb_encrypt(key, &input)?
            .try_into()
            .map_err(|_| Error::Crypto("session key derivation output has wrong length"))
    };

    Ok(SessionKeys {
        enc: derive(keys.enc())?,
        mac: derive(keys.mac())?,
        // The SCP01 session KEK is the static KEK, unchanged
        dek: *keys.kek(),
        rmac: None,
    })
}

/// State of an authenticated (or authenticating) secure channel session
#[derive(Debug, Clone)]
pub struct Session {
    variant: ScpVariant,
    keys: SessionKeys,
    host_challenge: HostChallenge,
    /// Bytes 12..20 of the INITIALIZE UPDATE response: the sequence counter
    /// and card challenge
    card_challenge: [u8; 8],
}

impl Session {
    /// Derive a session from a successful INITIALIZE UPDATE exchange and
    /// verify the card cryptogram
    ///
    /// Fails with a protocol mismatch if the card announced a different SCP
    /// major version, and with an authentication error if the cryptogram
    /// does not verify.
    pub fn open(
        static_keys: &KeySet,
        variant: ScpVariant,
        init_response: &InitializeUpdateResponse,
        host_challenge: &HostChallenge,
    ) -> Result<Self> {
        let (card_challenge, card_cryptogram) = match init_response {
            InitializeUpdateResponse::Success {
                key_info,
                card_challenge,
                card_cryptogram,
                ..
            } => {
                if key_info[1] != variant.major() {
                    return Err(Error::ProtocolMismatch(
                        "card announced a different SCP version",
                    ));
                }
                (card_challenge, card_cryptogram)
            }
            _ => {
                return Err(Error::AuthenticationFailed(
                    "not a successful INITIALIZE UPDATE response",
                ));
            }
        };

        let keys = match variant.major() {
            scp::SCP01 => derive_scp01_set(static_keys, card_challenge, host_challenge)?,
            _ => {
                let seq = [card_challenge[0], card_challenge[1]];
                derive_scp02_set(static_keys, &seq, variant)?
            }
        };

        let session = Self {
            variant,
            keys,
            host_challenge: *host_challenge,
            card_challenge: *card_challenge,
        };

        let expected = session.card_cryptogram()?;
        if !crypto::ct_eq(&expected, card_cryptogram) {
            return Err(Error::AuthenticationFailed("card cryptogram mismatch"));
        }

        trace!(variant = ?variant, "session keys derived, card cryptogram verified");
        Ok(session)
    }

    /// Derive a session for an implicitly initiated SCP02 channel
    ///
    /// There is no handshake, so there are no challenges and no cryptograms;
    /// the sequence counter is read from the card with GET DATA.
    pub fn implicit(
        static_keys: &KeySet,
        variant: ScpVariant,
        seq: &SequenceCounter,
    ) -> Result<Self> {
        if !variant.is_implicit() {
            return Err(Error::Config(
                "variant requires an explicit INITIALIZE UPDATE handshake",
            ));
        }

        let mut card_challenge = [0u8; 8];
        card_challenge[0..2].copy_from_slice(seq);

        Ok(Self {
            variant,
            keys: derive_scp02_set(static_keys, seq, variant)?,
            host_challenge: [0u8; 8],
            card_challenge,
        })
    }

    /// The variant this session was derived for
    pub const fn variant(&self) -> ScpVariant {
        self.variant
    }

    /// Get the session keys
    pub const fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// Get the host challenge
    pub const fn host_challenge(&self) -> &HostChallenge {
        &self.host_challenge
    }

    /// Sequence counter and card challenge from the handshake
    pub const fn card_challenge(&self) -> &[u8; 8] {
        &self.card_challenge
    }

    /// Cryptogram the card must present: a retail MAC under the session MAC
    /// key over the host challenge followed by the card's sequence counter
    /// and challenge
    pub fn card_cryptogram(&self) -> Result<Cryptogram> {
        let mut input = Vec::with_capacity(16);
        input.extend_from_slice(&self.host_challenge);
        input.extend_from_slice(&self.card_challenge);
        retail_mac(self.keys.mac(), &pad80(&input), &NULL_BYTES_8)
    }

    /// Cryptogram the host presents in EXTERNAL AUTHENTICATE: the same MAC
    /// over the byte-swapped order
    pub fn host_cryptogram(&self) -> Result<Cryptogram> {
        let mut input = Vec::with_capacity(16);
        input.extend_from_slice(&self.card_challenge);
        input.extend_from_slice(&self.host_challenge);
        retail_mac(self.keys.mac(), &pad80(&input), &NULL_BYTES_8)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        variant: ScpVariant,
        keys: SessionKeys,
        host_challenge: HostChallenge,
        card_challenge: [u8; 8],
    ) -> Self {
        Self {
            variant,
            keys,
            host_challenge,
            card_challenge,
        }
    }

    #[cfg(test)]
    pub(crate) fn test_keys(enc: [u8; 16], mac: [u8; 16], dek: [u8; 16], rmac: Option<[u8; 16]>) -> SessionKeys {
        SessionKeys {
            enc,
            mac,
            dek,
            rmac,
        }
    }
}
