//! Static key material for GlobalPlatform secure channels
//!
//! This module provides the [`KeySet`] type holding the three static keys
//! shared with a card (ENC, MAC, KEK) together with the diversification
//! scheme applied to them before the first handshake.

use zeroize::Zeroize;

use crate::{Error, Result, crypto};

/// Diversification schemes for deriving card-unique keys from a master set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Diversification {
    /// Keys are used as provided
    #[default]
    None,
    /// VISA2 derivation
    Visa2,
    /// EMV derivation
    Emv,
}

/// Type of the keys held in a [`KeySet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Double-length DES keys used in ECB/CBC mode
    #[default]
    DesEcb,
}

/// Identifies one of the three static subkeys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyId {
    /// Encryption key
    Enc = 1,
    /// MAC key
    Mac = 2,
    /// Key encryption key
    Kek = 3,
}

/// The static secure-channel key set shared with a card
///
/// Keys are 16-byte double-length DES keys. The set optionally carries a
/// diversification scheme which is applied at most once; diversifying an
/// already-diversified set is a no-op.
#[derive(Debug, Clone, Zeroize)]
#[zeroize(drop)]
pub struct KeySet {
    enc: [u8; 16],
    mac: [u8; 16],
    kek: [u8; 16],
    #[zeroize(skip)]
    diversification: Diversification,
    #[zeroize(skip)]
    diversified: bool,
    #[zeroize(skip)]
    key_type: KeyType,
}

impl Default for KeySet {
    fn default() -> Self {
        // Default GlobalPlatform test key
        let key = [
            0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D,
            0x4E, 0x4F,
        ];
        Self::from_single_key(key)
    }
}

impl KeySet {
    /// Create a new key set from its three keys
    pub const fn new(enc: [u8; 16], mac: [u8; 16], kek: [u8; 16]) -> Self {
        Self {
            enc,
            mac,
            kek,
            diversification: Diversification::None,
            diversified: false,
            key_type: KeyType::DesEcb,
        }
    }

    /// Create a new key set where all three keys are the same
    pub const fn from_single_key(key: [u8; 16]) -> Self {
        Self::new(key, key, key)
    }

    /// Set the diversification scheme applied before the handshake
    pub const fn with_diversification(mut self, diversification: Diversification) -> Self {
        self.diversification = diversification;
        self
    }

    /// Get the encryption key
    pub const fn enc(&self) -> &[u8; 16] {
        &self.enc
    }

    /// Get the MAC key
    pub const fn mac(&self) -> &[u8; 16] {
        &self.mac
    }

    /// Get the key encryption key
    pub const fn kek(&self) -> &[u8; 16] {
        &self.kek
    }

    /// Get the configured diversification scheme
    pub const fn diversification(&self) -> Diversification {
        self.diversification
    }

    /// Whether diversification has already been applied
    pub const fn is_diversified(&self) -> bool {
        self.diversified
    }

    /// Get the key type tag
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Replace one subkey in place
    pub const fn set_key(&mut self, id: KeyId, key_type: KeyType, key: [u8; 16]) {
        match id {
            KeyId::Enc => self.enc = key,
            KeyId::Mac => self.mac = key,
            KeyId::Kek => self.kek = key,
        }
        self.key_type = key_type;
    }

    /// Diversify the key set with card-supplied identity bytes
    ///
    /// Applies the configured scheme to all three subkeys. Calling this a
    /// second time, or on a set configured with [`Diversification::None`],
    /// leaves the keys unchanged.
    pub fn diversify(&mut self, seed: &[u8; 16]) -> Result<()> {
        if self.diversified || self.diversification == Diversification::None {
            return Ok(());
        }

        self.enc = derive_subkey(&self.enc, self.diversification, seed, 1)?;
        self.mac = derive_subkey(&self.mac, self.diversification, seed, 2)?;
        self.kek = derive_subkey(&self.kek, self.diversification, seed, 3)?;
        self.diversified = true;

        Ok(())
    }
}

/// Build the 16-byte derivation input for one subkey
///
/// Both schemes lay out six seed bytes, a scheme constant, and the subkey
/// index twice: `seed6 ‖ F0 ‖ i ‖ seed6 ‖ 0F ‖ i`. VISA2 sources seed bytes
/// 0, 1, 4, 5, 6, 7; EMV sources bytes 4 through 9.
fn derivation_input(scheme: Diversification, seed: &[u8; 16], index: u8) -> [u8; 16] {
    let picks: [usize; 6] = match scheme {
        Diversification::Visa2 => [0, 1, 4, 5, 6, 7],
        Diversification::Emv => [4, 5, 6, 7, 8, 9],
        Diversification::None => unreachable!("no derivation input without a scheme"),
    };

    let mut input = [0u8; 16];
    for (i, &pick) in picks.iter().enumerate() {
        input[i] = seed[pick];
        input[8 + i] = seed[pick];
    }
    input[6] = 0xF0;
    input[7] = index;
    input[14] = 0x0F;
    input[15] = index;
    input
}

fn derive_subkey(
    key: &[u8; 16],
    scheme: Diversification,
    seed: &[u8; 16],
    index: u8,
) -> Result<[u8; 16]> {
    let input = derivation_input(scheme, seed, index);
    let out = crypto::tdes_ecb_encrypt(key, &input)?;
    out.try_into()
        .map_err(|_| Error::Crypto("diversification output has wrong length"))
}
