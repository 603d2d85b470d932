//! Secure Channel Protocol variants and security levels
//!
//! A variant pairs an SCP major version (01 or 02) with the "i" parameter
//! byte that cards announce in their card recognition data. The four
//! behavior switches the "i" byte encodes are precomputed into a
//! [`VariantFlags`] struct once, at channel setup, so the wrap path never
//! re-derives them.

use crate::{Error, Result, constants::scp};

/// A defined (major, "i") secure channel protocol pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScpVariant {
    /// SCP01 i=05: 3 keys, no ICV encryption
    Scp01i05,
    /// SCP01 i=15: 3 keys, ICV encryption
    Scp01i15,
    /// SCP02 i=04: 1 key, explicit initiation
    Scp02i04,
    /// SCP02 i=05: 3 keys, explicit initiation
    Scp02i05,
    /// SCP02 i=0A: 1 key, implicit initiation
    Scp02i0a,
    /// SCP02 i=0B: 3 keys, implicit initiation
    Scp02i0b,
    /// SCP02 i=14: 1 key, explicit initiation, ICV encryption
    Scp02i14,
    /// SCP02 i=15: 3 keys, explicit initiation, ICV encryption
    Scp02i15,
    /// SCP02 i=1A: 1 key, implicit initiation, ICV encryption
    Scp02i1a,
    /// SCP02 i=1B: 3 keys, implicit initiation, ICV encryption
    Scp02i1b,
}

/// Precomputed behavior switches selected by a variant's "i" parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantFlags {
    /// The C-MAC is computed over the modified APDU (CLA with the secure
    /// messaging bit set and Lc already increased by the MAC length)
    pub mac_modified_apdu: bool,
    /// The previous C-MAC is encrypted before serving as the next ICV
    pub icv_encrypted: bool,
    /// Three static base keys (ENC, MAC, KEK) rather than one
    pub three_base_keys: bool,
    /// The channel is opened explicitly with INITIALIZE UPDATE and
    /// EXTERNAL AUTHENTICATE rather than lazily on first use
    pub explicit_initiation: bool,
}

impl ScpVariant {
    /// SCP major version (1 or 2)
    pub const fn major(self) -> u8 {
        match self {
            Self::Scp01i05 | Self::Scp01i15 => scp::SCP01,
            _ => scp::SCP02,
        }
    }

    /// The "i" parameter byte
    pub const fn i_parameter(self) -> u8 {
        match self {
            Self::Scp01i05 | Self::Scp02i05 => 0x05,
            Self::Scp01i15 | Self::Scp02i15 => 0x15,
            Self::Scp02i04 => 0x04,
            Self::Scp02i0a => 0x0A,
            Self::Scp02i0b => 0x0B,
            Self::Scp02i14 => 0x14,
            Self::Scp02i1a => 0x1A,
            Self::Scp02i1b => 0x1B,
        }
    }

    /// Decode the variant's behavior switches
    pub const fn flags(self) -> VariantFlags {
        match self.major() {
            // SCP01 always computes the C-MAC over the modified APDU and
            // uses three base keys; only ICV encryption varies.
            scp::SCP01 => VariantFlags {
                mac_modified_apdu: true,
                icv_encrypted: matches!(self, Self::Scp01i15),
                three_base_keys: true,
                explicit_initiation: true,
            },
            _ => {
                let i = self.i_parameter();
                VariantFlags {
                    mac_modified_apdu: i & 0x02 == 0,
                    icv_encrypted: i & 0x10 != 0,
                    three_base_keys: i & 0x01 != 0,
                    explicit_initiation: i & 0x04 != 0,
                }
            }
        }
    }

    /// Whether the channel is initiated implicitly on first use
    pub const fn is_implicit(self) -> bool {
        !self.flags().explicit_initiation
    }

    /// Whether response MACs are defined for this variant
    pub const fn supports_rmac(self) -> bool {
        self.major() == scp::SCP02
    }
}

/// Session security level, the MAC/ENC/RMAC bitmask of GlobalPlatform 2.1.1
///
/// Encryption implies MAC protection; response MACs are only defined for
/// SCP02.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityLevel {
    mac: bool,
    enc: bool,
    rmac: bool,
}

/// Bit for command MAC protection
const LEVEL_MAC: u8 = 0x01;
/// Bit for command encryption
const LEVEL_ENC: u8 = 0x02;
/// Bit for response MAC protection
const LEVEL_RMAC: u8 = 0x10;

impl SecurityLevel {
    /// No protection (plain communication)
    pub const fn none() -> Self {
        Self {
            mac: false,
            enc: false,
            rmac: false,
        }
    }

    /// Command MAC only
    pub const fn mac() -> Self {
        Self {
            mac: true,
            enc: false,
            rmac: false,
        }
    }

    /// Command MAC and encryption
    pub const fn enc_mac() -> Self {
        Self {
            mac: true,
            enc: true,
            rmac: false,
        }
    }

    /// Command and response MAC
    pub const fn mac_rmac() -> Self {
        Self {
            mac: true,
            enc: false,
            rmac: true,
        }
    }

    /// Builder method to add encryption
    pub const fn with_enc(mut self) -> Self {
        self.enc = true;
        self.mac = true;
        self
    }

    /// Builder method to add response MACs
    pub const fn with_rmac(mut self) -> Self {
        self.rmac = true;
        self
    }

    /// Whether command MACs are applied
    pub const fn has_mac(self) -> bool {
        self.mac
    }

    /// Whether command data is encrypted
    pub const fn has_enc(self) -> bool {
        self.enc
    }

    /// Whether response MACs are verified
    pub const fn has_rmac(self) -> bool {
        self.rmac
    }

    /// Encode as the security level byte used as EXTERNAL AUTHENTICATE P1
    pub const fn bits(self) -> u8 {
        (if self.mac { LEVEL_MAC } else { 0 })
            | (if self.enc { LEVEL_ENC } else { 0 })
            | (if self.rmac { LEVEL_RMAC } else { 0 })
    }

    /// Decode from a security level byte
    pub const fn from_bits(bits: u8) -> Result<Self> {
        if bits & !(LEVEL_MAC | LEVEL_ENC | LEVEL_RMAC) != 0 {
            return Err(Error::Config("unknown security level bits"));
        }
        Ok(Self {
            mac: bits & LEVEL_MAC != 0,
            enc: bits & LEVEL_ENC != 0,
            rmac: bits & LEVEL_RMAC != 0,
        })
    }

    /// Force the MAC bit when encryption is requested
    pub(crate) const fn normalized(mut self) -> Self {
        if self.enc {
            self.mac = true;
        }
        self
    }

    /// Drop the response MAC bit
    pub(crate) const fn without_rmac(mut self) -> Self {
        self.rmac = false;
        self
    }
}
