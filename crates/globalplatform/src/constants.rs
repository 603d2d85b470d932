//! Constants used in GlobalPlatform operations
//!
//! This module contains various constants defined by the GlobalPlatform
//! specification, such as CLA bytes, instruction codes, parameter values,
//! and status words.

/// GlobalPlatform command classes
pub mod cla {
    /// ISO7816 command class
    pub const ISO7816: u8 = 0x00;
    /// GlobalPlatform command class
    pub const GP: u8 = 0x80;
    /// Secure messaging command class (with MAC)
    pub const MAC: u8 = 0x84;
    /// Bit set in the CLA byte when a command carries a MAC
    pub const MAC_BIT: u8 = 0x04;
    /// Logical channel bits, cleared when recording commands for the R-MAC
    pub const CHANNEL_MASK: u8 = 0x07;
}

/// GlobalPlatform instruction codes
pub mod ins {
    /// SELECT command
    pub const SELECT: u8 = 0xA4;
    /// INITIALIZE UPDATE command
    pub const INITIALIZE_UPDATE: u8 = 0x50;
    /// EXTERNAL AUTHENTICATE command
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    /// GET DATA command
    pub const GET_DATA: u8 = 0xCA;
    /// DELETE command
    pub const DELETE: u8 = 0xE4;
    /// LOAD command
    pub const LOAD: u8 = 0xE8;
    /// INSTALL command
    pub const INSTALL: u8 = 0xE6;
    /// GET STATUS command
    pub const GET_STATUS: u8 = 0xF2;
    /// PUT KEY command
    pub const PUT_KEY: u8 = 0xD8;
}

/// Parameter values for SELECT command (P1)
pub mod select_p1 {
    /// Select by DF name
    pub const BY_NAME: u8 = 0x04;
}

/// Parameter values for INSTALL command (P1)
pub mod install_p1 {
    /// Install for load
    pub const FOR_LOAD: u8 = 0x02;
    /// Install for install
    pub const FOR_INSTALL: u8 = 0x04;
    /// Install for make selectable
    pub const FOR_MAKE_SELECTABLE: u8 = 0x08;
    /// Install for install and make selectable
    pub const FOR_INSTALL_AND_MAKE_SELECTABLE: u8 = FOR_INSTALL | FOR_MAKE_SELECTABLE;
    /// Install for personalization
    pub const FOR_PERSONALIZATION: u8 = 0x20;
}

/// Parameter values for LOAD command (P1)
pub mod load_p1 {
    /// More blocks to follow
    pub const MORE_BLOCKS: u8 = 0x00;
    /// Last block
    pub const LAST_BLOCK: u8 = 0x80;
}

/// Parameter values for GET STATUS command (P1)
pub mod get_status_p1 {
    /// Get status of issuer security domain
    pub const ISSUER_SECURITY_DOMAIN: u8 = 0x80;
    /// Get status of applications and supplementary security domains
    pub const APPLICATIONS: u8 = 0x40;
    /// Get status of executable load files
    pub const EXEC_LOAD_FILES: u8 = 0x20;
    /// Get status of executable load files and their modules
    pub const EXEC_LOAD_FILES_AND_MODULES: u8 = 0x10;
}

/// Parameter values for GET STATUS command (P2)
pub mod get_status_p2 {
    /// First or only occurrence
    pub const FIRST: u8 = 0x00;
    /// Next occurrence, after SW 63 10
    pub const NEXT: u8 = 0x01;
}

/// Parameter values for DELETE command (P2)
pub mod delete_p2 {
    /// Delete object
    pub const OBJECT: u8 = 0x00;
    /// Delete object and related objects
    pub const OBJECT_AND_RELATED: u8 = 0x80;
}

/// Data object identifiers for GET DATA (P1, P2)
pub mod get_data {
    /// Key information template
    pub const KEY_INFORMATION: (u8, u8) = (0x00, 0xE0);
    /// SCP02 sequence counter of the default key version
    pub const SEQUENCE_COUNTER: (u8, u8) = (0x00, 0xC1);
    /// Card production life cycle data, used for diversification
    pub const CPLC: (u8, u8) = (0x9F, 0x7F);
}

/// Commonly used status words in GlobalPlatform
pub mod status {
    use ironcard_apdu_core::StatusWord;

    /// Success
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
    /// More GET STATUS data available
    pub const MORE_DATA: StatusWord = StatusWord::new(0x63, 0x10);
    /// Wrong length
    pub const WRONG_LENGTH: StatusWord = StatusWord::new(0x67, 0x00);
    /// File not found
    pub const FILE_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x82);
    /// Referenced data not found
    pub const REFERENCED_DATA_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x88);
    /// Security condition not satisfied
    pub const SECURITY_CONDITION_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x82);
    /// Authentication method blocked
    pub const AUTHENTICATION_METHOD_BLOCKED: StatusWord = StatusWord::new(0x69, 0x83);
}

/// Tags used in GlobalPlatform commands and responses
pub mod tags {
    /// AID tag for DELETE and GET STATUS commands
    pub const AID: u8 = 0x4F;
    /// Key information template
    pub const KEY_INFORMATION_TEMPLATE: u8 = 0xE0;
    /// Key information data object
    pub const KEY_INFORMATION: u8 = 0xC0;
    /// Sequence counter data object
    pub const SEQUENCE_COUNTER: u8 = 0xC1;
    /// Application specific install parameters
    pub const INSTALL_PARAMETERS: u8 = 0xC9;
}

/// Secure Channel Protocol (SCP) major versions
pub mod scp {
    /// SCP01 protocol version
    pub const SCP01: u8 = 0x01;
    /// SCP02 protocol version
    pub const SCP02: u8 = 0x02;
}

/// Host and card challenge length in bytes
pub const CHALLENGE_LENGTH: usize = 8;

/// Maximum payload of a wrapped short APDU
pub const MAX_WRAPPED_LC: usize = 255;

/// Issuer security domain AID (GlobalPlatform)
pub const SECURITY_DOMAIN_AID: &[u8] = &[0xA0, 0x00, 0x00, 0x01, 0x51, 0x00, 0x00, 0x00];

/// Visa Open Platform card manager AID
pub const VISA_OP_AID: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];

/// Gemalto security domain AID
pub const GEMALTO_SD_AID: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x18, 0x43, 0x4D, 0x00];

/// Security domain AIDs tried, in order, when none is specified
pub const KNOWN_SD_AIDS: &[&[u8]] = &[SECURITY_DOMAIN_AID, VISA_OP_AID, GEMALTO_SD_AID];
