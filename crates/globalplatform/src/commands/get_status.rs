//! GET STATUS command for GlobalPlatform
//!
//! Lists the card registry: the issuer security domain, applications, and
//! executable load files. Responses may span several exchanges; the card
//! answers 63 10 when more records are available, and the host continues
//! with P2 = 01.

use derive_more::{Deref, DerefMut};
use iso7816_tlv::simple::Tlv;
use ironcard_apdu_core::{Command, Response, StatusWord};

use crate::{
    Error, Result,
    constants::{cla, get_status_p2, ins, status, tags},
};

/// GET STATUS command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GetStatusCommand(Command);

impl GetStatusCommand {
    /// Create a GET STATUS command for a registry subset with an AID filter
    pub fn with_aid_filter(p1: u8, p2: u8, aid: impl AsRef<[u8]>) -> Self {
        let data = Tlv::new(tags::AID.try_into().unwrap(), aid.as_ref().to_vec()).unwrap();
        Self(Command::new(cla::GP, ins::GET_STATUS, p1, p2).with_data(data.to_vec()))
    }

    /// First query for a registry subset (wildcard AID)
    pub fn first(p1: u8) -> Self {
        Self::with_aid_filter(p1, get_status_p2::FIRST, [])
    }

    /// Continuation query after a 63 10 status
    pub fn next(p1: u8) -> Self {
        Self::with_aid_filter(p1, get_status_p2::NEXT, [])
    }
}

/// Response to a GET STATUS command
#[derive(Debug, Clone)]
pub enum GetStatusResponse {
    /// Success, all remaining records returned (9000)
    Success {
        /// Registry records
        data: Vec<u8>,
    },
    /// Records returned, more available (6310)
    MoreData {
        /// Registry records
        data: Vec<u8>,
    },
    /// Referenced data not found (6A88)
    ReferencedDataNotFound,
    /// Other error
    OtherError {
        /// Status word returned by the card
        sw: StatusWord,
    },
}

impl GetStatusResponse {
    /// Parse from a raw response
    pub fn from_response(response: &Response) -> Self {
        match response.status() {
            status::SUCCESS => Self::Success {
                data: response.payload().to_vec(),
            },
            status::MORE_DATA => Self::MoreData {
                data: response.payload().to_vec(),
            },
            status::REFERENCED_DATA_NOT_FOUND => Self::ReferencedDataNotFound,
            sw => Self::OtherError { sw },
        }
    }

    /// Whether more records are available
    pub const fn has_more_data(&self) -> bool {
        matches!(self, Self::MoreData { .. })
    }
}

/// Application or security domain entry from GET STATUS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInfo {
    /// AID of the application
    pub aid: Vec<u8>,
    /// Lifecycle state
    pub lifecycle: u8,
    /// Privilege byte
    pub privileges: u8,
}

/// Executable load file entry from GET STATUS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFileInfo {
    /// AID of the load file
    pub aid: Vec<u8>,
    /// Lifecycle state
    pub lifecycle: u8,
    /// Privilege byte
    pub privileges: u8,
    /// Executable module AIDs, when the query included modules
    pub modules: Vec<Vec<u8>>,
}

struct RecordReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> RecordReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.offset + n > self.data.len() {
            return Err(Error::InvalidResponse("truncated GET STATUS record"));
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn take_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_aid(&mut self) -> Result<Vec<u8>> {
        let len = self.take_byte()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Parse application or security domain records
///
/// Each record is `len ‖ aid ‖ lifecycle ‖ privileges`.
pub fn parse_application_records(data: &[u8]) -> Result<Vec<ApplicationInfo>> {
    let mut reader = RecordReader { data, offset: 0 };
    let mut records = Vec::new();

    while reader.offset < data.len() {
        records.push(ApplicationInfo {
            aid: reader.take_aid()?,
            lifecycle: reader.take_byte()?,
            privileges: reader.take_byte()?,
        });
    }

    Ok(records)
}

/// Parse executable load file records
///
/// Each record is `len ‖ aid ‖ lifecycle ‖ privileges`, followed, when the
/// query asked for modules, by a count of executable module AIDs and the
/// AIDs themselves.
pub fn parse_load_file_records(data: &[u8], with_modules: bool) -> Result<Vec<LoadFileInfo>> {
    let mut reader = RecordReader { data, offset: 0 };
    let mut records = Vec::new();

    while reader.offset < data.len() {
        let aid = reader.take_aid()?;
        let lifecycle = reader.take_byte()?;
        let privileges = reader.take_byte()?;

        let mut modules = Vec::new();
        if with_modules {
            let count = reader.take_byte()? as usize;
            for _ in 0..count {
                modules.push(reader.take_aid()?);
            }
        }

        records.push(LoadFileInfo {
            aid,
            lifecycle,
            privileges,
            modules,
        });
    }

    Ok(records)
}
