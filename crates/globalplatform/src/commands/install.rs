//! INSTALL command for GlobalPlatform
//!
//! Covers INSTALL [for load], INSTALL [for install], INSTALL [for install
//! and make selectable], and INSTALL [for personalization] per
//! GlobalPlatform 2.1.1 §11.

use derive_more::{Deref, DerefMut};
use ironcard_apdu_core::{Command, Response, StatusWord};

use crate::constants::{cla, ins, install_p1, status, tags};

/// INSTALL command for GlobalPlatform
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct InstallCommand(Command);

impl InstallCommand {
    /// Create an INSTALL command with a P1 qualifier and prebuilt data
    pub fn with_p1_data(p1: u8, data: Vec<u8>) -> Self {
        Self(Command::new(cla::GP, ins::INSTALL, p1, 0x00).with_data(data))
    }

    /// Create an INSTALL [for load] command
    ///
    /// `hash` is empty unless a load file hash check is requested;
    /// `load_parameters` likewise (the caller encodes them, typically
    /// `EF 04 C6 02 len` over the code length).
    pub fn for_load(
        load_file_aid: impl AsRef<[u8]>,
        security_domain_aid: impl AsRef<[u8]>,
        hash: impl AsRef<[u8]>,
        load_parameters: impl AsRef<[u8]>,
    ) -> Self {
        let load_file_aid = load_file_aid.as_ref();
        let security_domain_aid = security_domain_aid.as_ref();
        let hash = hash.as_ref();
        let load_parameters = load_parameters.as_ref();

        let mut data = Vec::with_capacity(
            5 + load_file_aid.len() + security_domain_aid.len() + hash.len() + load_parameters.len(),
        );
        data.push(load_file_aid.len() as u8);
        data.extend_from_slice(load_file_aid);
        data.push(security_domain_aid.len() as u8);
        data.extend_from_slice(security_domain_aid);
        data.push(hash.len() as u8);
        data.extend_from_slice(hash);
        data.push(load_parameters.len() as u8);
        data.extend_from_slice(load_parameters);
        data.push(0x00); // no load token

        Self::with_p1_data(install_p1::FOR_LOAD, data)
    }

    /// Create an INSTALL [for install] command
    pub fn for_install(
        executable_load_file_aid: impl AsRef<[u8]>,
        executable_module_aid: impl AsRef<[u8]>,
        application_aid: impl AsRef<[u8]>,
        privileges: u8,
        install_parameters: impl AsRef<[u8]>,
        install_token: impl AsRef<[u8]>,
    ) -> Self {
        let data = build_install_data(
            executable_load_file_aid,
            executable_module_aid,
            application_aid,
            privileges,
            install_parameters,
            install_token,
        );
        Self::with_p1_data(install_p1::FOR_INSTALL, data)
    }

    /// Create an INSTALL [for install and make selectable] command
    pub fn for_install_and_make_selectable(
        executable_load_file_aid: impl AsRef<[u8]>,
        executable_module_aid: impl AsRef<[u8]>,
        application_aid: impl AsRef<[u8]>,
        privileges: u8,
        install_parameters: impl AsRef<[u8]>,
        install_token: impl AsRef<[u8]>,
    ) -> Self {
        let data = build_install_data(
            executable_load_file_aid,
            executable_module_aid,
            application_aid,
            privileges,
            install_parameters,
            install_token,
        );
        Self::with_p1_data(install_p1::FOR_INSTALL_AND_MAKE_SELECTABLE, data)
    }

    /// Create an INSTALL [for personalization] command
    pub fn for_personalization(application_aid: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> Self {
        let application_aid = application_aid.as_ref();
        let perso_data = data.as_ref();

        let mut cmd_data = Vec::with_capacity(application_aid.len() + perso_data.len() + 6);
        cmd_data.push(0x00); // empty load file AID
        cmd_data.push(0x00); // empty module AID
        cmd_data.push(application_aid.len() as u8);
        cmd_data.extend_from_slice(application_aid);
        cmd_data.push(0x00); // empty privileges
        cmd_data.push(perso_data.len() as u8);
        cmd_data.extend_from_slice(perso_data);
        cmd_data.push(0x00); // empty token

        Self::with_p1_data(install_p1::FOR_PERSONALIZATION, cmd_data)
    }
}

/// Build the data field shared by INSTALL [for install] variants
fn build_install_data(
    executable_load_file_aid: impl AsRef<[u8]>,
    executable_module_aid: impl AsRef<[u8]>,
    application_aid: impl AsRef<[u8]>,
    privileges: u8,
    install_parameters: impl AsRef<[u8]>,
    install_token: impl AsRef<[u8]>,
) -> Vec<u8> {
    let executable_load_file_aid = executable_load_file_aid.as_ref();
    let executable_module_aid = executable_module_aid.as_ref();
    let application_aid = application_aid.as_ref();
    let install_parameters = install_parameters.as_ref();
    let install_token = install_token.as_ref();

    let mut data = Vec::new();

    data.push(executable_load_file_aid.len() as u8);
    data.extend_from_slice(executable_load_file_aid);

    data.push(executable_module_aid.len() as u8);
    data.extend_from_slice(executable_module_aid);

    data.push(application_aid.len() as u8);
    data.extend_from_slice(application_aid);

    // Single privilege byte
    data.push(0x01);
    data.push(privileges);

    // Application parameters wrapped in a C9 TLV; empty parameters still
    // produce the mandatory `C9 00`
    data.push((2 + install_parameters.len()) as u8);
    data.push(tags::INSTALL_PARAMETERS);
    data.push(install_parameters.len() as u8);
    data.extend_from_slice(install_parameters);

    data.push(install_token.len() as u8);
    data.extend_from_slice(install_token);

    data
}

/// Response to an INSTALL command
#[derive(Debug, Clone)]
pub enum InstallResponse {
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

impl InstallResponse {
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

/// Encode the load parameters advertising the total code length
/// (`EF 04 C6 02 len-hi len-lo`)
pub fn load_parameters_for_code_length(code_length: usize) -> Vec<u8> {
    vec![
        0xEF,
        0x04,
        0xC6,
        0x02,
        (code_length >> 8) as u8,
        (code_length & 0xFF) as u8,
    ]
}
