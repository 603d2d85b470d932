//! GlobalPlatform application implementation
//!
//! This module provides the [`GlobalPlatform`] façade: security domain
//! selection, the explicit SCP01/SCP02 handshake, lazy initiation of
//! implicit channels, and the privileged card management operations. The
//! façade owns the transport and at most one secure channel at a time; all
//! traffic is strictly sequential.

use std::fmt;
use std::time::Instant;

use rand::RngCore;
use tracing::{debug, trace, warn};

use ironcard_apdu_core::{Command, ExchangeObserver, Response, transport::CardTransport};

use crate::{
    Error, Result,
    commands::{
        DeleteCommand, ExternalAuthenticateCommand, ExternalAuthenticateResponse, GetDataCommand,
        GetStatusCommand, GetStatusResponse, InitializeUpdateCommand, InitializeUpdateResponse,
        InstallCommand, LoadCommand, PutKeyCommand, SelectCommand, SelectResponse,
        get_data::{parse_key_information, parse_sequence_counter},
        get_status::{ApplicationInfo, LoadFileInfo, parse_application_records, parse_load_file_records},
        install::load_parameters_for_code_length,
        put_key::build_key_set_data,
    },
    constants::{
        CHALLENGE_LENGTH, GEMALTO_SD_AID, KNOWN_SD_AIDS, SECURITY_DOMAIN_AID, get_data,
        get_status_p1, scp,
    },
    keys::KeySet,
    load::{DEFAULT_BLOCK_SIZE, LoadCommandStream},
    scp::{ScpVariant, SecurityLevel},
    secure_channel::SecureChannelWrapper,
    session::Session,
};

/// Configuration for opening an explicit secure channel
#[derive(Debug, Clone, Copy)]
pub struct SecureChannelOptions {
    /// Key set version to authenticate against; 0 (or the legacy 255)
    /// selects the card default and enables post-challenge diversification
    pub key_set: u8,
    /// Key identifier within the set, usually 0
    pub key_id: u8,
    /// Requested protocol variant; `None` negotiates SCP02 i=15 or
    /// SCP01 i=05 from the card's INITIALIZE UPDATE reply
    pub variant: Option<ScpVariant>,
    /// Requested session security level
    pub security_level: SecurityLevel,
    /// Run the Gemalto pre-handshake diversification step
    pub gemalto_diversification: bool,
}

impl Default for SecureChannelOptions {
    fn default() -> Self {
        Self {
            key_set: 0,
            key_id: 0,
            variant: None,
            security_level: SecurityLevel::mac(),
            gemalto_diversification: false,
        }
    }
}

/// The card registry as reported by GET STATUS
#[derive(Debug, Clone, Default)]
pub struct CardRegistry {
    /// Issuer security domain entries
    pub issuer_security_domain: Vec<ApplicationInfo>,
    /// Applications and supplementary security domains
    pub applications: Vec<ApplicationInfo>,
    /// Executable load files, with modules when the card reports them
    pub load_files: Vec<LoadFileInfo>,
}

/// GlobalPlatform card management application
pub struct GlobalPlatform<T: CardTransport> {
    /// Card transport
    transport: T,
    /// Static keys shared with the card
    keys: KeySet,
    /// Active secure channel, if any
    wrapper: Option<SecureChannelWrapper>,
    /// Pending implicit channel configuration
    implicit: Option<(ScpVariant, SecurityLevel)>,
    /// AID of the selected security domain
    selected_sd: Option<Vec<u8>>,
    /// Set when channel state was invalidated; cleared by a fresh handshake
    poisoned: bool,
    /// Exchange observers, notified in registration order
    observers: Vec<Box<dyn ExchangeObserver>>,
}

impl<T: CardTransport> fmt::Debug for GlobalPlatform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalPlatform")
            .field("transport", &self.transport)
            .field("channel_open", &self.wrapper.is_some())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl<T: CardTransport> GlobalPlatform<T> {
    /// Create a new instance with the default GlobalPlatform test keys
    pub fn new(transport: T) -> Self {
        Self::with_keys(transport, KeySet::default())
    }

    /// Create a new instance with specific static keys
    pub fn with_keys(transport: T, keys: KeySet) -> Self {
        Self {
            transport,
            keys,
            wrapper: None,
            implicit: None,
            selected_sd: None,
            poisoned: false,
            observers: Vec::new(),
        }
    }

    /// Register an exchange observer
    ///
    /// Observers see every APDU exchange, in send order, and must not issue
    /// commands of their own.
    pub fn add_observer(&mut self, observer: Box<dyn ExchangeObserver>) {
        self.observers.push(observer);
    }

    /// Get a reference to the transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether a secure channel is currently open
    pub const fn is_channel_open(&self) -> bool {
        self.wrapper.is_some()
    }

    /// The wrapper of the open secure channel, if any
    pub const fn secure_channel(&self) -> Option<&SecureChannelWrapper> {
        self.wrapper.as_ref()
    }

    /// Select a security domain
    ///
    /// With an explicit AID, a failed selection is an error carrying the
    /// card's status word. Without one, the well-known security domain AIDs
    /// are tried in order and the first that answers 90 00 wins.
    pub fn select_security_domain(&mut self, aid: Option<&[u8]>) -> Result<SelectResponse> {
        // A fresh selection discards any channel state
        self.wrapper = None;
        self.poisoned = false;

        match aid {
            Some(aid) => {
                let response = self.exchange_command(&SelectCommand::with_aid(aid))?;
                if response.is_success() {
                    self.selected_sd = Some(aid.to_vec());
                    Ok(SelectResponse::from_response(&response))
                } else {
                    Err(Error::Selection {
                        last_sw: Some(response.status()),
                    })
                }
            }
            None => {
                let mut last_sw = None;
                for candidate in KNOWN_SD_AIDS {
                    let response = self.exchange_command(&SelectCommand::with_aid(candidate))?;
                    if response.is_success() {
                        debug!(aid = %hex::encode(candidate), "selected security domain");
                        self.selected_sd = Some(candidate.to_vec());
                        return Ok(SelectResponse::from_response(&response));
                    }
                    last_sw = Some(response.status());
                }
                Err(Error::Selection { last_sw })
            }
        }
    }

    /// Open an explicit secure channel
    ///
    /// Runs INITIALIZE UPDATE and EXTERNAL AUTHENTICATE per GlobalPlatform
    /// 2.1.1, negotiating the variant when none was requested, applying the
    /// configured key diversification, and verifying the card cryptogram in
    /// constant time. On success the requested security level is active for
    /// all subsequent [`transmit`](Self::transmit) calls.
    pub fn open_secure_channel(&mut self, options: &SecureChannelOptions) -> Result<()> {
        let mut level = validate_options(options)?;

        // Any previous channel is gone the moment a new handshake starts
        self.wrapper = None;
        self.poisoned = true;

        if options.gemalto_diversification {
            self.gemalto_pre_step()?;
        }

        let mut host_challenge = [0u8; CHALLENGE_LENGTH];
        rand::rng().fill_bytes(&mut host_challenge);

        let init_cmd =
            InitializeUpdateCommand::with_challenge(options.key_set, options.key_id, &host_challenge);
        let response = self.exchange_command(&init_cmd)?;
        let init = InitializeUpdateResponse::from_response(&response)?;
        if !init.is_success() {
            return Err(Error::AuthenticationFailed("INITIALIZE UPDATE failed"));
        }

        // Negotiate the variant from the card's announced SCP major
        let variant = match options.variant {
            Some(variant) => variant,
            None => match init.scp_version() {
                Some(scp::SCP02) => ScpVariant::Scp02i15,
                _ => ScpVariant::Scp01i05,
            },
        };
        if variant.major() == scp::SCP01 {
            level = level.without_rmac();
        }

        // Default key sets diversify with the card's identification data
        if options.key_set == 0 || options.key_set == 255 {
            if let Some(seed) = init.diversification_seed() {
                self.keys.diversify(&seed)?;
            }
        } else if init.key_version_number() != Some(options.key_set) {
            return Err(Error::ProtocolMismatch(
                "card reported a different key set version",
            ));
        }

        // Derives the session keys and verifies the card cryptogram; also
        // rejects an SCP major mismatch
        let session = Session::open(&self.keys, variant, &init, &host_challenge)?;

        // EXTERNAL AUTHENTICATE travels through a MAC-only wrapper with a
        // zero ICV; the requested level is committed once the card accepts
        let mut wrapper = SecureChannelWrapper::new(session, SecurityLevel::mac());
        let host_cryptogram = wrapper.session().host_cryptogram()?;
        let auth_cmd = ExternalAuthenticateCommand::with_host_cryptogram(&host_cryptogram, level);
        let wrapped = wrapper.wrap(&auth_cmd)?;
        let response = self.exchange_command(&wrapped)?;

        if !ExternalAuthenticateResponse::from_response(&response).is_success() {
            return Err(Error::AuthenticationFailed("EXTERNAL AUTHENTICATE failed"));
        }

        wrapper.commit_security_level(level);
        self.wrapper = Some(wrapper);
        self.poisoned = false;

        debug!(?variant, level = level.bits(), "secure channel established");
        Ok(())
    }

    /// Configure an implicitly initiated SCP02 channel
    ///
    /// No handshake is run; the channel is derived lazily on the first
    /// [`transmit`](Self::transmit) from the card's current sequence
    /// counter.
    pub fn use_implicit_channel(
        &mut self,
        variant: ScpVariant,
        level: SecurityLevel,
    ) -> Result<()> {
        if !variant.is_implicit() {
            return Err(Error::Config(
                "variant requires an explicit INITIALIZE UPDATE handshake",
            ));
        }
        self.implicit = Some((variant, level.normalized()));
        self.wrapper = None;
        self.poisoned = false;
        Ok(())
    }

    /// Transmit a command through the secure channel, if one is active
    ///
    /// Wraps the command, sends it, and verifies the response MAC when
    /// response MACs are active. A transport or MAC failure invalidates the
    /// channel; every later call fails with [`Error::ChannelClosed`] until a
    /// fresh handshake.
    pub fn transmit(&mut self, command: &Command) -> Result<Response> {
        if self.poisoned {
            return Err(Error::ChannelClosed);
        }

        let had_channel = self.wrapper.is_some() || self.implicit.is_some();

        let result = (|| {
            if self.wrapper.is_none() {
                if let Some((variant, level)) = self.implicit {
                    self.initiate_implicit_channel(variant, level)?;
                }
            }
            self.transmit_inner(command)
        })();

        if had_channel {
            if let Err(err) = &result {
                if err.invalidates_channel() {
                    debug!(error = %err, "invalidating secure channel");
                    self.wrapper = None;
                    self.poisoned = true;
                }
            }
        }

        result
    }

    /// Close the secure channel and forget any implicit configuration
    pub fn close_secure_channel(&mut self) {
        self.wrapper = None;
        self.implicit = None;
        self.poisoned = false;
    }

    /// Install a load file for loading
    ///
    /// Targets the selected security domain unless one is given. When the
    /// total code length is known it is advertised through the `EF` load
    /// parameters.
    pub fn install_for_load(
        &mut self,
        package_aid: &[u8],
        security_domain_aid: Option<&[u8]>,
        hash: &[u8],
        code_length: Option<usize>,
    ) -> Result<()> {
        let sd_aid = security_domain_aid
            .map(<[u8]>::to_vec)
            .or_else(|| self.selected_sd.clone())
            .unwrap_or_else(|| SECURITY_DOMAIN_AID.to_vec());
        let parameters = code_length
            .map(load_parameters_for_code_length)
            .unwrap_or_default();

        let cmd = InstallCommand::for_load(package_aid, sd_aid, hash, parameters);
        let response = self.transmit(&cmd)?;
        expect_success("INSTALL [for load]", &response)
    }

    /// Load executable code, block by block
    ///
    /// The data is the already-encoded load file data block. The block size
    /// defaults to the largest that fits the active channel's overhead; an
    /// optional progress callback sees (blocks sent, blocks total).
    pub fn load(
        &mut self,
        data: &[u8],
        block_size: Option<usize>,
        mut progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<()> {
        let default_size = self
            .wrapper
            .as_ref()
            .map_or(DEFAULT_BLOCK_SIZE, SecureChannelWrapper::max_plaintext_length);
        let mut stream =
            LoadCommandStream::with_block_size(data, block_size.unwrap_or(default_size))?;

        while let Some((is_last, block_number, block)) = stream.next_block() {
            let cmd = if is_last {
                LoadCommand::last_block(block_number, block.to_vec())
            } else {
                LoadCommand::more_blocks(block_number, block.to_vec())
            };

            let response = self.transmit(&cmd)?;
            expect_success("LOAD", &response)?;

            if let Some(callback) = progress.as_mut() {
                callback(stream.current_block(), stream.blocks_count());
            }
        }

        Ok(())
    }

    /// Install an applet instance and make it selectable
    ///
    /// The instance AID defaults to the applet AID, parameters default to an
    /// empty `C9` object, and the install token defaults to empty.
    pub fn install_for_install_and_make_selectable(
        &mut self,
        package_aid: &[u8],
        applet_aid: &[u8],
        instance_aid: Option<&[u8]>,
        privileges: u8,
        install_parameters: &[u8],
        install_token: &[u8],
    ) -> Result<()> {
        let instance_aid = instance_aid.unwrap_or(applet_aid);
        let cmd = InstallCommand::for_install_and_make_selectable(
            package_aid,
            applet_aid,
            instance_aid,
            privileges,
            install_parameters,
            install_token,
        );
        let response = self.transmit(&cmd)?;
        expect_success("INSTALL [for install and make selectable]", &response)
    }

    /// Store personalization data in an installed application
    pub fn personalize_application(&mut self, application_aid: &[u8], data: &[u8]) -> Result<()> {
        let cmd = InstallCommand::for_personalization(application_aid, data);
        let response = self.transmit(&cmd)?;
        expect_success("INSTALL [for personalization]", &response)
    }

    /// Delete a single object
    pub fn delete_object(&mut self, aid: &[u8]) -> Result<()> {
        let response = self.transmit(&DeleteCommand::delete_object(aid))?;
        expect_success("DELETE", &response)
    }

    /// Delete an object and everything depending on it
    pub fn delete_object_and_related(&mut self, aid: &[u8]) -> Result<()> {
        let response = self.transmit(&DeleteCommand::delete_object_and_related(aid))?;
        expect_success("DELETE", &response)
    }

    /// Read the card registry
    ///
    /// Queries the issuer security domain and application subsets, then the
    /// executable load files with modules, falling back to the module-less
    /// query on cards that reject it. Continuations on SW 63 10 are followed
    /// until each subset is complete.
    pub fn registry(&mut self) -> Result<CardRegistry> {
        let isd_records = self.get_status_records(get_status_p1::ISSUER_SECURITY_DOMAIN)?;
        let app_records = self.get_status_records(get_status_p1::APPLICATIONS)?;

        let load_files = match self.get_status_records(get_status_p1::EXEC_LOAD_FILES_AND_MODULES)
        {
            Ok(records) => parse_load_file_records(&records, true)?,
            Err(Error::CommandFailed { .. }) => {
                let records = self.get_status_records(get_status_p1::EXEC_LOAD_FILES)?;
                parse_load_file_records(&records, false)?
            }
            Err(err) => return Err(err),
        };

        Ok(CardRegistry {
            issuer_security_domain: parse_application_records(&isd_records)?,
            applications: parse_application_records(&app_records)?,
            load_files,
        })
    }

    /// Load or replace a key set on the card
    ///
    /// Key components are encrypted under the session DEK, so an open
    /// secure channel is required.
    pub fn put_key_set(
        &mut self,
        new_version: u8,
        new_keys: &KeySet,
        replace_version: Option<u8>,
    ) -> Result<()> {
        let dek = match self.wrapper.as_ref() {
            Some(wrapper) => *wrapper.session().keys().dek(),
            None => return Err(Error::ChannelClosed),
        };
        let data = build_key_set_data(new_version, &dek, new_keys)?;

        let cmd = match replace_version {
            Some(version) => PutKeyCommand::replace_key_version(version, data),
            None => PutKeyCommand::add_key_version(data),
        };
        let response = self.transmit(&cmd)?;
        expect_success("PUT KEY", &response)
    }

    /// One GET STATUS subset, following 63 10 continuations
    ///
    /// This is the only retry loop in the protocol engine. A card that knows
    /// no matching objects (6A 88) yields an empty record list.
    fn get_status_records(&mut self, p1: u8) -> Result<Vec<u8>> {
        let mut records = Vec::new();
        let mut command = GetStatusCommand::first(p1);

        loop {
            let response = self.transmit(&command)?;
            match GetStatusResponse::from_response(&response) {
                GetStatusResponse::Success { data } => {
                    records.extend_from_slice(&data);
                    return Ok(records);
                }
                GetStatusResponse::MoreData { data } => {
                    records.extend_from_slice(&data);
                    command = GetStatusCommand::next(p1);
                }
                GetStatusResponse::ReferencedDataNotFound => return Ok(records),
                GetStatusResponse::OtherError { sw } => {
                    return Err(Error::CommandFailed {
                        operation: "GET STATUS",
                        status: sw,
                    });
                }
            }
        }
    }

    /// Gemalto cards derive card-unique keys from production data read
    /// before the handshake
    fn gemalto_pre_step(&mut self) -> Result<()> {
        let Some(sd_aid) = self.selected_sd.clone() else {
            return Ok(());
        };
        if sd_aid != GEMALTO_SD_AID {
            return Ok(());
        }

        let response = self.exchange_command(&GetDataCommand::with_identifier(get_data::CPLC))?;
        expect_success("GET DATA (CPLC)", &response)?;
        let data = response.payload();
        if data.len() < 19 {
            return Err(Error::InvalidLength {
                expected: 19,
                actual: data.len(),
            });
        }

        let mut seed = [0u8; 16];
        seed[0..2].copy_from_slice(&sd_aid[sd_aid.len() - 2..]);
        seed[4..8].copy_from_slice(&data[15..19]);
        self.keys.diversify(&seed)
    }

    /// Derive and install an implicit channel on first use
    fn initiate_implicit_channel(
        &mut self,
        variant: ScpVariant,
        level: SecurityLevel,
    ) -> Result<()> {
        debug!(?variant, "initiating implicit secure channel");

        let response =
            self.exchange_command(&GetDataCommand::with_identifier(get_data::KEY_INFORMATION))?;
        expect_success("GET DATA (key information)", &response)?;
        let key_info = parse_key_information(response.payload())?;
        trace!(key_set = key_info.version, "card default key set");

        let response =
            self.exchange_command(&GetDataCommand::with_identifier(get_data::SEQUENCE_COUNTER))?;
        expect_success("GET DATA (sequence counter)", &response)?;
        let counter = parse_sequence_counter(response.payload())?;

        let session = Session::implicit(&self.keys, variant, &counter)?;
        let mut wrapper = SecureChannelWrapper::new(session, level);
        let sd_aid = self
            .selected_sd
            .clone()
            .unwrap_or_else(|| SECURITY_DOMAIN_AID.to_vec());
        wrapper.seed_implicit_icvs(&sd_aid)?;
        self.wrapper = Some(wrapper);

        Ok(())
    }

    fn transmit_inner(&mut self, command: &Command) -> Result<Response> {
        let prepared = match self.wrapper.as_mut() {
            Some(wrapper) => wrapper.wrap(command)?,
            None => command.clone(),
        };

        let response = self.exchange_command(&prepared)?;

        match self.wrapper.as_mut() {
            Some(wrapper) => wrapper.unwrap_response(response),
            None => Ok(response),
        }
    }

    /// Send one APDU, time it, and notify observers
    fn exchange_command(&mut self, command: &Command) -> Result<Response> {
        let bytes = command.to_bytes();
        let started = Instant::now();
        let response = self.transport.transmit(&bytes)?;
        let elapsed = started.elapsed();

        trace!(
            command = %hex::encode(&bytes),
            response = %hex::encode(&response),
            ?elapsed,
            "APDU exchange"
        );

        for observer in &self.observers {
            observer.on_exchange(&bytes, &response, elapsed);
        }

        Ok(Response::from_bytes(&response)?)
    }
}

fn validate_options(options: &SecureChannelOptions) -> Result<SecurityLevel> {
    if options.key_set > 127 && options.key_set != 255 {
        return Err(Error::Config("key set version must be 0..=127"));
    }
    if options.key_set == 255 {
        // Preserved legacy alias for the card default key set
        warn!("key set 255 is treated as the card default (0)");
    }

    let level = options.security_level.normalized();
    if let Some(variant) = options.variant {
        if variant.is_implicit() {
            return Err(Error::Config(
                "implicit variants are initiated lazily on first transmit",
            ));
        }
        if level.has_rmac() && !variant.supports_rmac() {
            return Err(Error::Config("response MACs are not defined for SCP01"));
        }
    }

    Ok(level)
}

fn expect_success(operation: &'static str, response: &Response) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            operation,
            status: response.status(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hex_literal::hex;
    use ironcard_apdu_core::Error as ApduError;

    /// Scripted transport: answers from a queue and records every command
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        commands: Vec<Vec<u8>>,
        responses: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn with_responses(responses: &[&[u8]]) -> Self {
            Self {
                commands: Vec::new(),
                responses: responses.iter().map(|r| r.to_vec()).collect(),
            }
        }
    }

    impl CardTransport for ScriptedTransport {
        fn transmit(&mut self, command: &[u8]) -> core::result::Result<Bytes, ApduError> {
            self.commands.push(command.to_vec());
            if self.responses.is_empty() {
                return Err(ApduError::transport("no scripted response"));
            }
            Ok(Bytes::from(self.responses.remove(0)))
        }

        fn reset(&mut self) -> core::result::Result<(), ApduError> {
            Ok(())
        }
    }

    #[test]
    fn test_select_explicit_aid() {
        let transport = ScriptedTransport::with_responses(&[&hex!("6f059000")]);
        let mut gp = GlobalPlatform::new(transport);

        let aid = hex!("a000000151000000");
        let response = gp.select_security_domain(Some(&aid)).unwrap();
        assert!(response.is_success());
        assert_eq!(gp.transport().commands[0], hex!("00a4040008a00000015100000000"));
    }

    #[test]
    fn test_select_falls_back_through_known_aids() {
        let transport =
            ScriptedTransport::with_responses(&[&hex!("6a82"), &hex!("9000")]);
        let mut gp = GlobalPlatform::new(transport);

        let response = gp.select_security_domain(None).unwrap();
        assert!(response.is_success());

        // Second candidate answered
        let commands = &gp.transport().commands;
        assert_eq!(commands.len(), 2);
        assert_eq!(&commands[1][5..13], VISA_OP_SLICE);
    }

    const VISA_OP_SLICE: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];

    #[test]
    fn test_select_exhausts_known_aids() {
        let transport =
            ScriptedTransport::with_responses(&[&hex!("6a82"), &hex!("6a82"), &hex!("6a82")]);
        let mut gp = GlobalPlatform::new(transport);

        match gp.select_security_domain(None) {
            Err(Error::Selection { last_sw: Some(sw) }) => assert_eq!(sw.to_u16(), 0x6A82),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_registry_follows_continuations_and_falls_back() {
        // One ISD record; applications split over a 63 10 continuation;
        // the modules query rejected, the plain one answered
        let isd = hex!("07a0000000030000 0f 01");
        let apps_first = hex!("08a000000003000001 07 00");
        let apps_second = hex!("08a000000003000002 07 80");
        let files = hex!("07a0000000030000 01 00");

        let r_isd = [isd.as_ref(), hex!("9000").as_ref()].concat();
        let r_apps1 = [apps_first.as_ref(), hex!("6310").as_ref()].concat();
        let r_apps2 = [apps_second.as_ref(), hex!("9000").as_ref()].concat();
        let r_files = [files.as_ref(), hex!("9000").as_ref()].concat();

        let transport = ScriptedTransport::with_responses(&[
            &r_isd,
            &r_apps1,
            &r_apps2,
            &hex!("6a81"), // modules query not supported
            &r_files,
        ]);
        let mut gp = GlobalPlatform::new(transport);

        let registry = gp.registry().unwrap();
        assert_eq!(registry.issuer_security_domain.len(), 1);
        assert_eq!(registry.applications.len(), 2);
        assert_eq!(registry.applications[0].aid, hex!("a000000003000001"));
        assert_eq!(registry.applications[1].aid, hex!("a000000003000002"));
        assert_eq!(registry.load_files.len(), 1);

        // P1/P2 sequence: 80/00, 40/00, 40/01, 10/00, 20/00
        let commands = &gp.transport().commands;
        assert_eq!((commands[0][2], commands[0][3]), (0x80, 0x00));
        assert_eq!((commands[1][2], commands[1][3]), (0x40, 0x00));
        assert_eq!((commands[2][2], commands[2][3]), (0x40, 0x01));
        assert_eq!((commands[3][2], commands[3][3]), (0x10, 0x00));
        assert_eq!((commands[4][2], commands[4][3]), (0x20, 0x00));
    }

    #[test]
    fn test_load_blocks_and_progress() {
        let transport =
            ScriptedTransport::with_responses(&[&hex!("9000"), &hex!("9000"), &hex!("9000")]);
        let mut gp = GlobalPlatform::new(transport);

        let data = vec![0xC4u8; 250];
        let mut seen = Vec::new();
        let mut progress = |current: usize, total: usize| seen.push((current, total));
        gp.load(&data, Some(100), Some(&mut progress)).unwrap();

        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);

        let commands = &gp.transport().commands;
        assert_eq!(commands.len(), 3);
        // P1 marks the final block, P2 numbers from zero
        assert_eq!((commands[0][2], commands[0][3]), (0x00, 0x00));
        assert_eq!((commands[1][2], commands[1][3]), (0x00, 0x01));
        assert_eq!((commands[2][2], commands[2][3]), (0x80, 0x02));
        assert_eq!(commands[2][4], 50); // last block length
    }

    #[test]
    fn test_command_error_does_not_close_channel() {
        let transport = ScriptedTransport::with_responses(&[&hex!("6a88"), &hex!("9000")]);
        let mut gp = GlobalPlatform::new(transport);

        assert!(matches!(
            gp.delete_object(&hex!("a0000000030000")),
            Err(Error::CommandFailed {
                operation: "DELETE",
                ..
            })
        ));

        // The next command still goes through
        assert!(gp.delete_object(&hex!("a0000000030000")).is_ok());
    }

    #[test]
    fn test_transport_error_poisons_open_channel() {
        let transport = ScriptedTransport::default();
        let mut gp = GlobalPlatform::new(transport);

        // Simulate an established channel
        let session = Session::from_parts(
            ScpVariant::Scp02i15,
            Session::test_keys([0x11; 16], [0x22; 16], [0x33; 16], Some([0x44; 16])),
            [0u8; 8],
            [0u8; 8],
        );
        gp.wrapper = Some(SecureChannelWrapper::new(session, SecurityLevel::mac()));

        let cmd = Command::new(0x80, 0xF2, 0x80, 0x00);
        assert!(matches!(gp.transmit(&cmd), Err(Error::Apdu(_))));

        // Channel is now closed until a fresh handshake
        assert!(matches!(gp.transmit(&cmd), Err(Error::ChannelClosed)));
        assert!(!gp.is_channel_open());
    }

    #[test]
    fn test_validate_options() {
        let options = SecureChannelOptions {
            key_set: 128,
            ..Default::default()
        };
        assert!(matches!(validate_options(&options), Err(Error::Config(_))));

        let options = SecureChannelOptions {
            variant: Some(ScpVariant::Scp02i0a),
            ..Default::default()
        };
        assert!(matches!(validate_options(&options), Err(Error::Config(_))));

        let options = SecureChannelOptions {
            variant: Some(ScpVariant::Scp01i05),
            security_level: SecurityLevel::mac_rmac(),
            ..Default::default()
        };
        assert!(matches!(validate_options(&options), Err(Error::Config(_))));

        // ENC forces MAC
        let options = SecureChannelOptions {
            security_level: SecurityLevel::from_bits(0x02).unwrap(),
            ..Default::default()
        };
        let level = validate_options(&options).unwrap();
        assert!(level.has_mac());
    }

    #[test]
    fn test_put_key_requires_channel() {
        let transport = ScriptedTransport::default();
        let mut gp = GlobalPlatform::new(transport);

        assert!(matches!(
            gp.put_key_set(0x20, &KeySet::default(), None),
            Err(Error::ChannelClosed)
        ));
    }
}
