//! GlobalPlatform card management with SCP01/SCP02 secure channels
//!
//! This crate provides a host-side implementation of the GlobalPlatform
//! 2.1.1 card management protocol for smart cards conforming to
//! ISO/IEC 7816-4: mutual authentication against a security domain,
//! MAC-protected and optionally encrypted command traffic over the SCP01
//! and SCP02 secure channel protocols, and the privileged administrative
//! commands (LOAD, INSTALL, DELETE, GET STATUS, PUT KEY).
//!
//! The main entry point is the [`GlobalPlatform`] struct, which owns a
//! [`CardTransport`](ironcard_apdu_core::CardTransport) and drives the
//! handshake and the per-APDU wrap/unwrap state machine.

#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod application;
pub mod commands;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod load;
pub mod scp;
pub mod secure_channel;
pub mod session;

// Re-exports
pub use application::{CardRegistry, GlobalPlatform, SecureChannelOptions};
pub use error::{Error, Result};
pub use keys::{Diversification, KeySet};
pub use load::LoadCommandStream;
pub use scp::{ScpVariant, SecurityLevel};
pub use secure_channel::SecureChannelWrapper;
pub use session::{Session, SessionKeys};

// Re-export from ironcard-apdu-core for convenience
pub use ironcard_apdu_core::{CardTransport, Command, ExchangeObserver, Response, StatusWord};

/// Convenience functions for common operations
pub mod operations {
    use crate::commands::get_status::{ApplicationInfo, LoadFileInfo};
    use crate::{CardTransport, GlobalPlatform, Result, SecureChannelOptions};

    /// Select the card manager and establish a secure channel with the
    /// default options
    pub fn connect_and_setup<T: CardTransport>(transport: T) -> Result<GlobalPlatform<T>> {
        let mut gp = GlobalPlatform::new(transport);
        gp.select_security_domain(None)?;
        gp.open_secure_channel(&SecureChannelOptions::default())?;
        Ok(gp)
    }

    /// List all applications on the card
    pub fn list_applications<T: CardTransport>(
        gp: &mut GlobalPlatform<T>,
    ) -> Result<Vec<ApplicationInfo>> {
        Ok(gp.registry()?.applications)
    }

    /// List all executable load files on the card
    pub fn list_packages<T: CardTransport>(
        gp: &mut GlobalPlatform<T>,
    ) -> Result<Vec<LoadFileInfo>> {
        Ok(gp.registry()?.load_files)
    }

    /// Delete a package and all of its applications
    pub fn delete_package<T: CardTransport>(gp: &mut GlobalPlatform<T>, aid: &[u8]) -> Result<()> {
        gp.delete_object_and_related(aid)
    }

    /// Load a package and install one applet from it
    pub fn install_package<T: CardTransport>(
        gp: &mut GlobalPlatform<T>,
        package_aid: &[u8],
        applet_aid: &[u8],
        load_file_data: &[u8],
        install_parameters: &[u8],
    ) -> Result<()> {
        gp.install_for_load(package_aid, None, &[], Some(load_file_data.len()))?;
        gp.load(load_file_data, None, None)?;
        gp.install_for_install_and_make_selectable(
            package_aid,
            applet_aid,
            None,
            0x00,
            install_parameters,
            &[],
        )
    }
}
