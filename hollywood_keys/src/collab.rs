// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Consumed system services.
//!
//! Title metadata, flash-filesystem files, the device certificate and the
//! network MAC all come from privileged system services this crate does not
//! implement. The traits here pin down exactly what is consumed; the binary
//! wires in whatever transport the environment provides.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;

/// The system-menu title, whose boot content embeds the firmware keys.
pub const SYSTEM_MENU_TITLE: u64 = 0x0000_0001_0000_0002;

/// Installed only by the secondary-mode system transfer; its presence is
/// the execution-mode probe.
pub const ALT_MODE_PROBE_TITLE: u64 = 0x0000_0001_0000_0200;

/// Which flavor of the platform we are running on. The alternate mode
/// keeps several EEPROM-resident values in the secondary OTP bank instead
/// and wraps its firmware in ancast containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Primary,
    Alternate,
}

/// Signed-content and device-identity service.
pub trait TitleStore {
    /// Raw signed title-metadata blob. The service rejects blobs whose
    /// signature does not verify, so a returned blob is trusted.
    fn signed_metadata(&mut self, title_id: u64) -> Result<Vec<u8>, IosError>;

    /// Number of contents installed for a title.
    fn contents_count(&mut self, title_id: u64) -> Result<u32, IosError>;

    /// Raw device certificate bytes.
    fn device_cert(&mut self) -> Result<Vec<u8>, IosError>;
}

/// Read access to the internal flash filesystem.
pub trait FlashFs {
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, IosError>;

    fn file_exists(&mut self, path: &str) -> bool;
}

/// Network-interface identity service.
pub trait NetInterface {
    fn mac_address(&mut self) -> Result<[u8; 6], IosError>;
}

/// Decides the execution mode the way the original tooling does: probe the
/// transfer-installed title. A title that was never installed, or was
/// installed and then deleted, means primary mode.
pub fn detect_mode(store: &mut dyn TitleStore) -> ExecMode {
    match store.contents_count(ALT_MODE_PROBE_TITLE) {
        Ok(0) | Err(_) => ExecMode::Primary,
        Ok(_) => ExecMode::Alternate,
    }
}

/// Numeric status from a system service call.
#[derive(Debug, Error)]
pub enum IosError {
    #[error(transparent)]
    Known(#[from] KnownIosError),

    /// Codes we have not bothered to name yet.
    #[error("service returned error {0}")]
    ErrorCode(i32),
}

/// Error codes hit often enough to deserve names.
#[derive(Debug, FromPrimitive, Copy, Clone, Eq, PartialEq, Error)]
pub enum KnownIosError {
    #[error("invalid argument (err -101)")]
    Invalid = -101,
    #[error("access denied (err -102)")]
    AccessDenied = -102,
    #[error("file or object not found (err -106)")]
    NotFound = -106,
    #[error("signature check failed (err -2011)")]
    BadSignature = -2011,
}

/// Maps a raw service return code onto the error taxonomy.
pub fn code2err(code: i32) -> IosError {
    if let Some(e) = KnownIosError::from_i32(code) {
        IosError::Known(e)
    } else {
        IosError::ErrorCode(code)
    }
}
