// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One extraction session: drive every region exactly once, run the
//! recovery tasks, hand back a bundle ready for export.
//!
//! Only the two foundational reads are fatal (the fuse array, and the
//! EEPROM or its secondary-OTP stand-in); everything else degrades to an
//! absent record with a logged diagnostic.

use crate::collab::{ExecMode, FlashFs, NetInterface, TitleStore};
use crate::export::ExportBundle;
use crate::recover::{recover_firmware_keys, recover_storage_key, ScanConfig};
use crate::Error;
use hollywood_areas::{
    OtpArea, SeepromArea, SramOtpArea, OTP_SIZE, SEEPROM_SIZE, SRAM_OTP_SIZE,
};
use hollywood_io::bus::HollywoodBus;
use hollywood_io::mirror::Mirror;
use hollywood_io::otp::Otp;
use hollywood_io::seeprom::Seeprom;
use hollywood_io::Region;
use zeroize::Zeroize;

/// Region access as the session consumes it. The production implementation
/// is [`BusRegions`]; tests substitute canned images.
pub trait SecureRegions {
    fn read_otp(&mut self, dst: &mut [u8]) -> usize;
    fn read_seeprom(&mut self, dst: &mut [u8]) -> usize;
    fn read_sram_otp(&mut self, dst: &mut [u8]) -> usize;
    fn read_boot0(&mut self, dst: &mut [u8]) -> usize;
    fn boot0_size(&self) -> usize;
}

/// The real drivers behind the trait.
pub struct BusRegions<'a> {
    bus: &'a mut dyn HollywoodBus,
    alt_mode: bool,
}

impl<'a> BusRegions<'a> {
    pub fn new(bus: &'a mut dyn HollywoodBus, alt_mode: bool) -> BusRegions<'a> {
        BusRegions { bus, alt_mode }
    }
}

impl SecureRegions for BusRegions<'_> {
    fn read_otp(&mut self, dst: &mut [u8]) -> usize {
        Otp::new(self.bus).read(0, dst)
    }

    fn read_seeprom(&mut self, dst: &mut [u8]) -> usize {
        Seeprom::new(self.bus).read(0, dst)
    }

    fn read_sram_otp(&mut self, dst: &mut [u8]) -> usize {
        Mirror::sram_otp(self.bus).read(0, dst)
    }

    fn read_boot0(&mut self, dst: &mut [u8]) -> usize {
        Mirror::boot0(self.bus, self.alt_mode).read(0, dst)
    }

    fn boot0_size(&self) -> usize {
        Region::Boot0.total_size(self.alt_mode)
    }
}

/// The consumed system services, bundled to keep `run` callable.
pub struct Services<'a> {
    pub store: &'a mut dyn TitleStore,
    pub fs: &'a mut dyn FlashFs,
    pub net: &'a mut dyn NetInterface,
}

fn read_otp_area(regions: &mut dyn SecureRegions) -> Result<(OtpArea, [u8; OTP_SIZE]), Error> {
    let mut staging = [0u8; OTP_SIZE];
    let n = regions.read_otp(&mut staging);

    let otp = OtpArea::from_bytes(&staging);
    if n != OTP_SIZE || !otp.looks_programmed() {
        staging.zeroize();
        return Err(Error::RegionUnavailable("fuse array"));
    }
    Ok((otp, staging))
}

fn read_seeprom_area(
    regions: &mut dyn SecureRegions,
) -> Result<(SeepromArea, [u8; SEEPROM_SIZE]), Error> {
    let mut staging = [0u8; SEEPROM_SIZE];
    let n = regions.read_seeprom(&mut staging);

    let area = SeepromArea::from_bytes(&staging)?;
    if n != SEEPROM_SIZE || !area.looks_programmed() {
        staging.zeroize();
        return Err(Error::RegionUnavailable("EEPROM"));
    }
    Ok((area, staging))
}

fn read_sram_otp_area(
    regions: &mut dyn SecureRegions,
) -> Result<(SramOtpArea, [u8; SRAM_OTP_SIZE]), Error> {
    let mut staging = [0u8; SRAM_OTP_SIZE];
    let n = regions.read_sram_otp(&mut staging);

    let area = SramOtpArea::from_bytes(&staging);
    if n != SRAM_OTP_SIZE || !area.looks_programmed() {
        staging.zeroize();
        return Err(Error::RegionUnavailable("secondary OTP bank"));
    }
    Ok((area, staging))
}

/// Runs a full session.
///
/// `os_image` is the live-memory window described by `scan_cfg`, already
/// materialized by the caller (only the caller knows whether dereferencing
/// it is sound). Pass `None` to skip the storage-key task.
pub fn run(
    regions: &mut dyn SecureRegions,
    services: &mut Services<'_>,
    mode: ExecMode,
    os_image: Option<&[u8]>,
    scan_cfg: &ScanConfig,
) -> Result<ExportBundle, Error> {
    let (otp, otp_raw) = read_otp_area(regions)?;

    let mut bundle = ExportBundle {
        mode,
        otp,
        otp_raw,
        seeprom: None,
        seeprom_raw: None,
        sram_otp: None,
        sram_otp_raw: None,
        boot0: None,
        device_cert: None,
        extra_keys: Vec::new(),
        mac: None,
    };

    match mode {
        ExecMode::Primary => {
            let (area, raw) = read_seeprom_area(regions)?;
            bundle.seeprom = Some(area);
            bundle.seeprom_raw = Some(raw);
        }
        ExecMode::Alternate => {
            // EEPROM access is fenced off in this mode; the secondary OTP
            // bank carries the values instead.
            let (area, raw) = read_sram_otp_area(regions)?;
            bundle.sram_otp = Some(area);
            bundle.sram_otp_raw = Some(raw);
        }
    }

    let mut boot0 = vec![0u8; regions.boot0_size()];
    let n = regions.read_boot0(&mut boot0);
    if n == boot0.len() {
        bundle.boot0 = Some(boot0);
    } else {
        log::warn!("boot ROM read returned {n}/{} bytes; skipping", boot0.len());
        boot0.zeroize();
    }

    match services.store.device_cert() {
        Ok(cert) => bundle.device_cert = Some(cert),
        Err(e) => log::warn!("device certificate unavailable: {e}"),
    }

    if let Some(image) = os_image {
        match recover_storage_key(image, scan_cfg) {
            Ok(Some(hit)) => {
                log::info!("recovered {} from the running OS image", hit.label);
                bundle.extra_keys.push(hit);
            }
            Ok(None) => log::warn!("storage key not found in the scanned window"),
            Err(e) => log::warn!("storage key recovery failed: {e}"),
        }
    } else {
        log::info!("no OS image window available; skipping storage key recovery");
    }

    match recover_firmware_keys(services.store, services.fs, mode) {
        Ok(hits) => bundle.extra_keys.extend(hits),
        Err(e) => log::warn!("firmware key recovery failed: {e}"),
    }

    match services.net.mac_address() {
        Ok(mac) => bundle.mac = Some(mac),
        Err(e) => log::warn!("MAC address unavailable: {e}"),
    }

    Ok(bundle)
}
