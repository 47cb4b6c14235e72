// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Export formats: the human-readable key listing and the raw dumps.
//!
//! Every file is written independently and best-effort; one failed file is
//! logged and skipped so the rest of the session's results still land on
//! storage.

use crate::collab::ExecMode;
use crate::recover::ScanHit;
use hollywood_areas::{bootmii, OtpArea, SeepromArea, SramOtpArea, OTP_SIZE, SEEPROM_SIZE, SRAM_OTP_SIZE};
use std::io::{self, Write};
use std::path::Path;
use zeroize::Zeroize;

/// The device certificate is exported truncated to the length the
/// community tooling expects, regardless of what the service returns.
pub const DEVCERT_EXPORT_SIZE: usize = 0x180;

/// Everything one session recovered, ready for serialization.
pub struct ExportBundle {
    pub mode: ExecMode,
    pub otp: OtpArea,
    pub otp_raw: [u8; OTP_SIZE],
    pub seeprom: Option<SeepromArea>,
    pub seeprom_raw: Option<[u8; SEEPROM_SIZE]>,
    pub sram_otp: Option<SramOtpArea>,
    pub sram_otp_raw: Option<[u8; SRAM_OTP_SIZE]>,
    pub boot0: Option<Vec<u8>>,
    pub device_cert: Option<Vec<u8>>,
    pub extra_keys: Vec<ScanHit>,
    pub mac: Option<[u8; 6]>,
}

impl ExportBundle {
    /// Wipes every secret. Called once the bundle has been serialized (or
    /// abandoned); key material must not linger in memory.
    pub fn clear(&mut self) {
        self.otp_raw.zeroize();
        self.otp = OtpArea::from_bytes(&[0u8; OTP_SIZE]);

        if let Some(raw) = &mut self.seeprom_raw {
            raw.zeroize();
        }
        self.seeprom = None;
        self.seeprom_raw = None;

        if let Some(raw) = &mut self.sram_otp_raw {
            raw.zeroize();
        }
        self.sram_otp = None;
        self.sram_otp_raw = None;

        if let Some(b) = &mut self.boot0 {
            b.zeroize();
        }
        self.boot0 = None;

        if let Some(cert) = &mut self.device_cert {
            cert.zeroize();
        }
        self.device_cert = None;

        for hit in &mut self.extra_keys {
            hit.value.zeroize();
        }
        self.extra_keys.clear();
        self.mac = None;
    }

    /// NG key id / signature / Korean key, from whichever region carries
    /// them in the current mode.
    fn ng_values(&self) -> Option<([u8; 4], [u8; 60], [u8; 16])> {
        match self.mode {
            ExecMode::Primary => self
                .seeprom
                .as_ref()
                .map(|s| (s.ng_key_id, s.ng_sig, s.korean_key)),
            ExecMode::Alternate => self
                .sram_otp
                .as_ref()
                .map(|s| (s.ng_key_id.to_be_bytes(), s.ng_sig, s.korean_key)),
        }
    }
}

/// Hex pairs, sixteen to a row, continuation rows indented under the value
/// column. Matches the layout the original listing used.
fn fmt_key(data: &[u8]) -> String {
    data.chunks(16)
        .map(|row| {
            row.iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\r\n                   ")
}

fn row(out: &mut dyn Write, idx: usize, label: &str, data: &[u8]) -> io::Result<()> {
    write!(out, "[{idx}] {label:<13}:\t{}\r\n", fmt_key(data))
}

/// Fixed ordering for the scanned keys in the listing.
const EXTRA_ORDER: [&str; 3] = ["SD Key", "SD IV", "MD5 Blanker"];

/// Writes the combined key listing. Keys that were never retrieved are
/// omitted entirely; the Korean key is also omitted when its value is
/// all-zero, since most units never had one programmed.
pub fn write_keys_listing(out: &mut dyn Write, bundle: &ExportBundle) -> io::Result<()> {
    row(out, 0, "boot1 Hash", &bundle.otp.boot1_hash)?;
    row(out, 1, "Common Key", &bundle.otp.common_key)?;
    row(out, 2, "Console ID", &bundle.otp.ng_id)?;
    row(out, 3, "ECC Priv Key", &bundle.otp.ng_priv)?;
    row(out, 4, "NAND HMAC", &bundle.otp.nand_hmac)?;
    row(out, 5, "NAND AES Key", &bundle.otp.nand_key)?;
    row(out, 6, "PRNG Key", &bundle.otp.rng_key)?;

    if let Some((ng_key_id, ng_sig, korean_key)) = bundle.ng_values() {
        row(out, 7, "NG Key ID", &ng_key_id)?;
        row(out, 8, "NG Signature", &ng_sig)?;
        if korean_key != [0u8; 16] {
            row(out, 9, "Korean Key", &korean_key)?;
        }
    }

    let mut idx = 10;
    for label in EXTRA_ORDER {
        if let Some(hit) = bundle.extra_keys.iter().find(|h| h.label == label) {
            row(out, idx, label, &hit.value)?;
            idx += 1;
        }
    }

    if let Some(mac) = bundle.mac {
        let text = mac
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");
        write!(out, "[{idx}] {:<13}:\t{text}\r\n", "MAC Address")?;
    }

    Ok(())
}

fn write_file(dir: &Path, name: &str, data: &[u8]) -> bool {
    let path = dir.join(name);
    match std::fs::write(&path, data) {
        Ok(()) => {
            log::info!("wrote {} ({} bytes)", path.display(), data.len());
            true
        }
        Err(e) => {
            log::error!("unable to write {}: {e}", path.display());
            false
        }
    }
}

/// Serializes every recovered artifact into `dir`. Returns the number of
/// files actually written; each file is independent, so partial success is
/// normal and already logged.
pub fn export_all(dir: &Path, bundle: &ExportBundle) -> usize {
    let mut written = 0usize;

    let mut listing = Vec::new();
    match write_keys_listing(&mut listing, bundle) {
        Ok(()) => written += usize::from(write_file(dir, "keys.txt", &listing)),
        Err(e) => log::error!("unable to format key listing: {e}"),
    }

    written += usize::from(write_file(dir, "otp.bin", &bundle.otp_raw));

    if let Some(raw) = &bundle.seeprom_raw {
        written += usize::from(write_file(dir, "seeprom.bin", raw));
    }
    if let Some(raw) = &bundle.sram_otp_raw {
        written += usize::from(write_file(dir, "vwii_sram_otp.bin", raw));
    }
    if let Some(boot0) = &bundle.boot0 {
        written += usize::from(write_file(dir, "boot0.bin", boot0));
    }
    if let Some(cert) = &bundle.device_cert {
        let n = cert.len().min(DEVCERT_EXPORT_SIZE);
        written += usize::from(write_file(dir, "device.cert", &cert[..n]));
    }

    if bundle.mode == ExecMode::Primary {
        if let Some(seeprom_raw) = &bundle.seeprom_raw {
            let console_id = u32::from_be_bytes(bundle.otp.ng_id);
            let info = format!("BackupMii v1, ConsoleID: {console_id:08x}\n");
            let record = bootmii::build_record(&info, &bundle.otp_raw, seeprom_raw);
            written += usize::from(write_file(dir, "bootmii_keys.bin", &record));
        }
    }

    written
}
