// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed byte layouts for the console's secure regions and export records.
//!
//! Everything on this SoC is big-endian. Parsing is done against literal
//! byte offsets rather than by transmuting packed structs, because the OTP
//! layout contains an intentional field overlap that no struct can express.

use byteorder::{BigEndian, ByteOrder};
use packed_struct::prelude::*;
use packed_struct::PackingError;

/// Size of the one-time-programmable fuse array, in bytes.
pub const OTP_SIZE: usize = 0x80;
/// Size of the serial EEPROM, in bytes.
pub const SEEPROM_SIZE: usize = 0x100;
/// Size of the secondary OTP bank exposed through the SRAM mirror.
pub const SRAM_OTP_SIZE: usize = 0x80;
/// Boot ROM window size in primary mode.
pub const BOOT0_SIZE: usize = 0x1000;
/// Boot ROM window size in the alternate (secondary chip) mode.
pub const BOOT0_SIZE_ALT: usize = 0x4000;

/// Contents of the fuse array.
///
/// The last two bytes of `ng_priv` overlap the first two of `nand_hmac` in
/// the factory layout. Both fields are parsed in full from their own
/// offsets; serialization writes `ng_priv` first so the HMAC owns the
/// overlapping pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpArea {
    pub boot1_hash: [u8; 20],
    pub common_key: [u8; 16],
    pub ng_id: [u8; 4],
    pub ng_priv: [u8; 30],
    pub nand_hmac: [u8; 20],
    pub nand_key: [u8; 16],
    pub rng_key: [u8; 16],
    pub unk1: u32,
    // Reads back as 0x00000007 on every programmed part seen so far
    pub unk2: u32,
}

impl OtpArea {
    pub fn from_bytes(raw: &[u8; OTP_SIZE]) -> OtpArea {
        let mut boot1_hash = [0u8; 20];
        let mut common_key = [0u8; 16];
        let mut ng_id = [0u8; 4];
        let mut ng_priv = [0u8; 30];
        let mut nand_hmac = [0u8; 20];
        let mut nand_key = [0u8; 16];
        let mut rng_key = [0u8; 16];

        boot1_hash.copy_from_slice(&raw[0x00..0x14]);
        common_key.copy_from_slice(&raw[0x14..0x24]);
        ng_id.copy_from_slice(&raw[0x24..0x28]);
        ng_priv.copy_from_slice(&raw[0x28..0x46]);
        nand_hmac.copy_from_slice(&raw[0x44..0x58]);
        nand_key.copy_from_slice(&raw[0x58..0x68]);
        rng_key.copy_from_slice(&raw[0x68..0x78]);

        OtpArea {
            boot1_hash,
            common_key,
            ng_id,
            ng_priv,
            nand_hmac,
            nand_key,
            rng_key,
            unk1: BigEndian::read_u32(&raw[0x78..0x7c]),
            unk2: BigEndian::read_u32(&raw[0x7c..0x80]),
        }
    }

    pub fn to_bytes(&self) -> [u8; OTP_SIZE] {
        let mut raw = [0u8; OTP_SIZE];
        raw[0x00..0x14].copy_from_slice(&self.boot1_hash);
        raw[0x14..0x24].copy_from_slice(&self.common_key);
        raw[0x24..0x28].copy_from_slice(&self.ng_id);
        raw[0x28..0x46].copy_from_slice(&self.ng_priv);
        raw[0x44..0x58].copy_from_slice(&self.nand_hmac);
        raw[0x58..0x68].copy_from_slice(&self.nand_key);
        raw[0x68..0x78].copy_from_slice(&self.rng_key);
        BigEndian::write_u32(&mut raw[0x78..0x7c], self.unk1);
        BigEndian::write_u32(&mut raw[0x7c..0x80], self.unk2);
        raw
    }

    /// The fuse array reads back all zeros when the read command never took
    /// effect. A programmed part always has a nonzero tag in its last word.
    pub fn looks_programmed(&self) -> bool {
        self.unk2 != 0
    }
}

/// One of the two boot2 update counters stored in the EEPROM.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PackedStruct)]
#[packed_struct(size_bytes = "10", endian = "msb", bit_numbering = "msb0")]
pub struct EepCounter {
    pub boot2_version: u8,
    pub unknown1: u8,
    pub unknown2: u8,
    pub pad: u8,
    pub update_tag: u32,
    pub checksum: u16,
}

/// Contents of the serial EEPROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeepromArea {
    pub ms_key_id: u32,
    pub ca_key_id: u32,
    pub ng_key_id: [u8; 4],
    pub ng_sig: [u8; 60],
    pub counters: [EepCounter; 2],
    pub fill: [u8; 24],
    pub korean_key: [u8; 16],
    pub reserved: [u8; 124],
}

impl SeepromArea {
    pub fn from_bytes(raw: &[u8; SEEPROM_SIZE]) -> Result<SeepromArea, PackingError> {
        let mut ng_key_id = [0u8; 4];
        let mut ng_sig = [0u8; 60];
        let mut fill = [0u8; 24];
        let mut korean_key = [0u8; 16];
        let mut reserved = [0u8; 124];

        ng_key_id.copy_from_slice(&raw[0x08..0x0c]);
        ng_sig.copy_from_slice(&raw[0x0c..0x48]);
        fill.copy_from_slice(&raw[0x5c..0x74]);
        korean_key.copy_from_slice(&raw[0x74..0x84]);
        reserved.copy_from_slice(&raw[0x84..0x100]);

        let counters = [
            EepCounter::unpack(raw[0x48..0x52].try_into().unwrap())?,
            EepCounter::unpack(raw[0x52..0x5c].try_into().unwrap())?,
        ];

        Ok(SeepromArea {
            ms_key_id: BigEndian::read_u32(&raw[0x00..0x04]),
            ca_key_id: BigEndian::read_u32(&raw[0x04..0x08]),
            ng_key_id,
            ng_sig,
            counters,
            fill,
            korean_key,
            reserved,
        })
    }

    pub fn to_bytes(&self) -> Result<[u8; SEEPROM_SIZE], PackingError> {
        let mut raw = [0u8; SEEPROM_SIZE];
        BigEndian::write_u32(&mut raw[0x00..0x04], self.ms_key_id);
        BigEndian::write_u32(&mut raw[0x04..0x08], self.ca_key_id);
        raw[0x08..0x0c].copy_from_slice(&self.ng_key_id);
        raw[0x0c..0x48].copy_from_slice(&self.ng_sig);
        raw[0x48..0x52].copy_from_slice(&self.counters[0].pack()?);
        raw[0x52..0x5c].copy_from_slice(&self.counters[1].pack()?);
        raw[0x5c..0x74].copy_from_slice(&self.fill);
        raw[0x74..0x84].copy_from_slice(&self.korean_key);
        raw[0x84..0x100].copy_from_slice(&self.reserved);
        Ok(raw)
    }

    /// Heuristic, not an integrity check: a freshly-erased part reads back
    /// zeros everywhere, and the NG key id is nonzero on every consumer
    /// unit. A genuinely zero key id is indistinguishable from a failed
    /// read.
    pub fn looks_programmed(&self) -> bool {
        self.ng_key_id != [0u8; 4]
    }
}

/// Contents of the secondary OTP bank (alternate execution mode only).
///
/// Holds the values that primary mode keeps in the EEPROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SramOtpArea {
    pub ms_id: u32,
    pub ca_id: u32,
    pub ng_key_id: u32,
    pub ng_sig: [u8; 60],
    pub korean_key: [u8; 16],
    pub nss_device_cert: [u8; 32],
    pub pad: [u8; 8],
}

impl SramOtpArea {
    pub fn from_bytes(raw: &[u8; SRAM_OTP_SIZE]) -> SramOtpArea {
        let mut ng_sig = [0u8; 60];
        let mut korean_key = [0u8; 16];
        let mut nss_device_cert = [0u8; 32];
        let mut pad = [0u8; 8];

        ng_sig.copy_from_slice(&raw[0x0c..0x48]);
        korean_key.copy_from_slice(&raw[0x48..0x58]);
        nss_device_cert.copy_from_slice(&raw[0x58..0x78]);
        pad.copy_from_slice(&raw[0x78..0x80]);

        SramOtpArea {
            ms_id: BigEndian::read_u32(&raw[0x00..0x04]),
            ca_id: BigEndian::read_u32(&raw[0x04..0x08]),
            ng_key_id: BigEndian::read_u32(&raw[0x08..0x0c]),
            ng_sig,
            korean_key,
            nss_device_cert,
            pad,
        }
    }

    pub fn to_bytes(&self) -> [u8; SRAM_OTP_SIZE] {
        let mut raw = [0u8; SRAM_OTP_SIZE];
        BigEndian::write_u32(&mut raw[0x00..0x04], self.ms_id);
        BigEndian::write_u32(&mut raw[0x04..0x08], self.ca_id);
        BigEndian::write_u32(&mut raw[0x08..0x0c], self.ng_key_id);
        raw[0x0c..0x48].copy_from_slice(&self.ng_sig);
        raw[0x48..0x58].copy_from_slice(&self.korean_key);
        raw[0x58..0x78].copy_from_slice(&self.nss_device_cert);
        raw[0x78..0x80].copy_from_slice(&self.pad);
        raw
    }

    pub fn looks_programmed(&self) -> bool {
        self.ng_key_id != 0
    }
}

/// `bootmii_keys.bin` compatibility record: a fixed 1 KiB layout consumed
/// by established community tooling, so the offsets here are frozen.
pub mod bootmii {
    use super::{OTP_SIZE, SEEPROM_SIZE};

    pub const RECORD_SIZE: usize = 0x400;
    pub const INFO_OFFSET: usize = 0x000;
    pub const INFO_SIZE: usize = 0x100;
    pub const OTP_OFFSET: usize = 0x100;
    pub const SEEPROM_OFFSET: usize = 0x200;

    /// Assembles the record. The info string is NUL-padded into its block
    /// and silently truncated if it is longer than the block.
    pub fn build_record(
        info: &str,
        otp: &[u8; OTP_SIZE],
        seeprom: &[u8; SEEPROM_SIZE],
    ) -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];

        let info_bytes = info.as_bytes();
        let n = info_bytes.len().min(INFO_SIZE);
        record[INFO_OFFSET..INFO_OFFSET + n].copy_from_slice(&info_bytes[..n]);

        record[OTP_OFFSET..OTP_OFFSET + OTP_SIZE].copy_from_slice(otp);
        record[SEEPROM_OFFSET..SEEPROM_OFFSET + SEEPROM_SIZE].copy_from_slice(seeprom);

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_bytes<const N: usize>() -> [u8; N] {
        let mut raw = [0u8; N];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }
        raw
    }

    #[test]
    fn otp_field_offsets() {
        let raw: [u8; OTP_SIZE] = counting_bytes();
        let otp = OtpArea::from_bytes(&raw);

        assert_eq!(otp.boot1_hash[0], 0x00);
        assert_eq!(otp.common_key[0], 0x14);
        assert_eq!(otp.ng_id[0], 0x24);
        assert_eq!(otp.ng_priv[0], 0x28);
        assert_eq!(otp.nand_hmac[0], 0x44);
        assert_eq!(otp.nand_key[0], 0x58);
        assert_eq!(otp.rng_key[0], 0x68);
        assert_eq!(otp.unk1, 0x78797a7b);
        assert_eq!(otp.unk2, 0x7c7d7e7f);
    }

    #[test]
    fn otp_priv_key_overlaps_hmac() {
        let raw: [u8; OTP_SIZE] = counting_bytes();
        let otp = OtpArea::from_bytes(&raw);

        // Bytes 0x44 and 0x45 belong to both fields.
        assert_eq!(otp.ng_priv[28], otp.nand_hmac[0]);
        assert_eq!(otp.ng_priv[29], otp.nand_hmac[1]);
    }

    #[test]
    fn otp_round_trip() {
        let raw: [u8; OTP_SIZE] = counting_bytes();
        let otp = OtpArea::from_bytes(&raw);
        assert_eq!(otp.to_bytes(), raw);
    }

    #[test]
    fn otp_sanity_tag() {
        let mut raw = [0u8; OTP_SIZE];
        assert!(!OtpArea::from_bytes(&raw).looks_programmed());
        raw[0x7f] = 0x07;
        assert!(OtpArea::from_bytes(&raw).looks_programmed());
    }

    #[test]
    fn seeprom_field_offsets() {
        let raw: [u8; SEEPROM_SIZE] = counting_bytes();
        let eep = SeepromArea::from_bytes(&raw).unwrap();

        assert_eq!(eep.ms_key_id, 0x00010203);
        assert_eq!(eep.ca_key_id, 0x04050607);
        assert_eq!(eep.ng_key_id, [0x08, 0x09, 0x0a, 0x0b]);
        assert_eq!(eep.ng_sig[0], 0x0c);
        assert_eq!(eep.counters[0].boot2_version, 0x48);
        assert_eq!(eep.counters[0].update_tag, 0x4c4d4e4f);
        assert_eq!(eep.counters[0].checksum, 0x5051);
        assert_eq!(eep.counters[1].boot2_version, 0x52);
        assert_eq!(eep.fill[0], 0x5c);
        assert_eq!(eep.korean_key[0], 0x74);
        assert_eq!(eep.reserved[0], 0x84);
    }

    #[test]
    fn seeprom_round_trip() {
        let raw: [u8; SEEPROM_SIZE] = counting_bytes();
        let eep = SeepromArea::from_bytes(&raw).unwrap();
        assert_eq!(eep.to_bytes().unwrap(), raw);
    }

    #[test]
    fn seeprom_validity_heuristic() {
        let raw = [0u8; SEEPROM_SIZE];
        assert!(!SeepromArea::from_bytes(&raw).unwrap().looks_programmed());

        let mut raw = [0u8; SEEPROM_SIZE];
        raw[0x08] = 1;
        assert!(SeepromArea::from_bytes(&raw).unwrap().looks_programmed());
    }

    #[test]
    fn sram_otp_field_offsets() {
        let raw: [u8; SRAM_OTP_SIZE] = counting_bytes();
        let bank = SramOtpArea::from_bytes(&raw);

        assert_eq!(bank.ms_id, 0x00010203);
        assert_eq!(bank.ca_id, 0x04050607);
        assert_eq!(bank.ng_key_id, 0x08090a0b);
        assert_eq!(bank.ng_sig[0], 0x0c);
        assert_eq!(bank.korean_key[0], 0x48);
        assert_eq!(bank.nss_device_cert[0], 0x58);
        assert_eq!(bank.pad[0], 0x78);
        assert_eq!(bank.to_bytes(), raw);
    }

    #[test]
    fn bootmii_record_layout() {
        let otp = [0xAAu8; OTP_SIZE];
        let seeprom = [0xBBu8; SEEPROM_SIZE];
        let record = bootmii::build_record("backup", &otp, &seeprom);

        assert_eq!(&record[..6], b"backup");
        assert_eq!(record[6], 0);
        assert_eq!(record[bootmii::OTP_OFFSET], 0xAA);
        assert_eq!(record[bootmii::OTP_OFFSET + OTP_SIZE - 1], 0xAA);
        // Padding between the fuse image and the EEPROM image stays zero.
        assert_eq!(record[bootmii::OTP_OFFSET + OTP_SIZE], 0);
        assert_eq!(record[bootmii::SEEPROM_OFFSET], 0xBB);
        assert_eq!(record[bootmii::SEEPROM_OFFSET + SEEPROM_SIZE - 1], 0xBB);
    }

    #[test]
    fn bootmii_info_block_truncates() {
        let otp = [0u8; OTP_SIZE];
        let seeprom = [0u8; SEEPROM_SIZE];
        let long = "x".repeat(bootmii::INFO_SIZE + 32);
        let record = bootmii::build_record(&long, &otp, &seeprom);

        assert_eq!(record[bootmii::INFO_SIZE - 1], b'x');
        // Nothing bleeds into the fuse image block.
        assert_eq!(record[bootmii::OTP_OFFSET], 0);
    }
}
