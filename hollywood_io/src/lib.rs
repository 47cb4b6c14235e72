// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Protocol drivers for the four secure-storage media on the console SoC:
//! the OTP fuse array, the bit-banged serial EEPROM, the boot-ROM SRAM
//! mirror and the secondary-OTP SRAM mirror. All four speak through the
//! [`bus::HollywoodBus`] register seam and share one unaligned range
//! adapter, so every driver inherits identical partial-block behavior.

pub mod bus;
pub mod medium;
pub mod mirror;
pub mod mmio;
pub mod otp;
pub mod seeprom;

use strum_macros::EnumString;

/// A secure region addressable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Region {
    Otp,
    Seeprom,
    Boot0,
    SramOtp,
}

impl Region {
    /// Byte size of the region. The boot ROM window grows in the alternate
    /// execution mode; everything else is fixed.
    pub fn total_size(self, alt_mode: bool) -> usize {
        match self {
            Region::Otp => hollywood_areas::OTP_SIZE,
            Region::Seeprom => hollywood_areas::SEEPROM_SIZE,
            Region::Boot0 => {
                if alt_mode {
                    hollywood_areas::BOOT0_SIZE_ALT
                } else {
                    hollywood_areas::BOOT0_SIZE
                }
            }
            Region::SramOtp => hollywood_areas::SRAM_OTP_SIZE,
        }
    }
}

#[cfg(test)]
pub(crate) mod testbus;
