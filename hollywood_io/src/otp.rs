// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! OTP fuse-array driver.
//!
//! The fuse array is read one 32-bit word at a time through a command/data
//! register pair. There is no write path: the fuses are programmed once at
//! the factory.

use crate::bus::{HollywoodBus, HW_OTP_COMMAND, HW_OTP_DATA};
use crate::medium::{read_range, BlockMedium};
use hollywood_areas::OTP_SIZE;

const OTP_BLK_SIZE: usize = 4;

/// Bit 31 latches the read command; the low bits select the word.
const OTP_READ_CMD: u32 = 0x8000_0000;

pub struct Otp<'a> {
    bus: &'a mut dyn HollywoodBus,
}

impl<'a> Otp<'a> {
    pub fn new(bus: &'a mut dyn HollywoodBus) -> Otp<'a> {
        Otp { bus }
    }

    /// Reads `dst.len()` bytes starting at `offset`. Returns the byte
    /// count actually transferred (0 on an empty or out-of-range request).
    pub fn read(&mut self, offset: usize, dst: &mut [u8]) -> usize {
        read_range(self, offset, dst)
    }
}

impl BlockMedium for Otp<'_> {
    fn block_size(&self) -> usize {
        OTP_BLK_SIZE
    }

    fn total_size(&self) -> usize {
        OTP_SIZE
    }

    fn read_block(&mut self, index: usize, out: &mut [u8]) {
        self.bus.write32(HW_OTP_COMMAND, OTP_READ_CMD | index as u32);
        let word = self.bus.read32(HW_OTP_DATA);
        out.copy_from_slice(&word.to_be_bytes());
    }
}
