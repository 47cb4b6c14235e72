// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SRAM-mirror readers.
//!
//! When the mirror enable bit in the SRAM protection register is set, a
//! window of the address space shadows another physical memory: boot ROM at
//! the start of the window, and the secondary OTP bank at its tail. Both
//! readers flip the enable bit only if it was not already set, and put it
//! back afterwards so external expectations about the register are never
//! disturbed.

use crate::bus::{
    HollywoodBus, BOOT0_MASK, HW_BOOT0, HW_SRNPROT, SRAM_MASK, SRAM_MIRROR, SRAM_OTP_MIRROR,
};
use crate::medium::{read_range, BlockMedium};
use hollywood_areas::{BOOT0_SIZE, BOOT0_SIZE_ALT, SRAM_OTP_SIZE};

const MIRROR_BLK_SIZE: usize = 4;

pub struct Mirror<'a> {
    bus: &'a mut dyn HollywoodBus,
    window: u32,
    size: usize,
    /// Boot ROM must additionally be mapped into the window for the
    /// duration of the read.
    toggle_boot0: bool,
}

impl<'a> Mirror<'a> {
    /// Reader for the boot-ROM shadow. The visible window is larger in the
    /// alternate execution mode.
    pub fn boot0(bus: &'a mut dyn HollywoodBus, alt_mode: bool) -> Mirror<'a> {
        Mirror {
            bus,
            window: SRAM_MIRROR,
            size: if alt_mode { BOOT0_SIZE_ALT } else { BOOT0_SIZE },
            toggle_boot0: true,
        }
    }

    /// Reader for the secondary OTP bank shadowed at the window tail.
    pub fn sram_otp(bus: &'a mut dyn HollywoodBus) -> Mirror<'a> {
        Mirror {
            bus,
            window: SRAM_OTP_MIRROR,
            size: SRAM_OTP_SIZE,
            toggle_boot0: false,
        }
    }

    /// Reads `dst.len()` bytes starting at `offset`. Returns the byte
    /// count actually transferred (0 on an empty or out-of-range request).
    pub fn read(&mut self, offset: usize, dst: &mut [u8]) -> usize {
        if dst.is_empty() || offset >= self.size || offset + dst.len() > self.size {
            return 0;
        }

        // Unlikely to find the mirror disabled, but play it safe and leave
        // the bit the way we found it.
        let was_enabled = self.bus.read32(HW_SRNPROT) & SRAM_MASK != 0;
        if !was_enabled {
            self.bus.mask32(HW_SRNPROT, 0, SRAM_MASK);
        }
        if self.toggle_boot0 {
            self.bus.mask32(HW_BOOT0, BOOT0_MASK, 0);
        }

        let n = read_range(self, offset, dst);

        if self.toggle_boot0 {
            self.bus.mask32(HW_BOOT0, 0, BOOT0_MASK);
        }
        if !was_enabled {
            self.bus.mask32(HW_SRNPROT, SRAM_MASK, 0);
        }

        n
    }
}

impl BlockMedium for Mirror<'_> {
    fn block_size(&self) -> usize {
        MIRROR_BLK_SIZE
    }

    fn total_size(&self) -> usize {
        self.size
    }

    fn read_block(&mut self, index: usize, out: &mut [u8]) {
        let word = self.bus.read32(self.window + (index * MIRROR_BLK_SIZE) as u32);
        out.copy_from_slice(&word.to_be_bytes());
    }
}
