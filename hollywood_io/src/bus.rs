// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The register/GPIO seam every driver talks through.

/// Base of the SoC control register block.
pub const HW_REG_BASE: u32 = 0x0d80_0000;

/// Hardware access-protection register. Reads all-ones when the loader
/// granted full bus access; anything else means the secure peripherals are
/// fenced off and none of the drivers can work.
pub const HW_AHBPROT: u32 = HW_REG_BASE + 0x064;

/// SRAM protection/control register; bit [`SRAM_MASK`] exposes the SRAM
/// mirror window.
pub const HW_SRNPROT: u32 = HW_REG_BASE + 0x060;
pub const SRAM_MASK: u32 = 0x20;

/// Boot-ROM mapping control; setting [`BOOT0_MASK`] unmaps boot ROM from
/// the mirror window.
pub const HW_BOOT0: u32 = HW_REG_BASE + 0x18c;
pub const BOOT0_MASK: u32 = 0x1000;

/// GPIO bank 1 output and input latches. The EEPROM lines live here.
pub const HW_GPIO1OUT: u32 = HW_REG_BASE + 0x0e0;
pub const HW_GPIO1IN: u32 = HW_REG_BASE + 0x0e8;

/// OTP fuse-array command/data register pair.
pub const HW_OTP_COMMAND: u32 = HW_REG_BASE + 0x1ec;
pub const HW_OTP_DATA: u32 = HW_REG_BASE + 0x1f0;

/// SRAM mirror window (shadows boot ROM when enabled).
pub const SRAM_MIRROR: u32 = 0x0d40_0000;
/// Secondary OTP bank, shadowed at the tail of the SRAM mirror.
pub const SRAM_OTP_MIRROR: u32 = 0x0d40_7f00;

/// Register and GPIO access for the drivers.
///
/// The on-target implementation is [`crate::mmio::Mmio`]; tests substitute
/// a software model. All addresses are the physical ones listed in this
/// module; implementations translate to whatever mapping they use.
pub trait HollywoodBus {
    fn read32(&mut self, addr: u32) -> u32;

    fn write32(&mut self, addr: u32, val: u32);

    /// Read-modify-write: clears `clear`, then sets `set`.
    fn mask32(&mut self, addr: u32, clear: u32, set: u32) {
        let v = self.read32(addr);
        self.write32(addr, (v & !clear) | set);
    }

    /// Busy-wait for at least `us` microseconds. The EEPROM timing spec
    /// needs a real delay here, not a scheduler yield.
    fn delay_us(&mut self, us: u32);

    /// Mask asynchronous interrupts, returning an opaque cookie for
    /// [`HollywoodBus::irq_restore`]. An interrupted EEPROM programming
    /// sequence can leave the part in an inconsistent state, so the write
    /// path brackets the whole transaction with these.
    fn irq_disable(&mut self) -> u32;

    fn irq_restore(&mut self, cookie: u32);
}

/// True when the loader left the hardware fence open.
pub fn full_hw_access(bus: &mut dyn HollywoodBus) -> bool {
    bus.read32(HW_AHBPROT) == 0xffff_ffff
}
