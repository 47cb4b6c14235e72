// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw memory-mapped implementation of the register bus for on-target use.

use crate::bus::HollywoodBus;

/// The register block and SRAM window are reached through the uncached
/// mapping on the application processor.
const UNCACHED_BASE: u32 = 0xc000_0000;

/// Direct volatile register access.
///
/// Construction is `unsafe`: the caller asserts that this process runs
/// privileged on the console with the hardware fence open (see
/// [`crate::bus::full_hw_access`]) and that no other code is driving these
/// registers concurrently.
pub struct Mmio {
    _priv: (),
}

impl Mmio {
    /// # Safety
    ///
    /// Only sound on the console itself, in supervisor mode, with the
    /// AHB fence open. Dereferences fixed physical addresses.
    pub unsafe fn new() -> Mmio {
        Mmio { _priv: () }
    }

    fn virt(addr: u32) -> *mut u32 {
        (addr | UNCACHED_BASE) as *mut u32
    }
}

impl HollywoodBus for Mmio {
    fn read32(&mut self, addr: u32) -> u32 {
        unsafe { core::ptr::read_volatile(Self::virt(addr)) }
    }

    fn write32(&mut self, addr: u32, val: u32) {
        unsafe { core::ptr::write_volatile(Self::virt(addr), val) }
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(u64::from(us)));
    }

    #[cfg(target_arch = "powerpc")]
    fn irq_disable(&mut self) -> u32 {
        // Clear MSR[EE]; the previous MSR is the restore cookie.
        let msr: u32;
        unsafe {
            core::arch::asm!("mfmsr {0}", out(reg) msr);
            core::arch::asm!("mtmsr {0}", in(reg) msr & !0x8000);
        }
        msr
    }

    #[cfg(target_arch = "powerpc")]
    fn irq_restore(&mut self, cookie: u32) {
        unsafe {
            core::arch::asm!("mtmsr {0}", in(reg) cookie);
        }
    }

    // Host builds have no machine interrupts to mask; the critical section
    // collapses to a no-op so the driver code stays portable.
    #[cfg(not(target_arch = "powerpc"))]
    fn irq_disable(&mut self) -> u32 {
        0
    }

    #[cfg(not(target_arch = "powerpc"))]
    fn irq_restore(&mut self, _cookie: u32) {}
}
