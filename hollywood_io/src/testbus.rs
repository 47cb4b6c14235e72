// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Software model of the register bus used by the driver tests: a register
//! map, a fuse array behind the command/data pair, a gated SRAM mirror and
//! a clocked model of the 93-series serial EEPROM. The EEPROM model decodes
//! the same start-bit/opcode/address frames the real part does, so the
//! driver's bit-banging is exercised edge by edge.

use std::collections::HashMap;

use crate::bus::{
    HollywoodBus, BOOT0_MASK, HW_BOOT0, HW_GPIO1IN, HW_GPIO1OUT, HW_OTP_COMMAND, HW_OTP_DATA,
    HW_SRNPROT, SRAM_MASK, SRAM_MIRROR,
};

const GP_EEP_CS: u32 = 0x0000_0400;
const GP_EEP_CLK: u32 = 0x0000_0800;
const GP_EEP_MOSI: u32 = 0x0000_1000;

/// Number of ready-flag polls that observe "busy" after a program
/// operation before the model reports completion.
pub const BUSY_POLLS: u8 = 3;

const SRAM_WINDOW: usize = 0x8000;

#[derive(Debug, PartialEq, Eq)]
pub enum IrqEvent {
    Disable,
    Restore,
}

pub struct Eeprom93 {
    pub mem: [u16; 128],
    pub write_enabled: bool,
    /// Completed 11-bit command frames, in arrival order.
    pub commands: Vec<u16>,
    /// Accepted program operations as (block, value).
    pub writes: Vec<(u8, u16)>,

    cs: bool,
    clk: bool,
    in_shift: u32,
    in_bits: u8,
    out_shift: u16,
    out_bits: u8,
    pending_write: Option<u8>,
    programming: bool,
    busy: u8,
    miso: bool,
}

impl Default for Eeprom93 {
    fn default() -> Eeprom93 {
        Eeprom93 {
            mem: [0u16; 128],
            write_enabled: false,
            commands: Vec::new(),
            writes: Vec::new(),
            cs: false,
            clk: false,
            in_shift: 0,
            in_bits: 0,
            out_shift: 0,
            out_bits: 0,
            pending_write: None,
            programming: false,
            busy: 0,
            miso: false,
        }
    }
}

impl Eeprom93 {
    fn gpio_out(&mut self, val: u32) {
        let cs = val & GP_EEP_CS != 0;
        let clk = val & GP_EEP_CLK != 0;
        let mosi = val & GP_EEP_MOSI != 0;

        if cs != self.cs {
            // Any chip-select edge abandons a partial frame.
            self.in_shift = 0;
            self.in_bits = 0;
            self.out_bits = 0;
        }
        if cs && clk && !self.clk {
            self.rising_edge(mosi);
        }

        self.cs = cs;
        self.clk = clk;
    }

    fn rising_edge(&mut self, mosi: bool) {
        if self.out_bits > 0 {
            self.out_bits -= 1;
            self.miso = (self.out_shift >> self.out_bits) & 1 != 0;
            return;
        }

        self.in_shift = (self.in_shift << 1) | mosi as u32;
        self.in_bits += 1;

        if let Some(addr) = self.pending_write {
            if self.in_bits == 16 {
                let data = self.in_shift as u16;
                self.pending_write = None;
                self.in_shift = 0;
                self.in_bits = 0;
                self.programming = true;
                if self.write_enabled {
                    self.mem[addr as usize] = data;
                    self.writes.push((addr, data));
                    self.busy = BUSY_POLLS;
                } else {
                    self.busy = 0;
                }
            }
            return;
        }

        if self.in_bits == 11 {
            let frame = self.in_shift as u16;
            self.in_shift = 0;
            self.in_bits = 0;
            self.commands.push(frame);
            self.programming = false;

            if frame & 0x400 == 0 {
                // No start bit: not a command.
                return;
            }
            let opcode = (frame >> 8) & 0x3;
            let addr = (frame & 0xff) as u8;
            match opcode {
                0b10 => {
                    self.out_shift = self.mem[(addr & 0x7f) as usize];
                    self.out_bits = 16;
                }
                0b01 => {
                    self.pending_write = Some(addr & 0x7f);
                }
                0b00 => match addr >> 6 {
                    0b11 => self.write_enabled = true,
                    0b00 => self.write_enabled = false,
                    _ => {}
                },
                _ => {}
            }
        }
    }

    fn miso_read(&mut self) -> bool {
        if self.programming {
            if self.busy > 0 {
                self.busy -= 1;
                return false;
            }
            return true;
        }
        self.miso
    }
}

pub struct FakeBus {
    pub otp: [u8; hollywood_areas::OTP_SIZE],
    pub otp_commands: Vec<u32>,
    pub eeprom: Eeprom93,
    /// Backing bytes for SRAM_MIRROR..SRAM_MIRROR+0x8000.
    pub sram: Vec<u8>,
    pub irq_events: Vec<IrqEvent>,
    pub srnprot_writes: Vec<u32>,
    pub delay_total_us: u64,
    regs: HashMap<u32, u32>,
    otp_last_cmd: u32,
}

impl FakeBus {
    pub fn new() -> FakeBus {
        FakeBus {
            otp: [0u8; hollywood_areas::OTP_SIZE],
            otp_commands: Vec::new(),
            eeprom: Eeprom93::default(),
            sram: vec![0u8; SRAM_WINDOW],
            irq_events: Vec::new(),
            srnprot_writes: Vec::new(),
            delay_total_us: 0,
            regs: HashMap::new(),
            otp_last_cmd: 0,
        }
    }

    fn mirror_enabled(&self) -> bool {
        self.regs.get(&HW_SRNPROT).copied().unwrap_or(0) & SRAM_MASK != 0
    }

    fn boot0_mapped(&self) -> bool {
        self.regs.get(&HW_BOOT0).copied().unwrap_or(0) & BOOT0_MASK == 0
    }
}

impl HollywoodBus for FakeBus {
    fn read32(&mut self, addr: u32) -> u32 {
        if addr == HW_OTP_DATA {
            if self.otp_last_cmd & 0x8000_0000 == 0 {
                return 0;
            }
            let word = (self.otp_last_cmd & 0x1f) as usize * 4;
            return u32::from_be_bytes(self.otp[word..word + 4].try_into().unwrap());
        }
        if addr == HW_GPIO1IN {
            return if self.eeprom.miso_read() { 0x0000_2000 } else { 0 };
        }
        if (SRAM_MIRROR..SRAM_MIRROR + SRAM_WINDOW as u32).contains(&addr) {
            if !self.mirror_enabled() {
                return 0;
            }
            // The boot-ROM un-map bit only affects the boot-ROM part of the
            // window, not the OTP shadow at its tail.
            if addr < crate::bus::SRAM_OTP_MIRROR && !self.boot0_mapped() {
                return 0;
            }
            let off = (addr - SRAM_MIRROR) as usize;
            return u32::from_be_bytes(self.sram[off..off + 4].try_into().unwrap());
        }
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    fn write32(&mut self, addr: u32, val: u32) {
        match addr {
            HW_OTP_COMMAND => {
                self.otp_commands.push(val);
                self.otp_last_cmd = val;
            }
            HW_GPIO1OUT => {
                self.regs.insert(addr, val);
                self.eeprom.gpio_out(val);
            }
            HW_SRNPROT => {
                self.srnprot_writes.push(val);
                self.regs.insert(addr, val);
            }
            _ => {
                self.regs.insert(addr, val);
            }
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_total_us += u64::from(us);
    }

    fn irq_disable(&mut self) -> u32 {
        self.irq_events.push(IrqEvent::Disable);
        0x8000
    }

    fn irq_restore(&mut self, cookie: u32) {
        assert_eq!(cookie, 0x8000);
        self.irq_events.push(IrqEvent::Restore);
    }
}
