// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bit-banged serial EEPROM driver.
//!
//! The part is a 93-series EEPROM organized as 128 x 16 bits, wired to four
//! GPIO lines (chip select, clock, data in, data out). Commands are 11-bit
//! frames, MSB first: a start bit, a 2-bit opcode and an 8-bit block
//! address. Programming is self-timed by the device: after a write the
//! driver polls the data-out line for the ready flag, because no fixed
//! delay is reliable across parts.

use crate::bus::{HollywoodBus, HW_GPIO1IN, HW_GPIO1OUT};
use crate::medium::{read_range, write_range, BlockMedium};
use hollywood_areas::SEEPROM_SIZE;

const SEEPROM_BLK_SIZE: usize = 2;

const GP_EEP_CS: u32 = 0x0000_0400;
const GP_EEP_CLK: u32 = 0x0000_0800;
const GP_EEP_MOSI: u32 = 0x0000_1000;
const GP_EEP_MISO: u32 = 0x0000_2000;

/// Minimum line-settle time from the device's timing spec.
const EEPROM_DELAY_US: u32 = 5;

/// Ready-flag poll ceiling for the self-timed program cycle. Datasheet
/// worst case is well under this many delay quanta.
const WRITE_POLL_LIMIT: u32 = 100;

const CMD_BITS: u8 = 11;
const OP_READ: u16 = 0x600;
const OP_WRITE: u16 = 0x500;
const OP_EWEN: u16 = 0x4c0;
const OP_EWDS: u16 = 0x400;

pub struct Seeprom<'a> {
    bus: &'a mut dyn HollywoodBus,
}

impl<'a> Seeprom<'a> {
    pub fn new(bus: &'a mut dyn HollywoodBus) -> Seeprom<'a> {
        Seeprom { bus }
    }

    /// Reads `dst.len()` bytes starting at `offset`. Returns the byte
    /// count actually transferred (0 on an empty or out-of-range request).
    pub fn read(&mut self, offset: usize, dst: &mut [u8]) -> usize {
        if dst.is_empty() || offset >= SEEPROM_SIZE || offset + dst.len() > SEEPROM_SIZE {
            return 0;
        }

        // Settle the lines before the first command.
        self.bus.mask32(HW_GPIO1OUT, GP_EEP_CLK, 0);
        self.bus.mask32(HW_GPIO1OUT, GP_EEP_CS, 0);
        self.bus.delay_us(EEPROM_DELAY_US);

        read_range(self, offset, dst)
    }

    /// Writes `src` starting at `offset`, returning the byte count actually
    /// programmed. Partially-covered blocks are read, spliced and written
    /// back whole. The entire enable/program/disable envelope runs with
    /// interrupts masked: a preempted command frame can corrupt the
    /// device's programming state.
    pub fn write(&mut self, offset: usize, src: &[u8]) -> usize {
        if src.is_empty() || offset >= SEEPROM_SIZE || offset + src.len() > SEEPROM_SIZE {
            return 0;
        }

        let cookie = self.bus.irq_disable();

        self.command(OP_EWEN);
        let written = write_range(self, offset, src);
        self.command(OP_EWDS);

        self.bus.irq_restore(cookie);

        if written != src.len() {
            log::warn!("seeprom: short write, {}/{} bytes", written, src.len());
        }
        written
    }

    fn command(&mut self, op: u16) {
        self.bus.mask32(HW_GPIO1OUT, 0, GP_EEP_CS);
        self.send_bits(op, CMD_BITS);
        self.bus.mask32(HW_GPIO1OUT, GP_EEP_CS, 0);
        self.bus.delay_us(EEPROM_DELAY_US);
    }

    fn send_bits(&mut self, value: u16, bits: u8) {
        if bits == 0 || bits > 16 {
            return;
        }
        for shift in (0..bits).rev() {
            if value & (1 << shift) != 0 {
                self.bus.mask32(HW_GPIO1OUT, 0, GP_EEP_MOSI);
            } else {
                self.bus.mask32(HW_GPIO1OUT, GP_EEP_MOSI, 0);
            }
            self.bus.delay_us(EEPROM_DELAY_US);

            self.bus.mask32(HW_GPIO1OUT, 0, GP_EEP_CLK);
            self.bus.delay_us(EEPROM_DELAY_US);

            self.bus.mask32(HW_GPIO1OUT, GP_EEP_CLK, 0);
            self.bus.delay_us(EEPROM_DELAY_US);
        }
    }

    fn recv_bits(&mut self, bits: u8) -> u16 {
        if bits == 0 || bits > 16 {
            return 0;
        }
        let mut res: u16 = 0;
        for _ in 0..bits {
            res <<= 1;

            self.bus.mask32(HW_GPIO1OUT, 0, GP_EEP_CLK);
            self.bus.delay_us(EEPROM_DELAY_US);

            self.bus.mask32(HW_GPIO1OUT, GP_EEP_CLK, 0);
            self.bus.delay_us(EEPROM_DELAY_US);

            if self.bus.read32(HW_GPIO1IN) & GP_EEP_MISO != 0 {
                res |= 1;
            }
        }
        res
    }
}

impl BlockMedium for Seeprom<'_> {
    fn block_size(&self) -> usize {
        SEEPROM_BLK_SIZE
    }

    fn total_size(&self) -> usize {
        SEEPROM_SIZE
    }

    fn read_block(&mut self, index: usize, out: &mut [u8]) {
        self.bus.mask32(HW_GPIO1OUT, 0, GP_EEP_CS);
        self.send_bits(OP_READ | index as u16, CMD_BITS);
        let val = self.recv_bits(16);
        self.bus.mask32(HW_GPIO1OUT, GP_EEP_CS, 0);
        self.bus.delay_us(EEPROM_DELAY_US);

        out.copy_from_slice(&val.to_be_bytes());
    }

    fn write_block(&mut self, index: usize, data: &[u8]) -> bool {
        self.bus.mask32(HW_GPIO1OUT, 0, GP_EEP_CS);
        self.send_bits(OP_WRITE | index as u16, CMD_BITS);
        self.send_bits(u16::from_be_bytes([data[0], data[1]]), 16);
        self.bus.mask32(HW_GPIO1OUT, GP_EEP_CS, 0);
        self.bus.delay_us(EEPROM_DELAY_US);

        // Reselect and wait for the self-timed program cycle to finish.
        self.bus.mask32(HW_GPIO1OUT, 0, GP_EEP_CS);
        let mut ready = false;
        for _ in 0..WRITE_POLL_LIMIT {
            if self.bus.read32(HW_GPIO1IN) & GP_EEP_MISO != 0 {
                ready = true;
                break;
            }
            self.bus.delay_us(EEPROM_DELAY_US);
        }
        self.bus.mask32(HW_GPIO1OUT, GP_EEP_CS, 0);
        self.bus.delay_us(EEPROM_DELAY_US);

        if !ready {
            log::warn!("seeprom: block {index} program-complete poll timed out");
        }
        ready
    }
}
