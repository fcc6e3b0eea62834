//! MMC1 (mapper 1): serial-port banking.
//!
//! A 5-bit shift register accumulates one bit per PRG-area write; the
//! fifth write commits to the register selected by address bits 14-13.
//! Any write with bit 7 set resets the shifter and forces PRG mode 3.
//! Consecutive-cycle writes (the 6502 RMW double write) are ignored by
//! the hardware; games clear the shifter with bit-7 writes anyway, so
//! the simpler model of accepting every write holds up in practice.

use super::Chr;
use crate::cartridge::{Cartridge, Mirroring};
use lockstep_core::state::{StateReader, StateWriter};

#[derive(Debug)]
pub struct Mmc1<'r> {
    prg: &'r [u8],
    pub chr: Chr<'r>,
    shift: u8,
    shift_count: u8,
    /// Control: mirroring (1-0), PRG mode (3-2), CHR mode (4).
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,
}

impl<'r> Mmc1<'r> {
    pub fn new(cart: &Cartridge<'r>) -> Self {
        Self {
            prg: cart.prg_rom,
            chr: Chr::from_cart(cart.chr_rom),
            shift: 0,
            shift_count: 0,
            control: 0x0C, // PRG mode 3: fix last bank at $C000
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
        }
    }

    pub fn mirroring(&self) -> Mirroring {
        match self.control & 0x03 {
            0 => Mirroring::SingleScreenLower,
            1 => Mirroring::SingleScreenUpper,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    fn prg_bank_count(&self) -> usize {
        (self.prg.len() / 0x4000).max(1)
    }

    pub fn read_prg(&self, addr: u16) -> u8 {
        let mode = (self.control >> 2) & 0x03;
        let bank16 = self.prg_bank as usize & 0x0F;
        let offset = match mode {
            0 | 1 => {
                // 32 KiB mode: ignore low bank bit
                let base = (bank16 & !1) % self.prg_bank_count();
                base * 0x4000 + (addr as usize - 0x8000)
            }
            2 => {
                // First bank fixed at $8000
                if addr < 0xC000 {
                    addr as usize - 0x8000
                } else {
                    (bank16 % self.prg_bank_count()) * 0x4000 + (addr as usize - 0xC000)
                }
            }
            _ => {
                // Last bank fixed at $C000
                if addr < 0xC000 {
                    (bank16 % self.prg_bank_count()) * 0x4000 + (addr as usize - 0x8000)
                } else {
                    (self.prg_bank_count() - 1) * 0x4000 + (addr as usize - 0xC000)
                }
            }
        };
        self.prg.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn write_prg(&mut self, addr: u16, val: u8) {
        if val & 0x80 != 0 {
            self.shift = 0;
            self.shift_count = 0;
            self.control |= 0x0C;
            return;
        }
        self.shift |= (val & 1) << self.shift_count;
        self.shift_count += 1;
        if self.shift_count < 5 {
            return;
        }
        let value = self.shift;
        self.shift = 0;
        self.shift_count = 0;
        match (addr >> 13) & 0x03 {
            0 => self.control = value,
            1 => self.chr_bank0 = value,
            2 => self.chr_bank1 = value,
            _ => self.prg_bank = value,
        }
    }

    fn chr_offset(&self, addr: u16) -> usize {
        let four_k = self.control & 0x10 != 0;
        let banks4k = (self.chr.len() / 0x1000).max(1);
        if four_k {
            let bank = if addr < 0x1000 { self.chr_bank0 } else { self.chr_bank1 };
            (bank as usize % banks4k) * 0x1000 + (addr as usize & 0x0FFF)
        } else {
            let bank = (self.chr_bank0 & !1) as usize % banks4k;
            bank * 0x1000 + addr as usize
        }
    }

    pub fn read_chr(&self, addr: u16) -> u8 {
        self.chr.read(self.chr_offset(addr))
    }

    pub fn write_chr(&mut self, addr: u16, val: u8) {
        let offset = self.chr_offset(addr);
        self.chr.write(offset, val);
    }

    pub fn save_regs(&self, w: &mut StateWriter) {
        w.put_u8(self.shift);
        w.put_u8(self.shift_count);
        w.put_u8(self.control);
        w.put_u8(self.chr_bank0);
        w.put_u8(self.chr_bank1);
        w.put_u8(self.prg_bank);
    }

    pub fn load_regs(&mut self, r: &mut StateReader) {
        self.shift = r.get_u8();
        self.shift_count = r.get_u8();
        self.control = r.get_u8();
        self.chr_bank0 = r.get_u8();
        self.chr_bank1 = r.get_u8();
        self.prg_bank = r.get_u8();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::build_ines;

    fn make(prg_banks: u8) -> Vec<u8> {
        let mut rom = build_ines(prg_banks, 1, 0x10, 0);
        for bank in 0..prg_banks as usize {
            rom[16 + bank * 0x4000] = bank as u8;
        }
        rom
    }

    fn write_serial(m: &mut Mmc1, addr: u16, value: u8) {
        for i in 0..5 {
            m.write_prg(addr, (value >> i) & 1);
        }
    }

    #[test]
    fn five_writes_commit_a_register() {
        let rom = make(8);
        let cart = Cartridge::from_bytes(&rom).unwrap();
        let mut m = Mmc1::new(&cart);
        write_serial(&mut m, 0xE000, 3); // PRG bank 3
        assert_eq!(m.read_prg(0x8000), 3);
        // Last bank stays fixed in mode 3
        assert_eq!(m.read_prg(0xC000), 7);
    }

    #[test]
    fn bit7_write_resets_shifter() {
        let rom = make(8);
        let cart = Cartridge::from_bytes(&rom).unwrap();
        let mut m = Mmc1::new(&cart);
        m.write_prg(0xE000, 1);
        m.write_prg(0xE000, 1);
        m.write_prg(0xE000, 0x80); // reset mid-sequence
        write_serial(&mut m, 0xE000, 2);
        assert_eq!(m.read_prg(0x8000), 2);
    }

    #[test]
    fn mirroring_from_control() {
        let rom = make(2);
        let cart = Cartridge::from_bytes(&rom).unwrap();
        let mut m = Mmc1::new(&cart);
        write_serial(&mut m, 0x8000, 0x02 | 0x0C);
        assert_eq!(m.mirroring(), Mirroring::Vertical);
        write_serial(&mut m, 0x8000, 0x03 | 0x0C);
        assert_eq!(m.mirroring(), Mirroring::Horizontal);
    }
}
