//! UxROM (mapper 2): 16 KiB switchable bank at `$8000`, last bank fixed
//! at `$C000`.

use super::Chr;
use crate::cartridge::{Cartridge, Mirroring};

#[derive(Debug)]
pub struct Uxrom<'r> {
    prg: &'r [u8],
    pub chr: Chr<'r>,
    pub mirroring: Mirroring,
    pub bank: u8,
}

impl<'r> Uxrom<'r> {
    pub fn new(cart: &Cartridge<'r>) -> Self {
        Self {
            prg: cart.prg_rom,
            chr: Chr::from_cart(cart.chr_rom),
            mirroring: cart.mirroring,
            bank: 0,
        }
    }

    fn bank_count(&self) -> usize {
        (self.prg.len() / 0x4000).max(1)
    }

    pub fn read_prg(&self, addr: u16) -> u8 {
        let offset = if addr < 0xC000 {
            (self.bank as usize % self.bank_count()) * 0x4000 + (addr as usize - 0x8000)
        } else {
            (self.bank_count() - 1) * 0x4000 + (addr as usize - 0xC000)
        };
        self.prg.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn write_prg(&mut self, _addr: u16, val: u8) {
        self.bank = val & 0x0F;
    }

    pub fn read_chr(&self, addr: u16) -> u8 {
        self.chr.read(addr as usize)
    }

    pub fn write_chr(&mut self, addr: u16, val: u8) {
        self.chr.write(addr as usize, val);
    }
}
