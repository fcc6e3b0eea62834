//! NROM (mapper 0): no banking. 16 KiB PRG is mirrored into both halves.

use super::Chr;
use crate::cartridge::{Cartridge, Mirroring};

#[derive(Debug)]
pub struct Nrom<'r> {
    prg: &'r [u8],
    pub chr: Chr<'r>,
    pub mirroring: Mirroring,
}

impl<'r> Nrom<'r> {
    pub fn new(cart: &Cartridge<'r>) -> Self {
        Self {
            prg: cart.prg_rom,
            chr: Chr::from_cart(cart.chr_rom),
            mirroring: cart.mirroring,
        }
    }

    pub fn read_prg(&self, addr: u16) -> u8 {
        if self.prg.is_empty() {
            return 0xFF;
        }
        let offset = (addr as usize - 0x8000) % self.prg.len();
        self.prg[offset]
    }

    pub fn read_chr(&self, addr: u16) -> u8 {
        self.chr.read(addr as usize)
    }

    pub fn write_chr(&mut self, addr: u16, val: u8) {
        self.chr.write(addr as usize, val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::build_ines;

    #[test]
    fn sixteen_k_prg_mirrors() {
        let mut rom = build_ines(1, 1, 0, 0);
        rom[16] = 0xAA; // first PRG byte
        let cart = Cartridge::from_bytes(&rom).unwrap();
        let nrom = Nrom::new(&cart);
        assert_eq!(nrom.read_prg(0x8000), 0xAA);
        assert_eq!(nrom.read_prg(0xC000), 0xAA);
    }
}
