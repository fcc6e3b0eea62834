//! NES cartridge mappers.
//!
//! One module per chip; the [`Mapper`] enum dispatches. PRG and CHR ROM
//! are borrowed slices; CHR-less boards own 8 KiB of CHR RAM. The MMC3
//! scanline counter is clocked by the PPU at the sprite-fetch dot of each
//! rendered visible line and raises a level IRQ consumed through
//! [`Mapper::irq_pending`] / [`Mapper::ack_irq`].

mod axrom;
mod mmc1;
mod mmc3;
mod nrom;
mod uxrom;

pub use axrom::Axrom;
pub use mmc1::Mmc1;
pub use mmc3::Mmc3;
pub use nrom::Nrom;
pub use uxrom::Uxrom;

use crate::cartridge::{Cartridge, Mirroring};
use lockstep_core::state::{StateReader, StateWriter};
use lockstep_core::RomError;

/// CHR storage: ROM from the cartridge, or 8 KiB of on-board RAM.
#[derive(Debug)]
pub enum Chr<'r> {
    Rom(&'r [u8]),
    Ram(Box<[u8; 0x2000]>),
}

impl<'r> Chr<'r> {
    pub fn from_cart(chr_rom: &'r [u8]) -> Self {
        if chr_rom.is_empty() {
            Chr::Ram(Box::new([0; 0x2000]))
        } else {
            Chr::Rom(chr_rom)
        }
    }

    pub fn read(&self, offset: usize) -> u8 {
        match self {
            Chr::Rom(rom) => rom.get(offset).copied().unwrap_or(0),
            Chr::Ram(ram) => ram[offset & 0x1FFF],
        }
    }

    pub fn write(&mut self, offset: usize, val: u8) {
        if let Chr::Ram(ram) = self {
            ram[offset & 0x1FFF] = val;
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Chr::Rom(rom) => rom.len(),
            Chr::Ram(_) => 0x2000,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save_state(&self, w: &mut StateWriter) {
        match self {
            Chr::Rom(_) => w.put_bytes(&[0u8; 0x2000]),
            Chr::Ram(ram) => w.put_bytes(&ram[..]),
        }
    }

    fn load_state(&mut self, r: &mut StateReader) {
        let mut buf = [0u8; 0x2000];
        r.get_bytes(&mut buf);
        if let Chr::Ram(ram) = self {
            ram.copy_from_slice(&buf);
        }
    }
}

#[derive(Debug)]
pub enum Mapper<'r> {
    Nrom(Nrom<'r>),
    Mmc1(Mmc1<'r>),
    Uxrom(Uxrom<'r>),
    Axrom(Axrom<'r>),
    Mmc3(Mmc3<'r>),
}

impl<'r> Mapper<'r> {
    pub fn from_cart(cart: &Cartridge<'r>) -> Result<Self, RomError> {
        match cart.mapper {
            0 => Ok(Mapper::Nrom(Nrom::new(cart))),
            1 => Ok(Mapper::Mmc1(Mmc1::new(cart))),
            2 => Ok(Mapper::Uxrom(Uxrom::new(cart))),
            4 => Ok(Mapper::Mmc3(Mmc3::new(cart))),
            7 => Ok(Mapper::Axrom(Axrom::new(cart))),
            other => Err(RomError::UnsupportedMapper(other)),
        }
    }

    pub fn read_prg(&self, addr: u16) -> u8 {
        match self {
            Mapper::Nrom(m) => m.read_prg(addr),
            Mapper::Mmc1(m) => m.read_prg(addr),
            Mapper::Uxrom(m) => m.read_prg(addr),
            Mapper::Axrom(m) => m.read_prg(addr),
            Mapper::Mmc3(m) => m.read_prg(addr),
        }
    }

    pub fn write_prg(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Nrom(_) => {}
            Mapper::Mmc1(m) => m.write_prg(addr, val),
            Mapper::Uxrom(m) => m.write_prg(addr, val),
            Mapper::Axrom(m) => m.write_prg(addr, val),
            Mapper::Mmc3(m) => m.write_prg(addr, val),
        }
    }

    pub fn read_chr(&self, addr: u16) -> u8 {
        match self {
            Mapper::Nrom(m) => m.read_chr(addr),
            Mapper::Mmc1(m) => m.read_chr(addr),
            Mapper::Uxrom(m) => m.read_chr(addr),
            Mapper::Axrom(m) => m.read_chr(addr),
            Mapper::Mmc3(m) => m.read_chr(addr),
        }
    }

    pub fn write_chr(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Nrom(m) => m.write_chr(addr, val),
            Mapper::Mmc1(m) => m.write_chr(addr, val),
            Mapper::Uxrom(m) => m.write_chr(addr, val),
            Mapper::Axrom(m) => m.write_chr(addr, val),
            Mapper::Mmc3(m) => m.write_chr(addr, val),
        }
    }

    pub fn mirroring(&self) -> Mirroring {
        match self {
            Mapper::Nrom(m) => m.mirroring,
            Mapper::Mmc1(m) => m.mirroring(),
            Mapper::Uxrom(m) => m.mirroring,
            Mapper::Axrom(m) => m.mirroring(),
            Mapper::Mmc3(m) => m.mirroring(),
        }
    }

    /// Scanline hook, called by the PPU while rendering is enabled.
    pub fn clock_scanline(&mut self) {
        if let Mapper::Mmc3(m) = self {
            m.clock_scanline();
        }
    }

    pub fn irq_pending(&self) -> bool {
        matches!(self, Mapper::Mmc3(m) if m.irq_pending)
    }

    pub fn ack_irq(&mut self) {
        if let Mapper::Mmc3(m) = self {
            m.irq_pending = false;
        }
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        let start = w.len();
        match self {
            Mapper::Nrom(m) => {
                w.put_u8(0);
                m.chr.save_state(w);
            }
            Mapper::Mmc1(m) => {
                w.put_u8(1);
                m.chr.save_state(w);
                m.save_regs(w);
            }
            Mapper::Uxrom(m) => {
                w.put_u8(2);
                m.chr.save_state(w);
                w.put_u8(m.bank);
            }
            Mapper::Axrom(m) => {
                w.put_u8(7);
                m.chr.save_state(w);
                w.put_u8(m.bank);
            }
            Mapper::Mmc3(m) => {
                w.put_u8(4);
                m.chr.save_state(w);
                m.save_regs(w);
            }
        }
        // Pad every variant to the fixed slot size
        while w.len() - start < MAPPER_STATE_SIZE {
            w.put_u8(0);
        }
    }

    pub fn load_state(&mut self, r: &mut StateReader) {
        let start = r.position();
        let _tag = r.get_u8();
        match self {
            Mapper::Nrom(m) => m.chr.load_state(r),
            Mapper::Mmc1(m) => {
                m.chr.load_state(r);
                m.load_regs(r);
            }
            Mapper::Uxrom(m) => {
                m.chr.load_state(r);
                m.bank = r.get_u8();
            }
            Mapper::Axrom(m) => {
                m.chr.load_state(r);
                m.bank = r.get_u8();
            }
            Mapper::Mmc3(m) => {
                m.chr.load_state(r);
                m.load_regs(r);
            }
        }
        while r.position() - start < MAPPER_STATE_SIZE {
            r.get_u8();
        }
    }
}

/// Fixed mapper slot in the save-state layout: tag + CHR RAM + the
/// largest register file (MMC3).
pub const MAPPER_STATE_SIZE: usize = 1 + 0x2000 + 32;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::build_ines;

    #[test]
    fn mapper_selection() {
        for (id, flags6) in [(0u8, 0x00u8), (1, 0x10), (2, 0x20), (4, 0x40), (7, 0x70)] {
            let rom = build_ines(1, 1, flags6, 0);
            let cart = Cartridge::from_bytes(&rom).unwrap();
            let mapper = Mapper::from_cart(&cart).unwrap();
            let tag = match mapper {
                Mapper::Nrom(_) => 0,
                Mapper::Mmc1(_) => 1,
                Mapper::Uxrom(_) => 2,
                Mapper::Mmc3(_) => 4,
                Mapper::Axrom(_) => 7,
            };
            assert_eq!(tag, id);
        }
    }

    #[test]
    fn unsupported_mapper_rejected() {
        let rom = build_ines(1, 1, 0x30, 0); // mapper 3 (CNROM)
        let cart = Cartridge::from_bytes(&rom).unwrap();
        assert!(matches!(
            Mapper::from_cart(&cart),
            Err(RomError::UnsupportedMapper(3))
        ));
    }

    #[test]
    fn state_slot_is_fixed_size() {
        for flags6 in [0x00u8, 0x10, 0x20, 0x40, 0x70] {
            let rom = build_ines(2, 1, flags6, 0);
            let cart = Cartridge::from_bytes(&rom).unwrap();
            let mapper = Mapper::from_cart(&cart).unwrap();
            let mut w = StateWriter::new();
            mapper.save_state(&mut w);
            assert_eq!(w.len(), MAPPER_STATE_SIZE);
        }
    }

    #[test]
    fn chr_ram_when_no_chr_banks() {
        let rom = build_ines(1, 0, 0, 0);
        let cart = Cartridge::from_bytes(&rom).unwrap();
        let mut mapper = Mapper::from_cart(&cart).unwrap();
        mapper.write_chr(0x0100, 0xAB);
        assert_eq!(mapper.read_chr(0x0100), 0xAB);
    }
}
