//! Game Boy memory bank controllers.
//!
//! The ROM image is borrowed for the mapper's lifetime; cartridge RAM is
//! a fixed 32 KiB array (the largest bank set MBC1/MBC3 address) owned
//! here and surfaced through the battery-save operations.

mod mbc0;
mod mbc1;
mod mbc3;

pub use mbc0::Mbc0;
pub use mbc1::Mbc1;
pub use mbc3::Mbc3;

use lockstep_core::state::{StateReader, StateWriter};
use lockstep_core::RomError;

/// Fixed cartridge RAM backing store (4 × 8 KiB banks).
pub const CART_RAM_SIZE: usize = 0x8000;

/// Unified mapper enum dispatching to the chip implementations.
#[derive(Debug)]
pub enum Mapper<'r> {
    Mbc0(Mbc0<'r>),
    Mbc1(Mbc1<'r>),
    Mbc3(Mbc3<'r>),
}

impl<'r> Mapper<'r> {
    /// Select a mapper from the cartridge-type byte at `0x147`.
    pub fn from_cart(rom: &'r [u8], cart_type: u8) -> Result<Self, RomError> {
        match cart_type {
            0x00 => Ok(Mapper::Mbc0(Mbc0::new(rom))),
            0x01..=0x03 => Ok(Mapper::Mbc1(Mbc1::new(rom))),
            0x0F..=0x13 => Ok(Mapper::Mbc3(Mbc3::new(rom))),
            other => Err(RomError::UnsupportedCartridge(other)),
        }
    }

    pub fn read_rom(&self, addr: u16) -> u8 {
        match self {
            Mapper::Mbc0(m) => m.read_rom(addr),
            Mapper::Mbc1(m) => m.read_rom(addr),
            Mapper::Mbc3(m) => m.read_rom(addr),
        }
    }

    /// ROM-area writes program the banking registers.
    pub fn write_rom(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Mbc0(_) => {}
            Mapper::Mbc1(m) => m.write_rom(addr, val),
            Mapper::Mbc3(m) => m.write_rom(addr, val),
        }
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        match self {
            Mapper::Mbc0(_) => 0xFF,
            Mapper::Mbc1(m) => m.read_ram(addr),
            Mapper::Mbc3(m) => m.read_ram(addr),
        }
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        match self {
            Mapper::Mbc0(_) => {}
            Mapper::Mbc1(m) => m.write_ram(addr, val),
            Mapper::Mbc3(m) => m.write_ram(addr, val),
        }
    }

    /// Battery-backed RAM contents.
    pub fn save_data(&self) -> Option<&[u8]> {
        match self {
            Mapper::Mbc0(_) => None,
            Mapper::Mbc1(m) => Some(&m.ram),
            Mapper::Mbc3(m) => Some(&m.ram),
        }
    }

    pub fn load_save_data(&mut self, data: &[u8]) {
        let ram: &mut [u8] = match self {
            Mapper::Mbc0(_) => return,
            Mapper::Mbc1(m) => &mut m.ram,
            Mapper::Mbc3(m) => &mut m.ram,
        };
        let n = data.len().min(ram.len());
        ram[..n].copy_from_slice(&data[..n]);
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        match self {
            Mapper::Mbc0(_) => {
                w.put_u8(0);
                w.put_bytes(&[0; MAPPER_REG_BYTES]);
                w.put_bytes(&[0; CART_RAM_SIZE]);
            }
            Mapper::Mbc1(m) => {
                w.put_u8(1);
                w.put_u8(m.ram_enabled as u8);
                w.put_u8(m.rom_bank);
                w.put_u8(m.ram_bank);
                w.put_u8(m.banking_mode);
                w.put_bytes(&m.ram);
            }
            Mapper::Mbc3(m) => {
                w.put_u8(3);
                w.put_u8(m.ram_enabled as u8);
                w.put_u8(m.rom_bank);
                w.put_u8(m.ram_bank);
                w.put_u8(0);
                w.put_bytes(&m.ram);
            }
        }
    }

    pub fn load_state(&mut self, r: &mut StateReader) {
        let _tag = r.get_u8();
        let enabled = r.get_u8() != 0;
        let rom_bank = r.get_u8();
        let ram_bank = r.get_u8();
        let mode = r.get_u8();
        match self {
            Mapper::Mbc0(_) => {
                let mut scratch = [0u8; CART_RAM_SIZE];
                r.get_bytes(&mut scratch);
            }
            Mapper::Mbc1(m) => {
                m.ram_enabled = enabled;
                m.rom_bank = rom_bank;
                m.ram_bank = ram_bank;
                m.banking_mode = mode;
                r.get_bytes(&mut m.ram);
            }
            Mapper::Mbc3(m) => {
                m.ram_enabled = enabled;
                m.rom_bank = rom_bank;
                m.ram_bank = ram_bank;
                r.get_bytes(&mut m.ram);
            }
        }
    }

    #[cfg(test)]
    pub fn name(&self) -> &'static str {
        match self {
            Mapper::Mbc0(_) => "MBC0",
            Mapper::Mbc1(_) => "MBC1",
            Mapper::Mbc3(_) => "MBC3",
        }
    }
}

const MAPPER_REG_BYTES: usize = 4;

/// Bytes `save_state` writes, identical for every variant.
pub const MAPPER_STATE_SIZE: usize = 1 + MAPPER_REG_BYTES + CART_RAM_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cart_type_selection() {
        let rom = vec![0u8; 0x8000];
        assert_eq!(Mapper::from_cart(&rom, 0x00).unwrap().name(), "MBC0");
        assert_eq!(Mapper::from_cart(&rom, 0x01).unwrap().name(), "MBC1");
        assert_eq!(Mapper::from_cart(&rom, 0x03).unwrap().name(), "MBC1");
        assert_eq!(Mapper::from_cart(&rom, 0x0F).unwrap().name(), "MBC3");
        assert_eq!(Mapper::from_cart(&rom, 0x13).unwrap().name(), "MBC3");
        assert!(matches!(
            Mapper::from_cart(&rom, 0x19),
            Err(RomError::UnsupportedCartridge(0x19))
        ));
    }

    #[test]
    fn state_size_is_uniform() {
        let rom = vec![0u8; 0x8000];
        for ty in [0x00u8, 0x01, 0x11] {
            let mapper = Mapper::from_cart(&rom, ty).unwrap();
            let mut w = StateWriter::new();
            mapper.save_state(&mut w);
            assert_eq!(w.len(), MAPPER_STATE_SIZE);
        }
    }
}
