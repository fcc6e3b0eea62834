//! MMC3 (mapper 4): fine-grained PRG/CHR banking plus the scanline IRQ
//! counter.
//!
//! The counter is clocked once per rendered visible scanline (the PPU
//! calls [`Mmc3::clock_scanline`] at the sprite-fetch dot). On a clock it
//! reloads from the latch if zero or reload was requested, otherwise
//! decrements; when it lands on zero with IRQs enabled, `irq_pending`
//! goes up and stays up until the CPU-side acknowledgement clears it.

use super::Chr;
use crate::cartridge::{Cartridge, Mirroring};
use lockstep_core::state::{StateReader, StateWriter};

#[derive(Debug)]
pub struct Mmc3<'r> {
    prg: &'r [u8],
    pub chr: Chr<'r>,
    /// Bank-select register: target (2-0), PRG mode (6), CHR mode (7).
    bank_select: u8,
    banks: [u8; 8],
    mirroring_reg: u8,
    four_screen: bool,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    pub irq_pending: bool,
}

impl<'r> Mmc3<'r> {
    pub fn new(cart: &Cartridge<'r>) -> Self {
        Self {
            prg: cart.prg_rom,
            chr: Chr::from_cart(cart.chr_rom),
            bank_select: 0,
            banks: [0; 8],
            mirroring_reg: 0,
            four_screen: cart.mirroring == Mirroring::FourScreen,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
        }
    }

    pub fn mirroring(&self) -> Mirroring {
        if self.four_screen {
            Mirroring::FourScreen
        } else if self.mirroring_reg & 1 != 0 {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        }
    }

    fn prg_bank_count(&self) -> usize {
        (self.prg.len() / 0x2000).max(1)
    }

    pub fn read_prg(&self, addr: u16) -> u8 {
        let count = self.prg_bank_count();
        let swap = self.bank_select & 0x40 != 0;
        let bank = match (addr >> 13) & 0x03 {
            0 => {
                if swap {
                    count - 2
                } else {
                    self.banks[6] as usize % count
                }
            }
            1 => self.banks[7] as usize % count,
            2 => {
                if swap {
                    self.banks[6] as usize % count
                } else {
                    count - 2
                }
            }
            _ => count - 1,
        };
        let offset = bank * 0x2000 + (addr as usize & 0x1FFF);
        self.prg.get(offset).copied().unwrap_or(0xFF)
    }

    pub fn write_prg(&mut self, addr: u16, val: u8) {
        match (addr & 0xE001, addr & 1) {
            (0x8000, _) => self.bank_select = val,
            (0x8001, _) => {
                let target = (self.bank_select & 0x07) as usize;
                self.banks[target] = if target < 2 { val & 0xFE } else { val };
            }
            (0xA000, _) => self.mirroring_reg = val,
            (0xA001, _) => {} // PRG RAM protect, not modeled
            (0xC000, _) => self.irq_latch = val,
            (0xC001, _) => {
                self.irq_counter = 0;
                self.irq_reload = true;
            }
            (0xE000, _) => {
                self.irq_enabled = false;
                self.irq_pending = false;
            }
            (0xE001, _) => self.irq_enabled = true,
            _ => {}
        }
    }

    fn chr_offset(&self, addr: u16) -> usize {
        let invert = self.bank_select & 0x80 != 0;
        let a = if invert { addr ^ 0x1000 } else { addr } as usize;
        let banks1k = (self.chr.len() / 0x400).max(1);
        let bank = match a >> 10 {
            0 => self.banks[0] as usize,
            1 => self.banks[0] as usize + 1,
            2 => self.banks[1] as usize,
            3 => self.banks[1] as usize + 1,
            other => self.banks[other - 2] as usize,
        } % banks1k;
        bank * 0x400 + (a & 0x3FF)
    }

    pub fn read_chr(&self, addr: u16) -> u8 {
        self.chr.read(self.chr_offset(addr))
    }

    pub fn write_chr(&mut self, addr: u16, val: u8) {
        let offset = self.chr_offset(addr);
        self.chr.write(offset, val);
    }

    /// Once per rendered visible scanline.
    pub fn clock_scanline(&mut self) {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }
        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
        }
    }

    pub fn save_regs(&self, w: &mut StateWriter) {
        w.put_u8(self.bank_select);
        w.put_bytes(&self.banks);
        w.put_u8(self.mirroring_reg);
        w.put_u8(self.irq_latch);
        w.put_u8(self.irq_counter);
        w.put_bool(self.irq_reload);
        w.put_bool(self.irq_enabled);
        w.put_bool(self.irq_pending);
    }

    pub fn load_regs(&mut self, r: &mut StateReader) {
        self.bank_select = r.get_u8();
        r.get_bytes(&mut self.banks);
        self.mirroring_reg = r.get_u8();
        self.irq_latch = r.get_u8();
        self.irq_counter = r.get_u8();
        self.irq_reload = r.get_bool();
        self.irq_enabled = r.get_bool();
        self.irq_pending = r.get_bool();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::build_ines;

    fn make() -> Vec<u8> {
        let mut rom = build_ines(4, 2, 0x40, 0); // 8 x 8K PRG banks
        for bank in 0..8 {
            rom[16 + bank * 0x2000] = bank as u8;
        }
        rom
    }

    #[test]
    fn prg_banking_modes() {
        let rom = make();
        let cart = Cartridge::from_bytes(&rom).unwrap();
        let mut m = Mmc3::new(&cart);
        // Select R6 = bank 2
        m.write_prg(0x8000, 6);
        m.write_prg(0x8001, 2);
        m.write_prg(0x8000, 7);
        m.write_prg(0x8001, 3);
        assert_eq!(m.read_prg(0x8000), 2);
        assert_eq!(m.read_prg(0xA000), 3);
        assert_eq!(m.read_prg(0xC000), 6); // second-to-last fixed
        assert_eq!(m.read_prg(0xE000), 7); // last fixed

        // Swap mode: R6 moves to $C000
        m.write_prg(0x8000, 0x46);
        assert_eq!(m.read_prg(0x8000), 6);
        assert_eq!(m.read_prg(0xC000), 2);
    }

    #[test]
    fn irq_counts_scanlines() {
        let rom = make();
        let cart = Cartridge::from_bytes(&rom).unwrap();
        let mut m = Mmc3::new(&cart);
        m.write_prg(0xC000, 3); // latch
        m.write_prg(0xC001, 0); // reload
        m.write_prg(0xE001, 0); // enable
        m.clock_scanline(); // reload -> 3
        m.clock_scanline(); // 2
        m.clock_scanline(); // 1
        assert!(!m.irq_pending);
        m.clock_scanline(); // 0 -> IRQ
        assert!(m.irq_pending);

        // Acknowledge by disabling
        m.write_prg(0xE000, 0);
        assert!(!m.irq_pending);
    }

    #[test]
    fn mirroring_register() {
        let rom = make();
        let cart = Cartridge::from_bytes(&rom).unwrap();
        let mut m = Mmc3::new(&cart);
        assert_eq!(m.mirroring(), Mirroring::Vertical);
        m.write_prg(0xA000, 1);
        assert_eq!(m.mirroring(), Mirroring::Horizontal);
    }
}
