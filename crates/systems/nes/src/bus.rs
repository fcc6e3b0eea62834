//! NES CPU bus.
//!
//! ```text
//! $0000-$1FFF  2 KiB internal RAM, mirrored every $800
//! $2000-$3FFF  PPU registers, mirrored every 8
//! $4000-$4017  APU and I/O ($4014 OAM DMA, $4016/7 controllers)
//! $6000-$7FFF  PRG RAM (battery-backed on boards that have it)
//! $8000-$FFFF  PRG ROM through the mapper
//! ```
//!
//! Writing `$4014` copies a 256-byte page into OAM and requests the
//! 513/514-cycle CPU stall, which the driver adds to the instruction's
//! cycle count (the parity decides the extra cycle).

use crate::apu::NesApu;
use crate::mappers::Mapper;
use crate::ppu::Ppu;
use lockstep_core::cpu_6502::Bus6502;
use lockstep_core::state::{StateReader, StateWriter};

pub struct NesBus<'r> {
    pub ram: [u8; 0x800],
    /// PRG RAM at $6000 (the battery-save region).
    pub wram: [u8; 0x2000],
    pub ppu: Ppu,
    pub apu: NesApu,
    pub mapper: Option<Mapper<'r>>,
    controller_state: [u8; 2],
    controller_shift: [u8; 2],
    strobe: bool,
    /// Set by a $4014 write; consumed by the driver.
    pub dma_requested: bool,
}

impl<'r> NesBus<'r> {
    pub fn new() -> Self {
        Self {
            ram: [0; 0x800],
            wram: [0; 0x2000],
            ppu: Ppu::new(),
            apu: NesApu::new(),
            mapper: None,
            controller_state: [0; 2],
            controller_shift: [0; 2],
            strobe: false,
            dma_requested: false,
        }
    }

    pub fn set_controller(&mut self, idx: usize, state: u8) {
        if idx < 2 {
            self.controller_state[idx] = state;
        }
    }

    /// Level IRQ line into the CPU: mapper scanline IRQ or APU frame IRQ.
    pub fn irq_line(&self) -> bool {
        self.mapper.as_ref().is_some_and(|m| m.irq_pending()) || self.apu.frame_irq
    }

    /// Advance peripherals by the cycles one instruction consumed.
    pub fn tick(&mut self, cycles: u32) {
        if let Some(mapper) = &mut self.mapper {
            self.ppu.tick(cycles, mapper);
        }
        self.apu.tick(cycles);
    }

    fn read_controller(&mut self, idx: usize) -> u8 {
        if self.strobe {
            self.controller_state[idx] & 1
        } else {
            let v = self.controller_shift[idx] & 1;
            // Shift in 1s; reads past the 8th return 1 like real pads
            self.controller_shift[idx] = (self.controller_shift[idx] >> 1) | 0x80;
            v
        }
    }

    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        let mut buf = [0u8; 256];
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.read(base.wrapping_add(i as u16));
        }
        self.ppu.dma_fill_oam(&buf);
        self.dma_requested = true;
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.put_bytes(&self.ram);
        w.put_bytes(&self.wram);
        w.put_bytes(&self.controller_state);
        w.put_bytes(&self.controller_shift);
        w.put_bool(self.strobe);
        match &self.mapper {
            Some(m) => m.save_state(w),
            None => w.put_bytes(&vec![0u8; crate::mappers::MAPPER_STATE_SIZE]),
        }
        self.ppu.save_state(w);
        self.apu.save_state(w);
    }

    pub fn load_state(&mut self, r: &mut StateReader) {
        r.get_bytes(&mut self.ram);
        r.get_bytes(&mut self.wram);
        r.get_bytes(&mut self.controller_state);
        r.get_bytes(&mut self.controller_shift);
        self.strobe = r.get_bool();
        match &mut self.mapper {
            Some(m) => m.load_state(r),
            None => {
                let mut scratch = vec![0u8; crate::mappers::MAPPER_STATE_SIZE];
                r.get_bytes(&mut scratch);
            }
        }
        self.ppu.load_state(r);
        self.apu.load_state(r);
    }

    pub const STATE_SIZE: usize = 0x800
        + 0x2000
        + 5
        + crate::mappers::MAPPER_STATE_SIZE
        + Ppu::STATE_SIZE
        + NesApu::STATE_SIZE;
}

impl<'r> Default for NesBus<'r> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> Bus6502 for NesBus<'r> {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x2000..=0x3FFF => {
                let reg = 0x2000 + (addr & 0x07);
                match &self.mapper {
                    Some(mapper) => self.ppu.read_register(reg, mapper),
                    None => 0,
                }
            }
            0x4015 => self.apu.read_status(),
            0x4016 => self.read_controller(0),
            0x4017 => self.read_controller(1),
            0x4000..=0x401F => 0,
            0x6000..=0x7FFF => self.wram[(addr & 0x1FFF) as usize],
            0x8000..=0xFFFF => match &self.mapper {
                Some(m) => m.read_prg(addr),
                None => 0xFF,
            },
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize] = val,
            0x2000..=0x3FFF => {
                let reg = 0x2000 + (addr & 0x07);
                if let Some(mapper) = &mut self.mapper {
                    self.ppu.write_register(reg, val, mapper);
                }
            }
            0x4014 => self.oam_dma(val),
            0x4016 => {
                let st = val & 1 != 0;
                self.strobe = st;
                if !st {
                    // Falling edge latches the pad state into the shifters
                    self.controller_shift = self.controller_state;
                }
            }
            0x4000..=0x4017 => self.apu.write_register(addr, val),
            0x6000..=0x7FFF => self.wram[(addr & 0x1FFF) as usize] = val,
            0x8000..=0xFFFF => {
                if let Some(m) = &mut self.mapper {
                    m.write_prg(addr, val);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_mirrors_every_0x800() {
        let mut bus = NesBus::new();
        bus.write(0x0001, 0x42);
        assert_eq!(bus.read(0x0801), 0x42);
        assert_eq!(bus.read(0x1001), 0x42);
        assert_eq!(bus.read(0x1801), 0x42);
    }

    #[test]
    fn controller_strobe_protocol() {
        let mut bus = NesBus::new();
        // A + Start pressed (bits 0 and 3)
        bus.set_controller(0, 0b0000_1001);
        bus.write(0x4016, 1);
        bus.write(0x4016, 0);
        let bits: Vec<u8> = (0..8).map(|_| bus.read(0x4016)).collect();
        assert_eq!(bits, vec![1, 0, 0, 1, 0, 0, 0, 0]);
        // Past the 8th read: all ones
        assert_eq!(bus.read(0x4016), 1);
    }

    #[test]
    fn strobe_high_repeats_a_button() {
        let mut bus = NesBus::new();
        bus.set_controller(0, 1);
        bus.write(0x4016, 1);
        assert_eq!(bus.read(0x4016), 1);
        assert_eq!(bus.read(0x4016), 1);
    }

    #[test]
    fn input_does_not_touch_ram() {
        let mut bus = NesBus::new();
        let before = bus.ram;
        bus.set_controller(0, 0xFF);
        bus.set_controller(1, 0xFF);
        assert_eq!(bus.ram[..], before[..]);
    }

    #[test]
    fn prg_ram_readable_writable() {
        let mut bus = NesBus::new();
        bus.write(0x6000, 0x77);
        assert_eq!(bus.read(0x6000), 0x77);
        assert_eq!(bus.wram[0], 0x77);
    }
}
