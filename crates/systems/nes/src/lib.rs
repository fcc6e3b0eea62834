//! NES system aggregate.
//!
//! Wires the 6502 to the NES bus, PPU, APU and mapper. Each `step` gates
//! the PPU's latched NMI and the level IRQ line (mapper scanline counter,
//! APU frame counter) into the CPU, executes one instruction, applies the
//! OAM-DMA stall when one was requested, and advances the peripherals.
//!
//! Button mask for [`System::set_input`]: bit 0 = A, 1 = B, 2 = Select,
//! 3 = Start, 4 = Up, 5 = Down, 6 = Left, 7 = Right (set = pressed).
//! The framebuffer is 256x240 32-bit ABGR.

mod apu;
mod bus;
mod cartridge;
mod mappers;
mod ppu;

pub use bus::NesBus;
pub use cartridge::{Cartridge, Mirroring};
pub use ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};

use lockstep_core::cpu_6502::{Bus6502, Cpu6502};
use lockstep_core::state::{StateReader, StateWriter};
use lockstep_core::{RomError, System};
use mappers::Mapper;

/// The controller bit order expected by the hardware shift register.
pub mod buttons {
    pub const A: u8 = 1 << 0;
    pub const B: u8 = 1 << 1;
    pub const SELECT: u8 = 1 << 2;
    pub const START: u8 = 1 << 3;
    pub const UP: u8 = 1 << 4;
    pub const DOWN: u8 = 1 << 5;
    pub const LEFT: u8 = 1 << 6;
    pub const RIGHT: u8 = 1 << 7;
}

pub struct NesSystem<'r> {
    cpu: Cpu6502,
    bus: NesBus<'r>,
    total_cycles: u64,
}

impl<'r> NesSystem<'r> {
    pub fn new() -> Self {
        Self {
            cpu: Cpu6502::new(),
            bus: NesBus::new(),
            total_cycles: 0,
        }
    }

    /// Second controller.
    pub fn set_input_2(&mut self, buttons: u8) {
        self.bus.set_controller(1, buttons);
    }

    /// Whether the mapper's scanline IRQ is currently asserted.
    pub fn mapper_irq_pending(&self) -> bool {
        self.bus.mapper.as_ref().is_some_and(|m| m.irq_pending())
    }

    pub fn debug_state(&self) -> serde_json::Value {
        serde_json::json!({
            "pc": self.cpu.pc,
            "a": self.cpu.a,
            "x": self.cpu.x,
            "y": self.cpu.y,
            "sp": self.cpu.sp,
            "status": self.cpu.status,
            "cycles": self.total_cycles,
            "frame": self.bus.ppu.frame_count,
            "ppu_ctrl": self.bus.ppu.ctrl,
            "ppu_mask": self.bus.ppu.mask,
        })
    }
}

impl<'r> Default for NesSystem<'r> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> System<'r> for NesSystem<'r> {
    type Pixel = u32;

    const SAVE_STATE_SIZE: usize = Cpu6502::STATE_SIZE + NesBus::STATE_SIZE + 8;

    fn load_rom(&mut self, rom: &'r [u8]) -> Result<(), RomError> {
        let cart = Cartridge::from_bytes(rom)?;
        let mapper = Mapper::from_cart(&cart)?;
        self.bus = NesBus::new();
        self.bus.mapper = Some(mapper);
        self.cpu = Cpu6502::new();
        self.cpu.reset(&mut self.bus);
        self.total_cycles = 0;
        Ok(())
    }

    fn reset(&mut self) {
        let mapper = self.bus.mapper.take();
        self.bus = NesBus::new();
        self.bus.mapper = mapper;
        self.cpu = Cpu6502::new();
        self.cpu.reset(&mut self.bus);
        self.total_cycles = 0;
    }

    fn step(&mut self) -> u32 {
        if self.bus.ppu.take_nmi() {
            self.cpu.nmi_pending = true;
        }
        self.cpu.irq_line = self.bus.irq_line();

        let mut cycles = self.cpu.step(&mut self.bus);
        if self.bus.dma_requested {
            self.bus.dma_requested = false;
            // 513 cycles, 514 when the write landed on an odd cycle
            cycles += 513 + (self.total_cycles & 1) as u32;
        }
        self.bus.tick(cycles);
        self.total_cycles += cycles as u64;
        cycles
    }

    fn frame(&mut self) {
        let start = self.bus.ppu.frame_count;
        while self.bus.ppu.frame_count == start {
            self.step();
        }
    }

    fn set_input(&mut self, buttons: u8) {
        self.bus.set_controller(0, buttons);
    }

    fn frame_buffer(&self) -> &[u32] {
        self.bus.ppu.frame_buffer()
    }

    fn audio_samples(&mut self, out: &mut [i16]) -> usize {
        self.bus.apu.ring.drain(out)
    }

    fn read(&mut self, addr: u32) -> u8 {
        Bus6502::read(&mut self.bus, addr as u16)
    }

    fn write(&mut self, addr: u32, val: u8) {
        Bus6502::write(&mut self.bus, addr as u16, val);
    }

    fn ram(&self) -> &[u8] {
        &self.bus.ram
    }

    fn save_state(&self) -> Vec<u8> {
        let mut w = StateWriter::with_capacity(Self::SAVE_STATE_SIZE);
        self.cpu.save_state(&mut w);
        self.bus.save_state(&mut w);
        w.put_u64(self.total_cycles);
        w.into_vec()
    }

    fn load_state(&mut self, blob: &[u8]) {
        let mut r = StateReader::new(blob);
        self.cpu.load_state(&mut r);
        self.bus.load_state(&mut r);
        self.total_cycles = r.get_u64();
    }

    fn save_data(&self) -> Option<&[u8]> {
        Some(&self.bus.wram)
    }

    fn load_save_data(&mut self, data: &[u8]) {
        let n = data.len().min(self.bus.wram.len());
        self.bus.wram[..n].copy_from_slice(&data[..n]);
    }

    fn set_render_graphics(&mut self, enabled: bool) {
        self.bus.ppu.render_graphics = enabled;
    }

    fn set_render_audio(&mut self, enabled: bool) {
        self.bus.apu.render_audio = enabled;
    }

    fn frame_count(&self) -> u64 {
        self.bus.ppu.frame_count
    }

    fn cycles(&self) -> u64 {
        self.total_cycles
    }
}
