//! Sega Master System aggregate.
//!
//! Z80 + SEGA-mapper bus + mode-4 VDP + SN76489 PSG. The VDP's interrupt
//! line is refreshed into the CPU before every step, so deferred enables
//! take effect on the next instruction.
//!
//! Button mask for [`System::set_input`]: bit 0 = Up, 1 = Down, 2 = Left,
//! 3 = Right, 4 = B1, 5 = B2 (set = pressed). The framebuffer is
//! 256x192 or 256x224 32-bit ABGR depending on the VDP mode.

mod bus;
mod vdp;

pub use bus::SmsBus;
pub use vdp::{Vdp, MAX_HEIGHT, SCREEN_WIDTH};

use lockstep_core::cpu_z80::{CpuZ80, Z80Bus};
use lockstep_core::logging::{log, LogCategory, LogLevel};
use lockstep_core::state::{StateReader, StateWriter};
use lockstep_core::{RomError, System};

pub struct SmsSystem<'r> {
    cpu: CpuZ80,
    bus: SmsBus<'r>,
}

impl<'r> SmsSystem<'r> {
    pub fn new() -> Self {
        let mut cpu = CpuZ80::new();
        cpu.pc = 0;
        cpu.im = 1;
        Self {
            cpu,
            bus: SmsBus::new(),
        }
    }

    pub fn set_input_2(&mut self, buttons: u8) {
        self.bus.set_pad2(buttons);
    }

    /// Current display height in lines (192 or 224).
    pub fn display_height(&self) -> usize {
        self.bus.vdp.height()
    }

    pub fn debug_state(&self) -> serde_json::Value {
        serde_json::json!({
            "pc": self.cpu.pc,
            "sp": self.cpu.sp,
            "af": self.cpu.af(),
            "cycles": self.cpu.cycles,
            "scanline": self.bus.vdp.scanline,
            "frame": self.bus.vdp.frame_count,
            "iff1": self.cpu.iff1,
            "im": self.cpu.im,
        })
    }
}

impl<'r> Default for SmsSystem<'r> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> System<'r> for SmsSystem<'r> {
    type Pixel = u32;

    const SAVE_STATE_SIZE: usize = CpuZ80::STATE_SIZE + SmsBus::STATE_SIZE;

    fn load_rom(&mut self, rom: &'r [u8]) -> Result<(), RomError> {
        // Raw images; some dumps carry a 512-byte copier header
        if rom.len() < 0x400 {
            return Err(RomError::TooShort {
                got: rom.len(),
                need: 0x400,
            });
        }
        let rom = if rom.len() % 0x4000 == 512 { &rom[512..] } else { rom };
        log(LogCategory::Bus, LogLevel::Info, || {
            format!("SMS: loaded {} KiB ROM", rom.len() / 1024)
        });
        self.cpu = CpuZ80::new();
        self.cpu.pc = 0;
        self.cpu.im = 1;
        self.bus = SmsBus::new();
        self.bus.attach_rom(rom);
        Ok(())
    }

    fn reset(&mut self) {
        let rom = self.bus.rom_slice();
        self.cpu = CpuZ80::new();
        self.cpu.pc = 0;
        self.cpu.im = 1;
        self.bus = SmsBus::new();
        self.bus.attach_rom(rom);
    }

    fn step(&mut self) -> u32 {
        self.cpu.irq_line = self.bus.vdp.irq_asserted();
        let cycles = self.cpu.step(&mut self.bus);
        self.bus.tick(cycles);
        cycles
    }

    fn frame(&mut self) {
        let start = self.bus.vdp.frame_count;
        while self.bus.vdp.frame_count == start {
            self.step();
        }
    }

    fn set_input(&mut self, buttons: u8) {
        self.bus.set_pad1(buttons);
    }

    fn frame_buffer(&self) -> &[u32] {
        self.bus.vdp.frame_buffer()
    }

    fn audio_samples(&mut self, out: &mut [i16]) -> usize {
        self.bus.ring.drain(out)
    }

    fn read(&mut self, addr: u32) -> u8 {
        Z80Bus::read(&mut self.bus, addr as u16)
    }

    fn write(&mut self, addr: u32, val: u8) {
        Z80Bus::write(&mut self.bus, addr as u16, val);
    }

    fn ram(&self) -> &[u8] {
        self.bus.ram()
    }

    fn save_state(&self) -> Vec<u8> {
        let mut w = StateWriter::with_capacity(Self::SAVE_STATE_SIZE);
        self.cpu.save_state(&mut w);
        self.bus.save_state(&mut w);
        w.into_vec()
    }

    fn load_state(&mut self, blob: &[u8]) {
        let mut r = StateReader::new(blob);
        self.cpu.load_state(&mut r);
        self.bus.load_state(&mut r);
    }

    fn save_data(&self) -> Option<&[u8]> {
        Some(self.bus.cart_ram())
    }

    fn load_save_data(&mut self, data: &[u8]) {
        self.bus.load_cart_ram(data);
    }

    fn set_render_graphics(&mut self, enabled: bool) {
        self.bus.vdp.render_graphics = enabled;
    }

    fn set_render_audio(&mut self, enabled: bool) {
        self.bus.render_audio = enabled;
    }

    fn frame_count(&self) -> u64 {
        self.bus.vdp.frame_count
    }

    fn cycles(&self) -> u64 {
        self.cpu.cycles
    }
}
