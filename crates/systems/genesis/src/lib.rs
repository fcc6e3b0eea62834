//! Sega Genesis / Mega Drive aggregate.
//!
//! A 68000 drives the show; the Z80 sound program runs at half the 68000
//! clock whenever it is neither held in reset nor bus-granted, and the
//! VDP/PSG/FM tick at the 68000 rate (the PSG divides down internally).
//! The 68000's interrupt level is refreshed from the VDP's V-int/H-int
//! pending flags before every step so deferred interrupts land on the
//! very next instruction; the interrupt acknowledge clears the taken
//! level in the VDP. The Z80 receives a V-blank INT pulse lasting about
//! one scanline each frame.
//!
//! Button mask for [`System::set_input`]: bit 0 = Up, 1 = Down, 2 = Left,
//! 3 = Right, 4 = A, 5 = B, 6 = C, 7 = Start (set = pressed). The
//! framebuffer is 320x224 32-bit ABGR.

mod bus;
mod io;
mod vdp;

pub use bus::GenesisBus;
pub use vdp::{Vdp, SCREEN_HEIGHT, SCREEN_WIDTH};

use lockstep_core::cpu_m68k::CpuM68k;
use lockstep_core::cpu_z80::CpuZ80;
use lockstep_core::logging::{log, LogCategory, LogLevel};
use lockstep_core::state::{StateReader, StateWriter};
use lockstep_core::{RomError, System};

/// Z80 INT pulse length in 68000 cycles (about one scanline).
const Z80_INT_PULSE: u32 = 488;

pub struct GenesisSystem<'r> {
    m68k: CpuM68k,
    z80: CpuZ80,
    bus: GenesisBus<'r>,
    /// 68000-cycle credit the Z80 has not yet consumed (it spends two
    /// per Z80 cycle).
    z80_budget: i32,
    z80_int_cycles: u32,
    prev_vint: bool,
    total_cycles: u64,
}

impl<'r> GenesisSystem<'r> {
    pub fn new() -> Self {
        Self {
            m68k: CpuM68k::new(),
            z80: CpuZ80::new(),
            bus: GenesisBus::new(),
            z80_budget: 0,
            z80_int_cycles: 0,
            prev_vint: false,
            total_cycles: 0,
        }
    }

    pub fn set_input_2(&mut self, buttons: u8) {
        self.bus.io.set_pad(1, buttons);
    }

    /// 68000 supervisor-mode bit.
    pub fn supervisor(&self) -> bool {
        self.m68k.supervisor()
    }

    /// 68000 interrupt-priority mask.
    pub fn interrupt_mask(&self) -> u8 {
        self.m68k.interrupt_mask()
    }

    pub fn vdp(&self) -> &Vdp {
        &self.bus.vdp
    }

    pub fn debug_state(&self) -> serde_json::Value {
        serde_json::json!({
            "pc": self.m68k.pc,
            "sr": self.m68k.sr,
            "d0": self.m68k.d[0],
            "a7": self.m68k.a[7],
            "cycles": self.total_cycles,
            "scanline": self.bus.vdp.scanline,
            "frame": self.bus.vdp.frame_count,
            "z80_running": self.bus.z80_running(),
            "z80_pc": self.z80.pc,
        })
    }
}

impl<'r> Default for GenesisSystem<'r> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> System<'r> for GenesisSystem<'r> {
    type Pixel = u32;

    const SAVE_STATE_SIZE: usize = CpuM68k::STATE_SIZE
        + CpuZ80::STATE_SIZE
        + GenesisBus::STATE_SIZE
        + 4 // z80_budget
        + 4 // z80_int_cycles
        + 1 // prev_vint
        + 8; // total_cycles

    fn load_rom(&mut self, rom: &'r [u8]) -> Result<(), RomError> {
        if rom.len() < 0x200 {
            return Err(RomError::TooShort {
                got: rom.len(),
                need: 0x200,
            });
        }
        self.bus = GenesisBus::new();
        self.bus.attach_rom(rom);
        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "Genesis: loaded {} KiB ROM{}",
                rom.len() / 1024,
                if self.bus.sram_enabled { ", SRAM present" } else { "" }
            )
        });
        self.m68k = CpuM68k::new();
        self.m68k.reset(&mut self.bus);
        self.z80 = CpuZ80::new();
        self.z80.pc = 0;
        self.z80_budget = 0;
        self.z80_int_cycles = 0;
        self.prev_vint = false;
        self.total_cycles = 0;
        Ok(())
    }

    fn reset(&mut self) {
        let rom = self.bus.rom_slice();
        self.bus = GenesisBus::new();
        self.bus.attach_rom(rom);
        self.m68k = CpuM68k::new();
        self.m68k.reset(&mut self.bus);
        self.z80 = CpuZ80::new();
        self.z80.pc = 0;
        self.z80_budget = 0;
        self.z80_int_cycles = 0;
        self.prev_vint = false;
        self.total_cycles = 0;
    }

    fn step(&mut self) -> u32 {
        // Deferred interrupts must land on the next instruction, so the
        // level is refreshed right before the CPU steps
        self.m68k.pending_level = self.bus.vdp.pending_level();
        let cycles = self.m68k.step(&mut self.bus);

        // Z80 subprocessor at half rate, honoring reset/bus-grant
        if self.bus.z80_running() {
            self.z80.irq_line = self.z80_int_cycles > 0;
            self.z80_budget += cycles as i32;
            while self.z80_budget > 0 {
                let zc = self.z80.step(&mut self.bus);
                self.z80_budget -= (zc as i32) * 2;
                self.z80.irq_line = self.z80_int_cycles > 0;
            }
        } else {
            self.z80_budget = 0;
        }

        self.bus.tick(cycles);
        self.z80_int_cycles = self.z80_int_cycles.saturating_sub(cycles);

        // V-blank edge starts the Z80 INT pulse
        let vint = self.bus.vdp.vint_pending;
        if vint && !self.prev_vint {
            self.z80_int_cycles = Z80_INT_PULSE;
        }
        self.prev_vint = vint;

        self.total_cycles += cycles as u64;
        cycles
    }

    fn frame(&mut self) {
        let start = self.bus.vdp.frame_count;
        while self.bus.vdp.frame_count == start {
            self.step();
        }
    }

    fn set_input(&mut self, buttons: u8) {
        self.bus.io.set_pad(0, buttons);
    }

    fn frame_buffer(&self) -> &[u32] {
        self.bus.vdp.frame_buffer()
    }

    fn audio_samples(&mut self, out: &mut [i16]) -> usize {
        self.bus.ring.drain(out)
    }

    fn read(&mut self, addr: u32) -> u8 {
        use lockstep_core::cpu_m68k::BusM68k;
        self.bus.read8(addr)
    }

    fn write(&mut self, addr: u32, val: u8) {
        use lockstep_core::cpu_m68k::BusM68k;
        self.bus.write8(addr, val);
    }

    fn ram(&self) -> &[u8] {
        &self.bus.work_ram[..]
    }

    fn save_state(&self) -> Vec<u8> {
        let mut w = StateWriter::with_capacity(Self::SAVE_STATE_SIZE);
        self.m68k.save_state(&mut w);
        self.z80.save_state(&mut w);
        self.bus.save_state(&mut w);
        w.put_i32(self.z80_budget);
        w.put_u32(self.z80_int_cycles);
        w.put_bool(self.prev_vint);
        w.put_u64(self.total_cycles);
        w.into_vec()
    }

    fn load_state(&mut self, blob: &[u8]) {
        let mut r = StateReader::new(blob);
        self.m68k.load_state(&mut r);
        self.z80.load_state(&mut r);
        self.bus.load_state(&mut r);
        self.z80_budget = r.get_i32();
        self.z80_int_cycles = r.get_u32();
        self.prev_vint = r.get_bool();
        self.total_cycles = r.get_u64();
    }

    fn save_data(&self) -> Option<&[u8]> {
        if self.bus.sram_enabled {
            Some(self.bus.sram())
        } else {
            None
        }
    }

    fn load_save_data(&mut self, data: &[u8]) {
        self.bus.load_sram(data);
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
        self.total_cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal ROM: vectors, then a program that enables the display,
    /// writes CRAM/VRAM through the VDP ports and counts V-ints in RAM.
    fn test_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x1000];
        // Vector 0: initial SSP; vector 1: entry point
        rom[0..4].copy_from_slice(&0x00FF8000u32.to_be_bytes());
        rom[4..8].copy_from_slice(&0x00000200u32.to_be_bytes());
        // Level-6 autovector -> 0x300
        rom[(24 + 6) * 4..(24 + 6) * 4 + 4].copy_from_slice(&0x00000300u32.to_be_bytes());

        let mut code: Vec<u8> = Vec::new();
        let word = |c: &mut Vec<u8>, w: u16| c.extend_from_slice(&w.to_be_bytes());
        // LEA $C00004,A0 ; LEA $C00000,A1
        word(&mut code, 0x41F9);
        code.extend_from_slice(&0x00C00004u32.to_be_bytes());
        word(&mut code, 0x43F9);
        code.extend_from_slice(&0x00C00000u32.to_be_bytes());
        // MOVE.W #$8144,(A0)  display enable + vint enable (reg 1)
        word(&mut code, 0x30BC);
        word(&mut code, 0x8164);
        // MOVE.W #$8F02,(A0)  autoincrement 2
        word(&mut code, 0x30BC);
        word(&mut code, 0x8F02);
        // CRAM write: MOVE.W #$C000,(A0); MOVE.W #$0000,(A0)
        word(&mut code, 0x30BC);
        word(&mut code, 0xC000);
        word(&mut code, 0x30BC);
        word(&mut code, 0x0000);
        // MOVE.W #$0EEE,(A1)  white backdrop entry
        word(&mut code, 0x32BC);
        word(&mut code, 0x0EEE);
        // VRAM write at 0: MOVE.W #$4000,(A0); MOVE.W #$0000,(A0)
        word(&mut code, 0x30BC);
        word(&mut code, 0x4000);
        word(&mut code, 0x30BC);
        word(&mut code, 0x0000);
        // MOVE.W #$1234,(A1)
        word(&mut code, 0x32BC);
        word(&mut code, 0x1234);
        // MOVE #$2300,SR  (drop the mask so level 6 gets through)
        word(&mut code, 0x46FC);
        word(&mut code, 0x2300);
        // loop: BRA loop
        word(&mut code, 0x60FE);
        rom[0x200..0x200 + code.len()].copy_from_slice(&code);

        // V-int handler at 0x300: ADDQ.L #1,$FF0000.L ; RTE
        let mut handler: Vec<u8> = Vec::new();
        word(&mut handler, 0x52B9);
        handler.extend_from_slice(&0x00FF0000u32.to_be_bytes());
        word(&mut handler, 0x4E73);
        rom[0x300..0x300 + handler.len()].copy_from_slice(&handler);
        rom
    }

    #[test]
    fn power_on_is_supervisor_with_mask_7() {
        let genesis = GenesisSystem::new();
        assert!(genesis.supervisor());
        assert_eq!(genesis.interrupt_mask(), 7);
    }

    #[test]
    fn reset_vectors_from_rom() {
        let rom = test_rom();
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        assert_eq!(genesis.debug_state()["pc"], 0x200);
        assert_eq!(genesis.debug_state()["a7"], 0xFF8000);
    }

    #[test]
    fn boot_program_writes_vdp_memory() {
        let rom = test_rom();
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        genesis.run_frames(2);
        // Display enable set, CRAM and VRAM populated
        assert!(genesis.vdp().registers[1] & 0x40 != 0);
        assert!(genesis.vdp().cram().iter().any(|&c| c != 0));
        assert_eq!(genesis.vdp().vram()[0], 0x12);
        assert_eq!(genesis.vdp().vram()[1], 0x34);
    }

    #[test]
    fn vint_handler_counts_frames() {
        let rom = test_rom();
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        genesis.run_frames(5);
        let count = genesis.read(0xFF0003); // low byte of the counter
        assert!((4..=6).contains(&count), "vint count {count}");
    }

    #[test]
    fn frame_advances_counter_by_one() {
        let rom = test_rom();
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        genesis.frame();
        assert_eq!(genesis.frame_count(), 1);
        genesis.run_frames(2);
        assert_eq!(genesis.frame_count(), 3);
    }

    #[test]
    fn cycles_accumulate_step_returns() {
        let rom = test_rom();
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        let mut last = genesis.cycles();
        for _ in 0..300 {
            let c = genesis.step();
            assert!(c > 0);
            assert_eq!(genesis.cycles(), last + c as u64);
            last = genesis.cycles();
        }
    }

    #[test]
    fn save_state_round_trip_byte_identical() {
        let rom = test_rom();
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        genesis.run_frames(2);
        let blob = genesis.save_state();
        assert_eq!(blob.len(), GenesisSystem::SAVE_STATE_SIZE);

        let mut other = GenesisSystem::new();
        other.load_rom(&rom).unwrap();
        other.load_state(&blob);
        assert_eq!(other.save_state(), blob);
    }

    #[test]
    fn determinism_from_save_state() {
        let rom = test_rom();
        let mut a = GenesisSystem::new();
        a.load_rom(&rom).unwrap();
        a.run_frames(3);
        let snap = a.save_state();
        a.frame();

        let mut b = GenesisSystem::new();
        b.load_rom(&rom).unwrap();
        b.load_state(&snap);
        b.frame();

        assert_eq!(a.frame_buffer(), b.frame_buffer());
        assert_eq!(a.ram(), b.ram());
        assert_eq!(a.cycles(), b.cycles());
    }

    #[test]
    fn input_isolated_from_memory() {
        let rom = test_rom();
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        genesis.frame();
        let ram_before = genesis.ram().to_vec();
        genesis.set_input(0xFF);
        genesis.set_input_2(0xFF);
        assert_eq!(genesis.ram()[..], ram_before[..]);
    }

    #[test]
    fn audio_liveness() {
        let rom = test_rom();
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        genesis.frame();
        let mut out = [0i16; 2048];
        let n = genesis.audio_samples(&mut out);
        assert!(n > 0);
        while genesis.audio_samples(&mut out) > 0 {}
        assert_eq!(genesis.audio_samples(&mut out), 0);
    }

    #[test]
    fn sram_battery_round_trip() {
        let mut rom = test_rom();
        rom[0x1B0] = b'R';
        rom[0x1B1] = b'A';
        let mut genesis = GenesisSystem::new();
        genesis.load_rom(&rom).unwrap();
        genesis.write(0x200010, 0x5A);
        let saved = genesis.save_data().unwrap().to_vec();
        assert_eq!(saved[0x10], 0x5A);

        let mut other = GenesisSystem::new();
        other.load_rom(&rom).unwrap();
        other.load_save_data(&saved);
        assert_eq!(other.read(0x200010), 0x5A);
    }
}
