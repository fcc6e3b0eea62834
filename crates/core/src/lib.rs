//! Core emulator primitives shared by every system crate.
//!
//! This crate hosts the CPU interpreters (SM83, 6502, Z80, 68000), the
//! reusable audio synthesis components, the save-state codec and the
//! [`System`] contract that every console aggregate implements. System
//! crates wire these pieces to their own bus, video processor and mappers.

pub mod apu;
pub mod cpu_6502;
pub mod cpu_m68k;
pub mod cpu_sm83;
pub mod cpu_z80;
pub mod logging;
pub mod state;

use thiserror::Error;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// A 32-bit framebuffer. Pixel format is ABGR8888 unless a system
    /// documents otherwise.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }
    }

    pub type AudioSample = i16;
}

/// Errors surfaced by `load_rom`. Everything else in the cores is
/// infallible: bad in-simulation state executes the simulated exception
/// path instead of failing the host call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RomError {
    #[error("ROM shorter than its header implies ({got} bytes, need {need})")]
    TooShort { got: usize, need: usize },
    #[error("bad ROM magic")]
    BadMagic,
    #[error("unsupported mapper {0}")]
    UnsupportedMapper(u8),
    #[error("unsupported cartridge type {0:#04x}")]
    UnsupportedCartridge(u8),
}

/// The uniform operation contract over all systems.
///
/// `'r` is the lifetime of the borrowed ROM image: the cores never copy or
/// own ROM storage, so a system is tied to the ROM slice it was loaded
/// with. Any number of instances may share one ROM across threads.
pub trait System<'r> {
    /// Framebuffer element: `u8` palette indices on the Game Boy, 32-bit
    /// ABGR everywhere else.
    type Pixel: Copy + Default;

    /// Exact byte length of `save_state` blobs for this system.
    const SAVE_STATE_SIZE: usize;

    /// Parse the ROM header, select a mapper and attach the image. On
    /// failure the system remains in its default state.
    fn load_rom(&mut self, rom: &'r [u8]) -> Result<(), RomError>;

    /// Return to the default post-power-on state, keeping the loaded ROM.
    fn reset(&mut self);

    /// Execute a single CPU instruction and tick every peripheral,
    /// returning the cycles consumed. Always strictly positive.
    fn step(&mut self) -> u32;

    /// Advance until the video frame counter increments by exactly one.
    fn frame(&mut self);

    /// Run `count` frames back to back.
    fn run_frames(&mut self, count: usize) {
        for _ in 0..count {
            self.frame();
        }
    }

    /// Set the pad-1 button mask. Bit layouts are system specific and
    /// documented on each system type.
    fn set_input(&mut self, buttons: u8);

    /// Borrow the most recently rendered frame.
    fn frame_buffer(&self) -> &[Self::Pixel];

    /// Drain buffered stereo i16 samples (44 100 Hz) into `out`,
    /// returning the number of i16 values written.
    fn audio_samples(&mut self, out: &mut [i16]) -> usize;

    /// Read a byte through the CPU address space (observation path; may
    /// have the same side effects as a CPU read on I/O registers).
    fn read(&mut self, addr: u32) -> u8;

    /// Write a byte through the CPU address space.
    fn write(&mut self, addr: u32, val: u8);

    /// Borrow the system's internal work RAM.
    fn ram(&self) -> &[u8];

    /// Copy the CPU-visible address space into `out` (up to `out.len()`
    /// bytes from address 0).
    fn copy_memory(&mut self, out: &mut [u8]) {
        for (i, b) in out.iter_mut().enumerate() {
            *b = self.read(i as u32);
        }
    }

    /// Snapshot the observable state into a fixed-layout little-endian
    /// blob of exactly `SAVE_STATE_SIZE` bytes. Audio ring contents and
    /// framebuffer pixels are transient and not captured.
    fn save_state(&self) -> Vec<u8>;

    /// Restore a blob produced by `save_state` on the same build.
    fn load_state(&mut self, blob: &[u8]);

    /// Borrow battery-backed cartridge RAM, if the cartridge has any.
    fn save_data(&self) -> Option<&[u8]>;

    /// Import battery-backed cartridge RAM.
    fn load_save_data(&mut self, data: &[u8]);

    /// Headless toggle: when off, video ticks still advance counters and
    /// raise interrupts but skip pixel generation.
    fn set_render_graphics(&mut self, enabled: bool);

    /// Headless toggle: when off, audio ticks still advance channel and
    /// sequencer state but emit no samples.
    fn set_render_audio(&mut self, enabled: bool);

    /// Completed frames since power-on. Monotonic.
    fn frame_count(&self) -> u64;

    /// Total cycles consumed since power-on. Monotonic.
    fn cycles(&self) -> u64;
}
