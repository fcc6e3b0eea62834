//! Reusable audio synthesis components.
//!
//! The channel primitives here are shared across the system APUs: the
//! pulse sequencer, triangle, LFSR noise and wave channels, the envelope,
//! length-counter, sweep and frame-counter clocks, and the two complete
//! sound chips (SN76489 PSG, YM2612 FM stub). Each system crate wires
//! these into its own register map and mixes into a [`SampleRing`].
//!
//! All timers count CPU cycles with integer arithmetic; sample pacing is
//! fixed-point (cycles × 44100 against the system clock) so output is
//! deterministic across runs.

pub mod dmc;
pub mod envelope;
pub mod frame_counter;
pub mod length_counter;
pub mod noise;
pub mod pulse;
pub mod ring_buffer;
pub mod sn76489;
pub mod sweep;
pub mod timing;
pub mod triangle;
pub mod wave;
pub mod ym2612;

pub use dmc::DmcChannel;
pub use envelope::{DecayEnvelope, RampEnvelope};
pub use frame_counter::FrameCounter;
pub use length_counter::{LengthCounter, LENGTH_TABLE};
pub use noise::NoiseChannel;
pub use pulse::PulseChannel;
pub use ring_buffer::SampleRing;
pub use sn76489::Sn76489;
pub use sweep::{GbSweep, NesSweep};
pub use timing::TimingMode;
pub use triangle::TriangleChannel;
pub use wave::WaveChannel;
pub use ym2612::Ym2612;

/// Output sample rate shared by every system.
pub const SAMPLE_RATE: u32 = 44_100;
