//! NES APU (2A03 sound): two swept pulses, triangle, noise and the DMC
//! output-level stub, clocked by the frame counter and mixed with the
//! standard linear approximation into the sample ring.

use lockstep_core::apu::{
    DecayEnvelope, DmcChannel, FrameCounter, LengthCounter, NesSweep, NoiseChannel, PulseChannel,
    SampleRing, TriangleChannel, SAMPLE_RATE,
};
use lockstep_core::state::{StateReader, StateWriter};

/// NTSC noise periods in CPU cycles.
const NOISE_PERIODS: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

const CPU_CLOCK: u32 = 1_789_773;

#[derive(Debug, Default)]
struct Pulse {
    seq: PulseChannel,
    envelope: DecayEnvelope,
    sweep: NesSweep,
    length: LengthCounter,
    enabled: bool,
    /// Raw 11-bit timer value.
    period: u16,
}

impl Pulse {
    fn new(ones_complement: bool) -> Self {
        Self {
            sweep: NesSweep::new(ones_complement),
            ..Self::default()
        }
    }

    fn sync_period(&mut self) {
        self.seq.period = (self.period as u32 + 1) * 2;
    }

    fn output(&self) -> u8 {
        if !self.enabled
            || !self.length.active()
            || self.sweep.muting(self.period)
            || !self.seq.output()
        {
            0
        } else {
            self.envelope.volume()
        }
    }
}

pub struct NesApu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: TriangleChannel,
    triangle_length: LengthCounter,
    triangle_enabled: bool,
    noise: NoiseChannel,
    noise_envelope: DecayEnvelope,
    noise_length: LengthCounter,
    noise_enabled: bool,
    dmc: DmcChannel,
    frame_counter: FrameCounter,
    pub frame_irq: bool,

    sample_acc: u64,
    pub ring: SampleRing,
    pub render_audio: bool,
}

impl Default for NesApu {
    fn default() -> Self {
        Self::new()
    }
}

impl NesApu {
    pub fn new() -> Self {
        Self {
            pulse1: Pulse::new(true),
            pulse2: Pulse::new(false),
            triangle: TriangleChannel::new(),
            triangle_length: LengthCounter::new(),
            triangle_enabled: false,
            noise: NoiseChannel::new(),
            noise_envelope: DecayEnvelope::new(),
            noise_length: LengthCounter::new(),
            noise_enabled: false,
            dmc: DmcChannel::new(),
            frame_counter: FrameCounter::new(),
            frame_irq: false,
            sample_acc: 0,
            ring: SampleRing::new(),
            render_audio: true,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0x4000 | 0x4004 => {
                let p = if addr == 0x4000 { &mut self.pulse1 } else { &mut self.pulse2 };
                p.seq.duty = val >> 6;
                p.length.halt = val & 0x20 != 0;
                p.envelope.looped = val & 0x20 != 0;
                p.envelope.constant = val & 0x10 != 0;
                p.envelope.param = val & 0x0F;
            }
            0x4001 | 0x4005 => {
                let p = if addr == 0x4001 { &mut self.pulse1 } else { &mut self.pulse2 };
                p.sweep.write(val);
            }
            0x4002 | 0x4006 => {
                let p = if addr == 0x4002 { &mut self.pulse1 } else { &mut self.pulse2 };
                p.period = (p.period & 0x700) | val as u16;
                p.sync_period();
            }
            0x4003 | 0x4007 => {
                let p = if addr == 0x4003 { &mut self.pulse1 } else { &mut self.pulse2 };
                p.period = (p.period & 0x0FF) | ((val as u16 & 0x07) << 8);
                p.sync_period();
                if p.enabled {
                    p.length.load_table(val >> 3);
                }
                p.seq.restart();
                p.envelope.start = true;
            }
            0x4008 => {
                self.triangle.control = val & 0x80 != 0;
                self.triangle_length.halt = val & 0x80 != 0;
                self.triangle.linear_reload = val & 0x7F;
            }
            0x400A => {
                self.triangle.period = (self.triangle.period & 0x700) | val as u16;
            }
            0x400B => {
                self.triangle.period = (self.triangle.period & 0x0FF) | ((val as u16 & 0x07) << 8);
                if self.triangle_enabled {
                    self.triangle_length.load_table(val >> 3);
                }
                self.triangle.linear_reload_flag = true;
            }
            0x400C => {
                self.noise_length.halt = val & 0x20 != 0;
                self.noise_envelope.looped = val & 0x20 != 0;
                self.noise_envelope.constant = val & 0x10 != 0;
                self.noise_envelope.param = val & 0x0F;
            }
            0x400E => {
                self.noise.short_mode = val & 0x80 != 0;
                self.noise.period = NOISE_PERIODS[(val & 0x0F) as usize] as u32;
            }
            0x400F => {
                if self.noise_enabled {
                    self.noise_length.load_table(val >> 3);
                }
                self.noise_envelope.start = true;
            }
            0x4010 => self.dmc.write_control(val),
            0x4011 => self.dmc.write_output(val),
            0x4012 => self.dmc.sample_address = val,
            0x4013 => self.dmc.sample_length = val,
            0x4015 => {
                self.pulse1.enabled = val & 0x01 != 0;
                self.pulse2.enabled = val & 0x02 != 0;
                self.triangle_enabled = val & 0x04 != 0;
                self.noise_enabled = val & 0x08 != 0;
                if !self.pulse1.enabled {
                    self.pulse1.length.silence();
                }
                if !self.pulse2.enabled {
                    self.pulse2.length.silence();
                }
                if !self.triangle_enabled {
                    self.triangle_length.silence();
                }
                if !self.noise_enabled {
                    self.noise_length.silence();
                }
            }
            0x4017 => {
                let immediate = self.frame_counter.write(val);
                if immediate.quarter {
                    self.clock_quarter();
                }
                if immediate.half {
                    self.clock_half();
                }
                if self.frame_counter.irq_inhibit {
                    self.frame_irq = false;
                }
            }
            _ => {}
        }
    }

    /// $4015 status read; clears the frame IRQ flag.
    pub fn read_status(&mut self) -> u8 {
        let mut v = 0;
        if self.pulse1.length.active() {
            v |= 0x01;
        }
        if self.pulse2.length.active() {
            v |= 0x02;
        }
        if self.triangle_length.active() {
            v |= 0x04;
        }
        if self.noise_length.active() {
            v |= 0x08;
        }
        if self.frame_irq {
            v |= 0x40;
        }
        self.frame_irq = false;
        v
    }

    fn clock_quarter(&mut self) {
        self.pulse1.envelope.clock();
        self.pulse2.envelope.clock();
        self.noise_envelope.clock();
        self.triangle.clock_linear();
    }

    fn clock_half(&mut self) {
        self.pulse1.length.clock();
        self.pulse2.length.clock();
        self.triangle_length.clock();
        self.noise_length.clock();
        if let Some(p) = self.pulse1.sweep.clock(self.pulse1.period) {
            self.pulse1.period = p;
            self.pulse1.sync_period();
        }
        if let Some(p) = self.pulse2.sweep.clock(self.pulse2.period) {
            self.pulse2.period = p;
            self.pulse2.sync_period();
        }
    }

    /// Advance by `cycles` CPU cycles.
    pub fn tick(&mut self, cycles: u32) {
        let events = self.frame_counter.tick(cycles);
        if events.quarter {
            self.clock_quarter();
        }
        if events.half {
            self.clock_half();
        }
        if events.irq {
            self.frame_irq = true;
        }

        self.pulse1.seq.tick(cycles);
        self.pulse2.seq.tick(cycles);
        self.triangle
            .tick(cycles, self.triangle_enabled && self.triangle_length.active());
        self.noise.tick(cycles);

        self.sample_acc += cycles as u64 * SAMPLE_RATE as u64;
        while self.sample_acc >= CPU_CLOCK as u64 {
            self.sample_acc -= CPU_CLOCK as u64;
            if self.render_audio {
                let s = self.mix();
                self.ring.push_stereo(s, s);
            }
        }
    }

    /// Linear-approximation mixer.
    fn mix(&self) -> i16 {
        let p1 = self.pulse1.output() as f32;
        let p2 = self.pulse2.output() as f32;
        let t = if self.triangle_enabled { self.triangle.output() as f32 } else { 0.0 };
        let n = if self.noise_enabled && self.noise_length.active() && self.noise.output() {
            self.noise_envelope.volume() as f32
        } else {
            0.0
        };
        let d = self.dmc.output() as f32;
        let out = 0.00752 * (p1 + p2) + 0.00851 * t + 0.00494 * n + 0.00335 * d;
        (out * 2.0 * 32767.0).clamp(-32768.0, 32767.0) as i16
    }

    fn save_pulse(p: &Pulse, w: &mut StateWriter) {
        let (t, s) = p.seq.phase();
        w.put_u32(t);
        w.put_u8(s);
        w.put_u8(p.seq.duty);
        w.put_u8(p.envelope.param);
        w.put_bool(p.envelope.constant);
        w.put_bool(p.envelope.looped);
        w.put_bool(p.envelope.start);
        w.put_u8(p.envelope.decay_level());
        w.put_u8(p.envelope.divider());
        w.put_u8(p.sweep.enabled as u8);
        w.put_u8(p.sweep.period);
        w.put_bool(p.sweep.negate);
        w.put_u8(p.sweep.shift);
        w.put_bool(p.sweep.reload);
        w.put_u8(p.sweep.divider());
        w.put_u16(p.length.counter);
        w.put_bool(p.length.halt);
        w.put_bool(p.enabled);
        w.put_u16(p.period);
    }

    fn load_pulse(p: &mut Pulse, r: &mut StateReader) {
        let t = r.get_u32();
        let s = r.get_u8();
        p.seq.restore_phase(t, s);
        p.seq.duty = r.get_u8();
        p.envelope.param = r.get_u8();
        p.envelope.constant = r.get_bool();
        p.envelope.looped = r.get_bool();
        p.envelope.start = r.get_bool();
        let decay = r.get_u8();
        p.envelope.set_decay_level(decay);
        let div = r.get_u8();
        p.envelope.set_divider(div);
        p.sweep.enabled = r.get_u8() != 0;
        p.sweep.period = r.get_u8();
        p.sweep.negate = r.get_bool();
        p.sweep.shift = r.get_u8();
        p.sweep.reload = r.get_bool();
        let sd = r.get_u8();
        p.sweep.set_divider(sd);
        p.length.counter = r.get_u16();
        p.length.halt = r.get_bool();
        p.enabled = r.get_bool();
        p.period = r.get_u16();
        p.sync_period();
    }

    const PULSE_STATE: usize = 4 + 1 + 1 + 1 + 3 + 2 + 6 + 2 + 1 + 1 + 2;

    pub fn save_state(&self, w: &mut StateWriter) {
        Self::save_pulse(&self.pulse1, w);
        Self::save_pulse(&self.pulse2, w);

        let (lin, t, s) = self.triangle.state();
        w.put_u8(lin);
        w.put_u16(t);
        w.put_u8(s);
        w.put_u16(self.triangle.period);
        w.put_u8(self.triangle.linear_reload);
        w.put_bool(self.triangle.control);
        w.put_bool(self.triangle.linear_reload_flag);
        w.put_u16(self.triangle_length.counter);
        w.put_bool(self.triangle_length.halt);
        w.put_bool(self.triangle_enabled);

        w.put_u16(self.noise.lfsr());
        w.put_u32(self.noise.timer());
        w.put_u32(self.noise.period);
        w.put_bool(self.noise.short_mode);
        w.put_u8(self.noise_envelope.param);
        w.put_bool(self.noise_envelope.constant);
        w.put_bool(self.noise_envelope.looped);
        w.put_bool(self.noise_envelope.start);
        w.put_u8(self.noise_envelope.decay_level());
        w.put_u8(self.noise_envelope.divider());
        w.put_u16(self.noise_length.counter);
        w.put_bool(self.noise_length.halt);
        w.put_bool(self.noise_enabled);

        w.put_bool(self.dmc.irq_enabled);
        w.put_bool(self.dmc.looped);
        w.put_u8(self.dmc.rate_index);
        w.put_u8(self.dmc.output_level);
        w.put_u8(self.dmc.sample_address);
        w.put_u8(self.dmc.sample_length);

        let (fc_cycle, fc_step) = self.frame_counter.state();
        w.put_u32(fc_cycle);
        w.put_u8(fc_step);
        w.put_bool(self.frame_counter.five_step);
        w.put_bool(self.frame_counter.irq_inhibit);
        w.put_bool(self.frame_irq);
        w.put_u64(self.sample_acc);
    }

    pub fn load_state(&mut self, r: &mut StateReader) {
        Self::load_pulse(&mut self.pulse1, r);
        Self::load_pulse(&mut self.pulse2, r);

        let lin = r.get_u8();
        let t = r.get_u16();
        let s = r.get_u8();
        self.triangle.restore(lin, t, s);
        self.triangle.period = r.get_u16();
        self.triangle.linear_reload = r.get_u8();
        self.triangle.control = r.get_bool();
        self.triangle.linear_reload_flag = r.get_bool();
        self.triangle_length.counter = r.get_u16();
        self.triangle_length.halt = r.get_bool();
        self.triangle_enabled = r.get_bool();

        let lfsr = r.get_u16();
        let nt = r.get_u32();
        self.noise.restore(lfsr, nt);
        self.noise.period = r.get_u32();
        self.noise.short_mode = r.get_bool();
        self.noise_envelope.param = r.get_u8();
        self.noise_envelope.constant = r.get_bool();
        self.noise_envelope.looped = r.get_bool();
        self.noise_envelope.start = r.get_bool();
        let decay = r.get_u8();
        self.noise_envelope.set_decay_level(decay);
        let div = r.get_u8();
        self.noise_envelope.set_divider(div);
        self.noise_length.counter = r.get_u16();
        self.noise_length.halt = r.get_bool();
        self.noise_enabled = r.get_bool();

        self.dmc.irq_enabled = r.get_bool();
        self.dmc.looped = r.get_bool();
        self.dmc.rate_index = r.get_u8();
        self.dmc.output_level = r.get_u8();
        self.dmc.sample_address = r.get_u8();
        self.dmc.sample_length = r.get_u8();

        let fc_cycle = r.get_u32();
        let fc_step = r.get_u8();
        self.frame_counter.restore(fc_cycle, fc_step);
        self.frame_counter.five_step = r.get_bool();
        self.frame_counter.irq_inhibit = r.get_bool();
        self.frame_irq = r.get_bool();
        self.sample_acc = r.get_u64();

        self.ring.clear();
    }

    pub const STATE_SIZE: usize = Self::PULSE_STATE * 2
        + (1 + 2 + 1 + 2 + 1 + 1 + 1 + 2 + 1 + 1) // triangle
        + (2 + 4 + 4 + 1 + 1 + 3 + 2 + 2 + 1 + 1) // noise
        + 6 // dmc
        + (4 + 1 + 3 + 8); // frame counter + irq + acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tracks_length_counters() {
        let mut apu = NesApu::new();
        apu.write_register(0x4015, 0x01); // enable pulse 1
        apu.write_register(0x4003, 0x08); // load length
        assert!(apu.read_status() & 0x01 != 0);
        apu.write_register(0x4015, 0x00); // disable silences
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn disabled_channel_ignores_length_load() {
        let mut apu = NesApu::new();
        apu.write_register(0x4003, 0x08);
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn frame_irq_raised_and_cleared_by_status_read() {
        let mut apu = NesApu::new();
        apu.tick(29830);
        assert!(apu.frame_irq);
        let v = apu.read_status();
        assert!(v & 0x40 != 0);
        assert!(!apu.frame_irq);
    }

    #[test]
    fn five_step_mode_suppresses_irq() {
        let mut apu = NesApu::new();
        apu.write_register(0x4017, 0xC0);
        apu.tick(40000);
        assert!(!apu.frame_irq);
    }

    #[test]
    fn produces_samples_at_44100() {
        let mut apu = NesApu::new();
        apu.tick(CPU_CLOCK / 60);
        let n = apu.ring.len();
        assert!((1400..=1500).contains(&n), "got {n}");
    }

    #[test]
    fn dmc_direct_load_affects_mix() {
        let mut apu = NesApu::new();
        let silent = apu.mix();
        apu.write_register(0x4011, 0x7F);
        assert!(apu.mix() > silent);
    }

    #[test]
    fn state_round_trip() {
        let mut apu = NesApu::new();
        apu.write_register(0x4015, 0x0F);
        apu.write_register(0x4000, 0xBF);
        apu.write_register(0x4002, 0x55);
        apu.write_register(0x4003, 0x12);
        apu.tick(10_000);

        let mut w = StateWriter::new();
        apu.save_state(&mut w);
        let blob = w.into_vec();
        assert_eq!(blob.len(), NesApu::STATE_SIZE);

        let mut restored = NesApu::new();
        restored.load_state(&mut StateReader::new(&blob));
        assert_eq!(restored.pulse1.period, apu.pulse1.period);
        assert_eq!(restored.read_status(), apu.read_status());
    }
}
