//! Game Boy APU: two pulse channels (one swept), the wave channel and
//! the noise channel, mixed to stereo through NR50/NR51 and paced into
//! the sample ring at 44 100 Hz.
//!
//! The frame sequencer divides the CPU clock by 8192 (512 Hz) and clocks
//! length on steps 0/2/4/6, sweep on 2/6 and envelopes on 7.

use lockstep_core::apu::timing::GB_CPU_CLOCK;
use lockstep_core::apu::{
    GbSweep, NoiseChannel, PulseChannel, RampEnvelope, SampleRing, WaveChannel, SAMPLE_RATE,
};
use lockstep_core::state::{StateReader, StateWriter};

const FRAME_SEQ_PERIOD: u32 = 8192;

/// Read-back OR masks for NR10-NR52 (unreadable bits return 1).
const REG_MASKS: [u8; 0x17] = [
    0x80, 0x3F, 0x00, 0xFF, 0xBF, // NR10-NR14
    0xFF, 0x3F, 0x00, 0xFF, 0xBF, // NR20-NR24
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF, // NR30-NR34
    0xFF, 0xFF, 0x00, 0x00, 0xBF, // NR40-NR44
    0x00, 0x00, 0x70, // NR50-NR52
];

#[derive(Debug, Clone, Default)]
struct Length {
    counter: u16,
    enabled: bool,
}

impl Length {
    fn clock(&mut self, channel_on: &mut bool) {
        if self.enabled && self.counter > 0 {
            self.counter -= 1;
            if self.counter == 0 {
                *channel_on = false;
            }
        }
    }
}

pub struct GbApu {
    /// Raw register bytes FF10-FF26 for read-back.
    regs: [u8; 0x17],

    ch1: PulseChannel,
    ch1_env: RampEnvelope,
    ch1_sweep: GbSweep,
    ch1_len: Length,
    ch1_on: bool,
    ch1_freq: u16,

    ch2: PulseChannel,
    ch2_env: RampEnvelope,
    ch2_len: Length,
    ch2_on: bool,
    ch2_freq: u16,

    ch3: WaveChannel,
    ch3_len: Length,
    ch3_on: bool,
    ch3_dac: bool,

    ch4: NoiseChannel,
    ch4_env: RampEnvelope,
    ch4_len: Length,
    ch4_on: bool,

    power: bool,
    frame_seq_counter: u32,
    frame_seq_step: u8,

    sample_acc: u64,
    pub ring: SampleRing,
    pub render_audio: bool,
}

impl Default for GbApu {
    fn default() -> Self {
        Self::new()
    }
}

impl GbApu {
    pub fn new() -> Self {
        Self {
            regs: [0; 0x17],
            ch1: PulseChannel::new(),
            ch1_env: RampEnvelope::new(),
            ch1_sweep: GbSweep::new(),
            ch1_len: Length::default(),
            ch1_on: false,
            ch1_freq: 0,
            ch2: PulseChannel::new(),
            ch2_env: RampEnvelope::new(),
            ch2_len: Length::default(),
            ch2_on: false,
            ch2_freq: 0,
            ch3: WaveChannel::new(),
            ch3_len: Length::default(),
            ch3_on: false,
            ch3_dac: false,
            ch4: NoiseChannel::new(),
            ch4_env: RampEnvelope::new(),
            ch4_len: Length::default(),
            ch4_on: false,
            power: false,
            frame_seq_counter: 0,
            frame_seq_step: 0,
            sample_acc: 0,
            ring: SampleRing::new(),
            render_audio: true,
        }
    }

    fn pulse_period(freq: u16) -> u32 {
        (2048 - freq as u32) * 4
    }

    fn noise_period(r: u8, s: u8) -> u32 {
        let divisor: u32 = if r == 0 { 8 } else { 16 * r as u32 };
        divisor << s
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF10..=0xFF25 => {
                let idx = (addr - 0xFF10) as usize;
                self.regs[idx] | REG_MASKS[idx]
            }
            0xFF26 => {
                let mut v = 0x70;
                if self.power {
                    v |= 0x80;
                }
                if self.ch1_on {
                    v |= 0x01;
                }
                if self.ch2_on {
                    v |= 0x02;
                }
                if self.ch3_on {
                    v |= 0x04;
                }
                if self.ch4_on {
                    v |= 0x08;
                }
                v
            }
            0xFF30..=0xFF3F => self.ch3.ram[(addr - 0xFF30) as usize],
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        if let 0xFF30..=0xFF3F = addr {
            self.ch3.ram[(addr - 0xFF30) as usize] = val;
            return;
        }
        if addr == 0xFF26 {
            let was_on = self.power;
            self.power = val & 0x80 != 0;
            if was_on && !self.power {
                // Power-off clears every register and channel
                *self = Self {
                    ring: std::mem::take(&mut self.ring),
                    render_audio: self.render_audio,
                    ch3: {
                        let mut ch3 = WaveChannel::new();
                        ch3.ram = self.ch3.ram;
                        ch3
                    },
                    ..Self::new()
                };
            }
            return;
        }
        if !self.power {
            return;
        }

        let idx = (addr - 0xFF10) as usize;
        if idx < self.regs.len() {
            self.regs[idx] = val;
        }

        match addr {
            // Channel 1
            0xFF10 => self.ch1_sweep.write(val),
            0xFF11 => {
                self.ch1.duty = val >> 6;
                self.ch1_len.counter = 64 - (val & 0x3F) as u16;
            }
            0xFF12 => {
                self.ch1_env.write(val);
                if !self.ch1_env.dac_enabled() {
                    self.ch1_on = false;
                }
            }
            0xFF13 => {
                self.ch1_freq = (self.ch1_freq & 0x700) | val as u16;
                self.ch1.period = Self::pulse_period(self.ch1_freq);
            }
            0xFF14 => {
                self.ch1_freq = (self.ch1_freq & 0x0FF) | ((val as u16 & 0x07) << 8);
                self.ch1.period = Self::pulse_period(self.ch1_freq);
                self.ch1_len.enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch1_on = self.ch1_env.dac_enabled();
                    if self.ch1_len.counter == 0 {
                        self.ch1_len.counter = 64;
                    }
                    self.ch1.restart();
                    self.ch1_env.trigger();
                    if !self.ch1_sweep.trigger(self.ch1_freq) {
                        self.ch1_on = false;
                    }
                }
            }

            // Channel 2
            0xFF16 => {
                self.ch2.duty = val >> 6;
                self.ch2_len.counter = 64 - (val & 0x3F) as u16;
            }
            0xFF17 => {
                self.ch2_env.write(val);
                if !self.ch2_env.dac_enabled() {
                    self.ch2_on = false;
                }
            }
            0xFF18 => {
                self.ch2_freq = (self.ch2_freq & 0x700) | val as u16;
                self.ch2.period = Self::pulse_period(self.ch2_freq);
            }
            0xFF19 => {
                self.ch2_freq = (self.ch2_freq & 0x0FF) | ((val as u16 & 0x07) << 8);
                self.ch2.period = Self::pulse_period(self.ch2_freq);
                self.ch2_len.enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch2_on = self.ch2_env.dac_enabled();
                    if self.ch2_len.counter == 0 {
                        self.ch2_len.counter = 64;
                    }
                    self.ch2.restart();
                    self.ch2_env.trigger();
                }
            }

            // Channel 3
            0xFF1A => {
                self.ch3_dac = val & 0x80 != 0;
                if !self.ch3_dac {
                    self.ch3_on = false;
                }
            }
            0xFF1B => self.ch3_len.counter = 256 - val as u16,
            0xFF1C => self.ch3.volume_code = (val >> 5) & 0x03,
            0xFF1D => self.ch3.frequency = (self.ch3.frequency & 0x700) | val as u16,
            0xFF1E => {
                self.ch3.frequency = (self.ch3.frequency & 0x0FF) | ((val as u16 & 0x07) << 8);
                self.ch3_len.enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch3_on = self.ch3_dac;
                    if self.ch3_len.counter == 0 {
                        self.ch3_len.counter = 256;
                    }
                    self.ch3.trigger();
                }
            }

            // Channel 4
            0xFF20 => self.ch4_len.counter = 64 - (val & 0x3F) as u16,
            0xFF21 => {
                self.ch4_env.write(val);
                if !self.ch4_env.dac_enabled() {
                    self.ch4_on = false;
                }
            }
            0xFF22 => {
                self.ch4.short_mode = val & 0x08 != 0;
                self.ch4.period = Self::noise_period(val & 0x07, val >> 4);
            }
            0xFF23 => {
                self.ch4_len.enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch4_on = self.ch4_env.dac_enabled();
                    if self.ch4_len.counter == 0 {
                        self.ch4_len.counter = 64;
                    }
                    self.ch4.reset_lfsr();
                    self.ch4_env.trigger();
                }
            }

            _ => {} // NR50/NR51 are pure storage
        }
    }

    fn clock_frame_sequencer(&mut self) {
        let step = self.frame_seq_step;
        if step % 2 == 0 {
            self.ch1_len.clock(&mut self.ch1_on);
            self.ch2_len.clock(&mut self.ch2_on);
            self.ch3_len.clock(&mut self.ch3_on);
            self.ch4_len.clock(&mut self.ch4_on);
        }
        if step == 2 || step == 6 {
            let mut disabled = false;
            if let Some(freq) = self.ch1_sweep.clock(&mut disabled) {
                self.ch1_freq = freq;
                self.ch1.period = Self::pulse_period(freq);
                self.regs[3] = freq as u8;
                self.regs[4] = (self.regs[4] & 0xF8) | ((freq >> 8) as u8 & 0x07);
            }
            if disabled {
                self.ch1_on = false;
            }
        }
        if step == 7 {
            self.ch1_env.clock();
            self.ch2_env.clock();
            self.ch4_env.clock();
        }
        self.frame_seq_step = (step + 1) & 7;
    }

    /// Advance by `cycles` CPU cycles.
    pub fn tick(&mut self, cycles: u32) {
        if self.power {
            self.ch1.tick(cycles);
            self.ch2.tick(cycles);
            self.ch3.tick(cycles);
            self.ch4.tick(cycles);

            self.frame_seq_counter += cycles;
            while self.frame_seq_counter >= FRAME_SEQ_PERIOD {
                self.frame_seq_counter -= FRAME_SEQ_PERIOD;
                self.clock_frame_sequencer();
            }
        }

        self.sample_acc += cycles as u64 * SAMPLE_RATE as u64;
        while self.sample_acc >= GB_CPU_CLOCK as u64 {
            self.sample_acc -= GB_CPU_CLOCK as u64;
            if self.render_audio {
                let (l, r) = self.mix();
                self.ring.push_stereo(l, r);
            }
        }
    }

    /// Channel DAC outputs mixed per NR51 panning and NR50 volume.
    fn mix(&self) -> (i16, i16) {
        if !self.power {
            return (0, 0);
        }
        let nr50 = self.regs[0x14];
        let nr51 = self.regs[0x15];

        let dac = |amp: u8| (amp as i32 * 2 - 15) * 128;
        let outputs = [
            if self.ch1_on {
                if self.ch1.output() { dac(self.ch1_env.volume) } else { dac(0) }
            } else {
                0
            },
            if self.ch2_on {
                if self.ch2.output() { dac(self.ch2_env.volume) } else { dac(0) }
            } else {
                0
            },
            if self.ch3_on { dac(self.ch3.output()) } else { 0 },
            if self.ch4_on {
                if self.ch4.output() { dac(self.ch4_env.volume) } else { dac(0) }
            } else {
                0
            },
        ];

        let mut left = 0i32;
        let mut right = 0i32;
        for (i, out) in outputs.iter().enumerate() {
            if nr51 & (0x10 << i) != 0 {
                left += out;
            }
            if nr51 & (0x01 << i) != 0 {
                right += out;
            }
        }
        let left_vol = ((nr50 >> 4) & 0x07) as i32 + 1;
        let right_vol = (nr50 & 0x07) as i32 + 1;
        (
            ((left * left_vol) / 2).clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            ((right * right_vol) / 2).clamp(i16::MIN as i32, i16::MAX as i32) as i16,
        )
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.put_bytes(&self.regs);
        w.put_bytes(&self.ch3.ram);

        let (t, s) = self.ch1.phase();
        w.put_u32(t);
        w.put_u8(s);
        w.put_u8(self.ch1_env.volume);
        w.put_u8(self.ch1_env.timer());
        let (se, ss, st) = self.ch1_sweep.state();
        w.put_bool(se);
        w.put_u16(ss);
        w.put_u8(st);
        w.put_u16(self.ch1_len.counter);
        w.put_bool(self.ch1_len.enabled);
        w.put_bool(self.ch1_on);
        w.put_u16(self.ch1_freq);

        let (t, s) = self.ch2.phase();
        w.put_u32(t);
        w.put_u8(s);
        w.put_u8(self.ch2_env.volume);
        w.put_u8(self.ch2_env.timer());
        w.put_u16(self.ch2_len.counter);
        w.put_bool(self.ch2_len.enabled);
        w.put_bool(self.ch2_on);
        w.put_u16(self.ch2_freq);

        let (pos, timer, sample) = self.ch3.state();
        w.put_u8(pos);
        w.put_u32(timer);
        w.put_u8(sample);
        w.put_u16(self.ch3_len.counter);
        w.put_bool(self.ch3_len.enabled);
        w.put_bool(self.ch3_on);
        w.put_bool(self.ch3_dac);

        w.put_u16(self.ch4.lfsr());
        w.put_u32(self.ch4.timer());
        w.put_u8(self.ch4_env.volume);
        w.put_u8(self.ch4_env.timer());
        w.put_u16(self.ch4_len.counter);
        w.put_bool(self.ch4_len.enabled);
        w.put_bool(self.ch4_on);

        w.put_bool(self.power);
        w.put_u32(self.frame_seq_counter);
        w.put_u8(self.frame_seq_step);
        w.put_u64(self.sample_acc);
    }

    pub fn load_state(&mut self, r: &mut StateReader) {
        r.get_bytes(&mut self.regs);
        r.get_bytes(&mut self.ch3.ram);

        // Re-derive the static channel parameters from the registers,
        // then restore the dynamic timers.
        self.ch1_sweep.write(self.regs[0]);
        self.ch1.duty = self.regs[1] >> 6;
        self.ch1_env.write(self.regs[2]);
        self.ch2.duty = self.regs[6] >> 6;
        self.ch2_env.write(self.regs[7]);
        self.ch3.volume_code = (self.regs[0x0C] >> 5) & 0x03;
        self.ch3.frequency =
            (self.regs[0x0D] as u16) | ((self.regs[0x0E] as u16 & 0x07) << 8);
        self.ch4_env.write(self.regs[0x11]);
        self.ch4.short_mode = self.regs[0x12] & 0x08 != 0;
        self.ch4.period = Self::noise_period(self.regs[0x12] & 0x07, self.regs[0x12] >> 4);

        let t = r.get_u32();
        let s = r.get_u8();
        self.ch1.restore_phase(t, s);
        self.ch1_env.volume = r.get_u8();
        let et = r.get_u8();
        self.ch1_env.set_timer(et);
        let se = r.get_bool();
        let ss = r.get_u16();
        let st = r.get_u8();
        self.ch1_sweep.restore(se, ss, st);
        self.ch1_len.counter = r.get_u16();
        self.ch1_len.enabled = r.get_bool();
        self.ch1_on = r.get_bool();
        self.ch1_freq = r.get_u16();
        self.ch1.period = Self::pulse_period(self.ch1_freq);

        let t = r.get_u32();
        let s = r.get_u8();
        self.ch2.restore_phase(t, s);
        self.ch2_env.volume = r.get_u8();
        let et = r.get_u8();
        self.ch2_env.set_timer(et);
        self.ch2_len.counter = r.get_u16();
        self.ch2_len.enabled = r.get_bool();
        self.ch2_on = r.get_bool();
        self.ch2_freq = r.get_u16();
        self.ch2.period = Self::pulse_period(self.ch2_freq);

        let pos = r.get_u8();
        let timer = r.get_u32();
        let sample = r.get_u8();
        self.ch3.restore(pos, timer, sample);
        self.ch3_len.counter = r.get_u16();
        self.ch3_len.enabled = r.get_bool();
        self.ch3_on = r.get_bool();
        self.ch3_dac = r.get_bool();

        let lfsr = r.get_u16();
        let timer = r.get_u32();
        self.ch4.restore(lfsr, timer);
        self.ch4_env.volume = r.get_u8();
        let et = r.get_u8();
        self.ch4_env.set_timer(et);
        self.ch4_len.counter = r.get_u16();
        self.ch4_len.enabled = r.get_bool();
        self.ch4_on = r.get_bool();

        self.power = r.get_bool();
        self.frame_seq_counter = r.get_u32();
        self.frame_seq_step = r.get_u8();
        self.sample_acc = r.get_u64();

        self.ring.clear();
    }

    pub const STATE_SIZE: usize = 0x17
        + 16
        + (4 + 1 + 1 + 1 + 1 + 2 + 1 + 2 + 1 + 1 + 2) // ch1
        + (4 + 1 + 1 + 1 + 2 + 1 + 1 + 2) // ch2
        + (1 + 4 + 1 + 2 + 1 + 1 + 1) // ch3
        + (2 + 4 + 1 + 1 + 2 + 1 + 1) // ch4
        + 1 + 4 + 1 + 8;
}
