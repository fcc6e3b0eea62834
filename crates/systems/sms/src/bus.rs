//! Sega Master System bus: SEGA mapper, 8 KiB RAM and the I/O port map.
//!
//! # Memory Map
//!
//! ```text
//! $0000-$03FF  ROM bank 0, fixed first kilobyte
//! $0400-$3FFF  ROM slot 0 (register $FFFD)
//! $4000-$7FFF  ROM slot 1 (register $FFFE)
//! $8000-$BFFF  ROM slot 2 (register $FFFF) or cartridge RAM
//! $C000-$DFFF  System RAM (8 KiB)
//! $E000-$FFFF  RAM mirror (the $FFFC-$FFFF writes also reach the mapper)
//! ```
//!
//! # I/O ports (by low byte)
//!
//! ```text
//! $00-$3F  writes: memory control (even) / I/O control (odd)
//! $40-$7F  reads: V counter (even) / H counter (odd); writes: PSG
//! $80-$BF  VDP data (even) / VDP control-status (odd)
//! $C0-$FF  controller port A/B (even) / B/misc (odd)
//! ```

use crate::vdp::Vdp;
use lockstep_core::apu::{SampleRing, Sn76489, TimingMode, SAMPLE_RATE};
use lockstep_core::cpu_z80::Z80Bus;
use lockstep_core::state::{StateReader, StateWriter};

/// Cartridge RAM backing store (2 x 16 KiB pages).
pub const CART_RAM_SIZE: usize = 0x8000;

pub struct SmsBus<'r> {
    rom: &'r [u8],
    ram: [u8; 0x2000],
    cart_ram: [u8; CART_RAM_SIZE],

    /// Mapper registers $FFFC-$FFFF.
    mapper_control: u8,
    banks: [u8; 3],

    pub vdp: Vdp,
    pub psg: Sn76489,
    psg_sample_acc: u64,
    cpu_clock: u32,
    pub ring: SampleRing,
    pub render_audio: bool,

    /// Pad state, bit set = pressed: Up Down Left Right B1 B2 per pad.
    pad1: u8,
    pad2: u8,
    memory_control: u8,
    io_control: u8,
}

impl<'r> SmsBus<'r> {
    pub fn new() -> Self {
        Self {
            rom: &[],
            ram: [0; 0x2000],
            cart_ram: [0; CART_RAM_SIZE],
            mapper_control: 0,
            banks: [0, 1, 2],
            vdp: Vdp::new(),
            psg: Sn76489::new(),
            psg_sample_acc: 0,
            cpu_clock: TimingMode::Ntsc.sms_cpu_clock(),
            ring: SampleRing::new(),
            render_audio: true,
            pad1: 0,
            pad2: 0,
            memory_control: 0,
            io_control: 0,
        }
    }

    pub fn attach_rom(&mut self, rom: &'r [u8]) {
        self.rom = rom;
    }

    pub fn rom_slice(&self) -> &'r [u8] {
        self.rom
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn set_pad1(&mut self, state: u8) {
        self.pad1 = state;
    }

    pub fn set_pad2(&mut self, state: u8) {
        self.pad2 = state;
    }

    pub fn cart_ram(&self) -> &[u8] {
        &self.cart_ram
    }

    pub fn load_cart_ram(&mut self, data: &[u8]) {
        let n = data.len().min(self.cart_ram.len());
        self.cart_ram[..n].copy_from_slice(&data[..n]);
    }

    fn bank_count(&self) -> usize {
        (self.rom.len() / 0x4000).max(1)
    }

    fn rom_byte(&self, bank: usize, offset: usize) -> u8 {
        self.rom
            .get((bank % self.bank_count()) * 0x4000 + offset)
            .copied()
            .unwrap_or(0xFF)
    }

    /// Cartridge RAM mapped into slot 2 (control register bit 3).
    fn slot2_is_ram(&self) -> bool {
        self.mapper_control & 0x08 != 0
    }

    fn slot2_ram_page(&self) -> usize {
        ((self.mapper_control >> 2) & 1) as usize
    }

    /// Advance peripherals by the cycles one instruction consumed.
    pub fn tick(&mut self, cycles: u32) {
        self.vdp.tick(cycles);
        self.psg.tick(cycles);
        self.psg_sample_acc += cycles as u64 * SAMPLE_RATE as u64;
        while self.psg_sample_acc >= self.cpu_clock as u64 {
            self.psg_sample_acc -= self.cpu_clock as u64;
            if self.render_audio {
                let s = self.psg.sample();
                self.ring.push_stereo(s, s);
            }
        }
    }

    /// Port A/B read ($DC): P1 all six buttons + P2 up/down, active low.
    fn read_port_ab(&self) -> u8 {
        let mut v = 0xFF;
        v &= !(self.pad1 & 0x3F);
        if self.pad2 & 0x01 != 0 {
            v &= !0x40; // P2 up
        }
        if self.pad2 & 0x02 != 0 {
            v &= !0x80; // P2 down
        }
        v
    }

    /// Port B/misc read ($DD): P2 left/right/buttons, reset high.
    fn read_port_b_misc(&self) -> u8 {
        let mut v = 0xFF;
        if self.pad2 & 0x04 != 0 {
            v &= !0x01;
        }
        if self.pad2 & 0x08 != 0 {
            v &= !0x02;
        }
        if self.pad2 & 0x10 != 0 {
            v &= !0x04;
        }
        if self.pad2 & 0x20 != 0 {
            v &= !0x08;
        }
        v
    }

    pub fn save_state(&self, w: &mut StateWriter) {
        w.put_bytes(&self.ram);
        w.put_bytes(&self.cart_ram);
        w.put_u8(self.mapper_control);
        w.put_bytes(&self.banks);
        w.put_u8(self.pad1);
        w.put_u8(self.pad2);
        w.put_u8(self.memory_control);
        w.put_u8(self.io_control);
        w.put_u64(self.psg_sample_acc);
        self.vdp.save_state(w);
        self.psg.save_state(w);
    }

    pub fn load_state(&mut self, r: &mut StateReader) {
        r.get_bytes(&mut self.ram);
        r.get_bytes(&mut self.cart_ram);
        self.mapper_control = r.get_u8();
        r.get_bytes(&mut self.banks);
        self.pad1 = r.get_u8();
        self.pad2 = r.get_u8();
        self.memory_control = r.get_u8();
        self.io_control = r.get_u8();
        self.psg_sample_acc = r.get_u64();
        self.vdp.load_state(r);
        self.psg.load_state(r);
        self.ring.clear();
    }

    pub const STATE_SIZE: usize =
        0x2000 + CART_RAM_SIZE + 1 + 3 + 4 + 8 + Vdp::STATE_SIZE + Sn76489::STATE_SIZE;
}

impl<'r> Default for SmsBus<'r> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> Z80Bus for SmsBus<'r> {
    fn read(&mut self, addr: u16) -> u8 {
        match addr {
            // First kilobyte is never banked so the interrupt vectors
            // stay put
            0x0000..=0x03FF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x0400..=0x3FFF => self.rom_byte(self.banks[0] as usize, addr as usize),
            0x4000..=0x7FFF => self.rom_byte(self.banks[1] as usize, (addr & 0x3FFF) as usize),
            0x8000..=0xBFFF => {
                if self.slot2_is_ram() {
                    self.cart_ram[self.slot2_ram_page() * 0x4000 + (addr & 0x3FFF) as usize]
                } else {
                    self.rom_byte(self.banks[2] as usize, (addr & 0x3FFF) as usize)
                }
            }
            0xC000..=0xFFFF => self.ram[(addr & 0x1FFF) as usize],
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x8000..=0xBFFF => {
                if self.slot2_is_ram() {
                    self.cart_ram[self.slot2_ram_page() * 0x4000 + (addr & 0x3FFF) as usize] = val;
                }
            }
            0xC000..=0xFFFF => {
                self.ram[(addr & 0x1FFF) as usize] = val;
                match addr {
                    0xFFFC => self.mapper_control = val,
                    0xFFFD => self.banks[0] = val,
                    0xFFFE => self.banks[1] = val,
                    0xFFFF => self.banks[2] = val,
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn io_read(&mut self, port: u16) -> u8 {
        match port as u8 {
            0x00..=0x3F => 0xFF,
            0x40..=0x7F => {
                if port & 1 == 0 {
                    self.vdp.read_vcounter()
                } else {
                    0xFF // H counter, not modeled
                }
            }
            0x80..=0xBF => {
                if port & 1 == 0 {
                    self.vdp.read_data()
                } else {
                    self.vdp.read_status()
                }
            }
            _ => {
                if port & 1 == 0 {
                    self.read_port_ab()
                } else {
                    self.read_port_b_misc()
                }
            }
        }
    }

    fn io_write(&mut self, port: u16, val: u8) {
        match port as u8 {
            0x00..=0x3F => {
                if port & 1 == 0 {
                    self.memory_control = val;
                } else {
                    self.io_control = val;
                }
            }
            0x40..=0x7F => self.psg.write(val),
            0x80..=0xBF => {
                if port & 1 == 0 {
                    self.vdp.write_data(val);
                } else {
                    self.vdp.write_control(val);
                }
            }
            _ => {}
        }
    }
}
