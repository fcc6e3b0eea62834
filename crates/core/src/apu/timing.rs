//! Regional timing modes and the master clock rates derived from them.

use serde::{Deserialize, Serialize};

/// NTSC or PAL timing. Stored with cartridges that can express a region
/// preference and used to derive CPU clock rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingMode {
    Ntsc,
    Pal,
}

impl TimingMode {
    /// NES CPU clock (2A03 NTSC / 2A07 PAL).
    pub fn nes_cpu_clock(self) -> u32 {
        match self {
            TimingMode::Ntsc => 1_789_773,
            TimingMode::Pal => 1_662_607,
        }
    }

    /// SMS Z80 clock.
    pub fn sms_cpu_clock(self) -> u32 {
        match self {
            TimingMode::Ntsc => 3_579_545,
            TimingMode::Pal => 3_546_893,
        }
    }

    /// Genesis 68000 clock.
    pub fn genesis_m68k_clock(self) -> u32 {
        match self {
            TimingMode::Ntsc => 7_670_453,
            TimingMode::Pal => 7_600_489,
        }
    }

    /// Scanlines per frame on the SMS/NES-style 262/313 raster.
    pub fn scanlines_per_frame(self) -> u16 {
        match self {
            TimingMode::Ntsc => 262,
            TimingMode::Pal => 313,
        }
    }
}

/// Game Boy master clock (region independent).
pub const GB_CPU_CLOCK: u32 = 4_194_304;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_rates() {
        assert_eq!(TimingMode::Ntsc.nes_cpu_clock(), 1_789_773);
        assert_eq!(TimingMode::Ntsc.sms_cpu_clock(), 3_579_545);
        assert!(TimingMode::Pal.nes_cpu_clock() < TimingMode::Ntsc.nes_cpu_clock());
    }
}
