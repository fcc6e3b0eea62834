//! iNES cartridge header parsing.
//!
//! The 16-byte header carries the magic `NES\x1A`, PRG size in 16 KiB
//! units, CHR size in 8 KiB units, and the flags 6/7 pair encoding
//! mirroring and the mapper number nibbles. ROM data is borrowed, never
//! copied; CHR-less cartridges get 8 KiB of CHR RAM in the mapper.

use lockstep_core::apu::TimingMode;
use lockstep_core::logging::{log, LogCategory, LogLevel};
use lockstep_core::RomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    SingleScreenLower,
    SingleScreenUpper,
    FourScreen,
}

#[derive(Debug, Clone, Copy)]
pub struct Cartridge<'r> {
    pub prg_rom: &'r [u8],
    pub chr_rom: &'r [u8],
    pub mapper: u8,
    pub mirroring: Mirroring,
    pub timing: TimingMode,
}

impl<'r> Cartridge<'r> {
    pub fn from_bytes(data: &'r [u8]) -> Result<Self, RomError> {
        if data.len() < 16 {
            return Err(RomError::TooShort {
                got: data.len(),
                need: 16,
            });
        }
        if &data[0..4] != b"NES\x1A" {
            return Err(RomError::BadMagic);
        }

        let prg_size = data[4] as usize * 16 * 1024;
        let chr_size = data[5] as usize * 8 * 1024;
        let mapper = (data[6] >> 4) | (data[7] & 0xF0);

        let four_screen = data[6] & 0x08 != 0;
        let vertical = data[6] & 0x01 != 0;
        let mirroring = if four_screen {
            Mirroring::FourScreen
        } else if vertical {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        // Unofficial PAL flag in byte 9
        let timing = if data[9] & 0x01 != 0 {
            TimingMode::Pal
        } else {
            TimingMode::Ntsc
        };

        let has_trainer = data[6] & 0x04 != 0;
        let mut offset = 16;
        if has_trainer {
            offset += 512;
        }

        let need = offset + prg_size + chr_size;
        if data.len() < need {
            return Err(RomError::TooShort {
                got: data.len(),
                need,
            });
        }

        let prg_rom = &data[offset..offset + prg_size];
        let chr_rom = &data[offset + prg_size..offset + prg_size + chr_size];

        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "NES: mapper {} ({} KiB PRG, {} KiB CHR, {:?})",
                mapper,
                prg_size / 1024,
                chr_size / 1024,
                mirroring
            )
        });

        Ok(Self {
            prg_rom,
            chr_rom,
            mapper,
            mirroring,
            timing,
        })
    }
}

#[cfg(test)]
pub fn build_ines(prg_banks: u8, chr_banks: u8, flags6: u8, flags7: u8) -> Vec<u8> {
    let mut rom = vec![0u8; 16 + prg_banks as usize * 0x4000 + chr_banks as usize * 0x2000];
    rom[0..4].copy_from_slice(b"NES\x1A");
    rom[4] = prg_banks;
    rom[5] = chr_banks;
    rom[6] = flags6;
    rom[7] = flags7;
    rom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_fields() {
        let rom = build_ines(2, 1, 0x11, 0x40);
        let cart = Cartridge::from_bytes(&rom).unwrap();
        assert_eq!(cart.prg_rom.len(), 0x8000);
        assert_eq!(cart.chr_rom.len(), 0x2000);
        assert_eq!(cart.mapper, 0x41);
        assert_eq!(cart.mirroring, Mirroring::Vertical);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut rom = build_ines(1, 1, 0, 0);
        rom[0] = b'X';
        assert!(matches!(Cartridge::from_bytes(&rom), Err(RomError::BadMagic)));
    }

    #[test]
    fn rejects_truncated_prg() {
        let mut rom = build_ines(2, 0, 0, 0);
        rom.truncate(16 + 0x4000);
        assert!(matches!(
            Cartridge::from_bytes(&rom),
            Err(RomError::TooShort { .. })
        ));
    }

    #[test]
    fn trainer_is_skipped() {
        let mut rom = vec![0u8; 16 + 512 + 0x4000];
        rom[0..4].copy_from_slice(b"NES\x1A");
        rom[4] = 1;
        rom[6] = 0x04; // trainer present
        rom[16 + 512] = 0xAB;
        let cart = Cartridge::from_bytes(&rom).unwrap();
        assert_eq!(cart.prg_rom[0], 0xAB);
    }

    #[test]
    fn four_screen_beats_vertical() {
        let rom = build_ines(1, 0, 0x09, 0);
        let cart = Cartridge::from_bytes(&rom).unwrap();
        assert_eq!(cart.mirroring, Mirroring::FourScreen);
    }
}
