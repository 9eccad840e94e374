//! Non-volatile storage of the user settings and the calibration table.
//!
//! Storage is a flat, byte addressed space (an EEPROM, or anything that looks
//! like one).  Everything lives at a fixed offset:
//!
//! | address        | contents                           |
//! |----------------|------------------------------------|
//! | 8              | pitch bend range, semitones        |
//! | 18             | MIDI master channel (0 = omni)     |
//! | 19             | transpose + 12, semitones          |
//! | 21             | octave shift + 2                   |
//! | 23             | keyboard mode                      |
//! | 50 ..= 1073    | calibration, `50 + osc*128 + note` |
//!
//! Bytes that hold an out of range value (including erased `0xFF` cells on a
//! fresh part) load as the default for that setting.

use crate::voicealloc::KeyboardMode;
use crate::{NUM_NOTES, NUM_VOICES};

/// Address of the pitch bend range
pub const ADDR_PITCH_BEND: u16 = 8;
/// Address of the MIDI master channel
pub const ADDR_MASTER_CHAN: u16 = 18;
/// Address of the transpose setting
pub const ADDR_TRANSPOSE: u16 = 19;
/// Address of the octave setting
pub const ADDR_OCTAVE: u16 = 21;
/// Address of the keyboard mode
pub const ADDR_KEYBOARD_MODE: u16 = 23;
/// Address of the first byte of the calibration table
pub const ADDR_CALIBRATION: u16 = 50;
/// One past the last byte used
pub const STORAGE_END: u16 = ADDR_CALIBRATION + (NUM_VOICES * NUM_NOTES) as u16;

const TRANSPOSE_BIAS: i8 = 12;
const OCTAVE_BIAS: i8 = 2;

/// A byte addressed non-volatile memory
pub trait NvStorage {
    /// The error type for the underlying bus
    type Error;
    /// Read the byte at `address`
    fn read_byte(&mut self, address: u16) -> Result<u8, Self::Error>;
    /// Write `value` at `address`
    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), Self::Error>;
    /// Write `value` at `address` only if it differs from what is stored, to
    /// save wear on the part.  Returns true if a write happened.
    fn update_byte(&mut self, address: u16, value: u8) -> Result<bool, Self::Error> {
        if self.read_byte(address)? == value {
            Ok(false)
        } else {
            self.write_byte(address, value)?;
            Ok(true)
        }
    }
}

/// The address of the calibration entry for oscillator `osc`, note `note`
pub fn calibration_address(osc: usize, note: u8) -> Option<u16> {
    if osc < NUM_VOICES && (note as usize) < NUM_NOTES {
        Some(ADDR_CALIBRATION + (osc * NUM_NOTES) as u16 + note as u16)
    } else {
        None
    }
}

/// User settings persisted across power cycles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    /// MIDI channel to listen on, 1-16, or 0 to listen on all channels
    pub master_channel: u8,
    /// Transpose, in semitones (-12 to 12)
    pub transpose: i8,
    /// Octave shift (-2 to 2)
    pub octave: i8,
    /// Keyboard mode
    pub keyboard_mode: KeyboardMode,
    /// Pitch bend range in semitones, each direction (1 to 12)
    pub pitch_bend_range: u8,
}

impl Settings {
    /// The factory settings
    pub const fn new() -> Self {
        Self {
            master_channel: 0,
            transpose: 0,
            octave: 0,
            keyboard_mode: KeyboardMode::Poly,
            pitch_bend_range: 2,
        }
    }
    /// Read the settings from storage, using the default for any setting
    /// holding an invalid value
    pub fn load<S: NvStorage>(storage: &mut S) -> Result<Self, S::Error> {
        let defaults = Self::new();
        let master_channel = match storage.read_byte(ADDR_MASTER_CHAN)? {
            x @ 0..=16 => x,
            _ => defaults.master_channel,
        };
        let transpose = match storage.read_byte(ADDR_TRANSPOSE)? {
            x @ 0..=24 => x as i8 - TRANSPOSE_BIAS,
            _ => defaults.transpose,
        };
        let octave = match storage.read_byte(ADDR_OCTAVE)? {
            x @ 0..=4 => x as i8 - OCTAVE_BIAS,
            _ => defaults.octave,
        };
        let keyboard_mode = KeyboardMode::try_from(storage.read_byte(ADDR_KEYBOARD_MODE)?)
            .unwrap_or(defaults.keyboard_mode);
        let pitch_bend_range = match storage.read_byte(ADDR_PITCH_BEND)? {
            x @ 1..=12 => x,
            _ => defaults.pitch_bend_range,
        };
        Ok(Self {
            master_channel,
            transpose,
            octave,
            keyboard_mode,
            pitch_bend_range,
        })
    }
    /// Write the settings to storage
    pub fn store<S: NvStorage>(&self, storage: &mut S) -> Result<(), S::Error> {
        storage.update_byte(ADDR_MASTER_CHAN, self.master_channel)?;
        let transpose = self.transpose.clamp(-12, 12) + TRANSPOSE_BIAS;
        let octave = self.octave.clamp(-2, 2) + OCTAVE_BIAS;
        storage.update_byte(ADDR_TRANSPOSE, transpose as u8)?;
        storage.update_byte(ADDR_OCTAVE, octave as u8)?;
        storage.update_byte(ADDR_KEYBOARD_MODE, self.keyboard_mode as u8)?;
        storage.update_byte(ADDR_PITCH_BEND, self.pitch_bend_range)?;
        Ok(())
    }
    /// The total shift applied to incoming notes, in semitones
    pub fn note_shift(&self) -> i16 {
        self.transpose as i16 + 12 * self.octave as i16
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemStorage;

    #[test]
    fn erased_storage_loads_defaults() {
        let mut storage = MemStorage::erased();
        assert_eq!(Settings::load(&mut storage), Ok(Settings::default()));
    }
    #[test]
    fn settings_round_trip() {
        let mut storage = MemStorage::erased();
        let settings = Settings {
            master_channel: 10,
            transpose: -5,
            octave: 1,
            keyboard_mode: KeyboardMode::Unison,
            pitch_bend_range: 12,
        };
        settings.store(&mut storage).unwrap();
        assert_eq!(storage.peek(ADDR_TRANSPOSE), 7);
        assert_eq!(storage.peek(ADDR_OCTAVE), 3);
        assert_eq!(Settings::load(&mut storage), Ok(settings));
        assert_eq!(settings.note_shift(), 7);
    }
    #[test]
    fn update_skips_identical_bytes() {
        let mut storage = MemStorage::erased();
        assert_eq!(storage.update_byte(3, 0xFF), Ok(false));
        assert_eq!(storage.update_byte(3, 0x12), Ok(true));
        assert_eq!(storage.writes, 1);
    }
    #[test]
    fn calibration_layout() {
        assert_eq!(calibration_address(0, 0), Some(50));
        assert_eq!(calibration_address(1, 0), Some(178));
        assert_eq!(calibration_address(7, 127), Some(STORAGE_END - 1));
        assert_eq!(calibration_address(8, 0), None);
        assert_eq!(calibration_address(0, 128), None);
        // settings must not overlap the table
        assert!(ADDR_KEYBOARD_MODE < ADDR_CALIBRATION);
    }
}
