//! The per-oscillator, per-note tuning correction table built by [crate::autotune]

use crate::storage::{calibration_address, NvStorage};
use crate::util::offset_by_cents;
use crate::{NUM_NOTES, NUM_VOICES};

/// Tuning corrections, in cents, for every note of every oscillator.
///
/// A positive entry means the oscillator runs flat on that note and must be
/// driven sharp to compensate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalibrationTable {
    offsets: [[i8; NUM_NOTES]; NUM_VOICES],
}

impl CalibrationTable {
    /// A table with no corrections
    pub const fn new() -> Self {
        Self {
            offsets: [[0; NUM_NOTES]; NUM_VOICES],
        }
    }
    /// The correction for `(osc, note)`, or `None` if either is out of range
    pub fn get(&self, osc: usize, note: u8) -> Option<i8> {
        self.offsets.get(osc)?.get(note as usize).copied()
    }
    /// Set the correction for `(osc, note)`.  Returns false (and does nothing)
    /// if either is out of range.
    pub fn set(&mut self, osc: usize, note: u8, cents: i8) -> bool {
        match self
            .offsets
            .get_mut(osc)
            .and_then(|row| row.get_mut(note as usize))
        {
            Some(entry) => {
                *entry = cents;
                true
            }
            None => false,
        }
    }
    /// Zero every correction
    pub fn clear(&mut self) {
        self.offsets = [[0; NUM_NOTES]; NUM_VOICES];
    }
    /// The corrections for one oscillator
    pub fn oscillator(&self, osc: usize) -> Option<&[i8; NUM_NOTES]> {
        self.offsets.get(osc)
    }
    /// Apply the correction for `(osc, note)` to `freq`.  Out of range
    /// indices leave the frequency alone.
    pub fn correct(&self, osc: usize, note: u8, freq: f32) -> f32 {
        match self.get(osc, note) {
            Some(0) | None => freq,
            Some(cents) => offset_by_cents(freq, cents as f32),
        }
    }
    /// Read a table from storage
    pub fn load<S: NvStorage>(storage: &mut S) -> Result<Self, S::Error> {
        let mut table = Self::new();
        for (osc, row) in table.offsets.iter_mut().enumerate() {
            for (note, entry) in row.iter_mut().enumerate() {
                if let Some(addr) = calibration_address(osc, note as u8) {
                    *entry = storage.read_byte(addr)? as i8;
                }
            }
        }
        Ok(table)
    }
    /// Write the whole table to storage, skipping unchanged bytes
    pub fn store<S: NvStorage>(&self, storage: &mut S) -> Result<(), S::Error> {
        for osc in 0..NUM_VOICES {
            for note in 0..NUM_NOTES as u8 {
                self.store_entry(osc, note, storage)?;
            }
        }
        Ok(())
    }
    /// Write a single entry to storage, e.g. as soon as autotune measures it
    pub fn store_entry<S: NvStorage>(
        &self,
        osc: usize,
        note: u8,
        storage: &mut S,
    ) -> Result<(), S::Error> {
        if let (Some(addr), Some(value)) = (calibration_address(osc, note), self.get(osc, note)) {
            storage.update_byte(addr, value as u8)?;
        }
        Ok(())
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemStorage;
    use crate::util::calculate_cents;

    #[test]
    fn bounds_checked() {
        let mut table = CalibrationTable::new();
        assert!(table.set(7, 127, -3));
        assert!(!table.set(8, 0, 1));
        assert!(!table.set(0, 128, 1));
        assert_eq!(table.get(7, 127), Some(-3));
        assert_eq!(table.get(8, 0), None);
    }
    #[test]
    fn correction_direction() {
        let mut table = CalibrationTable::new();
        table.set(2, 81, 10);
        let corrected = table.correct(2, 81, 440.0);
        assert!((calculate_cents(440.0, corrected) - 10.0).abs() < 0.01);
        assert_eq!(table.correct(3, 81, 440.0), 440.0);
    }
    #[test]
    fn storage_round_trip() {
        let mut storage = MemStorage::erased();
        // erased cells read back as -1 cent
        assert_eq!(CalibrationTable::load(&mut storage).unwrap().get(0, 0), Some(-1));
        let mut table = CalibrationTable::new();
        table.set(0, 0, i8::MIN);
        table.set(5, 64, 42);
        table.store(&mut storage).unwrap();
        assert_eq!(CalibrationTable::load(&mut storage).unwrap(), table);
        // storing again changes nothing
        let writes = storage.writes;
        table.store(&mut storage).unwrap();
        assert_eq!(storage.writes, writes);
    }
}
