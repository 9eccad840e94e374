//! Note/frequency tables and the scaling from notes to DAC codes.
//!
//! The DCOs on this board run one octave below concert pitch (the analog core
//! doubles them back up), so the reference table has A440 at note 81 rather
//! than note 69.

use crate::{SignedNote, NUM_NOTES};

/// DAC codes per semitone on the note CV outputs.  This gives 0.25V/octave,
/// which fits a ten octave keyboard on a 3.3V DAC.
pub const NOTE_SCALE: f32 = 271.5;
/// DAC codes per step of MIDI velocity on the velocity CV outputs
pub const VELOCITY_SCALE: u16 = 256;

/// The frequency, in Hz, each DCO is expected to produce for a given MIDI note
#[rustfmt::skip]
pub const REFERENCE_FREQS: [f32; NUM_NOTES] = [
    4.09, 4.33, 4.59, 4.86, 5.15, 5.45, 5.78, 6.12, // 0..7
    6.49, 6.87, 7.28, 7.71, 8.17, 8.66, 9.17, 9.72, // 8..15
    10.30, 10.91, 11.56, 12.25, 12.98, 13.75, 14.57, 15.43, // 16..23
    16.35, 17.32, 18.35, 19.45, 20.60, 21.83, 23.12, 24.50, // 24..31
    25.96, 27.50, 29.14, 30.87, 32.70, 34.65, 36.71, 38.89, // 32..39
    41.20, 43.65, 46.25, 49.00, 51.91, 55.00, 58.27, 61.74, // 40..47
    65.41, 69.30, 73.42, 77.78, 82.41, 87.31, 92.50, 98.00, // 48..55
    103.83, 110.00, 116.54, 123.47, 130.81, 138.59, 146.83, 155.56, // 56..63
    164.81, 174.61, 185.00, 196.00, 207.65, 220.00, 233.08, 246.94, // 64..71
    261.63, 277.18, 293.66, 311.13, 329.63, 349.23, 369.99, 392.00, // 72..79
    415.30, 440.00, 466.16, 493.88, 523.25, 554.37, 587.33, 622.25, // 80..87
    659.25, 698.46, 739.99, 783.99, 830.61, 880.00, 932.33, 987.77, // 88..95
    1046.50, 1108.73, 1174.66, 1244.51, 1318.51, 1396.91, 1479.98, 1567.98, // 96..103
    1661.22, 1760.00, 1864.66, 1975.53, 2093.00, 2217.46, 2349.32, 2489.02, // 104..111
    2637.02, 2793.83, 2959.96, 3135.96, 3322.44, 3520.00, 3729.31, 3951.07, // 112..119
    4186.01, 4434.92, 4698.63, 4978.03, 5274.04, 5587.65, 5919.91, 6271.93, // 120..127
];

/// Look up the reference frequency for `note`, or `None` if it isn't a MIDI
/// note number
pub fn reference_frequency(note: u8) -> Option<f32> {
    REFERENCE_FREQS.get(note as usize).copied()
}

/// Convert a note (plus a signed offset, e.g. pitch bend) to a note CV DAC code.
/// Saturates at both ends of the DAC range.
pub fn note_to_cv(note: u8, offset: SignedNote) -> u16 {
    let semis = note as f32 + offset.to_num::<f32>();
    let code = semis * NOTE_SCALE;
    if code <= 0.0 {
        0
    } else if code >= u16::MAX as f32 {
        u16::MAX
    } else {
        code as u16
    }
}

/// Convert a MIDI velocity to a velocity CV DAC code
pub fn velocity_to_cv(velocity: u8) -> u16 {
    (velocity.min(127) as u16) * VELOCITY_SCALE
}
