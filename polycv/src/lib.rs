//! This crate contains all of the portable logic for an 8-voice analog
//! polyphonic CV/gate board.  It is `no_std` and talks to hardware only through
//! the `embedded-hal` 1.0 traits plus a couple of small traits of its own (see
//! [outputs] and [storage]), so the same code drives the real board and the
//! host-side unit tests.
//!
//! The interesting parts are:
//!
//!  - [voicealloc]: assigning MIDI notes to the eight voice slots
//!  - [autotune]: sweeping each oscillator across the keyboard, measuring it
//!    against an external frequency counter, and building a per-note
//!    correction table ([calibration::CalibrationTable])
//!  - [ad9833]: the DDS array that generates the oscillator frequencies
//!
//! Everything is tied together by the [engine::Engine], which the firmware
//! polls from a single cooperative loop.  The only state shared with an
//! interrupt handler is the [capture::FrequencyCapture].

#![no_std]
#![warn(missing_docs)]

#[cfg(test)]
extern crate std;

pub mod ad9833;
pub mod autotune;
pub mod calibration;
pub mod capture;
pub mod config;
pub mod controls;
pub mod engine;
pub mod midi;
pub mod notes;
pub mod outputs;
pub mod storage;
pub mod voice;
pub mod voicealloc;

pub mod util;

#[cfg(test)]
mod testutil;

/// The number of voices (and DCOs) on the board
pub const NUM_VOICES: usize = 8;
/// The number of MIDI notes, and so the number of entries per oscillator in
/// the calibration table
pub const NUM_NOTES: usize = 128;

/// A signed pitch offset in semitones, with 9 fractional bits.  Used for pitch
/// bend and detune, which only ever need to reach a couple of octaves.
pub type SignedNote = fixed::types::I7F9;

pub use autotune::{Autotune, AutotuneEvent, AutotuneState};
pub use calibration::CalibrationTable;
pub use capture::FrequencyCapture;
pub use config::BoardConfig;
pub use engine::Engine;
pub use voicealloc::{KeyboardMode, VoiceAllocator};
