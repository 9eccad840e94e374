//! This module abstracts over the idea of sending notes to the board and having
//! it "decide" which voice slots play them, based on the keyboard mode.

use crate::voice::VoiceTable;

/// This trait is the main abstraction for this module - the engine sends it
/// note on/off events and it will assign those events to voices, stealing if
/// required (or always, in the case of mono/unison).
pub trait VoiceAllocator {
    /// Process a 'note on' for MIDI note number `note`.  Returns the slot the
    /// note was assigned to, or `None` if `note` is not a valid MIDI note.
    fn assign(&mut self, note: u8, velocity: u8) -> Option<usize>;
    /// Process a 'note off' for MIDI note number `note`.  Releasing a note that
    /// is not currently playing does nothing.
    fn release(&mut self, note: u8);
    /// Process a change in the sustain pedal.  Releasing the pedal closes the
    /// gate of every voice whose key was released while it was held.
    fn sustain(&mut self, on: bool);
    /// Release every voice, regardless of the sustain pedal
    fn reset(&mut self);
    /// The voice table being managed
    fn voices(&self) -> &VoiceTable;
    /// The voice table being managed, mutably (e.g. to advance triggers)
    fn voices_mut(&mut self) -> &mut VoiceTable;
    /// Is this allocator polyphonic?
    fn is_poly(&self) -> bool;
}

mod mono;
pub use mono::MonoAllocator;

mod poly;
pub use poly::PolyAllocator;

/// The keyboard mode, as stored in the board settings
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyboardMode {
    /// Eight voice polyphony, oldest note stolen first
    #[default]
    Poly = 0,
    /// One voice, last note priority
    Mono = 1,
    /// All eight voices on one note, last note priority
    Unison = 2,
}

impl KeyboardMode {
    /// A short human readable name
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Poly => "Poly",
            Self::Mono => "Mono",
            Self::Unison => "Unison",
        }
    }
}

impl TryFrom<u8> for KeyboardMode {
    type Error = &'static str;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Poly),
            1 => Ok(Self::Mono),
            2 => Ok(Self::Unison),
            _ => Err("Unsupported Keyboard Mode"),
        }
    }
}

/// An allocator for any [KeyboardMode], dispatching to the concrete allocator
#[derive(Clone, Debug)]
pub enum Allocator {
    /// Polyphonic allocation
    Poly(PolyAllocator),
    /// Mono or unison allocation
    Mono(MonoAllocator),
}

impl Allocator {
    /// Create an allocator for the given mode with all voices idle
    pub fn new(mode: KeyboardMode) -> Self {
        match mode {
            KeyboardMode::Poly => Self::Poly(PolyAllocator::new()),
            KeyboardMode::Mono => Self::Mono(MonoAllocator::new(false)),
            KeyboardMode::Unison => Self::Mono(MonoAllocator::new(true)),
        }
    }
    /// The mode this allocator implements
    pub fn mode(&self) -> KeyboardMode {
        match self {
            Self::Poly(_) => KeyboardMode::Poly,
            Self::Mono(m) if m.is_unison() => KeyboardMode::Unison,
            Self::Mono(_) => KeyboardMode::Mono,
        }
    }
    fn inner(&self) -> &dyn VoiceAllocator {
        match self {
            Self::Poly(p) => p,
            Self::Mono(m) => m,
        }
    }
    fn inner_mut(&mut self) -> &mut dyn VoiceAllocator {
        match self {
            Self::Poly(p) => p,
            Self::Mono(m) => m,
        }
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new(KeyboardMode::default())
    }
}

impl VoiceAllocator for Allocator {
    fn assign(&mut self, note: u8, velocity: u8) -> Option<usize> {
        self.inner_mut().assign(note, velocity)
    }
    fn release(&mut self, note: u8) {
        self.inner_mut().release(note)
    }
    fn sustain(&mut self, on: bool) {
        self.inner_mut().sustain(on)
    }
    fn reset(&mut self) {
        self.inner_mut().reset()
    }
    fn voices(&self) -> &VoiceTable {
        self.inner().voices()
    }
    fn voices_mut(&mut self) -> &mut VoiceTable {
        self.inner_mut().voices_mut()
    }
    fn is_poly(&self) -> bool {
        self.inner().is_poly()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_mode_round_trip() {
        for mode in [KeyboardMode::Poly, KeyboardMode::Mono, KeyboardMode::Unison] {
            assert_eq!(KeyboardMode::try_from(mode as u8), Ok(mode));
            assert_eq!(Allocator::new(mode).mode(), mode);
        }
        assert!(KeyboardMode::try_from(0xFF).is_err());
    }
    #[test]
    fn dispatch() {
        let mut alloc = Allocator::new(KeyboardMode::Poly);
        assert!(alloc.is_poly());
        assert_eq!(alloc.assign(60, 100), Some(0));
        assert_eq!(alloc.assign(62, 100), Some(1));
        alloc.reset();
        assert_eq!(alloc.voices().active_count(), 0);
        let alloc = Allocator::new(KeyboardMode::Unison);
        assert!(!alloc.is_poly());
    }
}
