//! The voice table: the state of each of the eight physical voices on the
//! board, independent of how notes get assigned to them (see
//! [crate::voicealloc]).

use crate::NUM_VOICES;

/// The state of the trigger output of a voice
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Trigger {
    /// Output low
    #[default]
    Idle,
    /// A new note arrived; the pulse will start on the next render
    Pending,
    /// Output high since the given time (in milliseconds)
    Since(u32),
}

/// One voice slot
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Voice {
    slot: usize,
    note: Option<u8>,
    last: u8,
    velocity: u8,
    gate: bool,
    sustained: bool,
    trigger: Trigger,
    age: u32,
}

impl Voice {
    /// Create an idle voice for the given slot
    pub const fn new(slot: usize) -> Self {
        Self {
            slot,
            note: None,
            last: 69, //A440, or A220 on the DCOs
            velocity: 0,
            gate: false,
            sustained: false,
            trigger: Trigger::Idle,
            age: 0,
        }
    }
    /// The index of this voice on the board (fixed)
    pub fn slot(&self) -> usize {
        self.slot
    }
    /// The MIDI note assigned to this voice, if any
    pub fn note(&self) -> Option<u8> {
        self.note
    }
    /// The note this voice is pitched at.  Released voices keep their pitch
    /// so that the release stage of the analog envelopes doesn't jump.
    pub fn pitch(&self) -> u8 {
        self.note.unwrap_or(self.last)
    }
    /// The velocity of the current (or last) note
    pub fn velocity(&self) -> u8 {
        self.velocity
    }
    /// True if the gate is high (key held, or sustained)
    pub fn gate(&self) -> bool {
        self.gate
    }
    /// True if the key has been released but the sustain pedal is holding the
    /// gate open
    pub fn is_sustained(&self) -> bool {
        self.sustained
    }
    /// The current trigger state
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }
    /// Allocation stamp from a wrapping counter
    pub fn age(&self) -> u32 {
        self.age
    }
    /// Start (or restart) `note` on this voice, with a fresh trigger pulse
    pub fn start(&mut self, note: u8, velocity: u8, age: u32) {
        self.note = Some(note);
        self.last = note;
        self.velocity = velocity;
        self.gate = true;
        self.sustained = false;
        self.trigger = Trigger::Pending;
        self.age = age;
    }
    /// Change the pitch and velocity of a sounding voice without retriggering
    /// it (legato)
    pub fn glide_to(&mut self, note: u8, velocity: u8) {
        self.note = Some(note);
        self.last = note;
        self.velocity = velocity;
    }
    /// Mark a released key as held by the sustain pedal
    pub fn sustain(&mut self) {
        self.sustained = true;
    }
    /// Close the gate.  The note number is kept as the voice's pitch.
    pub fn release(&mut self) {
        self.note = None;
        self.gate = false;
        self.sustained = false;
    }
    /// Advance the trigger pulse and return the trigger output level.
    pub fn tick_trigger(&mut self, now_ms: u32, width_ms: u32) -> bool {
        match self.trigger {
            Trigger::Idle => false,
            Trigger::Pending => {
                self.trigger = Trigger::Since(now_ms);
                true
            }
            Trigger::Since(start) => {
                if crate::util::elapsed_ms(now_ms, start) >= width_ms {
                    self.trigger = Trigger::Idle;
                    false
                } else {
                    true
                }
            }
        }
    }
}

/// The fixed set of voices on the board
#[derive(Clone, Debug)]
pub struct VoiceTable {
    voices: [Voice; NUM_VOICES],
}

impl VoiceTable {
    /// Create a table with every voice idle
    pub fn new() -> Self {
        Self {
            voices: core::array::from_fn(Voice::new),
        }
    }
    /// Get a voice by slot index
    pub fn get(&self, slot: usize) -> Option<&Voice> {
        self.voices.get(slot)
    }
    /// Get a voice by slot index, mutably
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Voice> {
        self.voices.get_mut(slot)
    }
    /// Iterate over all of the voices in slot order
    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }
    /// Iterate mutably over all of the voices in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.voices.iter_mut()
    }
    /// Find the slot currently playing `note`
    pub fn find(&self, note: u8) -> Option<usize> {
        self.voices
            .iter()
            .position(|v| v.note() == Some(note))
    }
    /// The lowest numbered slot with its gate closed
    pub fn first_free(&self) -> Option<usize> {
        self.voices.iter().position(|v| !v.gate())
    }
    /// The slot that has been sounding the longest, where `counter` is the
    /// latest age handed out
    pub fn oldest(&self, counter: u32) -> Option<usize> {
        self.voices
            .iter()
            .filter(|v| v.gate())
            .max_by_key(|v| counter.wrapping_sub(v.age()))
            .map(Voice::slot)
    }
    /// Number of voices with their gate open
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.gate()).count()
    }
    /// Release every voice
    pub fn release_all(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.release();
        }
    }
}

impl Default for VoiceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_pulse_width() {
        let mut voice = Voice::new(0);
        assert!(!voice.tick_trigger(0, 20));
        voice.start(60, 100, 1);
        assert!(voice.tick_trigger(1000, 20));
        assert!(voice.tick_trigger(1019, 20));
        assert!(!voice.tick_trigger(1020, 20));
        assert_eq!(voice.trigger(), Trigger::Idle);
    }
    #[test]
    fn release_keeps_pitch() {
        let mut voice = Voice::new(3);
        voice.start(40, 90, 7);
        voice.release();
        assert_eq!(voice.note(), None);
        assert_eq!(voice.pitch(), 40);
        assert!(!voice.gate());
    }
    #[test]
    fn bounds_checked_access() {
        let mut table = VoiceTable::new();
        assert!(table.get(NUM_VOICES).is_none());
        assert!(table.get_mut(NUM_VOICES).is_none());
        assert_eq!(table.get(7).map(Voice::slot), Some(7));
    }
    #[test]
    fn oldest_ignores_free_voices() {
        let mut table = VoiceTable::new();
        assert_eq!(table.oldest(5), None);
        table.get_mut(2).unwrap().start(10, 1, 5);
        table.get_mut(4).unwrap().start(11, 1, 3);
        assert_eq!(table.oldest(5), Some(4));
        assert_eq!(table.first_free(), Some(0));
        assert_eq!(table.active_count(), 2);
    }
    #[test]
    fn oldest_across_counter_wrap() {
        let mut table = VoiceTable::new();
        table.get_mut(0).unwrap().start(10, 1, u32::MAX - 1);
        table.get_mut(1).unwrap().start(11, 1, u32::MAX);
        table.get_mut(2).unwrap().start(12, 1, 0);
        table.get_mut(3).unwrap().start(13, 1, 1);
        assert_eq!(table.oldest(1), Some(0));
    }
}
