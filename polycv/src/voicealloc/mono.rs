use super::*;
use arrayvec::ArrayVec;

/// The number of held keys remembered for last note priority
const NOTE_STACK_DEPTH: usize = 16;

/// Monophonic allocation with last note priority.
///
/// In plain mono mode only slot 0 plays; in unison mode every slot plays the
/// same note (the engine is responsible for detuning them).  Releasing the
/// most recent key falls back to the previous key still held, without a new
/// trigger.
#[derive(Clone, Debug)]
pub struct MonoAllocator {
    voices: VoiceTable,
    held: ArrayVec<(u8, u8), NOTE_STACK_DEPTH>,
    unison: bool,
    sustain: bool,
    counter: u32,
}

impl MonoAllocator {
    /// Create a mono allocator, playing all voices at once if `unison` is set
    pub fn new(unison: bool) -> Self {
        Self {
            voices: VoiceTable::new(),
            held: ArrayVec::new(),
            unison,
            sustain: false,
            counter: 0,
        }
    }
    /// True if every voice plays the note
    pub fn is_unison(&self) -> bool {
        self.unison
    }
    /// The key currently sounding, if any key is held
    pub fn top(&self) -> Option<u8> {
        self.held.last().map(|&(note, _)| note)
    }
    fn slots(&self) -> core::ops::Range<usize> {
        if self.unison {
            0..crate::NUM_VOICES
        } else {
            0..1
        }
    }
    fn for_each_voice(&mut self, mut f: impl FnMut(&mut crate::voice::Voice)) {
        for slot in self.slots() {
            if let Some(voice) = self.voices.get_mut(slot) {
                f(voice);
            }
        }
    }
}

impl VoiceAllocator for MonoAllocator {
    fn assign(&mut self, note: u8, velocity: u8) -> Option<usize> {
        if note > 127 {
            return None;
        }
        self.held.retain(|(n, _)| *n != note);
        if self.held.is_full() {
            self.held.remove(0);
        }
        self.held.push((note, velocity));
        self.counter = self.counter.wrapping_add(1);
        let age = self.counter;
        self.for_each_voice(|v| v.start(note, velocity, age));
        Some(0)
    }
    fn release(&mut self, note: u8) {
        let Some(index) = self.held.iter().position(|(n, _)| *n == note) else {
            return;
        };
        let was_top = index + 1 == self.held.len();
        self.held.remove(index);
        if !was_top {
            return;
        }
        if let Some(&(prev, velocity)) = self.held.last() {
            self.for_each_voice(|v| v.glide_to(prev, velocity));
        } else if self.sustain {
            self.for_each_voice(|v| v.sustain());
        } else {
            self.for_each_voice(|v| v.release());
        }
    }
    fn sustain(&mut self, on: bool) {
        self.sustain = on;
        if !on && self.held.is_empty() {
            self.for_each_voice(|v| {
                if v.is_sustained() {
                    v.release()
                }
            });
        }
    }
    fn reset(&mut self) {
        self.held.clear();
        self.sustain = false;
        self.voices.release_all();
    }
    fn voices(&self) -> &VoiceTable {
        &self.voices
    }
    fn voices_mut(&mut self) -> &mut VoiceTable {
        &mut self.voices
    }
    fn is_poly(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::Trigger;

    #[test]
    fn last_note_priority() {
        let mut alloc = MonoAllocator::new(false);
        alloc.assign(60, 100);
        alloc.assign(64, 100);
        assert_eq!(alloc.voices().get(0).unwrap().note(), Some(64));
        assert_eq!(alloc.voices().get(1).unwrap().note(), None);
        // flush the trigger of the second note
        alloc.voices_mut().get_mut(0).unwrap().tick_trigger(0, 20);
        alloc.voices_mut().get_mut(0).unwrap().tick_trigger(30, 20);
        alloc.release(64);
        let voice = alloc.voices().get(0).unwrap();
        assert_eq!(voice.note(), Some(60));
        assert!(voice.gate());
        assert_eq!(voice.trigger(), Trigger::Idle);
        alloc.release(60);
        assert!(!alloc.voices().get(0).unwrap().gate());
    }
    #[test]
    fn fallback_restores_velocity() {
        let mut alloc = MonoAllocator::new(false);
        alloc.assign(60, 40);
        alloc.assign(64, 120);
        assert_eq!(alloc.voices().get(0).unwrap().velocity(), 120);
        alloc.release(64);
        let voice = alloc.voices().get(0).unwrap();
        assert_eq!(voice.note(), Some(60));
        assert_eq!(voice.velocity(), 40);
    }
    #[test]
    fn releasing_buried_note_keeps_top() {
        let mut alloc = MonoAllocator::new(false);
        alloc.assign(60, 100);
        alloc.assign(64, 100);
        alloc.release(60);
        assert_eq!(alloc.top(), Some(64));
        assert_eq!(alloc.voices().get(0).unwrap().note(), Some(64));
        alloc.release(99);
        assert_eq!(alloc.top(), Some(64));
    }
    #[test]
    fn unison_plays_every_slot() {
        let mut alloc = MonoAllocator::new(true);
        alloc.assign(48, 100);
        assert!(alloc.voices().iter().all(|v| v.note() == Some(48)));
        alloc.release(48);
        assert_eq!(alloc.voices().active_count(), 0);
    }
    #[test]
    fn stack_overflow_drops_oldest() {
        let mut alloc = MonoAllocator::new(false);
        for note in 0..(NOTE_STACK_DEPTH as u8 + 4) {
            alloc.assign(note, 1);
        }
        assert_eq!(alloc.held.len(), NOTE_STACK_DEPTH);
        assert_eq!(alloc.held[0].0, 4);
    }
    #[test]
    fn sustain_holds_last_note() {
        let mut alloc = MonoAllocator::new(false);
        alloc.sustain(true);
        alloc.assign(60, 100);
        alloc.release(60);
        assert!(alloc.voices().get(0).unwrap().gate());
        alloc.sustain(false);
        assert!(!alloc.voices().get(0).unwrap().gate());
    }
}
