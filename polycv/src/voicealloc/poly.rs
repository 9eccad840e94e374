use super::*;
use log::debug;

/// Eight voice polyphonic allocation.
///
/// New notes take the lowest numbered free slot.  When every slot is sounding
/// the slot that has been sounding the longest is stolen and retriggered.  A
/// note that is already sounding (for example, held by the sustain pedal) is
/// retriggered in place, so no note is ever on two slots at once.
#[derive(Clone, Debug, Default)]
pub struct PolyAllocator {
    voices: VoiceTable,
    counter: u32,
    sustain: bool,
}

impl PolyAllocator {
    /// Create an allocator with all voices idle
    pub fn new() -> Self {
        Self::default()
    }
    fn next_age(&mut self) -> u32 {
        self.counter = self.counter.wrapping_add(1);
        self.counter
    }
}

impl VoiceAllocator for PolyAllocator {
    fn assign(&mut self, note: u8, velocity: u8) -> Option<usize> {
        if note > 127 {
            return None;
        }
        let slot = if let Some(slot) = self.voices.find(note) {
            slot
        } else if let Some(slot) = self.voices.first_free() {
            slot
        } else {
            let slot = self.voices.oldest(self.counter)?;
            debug!(
                "stealing voice {} (note {:?}) for note {}",
                slot,
                self.voices.get(slot).and_then(|v| v.note()),
                note
            );
            slot
        };
        let age = self.next_age();
        self.voices.get_mut(slot)?.start(note, velocity, age);
        Some(slot)
    }
    fn release(&mut self, note: u8) {
        let sustain = self.sustain;
        if let Some(voice) = self
            .voices
            .find(note)
            .and_then(|slot| self.voices.get_mut(slot))
        {
            if sustain {
                voice.sustain();
            } else {
                voice.release();
            }
        }
    }
    fn sustain(&mut self, on: bool) {
        self.sustain = on;
        if !on {
            for voice in self.voices.iter_mut().filter(|v| v.is_sustained()) {
                voice.release();
            }
        }
    }
    fn reset(&mut self) {
        self.voices.release_all();
        self.sustain = false;
    }
    fn voices(&self) -> &VoiceTable {
        &self.voices
    }
    fn voices_mut(&mut self) -> &mut VoiceTable {
        &mut self.voices
    }
    fn is_poly(&self) -> bool {
        true
    }
}
