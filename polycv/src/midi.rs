//! Framing of a raw DIN MIDI byte stream into [MidiMessage]s.
//!
//! Handles running status.  System real-time bytes may arrive in the middle of
//! another message and are dropped without disturbing it; system exclusive
//! data is skipped entirely.

use arrayvec::ArrayVec;
use wmidi::MidiMessage;

/// The UART baud rate of DIN MIDI
pub const BAUD_RATE: u32 = 31_250;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// The total length of a message starting with `status`, if it is one we
/// frame (channel voice or system common)
fn message_len(status: u8) -> Option<usize> {
    match status {
        0x80..=0xBF | 0xE0..=0xEF => Some(3),
        0xC0..=0xDF => Some(2),
        0xF1 | 0xF3 => Some(2),
        0xF2 => Some(3),
        0xF6 => Some(1),
        _ => None,
    }
}

/// Assembles bytes from the MIDI UART into messages
#[derive(Clone, Debug, Default)]
pub struct MidiFramer {
    buffer: ArrayVec<u8, 3>,
    expected: usize,
    running: Option<u8>,
    in_sysex: bool,
}

impl MidiFramer {
    /// Create a framer waiting for a status byte
    pub fn new() -> Self {
        Self::default()
    }
    /// Feed one received byte, returning a message if it completes one
    pub fn push(&mut self, byte: u8) -> Option<MidiMessage<'static>> {
        if byte >= 0xF8 {
            return None;
        }
        if byte & 0x80 != 0 {
            self.status(byte)
        } else {
            self.data(byte)
        }
    }
    /// Feed a run of bytes, calling `f` with every message completed
    pub fn push_all(&mut self, bytes: &[u8], mut f: impl FnMut(MidiMessage<'static>)) {
        for byte in bytes {
            if let Some(msg) = self.push(*byte) {
                f(msg);
            }
        }
    }
    fn status(&mut self, byte: u8) -> Option<MidiMessage<'static>> {
        self.buffer.clear();
        self.in_sysex = byte == SYSEX_START;
        self.running = None;
        let len = message_len(byte)?;
        if byte < 0xF0 {
            self.running = Some(byte);
        }
        self.expected = len;
        self.buffer.push(byte);
        self.complete()
    }
    fn data(&mut self, byte: u8) -> Option<MidiMessage<'static>> {
        if self.in_sysex {
            return None;
        }
        if self.buffer.is_empty() {
            // running status, or a stray data byte
            let status = self.running?;
            self.expected = message_len(status)?;
            self.buffer.push(status);
        }
        if self.buffer.try_push(byte).is_err() {
            self.buffer.clear();
            return None;
        }
        self.complete()
    }
    fn complete(&mut self) -> Option<MidiMessage<'static>> {
        if self.buffer.len() < self.expected {
            return None;
        }
        let msg = MidiMessage::try_from(self.buffer.as_slice())
            .ok()
            .and_then(MidiMessage::drop_unowned_sysex);
        self.buffer.clear();
        msg
    }
}
