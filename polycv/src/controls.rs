//! Scanning the front panel pots through an analog multiplexer.
//!
//! The mux address lines are ordinary output pins and the mux common line
//! goes to an ADC input.  One channel is read per call to
//! [ControlScanner::poll], so scanning never holds up the main loop; the next
//! channel is selected straight after a read so it has a whole loop iteration
//! to settle.

use embedded_hal::digital::OutputPin;

use crate::SignedNote;

/// A one-shot analog input (ADC channel).  Readings are right aligned.
pub trait AnalogInput {
    /// The error type of the ADC
    type Error;
    /// Take one reading
    fn read(&mut self) -> Result<u16, Self::Error>;
}

/// Full scale of the control ADC readings (12 bit)
pub const ADC_FULL_SCALE: u16 = 4095;

/// A binary addressed multiplexer with `BITS` select lines
pub struct Mux<P, const BITS: usize> {
    select: [P; BITS],
    current: usize,
}

impl<P: OutputPin, const BITS: usize> Mux<P, BITS> {
    /// Wrap the select lines, least significant first.  The mux starts on
    /// channel 0.
    pub fn new(select: [P; BITS]) -> Result<Self, P::Error> {
        let mut mux = Self { select, current: 0 };
        mux.write_address(0)?;
        Ok(mux)
    }
    /// The number of channels this mux can address
    pub const fn channels(&self) -> usize {
        1 << BITS
    }
    /// The currently selected channel
    pub fn current(&self) -> usize {
        self.current
    }
    /// Select `channel`.  Returns false (and leaves the selection alone) if the
    /// mux doesn't have that many channels.
    pub fn select(&mut self, channel: usize) -> Result<bool, P::Error> {
        if channel >= self.channels() {
            return Ok(false);
        }
        if channel != self.current {
            self.write_address(channel)?;
            self.current = channel;
        }
        Ok(true)
    }
    fn write_address(&mut self, channel: usize) -> Result<(), P::Error> {
        for (bit, pin) in self.select.iter_mut().enumerate() {
            pin.set_state(((channel >> bit) & 1 != 0).into())?;
        }
        Ok(())
    }
    /// Give back the select pins
    pub fn release(self) -> [P; BITS] {
        self.select
    }
}

/// The pots on the control mux
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Control {
    /// How much aftertouch drives FM
    FmAftertouchDepth = 0,
    /// How much the mod wheel drives TM
    TmModDepth = 1,
    /// How much aftertouch drives TM
    TmAftertouchDepth = 2,
    /// How much the mod wheel drives FM
    FmModDepth = 3,
    /// Voice spread in unison mode
    Detune = 4,
    /// Unused
    Spare5 = 5,
    /// Unused
    Spare6 = 6,
    /// Pitch bend depth
    PitchBendDepth = 7,
}

impl Control {
    /// The control wired to mux channel `channel`
    pub fn from_channel(channel: usize) -> Option<Self> {
        Some(match channel {
            0 => Self::FmAftertouchDepth,
            1 => Self::TmModDepth,
            2 => Self::TmAftertouchDepth,
            3 => Self::FmModDepth,
            4 => Self::Detune,
            5 => Self::Spare5,
            6 => Self::Spare6,
            7 => Self::PitchBendDepth,
            _ => return None,
        })
    }
}

/// A new reading from a control
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlChange {
    /// Which control moved
    pub control: Control,
    /// The raw ADC reading
    pub value: u16,
}

/// An error from scanning: either the mux pins or the ADC
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanError<P, A> {
    /// Setting a mux address line failed
    Select(P),
    /// The ADC failed
    Adc(A),
}

/// Round-robin scanner over an 8 channel control mux
pub struct ControlScanner<P, A> {
    mux: Mux<P, 3>,
    adc: A,
    values: [Option<u16>; 8],
}

impl<P: OutputPin, A: AnalogInput> ControlScanner<P, A> {
    /// Create a scanner.  The first pass reports every channel, whatever it
    /// reads.
    pub fn new(mux: Mux<P, 3>, adc: A) -> Self {
        Self {
            mux,
            adc,
            values: [None; 8],
        }
    }
    /// Read the current channel, then move on to the next.  Returns the new
    /// reading if it differs from the last reading of that channel.
    pub fn poll(&mut self) -> Result<Option<ControlChange>, ScanError<P::Error, A::Error>> {
        let channel = self.mux.current();
        let value = self.adc.read().map_err(ScanError::Adc)?;
        let next = (channel + 1) % self.values.len();
        self.mux.select(next).map_err(ScanError::Select)?;
        let previous = self.values[channel].replace(value);
        if previous == Some(value) {
            return Ok(None);
        }
        Ok(Control::from_channel(channel).map(|control| ControlChange { control, value }))
    }
    /// The last reading of `control`, once it has been scanned
    pub fn value(&self, control: Control) -> Option<u16> {
        self.values[control as usize]
    }
}

/// Scale a raw control reading to `[0, 1]`
pub fn normalize(value: u16) -> f32 {
    value.min(ADC_FULL_SCALE) as f32 / ADC_FULL_SCALE as f32
}

/// The modulation state of the board, from the pots and from MIDI.  Only the
/// latest values are kept.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlState {
    /// FM depth from the mod wheel, `[0, 1]`
    pub fm_mod_depth: f32,
    /// FM depth from aftertouch, `[0, 1]`
    pub fm_at_depth: f32,
    /// TM depth from the mod wheel, `[0, 1]`
    pub tm_mod_depth: f32,
    /// TM depth from aftertouch, `[0, 1]`
    pub tm_at_depth: f32,
    /// Pitch bend depth, `[0, 1]` of the pitch bend range
    pub pb_depth: f32,
    /// Unison detune, `[0, 1]`
    pub detune: f32,
    /// Mod wheel, `[0, 1]`
    pub mod_wheel: f32,
    /// Channel aftertouch, `[0, 1]`
    pub aftertouch: f32,
    /// Pitch bend wheel, `[-1, 1)`
    pub bend: f32,
}

impl ControlState {
    /// Everything at rest, with full pitch bend depth
    pub const fn new() -> Self {
        Self {
            fm_mod_depth: 0.0,
            fm_at_depth: 0.0,
            tm_mod_depth: 0.0,
            tm_at_depth: 0.0,
            pb_depth: 1.0,
            detune: 0.0,
            mod_wheel: 0.0,
            aftertouch: 0.0,
            bend: 0.0,
        }
    }
    /// Store a reading from the control scan
    pub fn apply(&mut self, change: ControlChange) {
        let value = normalize(change.value);
        match change.control {
            Control::FmAftertouchDepth => self.fm_at_depth = value,
            Control::TmModDepth => self.tm_mod_depth = value,
            Control::TmAftertouchDepth => self.tm_at_depth = value,
            Control::FmModDepth => self.fm_mod_depth = value,
            Control::Detune => self.detune = value,
            Control::PitchBendDepth => self.pb_depth = value,
            Control::Spare5 | Control::Spare6 => {}
        }
    }
    /// Total FM amount, `[0, 1]`
    pub fn fm_amount(&self) -> f32 {
        (self.mod_wheel * self.fm_mod_depth + self.aftertouch * self.fm_at_depth).clamp(0.0, 1.0)
    }
    /// Total TM amount, `[0, 1]`
    pub fn tm_amount(&self) -> f32 {
        (self.mod_wheel * self.tm_mod_depth + self.aftertouch * self.tm_at_depth).clamp(0.0, 1.0)
    }
    /// The pitch offset from the bend wheel, given the range in semitones
    pub fn bend_semitones(&self, range: u8) -> SignedNote {
        SignedNote::saturating_from_num(self.bend * self.pb_depth * range as f32)
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}
