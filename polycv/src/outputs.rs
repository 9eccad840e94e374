//! The outputs of the board, as seen by the [crate::engine::Engine] and the
//! [crate::autotune] sweep.
//!
//! The core only deals in DAC codes, gate bit images, and frequencies; what
//! chips those end up on is the firmware's business.

use crate::ad9833::{self, Ad9833Array};
use crate::controls::Mux;
use crate::NUM_VOICES;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;

/// A control voltage output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CvChannel {
    /// Pitch CV of a voice
    Note(usize),
    /// Velocity CV of a voice
    Velocity(usize),
    /// Global FM amount
    Fm,
    /// Global TM amount
    Tm,
}

/// The state of all of the gate and trigger lines, one bit per voice
/// (bit 0 = voice 0)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateLatch {
    /// Gate lines
    pub gates: u8,
    /// Trigger lines
    pub triggers: u8,
}

impl GateLatch {
    /// All lines low
    pub const fn new() -> Self {
        Self {
            gates: 0,
            triggers: 0,
        }
    }
    /// Set the gate and trigger bits of a voice.  Out of range voices are
    /// ignored.
    pub fn set(&mut self, voice: usize, gate: bool, trigger: bool) {
        if voice >= NUM_VOICES {
            return;
        }
        let mask = 1u8 << voice;
        self.gates = if gate { self.gates | mask } else { self.gates & !mask };
        self.triggers = if trigger {
            self.triggers | mask
        } else {
            self.triggers & !mask
        };
    }
    /// The gate level of a voice
    pub fn gate(&self, voice: usize) -> bool {
        voice < NUM_VOICES && self.gates & (1 << voice) != 0
    }
    /// The trigger level of a voice
    pub fn trigger(&self, voice: usize) -> bool {
        voice < NUM_VOICES && self.triggers & (1 << voice) != 0
    }
}

/// The DACs and gate drivers
pub trait CvSink {
    /// The error type of the underlying bus
    type Error;
    /// Write a 16 bit DAC code to a CV output
    fn set_cv(&mut self, channel: CvChannel, code: u16) -> Result<(), Self::Error>;
    /// Latch a new state onto the gate and trigger lines
    fn set_gates(&mut self, latch: GateLatch) -> Result<(), Self::Error>;
}

/// A bank of digitally controlled oscillators, one per voice
pub trait Dco {
    /// The error type of the underlying bus
    type Error;
    /// Set the frequency of one oscillator, in Hz
    fn set_frequency(&mut self, osc: usize, freq_hz: f32) -> Result<(), Self::Error>;
}

impl<SPI, D, E, const N: usize> Dco for Ad9833Array<SPI, D, N>
where
    SPI: SpiDevice<u16, Error = E>,
    D: DelayNs,
{
    type Error = ad9833::Error<E>;
    fn set_frequency(&mut self, osc: usize, freq_hz: f32) -> Result<(), Self::Error> {
        Ad9833Array::set_frequency(self, osc, freq_hz)
    }
}

/// Routes one oscillator at a time to the frequency counter
pub trait OscRouter {
    /// The error type of the underlying hardware
    type Error;
    /// Connect `osc` to the counter, or disconnect everything with `None`
    fn route(&mut self, osc: Option<usize>) -> Result<(), Self::Error>;
}

/// A routing mux with an active-low enable line
pub struct EnabledMux<P, const BITS: usize> {
    mux: Mux<P, BITS>,
    enable: P,
}

impl<P: OutputPin, const BITS: usize> EnabledMux<P, BITS> {
    /// Wrap a mux and its enable line.  The mux starts disabled.
    pub fn new(mux: Mux<P, BITS>, mut enable: P) -> Result<Self, P::Error> {
        enable.set_high()?;
        Ok(Self { mux, enable })
    }
    /// Give back the mux and enable pin
    pub fn release(self) -> (Mux<P, BITS>, P) {
        (self.mux, self.enable)
    }
}

impl<P: OutputPin, const BITS: usize> OscRouter for EnabledMux<P, BITS> {
    type Error = P::Error;
    fn route(&mut self, osc: Option<usize>) -> Result<(), Self::Error> {
        match osc {
            Some(osc) if osc < self.mux.channels() => {
                self.mux.select(osc)?;
                self.enable.set_low()
            }
            _ => self.enable.set_high(),
        }
    }
}
