//! Driver for an array of AD9833 DDS waveform generators, one per voice.
//!
//! Every chip shares the SPI clock and data lines but has its own FSYNC, so
//! each channel is a separate [SpiDevice].  A frequency update is four 16 bit
//! words (frequency LSBs, frequency MSBs, phase, control) and is sent as a
//! single SPI transaction, which keeps FSYNC low across all four words and
//! guarantees no other traffic lands in the middle of it.  The chip wants some
//! time between words to latch its registers, which we express as delay
//! operations inside the transaction.
//!
//! The chips expect SPI mode 2, MSB first.  25MHz is fine.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Operation, SpiDevice};

/// Control register: write the frequency as two consecutive 14 bit words
pub const CTRL_B28: u16 = 0x2000;
/// Control register: hold the chip in reset
pub const CTRL_RESET: u16 = 0x0100;
/// Control register: disconnect the DAC and output the MSB of the DAC data
pub const CTRL_OPBITEN: u16 = 0x0020;
/// Control register: with OPBITEN, output the MSB rather than MSB/2
pub const CTRL_DIV2: u16 = 0x0008;
/// Control register: triangle rather than sine output
pub const CTRL_MODE: u16 = 0x0002;
/// Address bits selecting the FREQ0 register
pub const FREQ0: u16 = 0x4000;
/// Address bits selecting the PHASE0 register (with a zero phase)
pub const PHASE0: u16 = 0xC000;

/// The largest value of the 28 bit frequency register
pub const FREQ_REG_MAX: u32 = (1 << 28) - 1;

const FSYNC_SETUP_NS: u32 = 1_000;
const WORD_GAP_NS: u32 = 50_000;
const FSYNC_HOLD_NS: u32 = 5_000;
const RESET_SETTLE_NS: u32 = 10_000;

/// An error from the DDS driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error<E> {
    /// The SPI bus reported an error
    Spi(E),
    /// There is no DDS on this channel
    Channel(usize),
}

/// The output waveform
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    /// Sine wave
    Sine,
    /// Triangle wave
    #[default]
    Triangle,
    /// Square wave, at the programmed frequency
    Square,
}

impl Waveform {
    /// The control word that takes the chip out of reset with this waveform
    pub const fn control_word(&self) -> u16 {
        match self {
            Self::Sine => CTRL_B28,
            Self::Triangle => CTRL_B28 | CTRL_MODE,
            Self::Square => CTRL_B28 | CTRL_OPBITEN | CTRL_DIV2,
        }
    }
}

/// Compute the 28 bit frequency tuning word for `freq_hz`:
/// `round(freq_hz * 2^28 / mclk_hz)`.
///
/// Negative, zero, and non-finite frequencies give 0, and frequencies at or
/// above the master clock saturate.
pub fn frequency_register(freq_hz: f32, mclk_hz: u32) -> u32 {
    if !(freq_hz > 0.0) || mclk_hz == 0 {
        return 0;
    }
    let reg = (freq_hz as f64) * ((1u64 << 28) as f64) / (mclk_hz as f64) + 0.5;
    if reg >= FREQ_REG_MAX as f64 {
        FREQ_REG_MAX
    } else {
        reg as u32
    }
}

/// The frequency, in Hz, produced by a tuning word
pub fn frequency_from_register(reg: u32, mclk_hz: u32) -> f32 {
    ((reg & FREQ_REG_MAX) as f64 * mclk_hz as f64 / ((1u64 << 28) as f64)) as f32
}

/// Split a tuning word into the (LSB, MSB) FREQ0 register writes
pub const fn split_register(reg: u32) -> (u16, u16) {
    let lsb = (reg & 0x3FFF) as u16;
    let msb = ((reg >> 14) & 0x3FFF) as u16;
    (FREQ0 | lsb, FREQ0 | msb)
}

/// An array of `N` AD9833 chips
pub struct Ad9833Array<SPI, D, const N: usize> {
    channels: [SPI; N],
    delay: D,
    mclk_hz: u32,
    waveform: Waveform,
}

impl<SPI, D, E, const N: usize> Ad9833Array<SPI, D, N>
where
    SPI: SpiDevice<u16, Error = E>,
    D: DelayNs,
{
    /// Wrap the SPI devices for each chip.  `mclk_hz` is the chips' master
    /// clock.  Call [Ad9833Array::reset_all] before use.
    pub fn new(channels: [SPI; N], delay: D, mclk_hz: u32) -> Self {
        Self {
            channels,
            delay,
            mclk_hz,
            waveform: Waveform::default(),
        }
    }
    /// The number of chips
    pub const fn len(&self) -> usize {
        N
    }
    /// True if there are no chips
    pub const fn is_empty(&self) -> bool {
        N == 0
    }
    /// Set the waveform used from the next frequency update onward
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }
    /// The master clock rate, in Hz
    pub fn mclk_hz(&self) -> u32 {
        self.mclk_hz
    }
    fn channel(&mut self, channel: usize) -> Result<&mut SPI, Error<E>> {
        self.channels.get_mut(channel).ok_or(Error::Channel(channel))
    }
    /// Put one chip into reset
    pub fn reset(&mut self, channel: usize) -> Result<(), Error<E>> {
        self.channel(channel)?
            .write(&[CTRL_B28 | CTRL_RESET])
            .map_err(Error::Spi)?;
        self.delay.delay_ns(RESET_SETTLE_NS);
        Ok(())
    }
    /// Put every chip into reset
    pub fn reset_all(&mut self) -> Result<(), Error<E>> {
        for channel in 0..N {
            self.reset(channel)?;
        }
        Ok(())
    }
    /// Program a raw tuning word into FREQ0 of one chip and start it running
    pub fn write_register(&mut self, channel: usize, reg: u32) -> Result<(), Error<E>> {
        let (lsb, msb) = split_register(reg);
        let control = self.waveform.control_word();
        self.channel(channel)?
            .transaction(&mut [
                Operation::DelayNs(FSYNC_SETUP_NS),
                Operation::Write(&[lsb]),
                Operation::DelayNs(WORD_GAP_NS),
                Operation::Write(&[msb]),
                Operation::DelayNs(WORD_GAP_NS),
                Operation::Write(&[PHASE0]),
                Operation::DelayNs(WORD_GAP_NS),
                Operation::Write(&[control]),
                Operation::DelayNs(FSYNC_HOLD_NS),
            ])
            .map_err(Error::Spi)
    }
    /// Set the output frequency of one chip, in Hz
    pub fn set_frequency(&mut self, channel: usize, freq_hz: f32) -> Result<(), Error<E>> {
        let reg = frequency_register(freq_hz, self.mclk_hz);
        self.write_register(channel, reg)
    }
    /// Give back the SPI devices and the delay
    pub fn release(self) -> ([SPI; N], D) {
        (self.channels, self.delay)
    }
}
