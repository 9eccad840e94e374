//! Recording stand-ins for the board hardware, for the unit tests

use core::cell::Cell;
use core::convert::Infallible;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, Operation, SpiDevice};

use crate::capture::FrequencyMeter;
use crate::controls::AnalogInput;
use crate::outputs::{CvChannel, CvSink, Dco, GateLatch, OscRouter};
use crate::storage::NvStorage;

/// One event seen by a [FakeSpi]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpiRecord {
    /// Chip select asserted
    Start,
    /// Words written
    Write(Vec<u16>),
    /// Delay inside the transaction, in ns
    Delay(u32),
    /// Words read (as zeros)
    Read(usize),
    /// Chip select released
    End,
}

#[derive(Default)]
pub struct FakeSpi {
    pub records: Vec<SpiRecord>,
}

impl FakeSpi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl spi::ErrorType for FakeSpi {
    type Error = Infallible;
}

impl SpiDevice<u16> for FakeSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u16>]) -> Result<(), Infallible> {
        self.records.push(SpiRecord::Start);
        for op in operations.iter_mut() {
            let record = match op {
                Operation::Write(words) => SpiRecord::Write(words.to_vec()),
                Operation::DelayNs(ns) => SpiRecord::Delay(*ns),
                Operation::Read(words) => {
                    words.fill(0);
                    SpiRecord::Read(words.len())
                }
                Operation::Transfer(read, write) => {
                    read.fill(0);
                    SpiRecord::Write(write.to_vec())
                }
                Operation::TransferInPlace(words) => {
                    let written = words.to_vec();
                    words.fill(0);
                    SpiRecord::Write(written)
                }
            };
            self.records.push(record);
        }
        self.records.push(SpiRecord::End);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDelay {
    pub total_ns: u64,
}

impl FakeDelay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
    }
}

#[derive(Default)]
pub struct FakePin {
    pub high: bool,
}

impl FakePin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl digital::ErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high = false;
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high = true;
        Ok(())
    }
}

/// An ADC returning either a fixed value or `step`, `2*step`, `3*step`, ...
pub struct FakeAnalog {
    value: u16,
    step: u16,
}

impl FakeAnalog {
    pub fn constant(value: u16) -> Self {
        Self { value, step: 0 }
    }
    pub fn counting(step: u16) -> Self {
        Self { value: 0, step }
    }
}

impl AnalogInput for FakeAnalog {
    type Error = Infallible;
    fn read(&mut self) -> Result<u16, Infallible> {
        self.value = self.value.wrapping_add(self.step);
        Ok(self.value)
    }
}

/// An EEPROM-like memory
pub struct MemStorage {
    data: Vec<u8>,
    pub writes: usize,
}

impl MemStorage {
    /// A fresh part, every cell `0xFF`
    pub fn erased() -> Self {
        Self {
            data: std::vec![0xFF; 2048],
            writes: 0,
        }
    }
    pub fn peek(&self, address: u16) -> u8 {
        self.data[address as usize]
    }
}

impl NvStorage for MemStorage {
    type Error = Infallible;
    fn read_byte(&mut self, address: u16) -> Result<u8, Infallible> {
        Ok(self.data[address as usize])
    }
    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), Infallible> {
        self.data[address as usize] = value;
        self.writes += 1;
        Ok(())
    }
}

/// Keeps the last value written to every output
#[derive(Default)]
pub struct RecordingOutputs {
    pub notes: [Option<u16>; 8],
    pub velocities: [Option<u16>; 8],
    pub fm: Option<u16>,
    pub tm: Option<u16>,
    pub latch: GateLatch,
    pub cv_writes: usize,
    pub latch_writes: usize,
}

impl CvSink for RecordingOutputs {
    type Error = Infallible;
    fn set_cv(&mut self, channel: CvChannel, code: u16) -> Result<(), Infallible> {
        match channel {
            CvChannel::Note(v) => self.notes[v] = Some(code),
            CvChannel::Velocity(v) => self.velocities[v] = Some(code),
            CvChannel::Fm => self.fm = Some(code),
            CvChannel::Tm => self.tm = Some(code),
        }
        self.cv_writes += 1;
        Ok(())
    }
    fn set_gates(&mut self, latch: GateLatch) -> Result<(), Infallible> {
        self.latch = latch;
        self.latch_writes += 1;
        Ok(())
    }
}

/// A DCO bank that remembers the frequency of each oscillator
#[derive(Default)]
pub struct FakeDco {
    pub freqs: [Option<f32>; 8],
    pub writes: usize,
}

impl Dco for FakeDco {
    type Error = Infallible;
    fn set_frequency(&mut self, osc: usize, freq_hz: f32) -> Result<(), Infallible> {
        self.freqs[osc] = Some(freq_hz);
        self.writes += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRouter {
    pub routed: Option<usize>,
    /// Fail every request to disconnect the counter
    pub fail_disconnect: bool,
}

impl OscRouter for FakeRouter {
    type Error = ();
    fn route(&mut self, osc: Option<usize>) -> Result<(), ()> {
        if osc.is_none() && self.fail_disconnect {
            return Err(());
        }
        self.routed = osc;
        Ok(())
    }
}

/// A frequency counter whose readings are fed in by the test.  Restarting
/// discards a reading that hasn't been taken.
pub struct FakeMeter {
    pending: Cell<Option<f32>>,
    pub restarts: Cell<usize>,
}

impl FakeMeter {
    pub fn new() -> Self {
        Self {
            pending: Cell::new(None),
            restarts: Cell::new(0),
        }
    }
    /// Make the next reading available
    pub fn feed(&self, freq: f32) {
        self.pending.set(Some(freq));
    }
}

impl FrequencyMeter for FakeMeter {
    fn restart(&self) {
        self.pending.set(None);
        self.restarts.set(self.restarts.get() + 1);
    }
    fn take(&self) -> Option<f32> {
        self.pending.take()
    }
}
