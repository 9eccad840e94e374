//! Hand-off of frequency measurements from an edge interrupt to the main loop.
//!
//! The interrupt handler calls [FrequencyCapture::on_edge] on every rising edge
//! of the oscillator under test, with a timestamp from a free running
//! timebase.  Once enough time has elapsed it publishes the number of cycles
//! seen and the ticks they took, and raises a flag.  The main loop polls
//! [FrequencyCapture::take], which copies the result and lowers the flag.
//!
//! Ownership of each field is split so that only load/store atomics are needed
//! (no read-modify-write, which Cortex-M0+ lacks):
//!
//!  - the accumulators are only ever written by the interrupt
//!  - the published snapshot is written by the interrupt only while the flag is
//!    low, and read by the main loop only while it is high
//!  - restart requests go the other way, and are acted on by the interrupt

use crate::config::CaptureConfig;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// A completed measurement: `cycles` full periods took `ticks` of the timebase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Measurement {
    /// Number of complete periods observed
    pub cycles: u32,
    /// Duration of those periods, in ticks of the timebase
    pub ticks: u32,
}

impl Measurement {
    /// The measured frequency, in Hz, given the timebase rate
    pub fn frequency(&self, tick_hz: u32) -> Option<f32> {
        if self.ticks == 0 || self.cycles == 0 {
            None
        } else {
            Some((self.cycles as f64 * tick_hz as f64 / self.ticks as f64) as f32)
        }
    }
}

/// Anything the autotune engine can take frequency readings from
pub trait FrequencyMeter {
    /// Discard any reading in progress and start a fresh one
    fn restart(&self);
    /// Take a completed reading, in Hz, if there is one
    fn take(&self) -> Option<f32>;
}

/// An edge counting frequency counter, shared between an interrupt and the
/// main loop.  Suitable for a `static`.
pub struct FrequencyCapture {
    tick_hz: u32,
    gate_ticks: u32,
    // interrupt-owned accumulators
    first_edge: AtomicU32,
    last_edge: AtomicU32,
    edges: AtomicU32,
    // published snapshot
    cycles: AtomicU32,
    ticks: AtomicU32,
    ready: AtomicBool,
    // main loop requests
    restart: AtomicBool,
}

impl FrequencyCapture {
    /// Create a capture cell
    pub const fn new(config: CaptureConfig) -> Self {
        Self {
            tick_hz: config.tick_hz,
            gate_ticks: config.gate_ticks,
            first_edge: AtomicU32::new(0),
            last_edge: AtomicU32::new(0),
            edges: AtomicU32::new(0),
            cycles: AtomicU32::new(0),
            ticks: AtomicU32::new(0),
            ready: AtomicBool::new(false),
            restart: AtomicBool::new(true),
        }
    }
    /// Record a rising edge at `now` (in ticks of the timebase).  Call this
    /// from the edge interrupt only.
    pub fn on_edge(&self, now: u32) {
        if self.restart.load(Ordering::Acquire) {
            self.restart.store(false, Ordering::Relaxed);
            self.edges.store(0, Ordering::Relaxed);
        }
        let edges = self.edges.load(Ordering::Relaxed);
        if edges == 0 {
            self.first_edge.store(now, Ordering::Relaxed);
        }
        self.edges.store(edges.saturating_add(1), Ordering::Relaxed);
        self.last_edge.store(now, Ordering::Relaxed);
        let span = now.wrapping_sub(self.first_edge.load(Ordering::Relaxed));
        if edges >= 1 && span >= self.gate_ticks && !self.ready.load(Ordering::Acquire) {
            self.cycles.store(edges, Ordering::Relaxed);
            self.ticks.store(span, Ordering::Relaxed);
            self.ready.store(true, Ordering::Release);
            // the closing edge opens the next measurement
            self.first_edge.store(now, Ordering::Relaxed);
            self.edges.store(1, Ordering::Relaxed);
        }
    }
    /// Take the latest completed measurement, if there is one
    pub fn take_measurement(&self) -> Option<Measurement> {
        if !self.ready.load(Ordering::Acquire) {
            return None;
        }
        let measurement = Measurement {
            cycles: self.cycles.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
        };
        self.ready.store(false, Ordering::Release);
        Some(measurement)
    }
    /// Timestamp of the most recent edge seen
    pub fn last_edge(&self) -> u32 {
        self.last_edge.load(Ordering::Relaxed)
    }
    /// The timebase rate, in Hz
    pub fn tick_hz(&self) -> u32 {
        self.tick_hz
    }
}

impl FrequencyMeter for FrequencyCapture {
    fn restart(&self) {
        // raise the request first, so an edge landing in between throws the
        // old accumulator away instead of publishing it
        self.restart.store(true, Ordering::Release);
        self.ready.store(false, Ordering::Release);
    }
    fn take(&self) -> Option<f32> {
        self.take_measurement()?.frequency(self.tick_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::calculate_cents;

    fn feed(capture: &FrequencyCapture, freq: f64, start: f64, count: usize) -> f64 {
        let period = 1_000_000.0 / freq;
        let mut t = start;
        for _ in 0..count {
            capture.on_edge(t as u32);
            t += period;
        }
        t
    }

    #[test]
    fn measures_frequency() {
        let capture = FrequencyCapture::new(CaptureConfig::new_1mhz());
        assert_eq!(capture.take(), None);
        // 440Hz for a bit over 100ms
        feed(&capture, 440.0, 0.0, 46);
        let freq = capture.take().unwrap();
        assert!(calculate_cents(440.0, freq).abs() < 1.0);
        assert_eq!(capture.take(), None);
    }
    #[test]
    fn no_publish_before_gate() {
        let capture = FrequencyCapture::new(CaptureConfig::new_1mhz());
        feed(&capture, 100.0, 0.0, 5);
        assert_eq!(capture.take_measurement(), None);
    }
    #[test]
    fn snapshot_not_overwritten_until_taken() {
        let capture = FrequencyCapture::new(CaptureConfig::new_1mhz());
        let t = feed(&capture, 1000.0, 0.0, 350);
        // later windows were held off while the first was waiting
        assert_eq!(
            capture.take_measurement(),
            Some(Measurement {
                cycles: 100,
                ticks: 100_000
            })
        );
        assert_eq!(capture.take_measurement(), None);
        // the accumulator kept running, so the next edge closes a long window
        feed(&capture, 1000.0, t, 1);
        assert_eq!(
            capture.take_measurement(),
            Some(Measurement {
                cycles: 250,
                ticks: 250_000
            })
        );
    }
    #[test]
    fn restart_discards_stale_edges() {
        let capture = FrequencyCapture::new(CaptureConfig::new_1mhz());
        let t = feed(&capture, 50.0, 0.0, 4);
        capture.restart();
        feed(&capture, 880.0, t + 10_000.0, 100);
        let freq = capture.take().unwrap();
        assert!(calculate_cents(880.0, freq).abs() < 2.0);
    }
    #[test]
    fn edge_during_restart_publishes_nothing() {
        let capture = FrequencyCapture::new(CaptureConfig::new_1mhz());
        let t = feed(&capture, 1000.0, 0.0, 350);
        assert!(capture.take_measurement().is_some());
        // the accumulator has run on well past the gate; restart() is split
        // here around an edge
        capture.restart.store(true, Ordering::Release);
        capture.on_edge(t as u32);
        capture.ready.store(false, Ordering::Release);
        assert_eq!(capture.take_measurement(), None);
        assert_eq!(capture.edges.load(Ordering::Relaxed), 1);
        // the edge that was kept opens the new window
        feed(&capture, 440.0, t + 1_000_000.0 / 440.0, 46);
        let freq = capture.take().unwrap();
        assert!(calculate_cents(440.0, freq).abs() < 2.0);
    }
    #[test]
    fn timebase_wraps() {
        let capture = FrequencyCapture::new(CaptureConfig::new_1mhz());
        let start = (u32::MAX - 50_000) as f64;
        let period = 1_000_000.0 / 500.0;
        for i in 0..60u32 {
            let t = (start + i as f64 * period) as u64;
            capture.on_edge(t as u32);
        }
        let freq = capture.take().unwrap();
        assert!(calculate_cents(500.0, freq).abs() < 1.0);
    }
}
