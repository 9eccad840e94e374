//! Automatic tuning of the oscillators.
//!
//! Each oscillator in turn is routed to the frequency counter and stepped
//! through all 128 notes.  For each note the DCO is set to the reference
//! frequency, allowed to settle, and measured; the difference between the
//! expected and the measured frequency becomes that note's entry in the
//! [CalibrationTable].
//!
//! The sweep is a state machine advanced by [Autotune::poll] from the main
//! loop, one transition per call, so MIDI and the control scan keep running
//! while it works.

use log::{info, warn};

use crate::calibration::CalibrationTable;
use crate::capture::FrequencyMeter;
use crate::config::AutotuneConfig;
use crate::notes::reference_frequency;
use crate::outputs::{Dco, OscRouter};
use crate::util::{calculate_cents, elapsed_ms, saturate_i8};
use crate::{NUM_NOTES, NUM_VOICES};

/// Where the sweep is up to
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum AutotuneState {
    /// Not tuning
    #[default]
    Idle,
    /// About to route `osc` to the counter and set it to `note`
    Sweeping {
        /// Oscillator being tuned
        osc: usize,
        /// Note being tuned
        note: u8,
    },
    /// Waiting for the oscillator to settle, then for a reading
    Measuring {
        /// Oscillator being tuned
        osc: usize,
        /// Note being tuned
        note: u8,
        /// When the current wait started, in ms
        since: u32,
        /// False while settling, true once the counter has been restarted
        settled: bool,
    },
    /// About to compute and store the correction
    Applying {
        /// Oscillator being tuned
        osc: usize,
        /// Note being tuned
        note: u8,
        /// The reading, or `None` if the counter timed out
        measured: Option<f32>,
    },
}

/// Something the caller may want to act on (e.g. persist an entry)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutotuneEvent {
    /// A new correction was written to the table
    Applied {
        /// Oscillator
        osc: usize,
        /// Note
        note: u8,
        /// The new correction, in cents
        cents: i8,
    },
    /// No reading arrived in time; the table entry was left alone
    Skipped {
        /// Oscillator
        osc: usize,
        /// Note
        note: u8,
    },
    /// The sweep finished (or was aborted) and the counter was disconnected
    Finished,
}

/// An error from the hardware under the sweep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error<D, R> {
    /// Setting a DCO frequency failed
    Dco(D),
    /// Routing the counter failed
    Route(R),
}

/// The autotune engine
#[derive(Clone, Debug)]
pub struct Autotune {
    config: AutotuneConfig,
    state: AutotuneState,
    last_osc: usize,
    finishing: bool,
}

impl Autotune {
    /// Create an idle autotune engine
    pub const fn new(config: AutotuneConfig) -> Self {
        Self {
            config,
            state: AutotuneState::Idle,
            last_osc: 0,
            finishing: false,
        }
    }
    /// Tune every oscillator
    pub fn start_all(&mut self) {
        info!("autotune: tuning all oscillators");
        self.state = AutotuneState::Sweeping { osc: 0, note: 0 };
        self.last_osc = NUM_VOICES - 1;
        self.finishing = false;
    }
    /// Tune a single oscillator.  Returns false if there's no such oscillator.
    pub fn start(&mut self, osc: usize) -> bool {
        if osc >= NUM_VOICES {
            return false;
        }
        info!("autotune: tuning oscillator {}", osc);
        self.state = AutotuneState::Sweeping { osc, note: 0 };
        self.last_osc = osc;
        self.finishing = false;
        true
    }
    /// Stop tuning.  Entries already written are kept.  The next poll
    /// disconnects the counter and reports [AutotuneEvent::Finished].
    pub fn abort(&mut self) {
        if self.is_running() {
            warn!("autotune: aborted at {:?}", self.state);
            self.state = AutotuneState::Idle;
            self.finishing = true;
        }
    }
    /// The current state
    pub fn state(&self) -> AutotuneState {
        self.state
    }
    /// True while a sweep is in progress (including the final poll that
    /// reports [AutotuneEvent::Finished])
    pub fn is_running(&self) -> bool {
        self.finishing || self.state != AutotuneState::Idle
    }
    /// The oscillator under test, if any
    pub fn oscillator(&self) -> Option<usize> {
        match self.state {
            AutotuneState::Idle => None,
            AutotuneState::Sweeping { osc, .. }
            | AutotuneState::Measuring { osc, .. }
            | AutotuneState::Applying { osc, .. } => Some(osc),
        }
    }
    /// Advance the sweep by (at most) one step.  Never blocks.
    pub fn poll<D: Dco, R: OscRouter, M: FrequencyMeter>(
        &mut self,
        now_ms: u32,
        dco: &mut D,
        router: &mut R,
        meter: &M,
        table: &mut CalibrationTable,
    ) -> Result<Option<AutotuneEvent>, Error<D::Error, R::Error>> {
        match self.state {
            AutotuneState::Idle => {
                if !self.finishing {
                    return Ok(None);
                }
                self.finishing = false;
                router.route(None).map_err(Error::Route)?;
                info!("autotune: finished");
                Ok(Some(AutotuneEvent::Finished))
            }
            AutotuneState::Sweeping { osc, note } => {
                let freq = reference_frequency(note).unwrap_or_default();
                router.route(Some(osc)).map_err(Error::Route)?;
                dco.set_frequency(osc, freq).map_err(Error::Dco)?;
                self.state = AutotuneState::Measuring {
                    osc,
                    note,
                    since: now_ms,
                    settled: false,
                };
                Ok(None)
            }
            AutotuneState::Measuring {
                osc,
                note,
                since,
                settled: false,
            } => {
                if elapsed_ms(now_ms, since) >= self.config.settle_ms {
                    meter.restart();
                    self.state = AutotuneState::Measuring {
                        osc,
                        note,
                        since: now_ms,
                        settled: true,
                    };
                }
                Ok(None)
            }
            AutotuneState::Measuring {
                osc,
                note,
                since,
                settled: true,
            } => {
                if let Some(freq) = meter.take() {
                    self.state = AutotuneState::Applying {
                        osc,
                        note,
                        measured: Some(freq),
                    };
                } else if elapsed_ms(now_ms, since) >= self.config.timeout_ms {
                    self.state = AutotuneState::Applying {
                        osc,
                        note,
                        measured: None,
                    };
                }
                Ok(None)
            }
            AutotuneState::Applying { osc, note, measured } => {
                let event = match measured.and_then(|f| correction(note, f)) {
                    Some(cents) => {
                        table.set(osc, note, cents);
                        AutotuneEvent::Applied { osc, note, cents }
                    }
                    None => {
                        warn!("autotune: no reading for osc {} note {}", osc, note);
                        AutotuneEvent::Skipped { osc, note }
                    }
                };
                self.advance(osc, note);
                Ok(Some(event))
            }
        }
    }
    fn advance(&mut self, osc: usize, note: u8) {
        self.state = if (note as usize) + 1 < NUM_NOTES {
            AutotuneState::Sweeping { osc, note: note + 1 }
        } else if osc < self.last_osc {
            info!("autotune: oscillator {} done", osc);
            AutotuneState::Sweeping {
                osc: osc + 1,
                note: 0,
            }
        } else {
            self.finishing = true;
            AutotuneState::Idle
        };
    }
}

impl Default for Autotune {
    fn default() -> Self {
        Self::new(AutotuneConfig::default())
    }
}

/// The correction for `note`, given the frequency measured when the DCO was
/// set to the note's reference frequency.  `None` for a nonsense reading.
pub fn correction(note: u8, measured: f32) -> Option<i8> {
    let expected = reference_frequency(note)?;
    if !(measured > 0.0) || !measured.is_finite() {
        return None;
    }
    Some(saturate_i8(-calculate_cents(expected, measured)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeDco, FakeMeter, FakeRouter};
    use crate::util::offset_by_cents;

    struct Bench {
        tune: Autotune,
        dco: FakeDco,
        router: FakeRouter,
        meter: FakeMeter,
        table: CalibrationTable,
        now: u32,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                tune: Autotune::default(),
                dco: FakeDco::default(),
                router: FakeRouter::default(),
                meter: FakeMeter::new(),
                table: CalibrationTable::new(),
                now: 0,
            }
        }
        /// Poll until the sweep finishes.  `reading` gives the counter
        /// reading for the frequency the DCO was set to, if any.
        fn run(&mut self, reading: impl Fn(f32) -> Option<f32>) -> std::vec::Vec<AutotuneEvent> {
            let mut events = std::vec::Vec::new();
            for _ in 0..1_000_000 {
                if !self.tune.is_running() {
                    return events;
                }
                if let AutotuneState::Measuring {
                    osc, settled: true, ..
                } = self.tune.state()
                {
                    assert_eq!(self.router.routed, Some(osc));
                    if let Some(f) = self.dco.freqs[osc].and_then(&reading) {
                        self.meter.feed(f);
                    }
                }
                let event = self
                    .tune
                    .poll(
                        self.now,
                        &mut self.dco,
                        &mut self.router,
                        &self.meter,
                        &mut self.table,
                    )
                    .unwrap();
                events.extend(event);
                self.now = self.now.wrapping_add(10);
            }
            panic!("autotune never finished");
        }
    }

    #[test]
    fn in_tune_oscillator_visits_each_note_once() {
        let mut bench = Bench::new();
        assert!(bench.tune.start(3));
        let events = bench.run(Some);
        let mut visited = [0u8; NUM_NOTES];
        for event in events.iter() {
            match *event {
                AutotuneEvent::Applied { osc, note, cents } => {
                    assert_eq!(osc, 3);
                    assert_eq!(cents, 0);
                    visited[note as usize] += 1;
                }
                AutotuneEvent::Finished => {}
                AutotuneEvent::Skipped { .. } => panic!("unexpected skip"),
            }
        }
        assert!(visited.iter().all(|n| *n == 1));
        assert_eq!(events.last(), Some(&AutotuneEvent::Finished));
        assert_eq!(bench.tune.state(), AutotuneState::Idle);
        assert_eq!(bench.router.routed, None);
        assert_eq!(bench.meter.restarts.get(), NUM_NOTES);
    }
    #[test]
    fn flat_oscillator_gets_positive_correction() {
        let mut bench = Bench::new();
        bench.tune.start(0);
        bench.run(|f| Some(offset_by_cents(f, -10.0)));
        assert_eq!(bench.table.get(0, 60), Some(10));
        assert_eq!(bench.table.get(0, 127), Some(10));
        assert_eq!(bench.table.get(1, 60), Some(0));
    }
    #[test]
    fn corrections_saturate() {
        let mut bench = Bench::new();
        bench.tune.start(1);
        bench.run(|f| Some(f / 2.0));
        assert_eq!(bench.table.get(1, 40), Some(i8::MAX));
        assert_eq!(correction(40, 0.0), None);
        assert_eq!(correction(40, f32::NAN), None);
    }
    #[test]
    fn timeouts_skip_and_terminate() {
        let mut bench = Bench::new();
        bench.table.set(5, 20, 7);
        bench.tune.start(5);
        let events = bench.run(|_| None);
        let skipped = events
            .iter()
            .filter(|e| matches!(e, AutotuneEvent::Skipped { osc: 5, .. }))
            .count();
        assert_eq!(skipped, NUM_NOTES);
        assert_eq!(bench.table.get(5, 20), Some(7));
        assert_eq!(bench.tune.state(), AutotuneState::Idle);
    }
    #[test]
    fn single_timeout_in_sweep() {
        let mut bench = Bench::new();
        let missing = reference_frequency(64).unwrap();
        bench.table.set(4, 64, -9);
        bench.tune.start(4);
        let events = bench.run(|f| (f != missing).then_some(f));
        let applied = events
            .iter()
            .filter(|e| matches!(e, AutotuneEvent::Applied { osc: 4, .. }))
            .count();
        assert_eq!(applied, NUM_NOTES - 1);
        let skipped: std::vec::Vec<_> = events
            .iter()
            .filter(|e| matches!(e, AutotuneEvent::Skipped { .. }))
            .collect();
        assert_eq!(skipped, [&AutotuneEvent::Skipped { osc: 4, note: 64 }]);
        assert_eq!(bench.table.get(4, 64), Some(-9));
        assert_eq!(bench.table.get(4, 65), Some(0));
        assert_eq!(events.last(), Some(&AutotuneEvent::Finished));
        assert_eq!(bench.tune.state(), AutotuneState::Idle);
    }
    #[test]
    fn failed_disconnect_still_stops() {
        let mut bench = Bench::new();
        bench.tune.start(2);
        bench.router.fail_disconnect = true;
        for _ in 0..20 {
            bench
                .tune
                .poll(0, &mut bench.dco, &mut bench.router, &bench.meter, &mut bench.table)
                .unwrap();
        }
        bench.tune.abort();
        let result = bench
            .tune
            .poll(0, &mut bench.dco, &mut bench.router, &bench.meter, &mut bench.table);
        assert_eq!(result, Err(Error::Route(())));
        // nothing left to report, the caller cleans up from the error
        assert!(!bench.tune.is_running());
        let result = bench
            .tune
            .poll(0, &mut bench.dco, &mut bench.router, &bench.meter, &mut bench.table);
        assert_eq!(result, Ok(None));
    }
    #[test]
    fn full_sweep_covers_every_oscillator() {
        let mut bench = Bench::new();
        bench.tune.start_all();
        let events = bench.run(|f| Some(offset_by_cents(f, 3.0)));
        let applied = events
            .iter()
            .filter(|e| matches!(e, AutotuneEvent::Applied { cents: -3, .. }))
            .count();
        assert_eq!(applied, NUM_VOICES * NUM_NOTES);
    }
    #[test]
    fn abort_disconnects_counter() {
        let mut bench = Bench::new();
        assert!(!bench.tune.start(NUM_VOICES));
        bench.tune.start(2);
        for _ in 0..20 {
            bench
                .tune
                .poll(0, &mut bench.dco, &mut bench.router, &bench.meter, &mut bench.table)
                .unwrap();
        }
        assert_eq!(bench.router.routed, Some(2));
        bench.tune.abort();
        assert!(bench.tune.is_running());
        let event = bench
            .tune
            .poll(0, &mut bench.dco, &mut bench.router, &bench.meter, &mut bench.table)
            .unwrap();
        assert_eq!(event, Some(AutotuneEvent::Finished));
        assert_eq!(bench.router.routed, None);
        assert!(!bench.tune.is_running());
    }
}
