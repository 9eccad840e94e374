//! This module provides the fixed configuration of the board: clock rates and
//! the handful of timing constants the control loop works to.  Unlike the
//! [crate::storage::Settings], none of this is user-editable or persisted.

/// Timing and clock configuration for one board
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoardConfig {
    /// The master clock of the AD9833 DDS chips, in Hz
    pub mclk_hz: u32,
    /// The width of the trigger pulse sent on note on, in milliseconds
    pub trigger_ms: u32,
    /// Autotune timing
    pub autotune: AutotuneConfig,
    /// Frequency counter configuration
    pub capture: CaptureConfig,
}

impl BoardConfig {
    /// The stock board: 25MHz DDS clock, 20ms triggers
    pub const fn new() -> Self {
        Self {
            mclk_hz: 25_000_000,
            trigger_ms: 20,
            autotune: AutotuneConfig::new(),
            capture: CaptureConfig::new_1mhz(),
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing used by the autotune sweep
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutotuneConfig {
    /// How long to let an oscillator settle after retuning it before
    /// measuring, in milliseconds
    pub settle_ms: u32,
    /// How long to wait for the frequency counter before giving up on a note,
    /// in milliseconds (measured after settling)
    pub timeout_ms: u32,
}

impl AutotuneConfig {
    /// Default autotune timing.  The timeout is long enough to see two full
    /// periods of the lowest note in the table (~4Hz).
    pub const fn new() -> Self {
        Self {
            settle_ms: 50,
            timeout_ms: 1000,
        }
    }
}

impl Default for AutotuneConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration of the edge-counting frequency counter
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureConfig {
    /// The rate of the timebase used to timestamp edges, in Hz
    pub tick_hz: u32,
    /// The minimum span of a measurement, in ticks of the timebase.  Higher
    /// values give more resolution at the cost of slower measurement.
    pub gate_ticks: u32,
}

impl CaptureConfig {
    /// A 1MHz (microsecond) timebase with a 100ms gate
    pub const fn new_1mhz() -> Self {
        Self {
            tick_hz: 1_000_000,
            gate_ticks: 100_000,
        }
    }
    /// Create a counter configuration if `tick_hz` can resolve the top of the
    /// note table (~6.3kHz) to better than 1 cent over the gate time
    pub fn maybe_create(tick_hz: u32, gate_ticks: u32) -> Option<Self> {
        // 1 cent is ~1/1731 of the frequency, so we need that many ticks
        // in the gate at minimum
        if tick_hz == 0 || gate_ticks < 1731 {
            None
        } else {
            Some(Self {
                tick_hz,
                gate_ticks,
            })
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::new_1mhz()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BoardConfig::default();
        assert_eq!(config.mclk_hz, 25_000_000);
        assert_eq!(config.trigger_ms, 20);
        assert!(config.autotune.timeout_ms > config.autotune.settle_ms);
    }
    #[test]
    fn capture_validation() {
        assert!(CaptureConfig::maybe_create(0, 100_000).is_none());
        assert!(CaptureConfig::maybe_create(1_000_000, 100).is_none());
        assert_eq!(
            CaptureConfig::maybe_create(1_000_000, 100_000),
            Some(CaptureConfig::new_1mhz())
        );
    }
}
