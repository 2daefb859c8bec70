use crate::hal::FrequencyCapture;
use crate::reading::SensorSample;
use crate::sync::EdgeSnapshot;
use log::debug;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// RPM from the change in cumulative edge count between two calls.
///
/// Zero elapsed time is not guarded: the division yields `+inf`, `-inf` or
/// `NaN` exactly as IEEE-754 defines it, and that value is passed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRpmCalculator {
    last_timestamp_ms: u64,
    last_edge_count: u64,
}

impl CountRpmCalculator {
    /// Seeds the state with the construction time and a zero count.
    pub fn new(start_ms: u64) -> Self {
        Self {
            last_timestamp_ms: start_ms,
            last_edge_count: 0,
        }
    }

    pub fn update(&mut self, now_ms: u64, current_count: u64) -> f64 {
        // Differences in f64 so an out-of-order call cannot overflow.
        let elapsed_ms = now_ms as f64 - self.last_timestamp_ms as f64;
        let revolutions = current_count as f64 - self.last_edge_count as f64;
        self.last_timestamp_ms = now_ms;
        self.last_edge_count = current_count;

        let seconds = elapsed_ms / 1000.0;
        revolutions / seconds * 60.0
    }

    pub fn apply(&mut self, sample: SensorSample) -> f64 {
        self.update(sample.timestamp_ms, sample.edge_count)
    }

    pub fn last_sample(&self) -> SensorSample {
        SensorSample {
            timestamp_ms: self.last_timestamp_ms,
            edge_count: self.last_edge_count,
        }
    }
}

/// RPM from the time between the last counted edges of consecutive samples.
///
/// Resolution is the edge timestamp, not the sampling tick, so it stays
/// accurate at low speed. Reads `0.0` until a reference edge has been seen,
/// and whenever no edge arrived since the previous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseIntervalCalculator {
    last: EdgeSnapshot,
}

impl PulseIntervalCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, snapshot: EdgeSnapshot) -> f64 {
        let edges = snapshot.count.saturating_sub(self.last.count);
        let span_us = snapshot.last_edge_us.saturating_sub(self.last.last_edge_us);
        let has_reference = self.last.count > 0;
        self.last = snapshot;
        if !has_reference {
            return 0.0;
        }
        rpm_from_pulse_interval(edges, span_us)
    }
}

/// One pulse per revolution: `edges` revolutions took `span_us` microseconds.
pub fn rpm_from_pulse_interval(edges: u64, span_us: u64) -> f64 {
    if edges == 0 || span_us <= 1 {
        return 0.0;
    }
    let average_pulse_us = span_us as f64 / edges as f64;
    MICROS_PER_MINUTE / average_pulse_us
}

/// RPM straight from a hardware capture channel; a failed read counts as a
/// stopped wheel for that sample.
#[derive(Debug)]
pub struct FrequencyRpmCalculator<C: FrequencyCapture> {
    capture: C,
}

impl<C: FrequencyCapture> FrequencyRpmCalculator<C> {
    pub fn new(capture: C) -> Self {
        Self { capture }
    }

    pub fn read(&mut self) -> f64 {
        match self.capture.frequency_hz() {
            Ok(hz) => hz * 60.0,
            Err(e) => {
                debug!("frequency read failed, reporting 0 rpm: {}", e);
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::HalError;

    struct FixedCapture(Result<f64, HalError>);

    impl FrequencyCapture for FixedCapture {
        fn frequency_hz(&mut self) -> Result<f64, HalError> {
            self.0.clone()
        }
    }

    #[test]
    fn rpm_from_count_and_elapsed_time() {
        let mut calc = CountRpmCalculator::new(0);
        assert_eq!(calc.update(1000, 10), 600.0);
        assert_eq!(calc.update(1500, 15), 600.0);
        assert_eq!(calc.update(3500, 16), 30.0);
    }

    #[test]
    fn repeating_a_count_reads_zero() {
        let mut calc = CountRpmCalculator::new(0);
        calc.update(1000, 10);
        assert_eq!(calc.update(2000, 10), 0.0);
    }

    #[test]
    fn repeating_a_call_exactly_reads_nan() {
        let mut calc = CountRpmCalculator::new(0);
        calc.update(1000, 10);
        assert!(calc.update(1000, 10).is_nan());
    }

    #[test]
    fn zero_elapsed_with_new_edges_is_infinite() {
        let mut calc = CountRpmCalculator::new(0);
        calc.update(1000, 10);
        assert_eq!(calc.update(1000, 12), f64::INFINITY);
    }

    #[test]
    fn state_advances_even_on_degenerate_input() {
        let mut calc = CountRpmCalculator::new(500);
        calc.update(500, 4);
        assert_eq!(
            calc.last_sample(),
            SensorSample {
                timestamp_ms: 500,
                edge_count: 4
            }
        );
        assert_eq!(calc.update(1500, 14), 600.0);
    }

    #[test]
    fn backwards_inputs_do_not_panic() {
        let mut calc = CountRpmCalculator::new(1000);
        calc.update(2000, 10);
        assert_eq!(calc.update(1000, 5), 300.0);
    }

    #[test]
    fn apply_matches_update() {
        let mut a = CountRpmCalculator::new(0);
        let mut b = CountRpmCalculator::new(0);
        let sample = SensorSample {
            timestamp_ms: 2000,
            edge_count: 30,
        };
        assert_eq!(a.apply(sample), b.update(2000, 30));
    }

    #[test]
    fn pulse_interval_uses_edge_timestamps() {
        let mut calc = PulseIntervalCalculator::new();
        calc.update(EdgeSnapshot {
            count: 1,
            last_edge_us: 250_000,
        });
        let rpm = calc.update(EdgeSnapshot {
            count: 11,
            last_edge_us: 1_250_000,
        });
        assert_eq!(rpm, 600.0);
    }

    #[test]
    fn first_edge_only_sets_the_reference() {
        let mut calc = PulseIntervalCalculator::new();
        let rpm = calc.update(EdgeSnapshot {
            count: 1,
            last_edge_us: 40_000,
        });
        assert_eq!(rpm, 0.0);
    }

    #[test]
    fn pulse_interval_without_new_edges_is_zero() {
        let mut calc = PulseIntervalCalculator::new();
        let snapshot = EdgeSnapshot {
            count: 5,
            last_edge_us: 900_000,
        };
        calc.update(snapshot);
        assert_eq!(calc.update(snapshot), 0.0);
    }

    #[test]
    fn pulse_interval_ignores_sub_microsecond_span() {
        assert_eq!(rpm_from_pulse_interval(3, 1), 0.0);
        assert_eq!(rpm_from_pulse_interval(0, 1_000_000), 0.0);
        assert_eq!(rpm_from_pulse_interval(2, 1_000_000), 120.0);
    }

    #[test]
    fn frequency_is_scaled_to_rpm() {
        let mut calc = FrequencyRpmCalculator::new(FixedCapture(Ok(12.5)));
        assert_eq!(calc.read(), 750.0);
    }

    #[test]
    fn failed_frequency_read_coasts_to_zero() {
        let mut calc = FrequencyRpmCalculator::new(FixedCapture(Err(HalError::NotReady { pin: 13 })));
        assert_eq!(calc.read(), 0.0);
        assert_eq!(calc.read(), 0.0);
    }
}
