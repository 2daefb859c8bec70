use crate::hal::PulseInput;
use crate::sync::{EdgeCell, EdgeSnapshot};
use crate::timebase::TimeBase;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound on a single blocking wait, so the stop flag is honoured.
const WAIT_SLICE: Duration = Duration::from_millis(100);
const ERROR_LOG_EVERY: u64 = 1000;

/// Which transition of the pickup signal is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolarity {
    /// Count as the magnet leaves the pickup (line returns high).
    #[default]
    Rising,
    /// Count as the magnet arrives (line pulled low).
    Falling,
}

impl EdgePolarity {
    /// Level to wait for before counting, then the level that re-arms.
    fn levels(self) -> (bool, bool) {
        match self {
            Self::Rising => (true, false),
            Self::Falling => (false, true),
        }
    }
}

/// Read side of one wheel's edge count.
#[derive(Debug, Clone)]
pub struct EdgeCounter {
    cell: Arc<EdgeCell>,
}

impl EdgeCounter {
    pub fn new(cell: Arc<EdgeCell>) -> Self {
        Self { cell }
    }

    pub fn count(&self) -> u64 {
        self.cell.read().count
    }

    pub fn snapshot(&self) -> EdgeSnapshot {
        self.cell.read()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub edges: u64,
    pub wait_errors: u64,
}

/// Spawns a thread that counts edges on `input` until `stop` is set.
///
/// The input is dropped, releasing the pin, when the thread exits.
pub fn spawn_edge_reader<I>(
    name: &str,
    input: I,
    polarity: EdgePolarity,
    timebase: TimeBase,
    stop: Arc<AtomicBool>,
) -> io::Result<(EdgeCounter, JoinHandle<ReaderStats>)>
where
    I: PulseInput + 'static,
{
    let cell = Arc::new(EdgeCell::new());
    let writer = Arc::clone(&cell);
    let handle = thread::Builder::new()
        .name(format!("edges-{name}"))
        .spawn(move || {
            let mut input = input;
            count_edges(&mut input, polarity, &writer, timebase, &stop)
        })?;
    Ok((EdgeCounter::new(cell), handle))
}

/// Counts one edge per revolution into `cell`; returns when `stop` is set.
///
/// The line is first seen at the re-arm level, so the first count is a real
/// transition rather than the level the pickup happened to rest at.
pub fn count_edges<I: PulseInput>(
    input: &mut I,
    polarity: EdgePolarity,
    cell: &EdgeCell,
    timebase: TimeBase,
    stop: &AtomicBool,
) -> ReaderStats {
    let (arm, rearm) = polarity.levels();
    let mut stats = ReaderStats::default();

    // A pickup already resting at the arm level has not passed an edge yet.
    if wait_level(input, rearm, stop, &mut stats) {
        count_transitions(input, arm, rearm, cell, timebase, stop, &mut stats);
    }

    debug!(
        "edge reader stopped after {} edges ({} wait errors)",
        stats.edges, stats.wait_errors
    );
    stats
}

fn count_transitions<I: PulseInput>(
    input: &mut I,
    arm: bool,
    rearm: bool,
    cell: &EdgeCell,
    timebase: TimeBase,
    stop: &AtomicBool,
    stats: &mut ReaderStats,
) {
    loop {
        if !wait_level(input, arm, stop, stats) {
            return;
        }
        stats.edges += 1;
        cell.publish(EdgeSnapshot {
            count: stats.edges,
            last_edge_us: timebase.now_us(),
        });
        if !wait_level(input, rearm, stop, stats) {
            return;
        }
    }
}

/// Returns `false` once `stop` is observed.
fn wait_level<I: PulseInput>(
    input: &mut I,
    high: bool,
    stop: &AtomicBool,
    stats: &mut ReaderStats,
) -> bool {
    while !stop.load(Ordering::Relaxed) {
        match input.wait_for_level(high, WAIT_SLICE) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                stats.wait_errors += 1;
                if stats.wait_errors == 1 || stats.wait_errors % ERROR_LOG_EVERY == 0 {
                    warn!("edge wait failed ({} so far): {}", stats.wait_errors, e);
                }
                thread::yield_now();
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::HalError;
    use std::collections::VecDeque;

    /// Replays a fixed list of wait outcomes, then raises the stop flag.
    struct ScriptedInput {
        script: VecDeque<Result<bool, HalError>>,
        levels: Vec<bool>,
        stop: Arc<AtomicBool>,
    }

    impl PulseInput for ScriptedInput {
        fn wait_for_level(&mut self, high: bool, _timeout: Duration) -> Result<bool, HalError> {
            self.levels.push(high);
            match self.script.pop_front() {
                Some(outcome) => outcome,
                None => {
                    self.stop.store(true, Ordering::Relaxed);
                    Ok(false)
                }
            }
        }
    }

    fn scripted(script: Vec<Result<bool, HalError>>) -> (ScriptedInput, Arc<AtomicBool>) {
        let stop = Arc::new(AtomicBool::new(false));
        let input = ScriptedInput {
            script: script.into(),
            levels: Vec::new(),
            stop: Arc::clone(&stop),
        };
        (input, stop)
    }

    #[test]
    fn rising_polarity_counts_low_to_high() {
        let (mut input, stop) = scripted(vec![Ok(true), Ok(true), Ok(true), Ok(true), Ok(true)]);
        let cell = EdgeCell::new();
        let stats = count_edges(&mut input, EdgePolarity::Rising, &cell, TimeBase::new(), &stop);
        assert_eq!(stats.edges, 2);
        assert_eq!(cell.read().count, 2);
        assert_eq!(&input.levels[..5], &[false, true, false, true, false]);
    }

    #[test]
    fn falling_polarity_counts_high_to_low() {
        let (mut input, stop) = scripted(vec![Ok(true), Ok(true), Ok(true)]);
        let cell = EdgeCell::new();
        let stats = count_edges(&mut input, EdgePolarity::Falling, &cell, TimeBase::new(), &stop);
        assert_eq!(stats.edges, 1);
        assert_eq!(&input.levels[..3], &[true, false, true]);
    }

    #[test]
    fn resting_at_arm_level_is_not_an_edge() {
        // Pulled-up pickup parked away from the magnet: high is immediate,
        // low never comes.
        let (mut input, stop) = scripted(vec![Ok(false), Ok(false), Ok(false)]);
        let cell = EdgeCell::new();
        let stats = count_edges(&mut input, EdgePolarity::Rising, &cell, TimeBase::new(), &stop);
        assert_eq!(stats.edges, 0);
        assert_eq!(cell.read(), EdgeSnapshot::default());
        assert!(input.levels.iter().all(|high| !high));
    }

    #[test]
    fn timeouts_and_errors_do_not_count() {
        let (mut input, stop) = scripted(vec![
            Ok(false),
            Err(HalError::ConnectionLost),
            Ok(true),
            Err(HalError::ConnectionLost),
            Ok(true),
        ]);
        let cell = EdgeCell::new();
        let stats = count_edges(&mut input, EdgePolarity::Rising, &cell, TimeBase::new(), &stop);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.wait_errors, 2);
    }

    #[test]
    fn preset_stop_counts_nothing() {
        let (mut input, stop) = scripted(vec![Ok(true)]);
        stop.store(true, Ordering::Relaxed);
        let cell = EdgeCell::new();
        let stats = count_edges(&mut input, EdgePolarity::Rising, &cell, TimeBase::new(), &stop);
        assert_eq!(stats, ReaderStats::default());
        assert!(input.levels.is_empty());
    }

    #[cfg(feature = "simulation")]
    #[test]
    fn counts_one_edge_per_simulated_revolution() {
        use crate::hal::{Board, PinBias};
        use crate::hal_sim::SimulatedBoard;

        // 1200 rpm = 20 revolutions per second.
        let mut board = SimulatedBoard::new().with_wheel(11, 1200.0);
        let input = board.open_input(11, PinBias::PullUp).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let (counter, handle) =
            spawn_edge_reader("front", input, EdgePolarity::Falling, TimeBase::new(), Arc::clone(&stop))
                .unwrap();

        thread::sleep(Duration::from_millis(500));
        stop.store(true, Ordering::Relaxed);
        let stats = handle.join().unwrap();

        assert!((8..=11).contains(&stats.edges), "edges = {}", stats.edges);
        assert_eq!(counter.count(), stats.edges);
        assert!(!board.is_open(11), "pin released on exit");
    }

    #[cfg(feature = "simulation")]
    #[test]
    fn rising_polarity_counts_one_edge_per_simulated_revolution() {
        use crate::hal::{Board, PinBias};
        use crate::hal_sim::SimulatedBoard;

        let mut board = SimulatedBoard::new().with_wheel(13, 1200.0);
        let input = board.open_input(13, PinBias::PullUp).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let (counter, handle) =
            spawn_edge_reader("rear", input, EdgePolarity::Rising, TimeBase::new(), Arc::clone(&stop))
                .unwrap();

        thread::sleep(Duration::from_millis(500));
        stop.store(true, Ordering::Relaxed);
        let stats = handle.join().unwrap();

        assert!((8..=11).contains(&stats.edges), "edges = {}", stats.edges);
        assert_eq!(counter.count(), stats.edges);
        assert!(!board.is_open(13));
    }

    #[cfg(feature = "simulation")]
    #[test]
    fn stopped_simulated_wheel_counts_nothing() {
        use crate::hal::{Board, PinBias};
        use crate::hal_sim::SimulatedBoard;

        for polarity in [EdgePolarity::Rising, EdgePolarity::Falling] {
            let mut board = SimulatedBoard::new().with_wheel(11, 0.0);
            let input = board.open_input(11, PinBias::PullUp).unwrap();
            let stop = Arc::new(AtomicBool::new(false));
            let (counter, handle) =
                spawn_edge_reader("front", input, polarity, TimeBase::new(), Arc::clone(&stop))
                    .unwrap();

            thread::sleep(Duration::from_millis(250));
            assert_eq!(counter.count(), 0, "{polarity:?}");
            stop.store(true, Ordering::Relaxed);
            assert_eq!(handle.join().unwrap().edges, 0);
        }
    }
}
