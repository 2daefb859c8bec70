use crate::format::LineFormat;
use crate::reading::TickRecord;
use crate::sink::OutputSink;
use crate::source::WheelSource;
use crate::timebase::TimeBase;
use chrono::{DateTime, Local};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep, so a stop request is seen promptly.
const STOP_POLL: Duration = Duration::from_millis(100);

/// When a tick is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionPolicy {
    /// Whenever either wheel turns.
    #[default]
    AlwaysIfMoving,
    /// Whenever either wheel turns and the pair differs from the previous
    /// tick. A constant speed is written once, then stays silent.
    ChangeGated,
    /// Every tick, stopped or not.
    EveryTick,
}

#[derive(Debug, Clone)]
pub struct EmissionGate {
    policy: EmissionPolicy,
    previous: Option<(f64, f64)>,
}

impl EmissionGate {
    pub fn new(policy: EmissionPolicy) -> Self {
        Self {
            policy,
            previous: None,
        }
    }

    /// The previous pair is tracked on every call, emitted or not.
    pub fn should_emit(&mut self, front: f64, rear: f64) -> bool {
        let moving = front > 0.0 || rear > 0.0;
        let changed = match self.previous {
            Some((prev_front, prev_rear)) => front != prev_front || rear != prev_rear,
            None => true,
        };
        self.previous = Some((front, rear));

        match self.policy {
            EmissionPolicy::AlwaysIfMoving => moving,
            EmissionPolicy::ChangeGated => moving && changed,
            EmissionPolicy::EveryTick => true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SamplerConfig {
    pub tick: Duration,
    pub emission: EmissionPolicy,
    pub format: LineFormat,
    /// Repeat the header after this many data lines.
    pub header_every: Option<u32>,
}

impl SamplerConfig {
    /// Longest supported tick; longer intervals are clamped.
    pub const MAX_TICK: Duration = Duration::from_secs(3600);
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1000),
            emission: EmissionPolicy::AlwaysIfMoving,
            format: LineFormat::default(),
            header_every: None,
        }
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub emissions: u64,
    pub overruns: u64,
    pub sink_failures: u64,
}

/// Periodic driver: samples both wheels, derives the delta, and writes
/// the lines the emission policy lets through.
pub struct SamplingLoop<S: OutputSink> {
    front: WheelSource,
    rear: WheelSource,
    sink: S,
    config: SamplerConfig,
    gate: EmissionGate,
    stats: SamplerStats,
    lines_since_header: u32,
    timebase: TimeBase,
}

impl<S: OutputSink> SamplingLoop<S> {
    pub fn new(
        front: WheelSource,
        rear: WheelSource,
        sink: S,
        mut config: SamplerConfig,
        timebase: TimeBase,
    ) -> Self {
        if config.tick > SamplerConfig::MAX_TICK {
            warn!(
                "tick of {:?} clamped to {:?}",
                config.tick,
                SamplerConfig::MAX_TICK
            );
            config.tick = SamplerConfig::MAX_TICK;
        }
        let gate = EmissionGate::new(config.emission);
        Self {
            front,
            rear,
            sink,
            config,
            gate,
            stats: SamplerStats::default(),
            lines_since_header: 0,
            timebase,
        }
    }

    pub fn run(&mut self, stop: &AtomicBool) {
        self.write_header();

        let mut next_tick = Instant::now() + self.config.tick;
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now < next_tick {
                thread::sleep((next_tick - now).min(STOP_POLL));
                continue;
            }
            if now.duration_since(next_tick) >= self.config.tick {
                self.stats.overruns += 1;
                debug!("sampling overrun by {:?}, resyncing", now - next_tick);
                next_tick = now;
            }

            let now_ms = self.timebase.now_ms();
            let wall = self.timebase.wall_clock();
            self.tick(now_ms, wall);

            next_tick += self.config.tick;
        }
    }

    /// One sampling step. Returns the record if it was written out.
    pub fn tick(&mut self, now_ms: u64, wall: DateTime<Local>) -> Option<TickRecord> {
        let front = self.front.sample(now_ms);
        let rear = self.rear.sample(now_ms);
        self.stats.ticks += 1;

        if !self.gate.should_emit(front.rpm, rear.rpm) {
            return None;
        }

        let record = TickRecord::new(wall, now_ms, front, rear);
        self.emit(&record);
        Some(record)
    }

    pub fn write_header(&mut self) {
        let header = self.config.format.header();
        if let Err(e) = self.sink.write_header(&header) {
            self.stats.sink_failures += 1;
            warn!("failed to write header: {}", e);
        }
        self.lines_since_header = 0;
    }

    fn emit(&mut self, record: &TickRecord) {
        if let Some(every) = self.config.header_every {
            if every > 0 && self.lines_since_header >= every {
                self.write_header();
            }
        }

        let line = self.config.format.line(record);
        match self.sink.write_line(&line) {
            Ok(()) => {
                self.stats.emissions += 1;
                self.lines_since_header += 1;
            }
            Err(e) => {
                self.stats.sink_failures += 1;
                warn!("failed to write sample line: {}", e);
            }
        }
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

}
