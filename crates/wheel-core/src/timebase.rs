use chrono::{DateTime, Local};
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Monotonic milliseconds since start.
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Local wall-clock time, for rendering only.
    pub fn wall_clock(&self) -> DateTime<Local> {
        Local::now()
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}
