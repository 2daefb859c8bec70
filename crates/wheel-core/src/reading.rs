use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    Front,
    Rear,
}

impl fmt::Display for Wheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Front => f.write_str("front"),
            Self::Rear => f.write_str("rear"),
        }
    }
}

/// Cumulative edge count observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorSample {
    pub timestamp_ms: u64,
    pub edge_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpmReading {
    pub wheel: Wheel,
    pub rpm: f64,
    pub sampled_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaReading {
    pub front: RpmReading,
    pub rear: RpmReading,
}

impl DeltaReading {
    /// Front minus rear; positive while the front wheel turns faster.
    pub fn delta(&self) -> f64 {
        self.front.rpm - self.rear.rpm
    }
}

/// One wheel's contribution to a tick. `count` is `None` for sources that
/// never see individual edges.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelSample {
    pub count: Option<u64>,
    pub rpm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickRecord {
    pub wall_time: DateTime<Local>,
    pub front: WheelSample,
    pub rear: WheelSample,
    pub reading: DeltaReading,
}

impl TickRecord {
    pub fn new(wall_time: DateTime<Local>, now_ms: u64, front: WheelSample, rear: WheelSample) -> Self {
        Self {
            wall_time,
            front,
            rear,
            reading: DeltaReading {
                front: RpmReading {
                    wheel: Wheel::Front,
                    rpm: front.rpm,
                    sampled_at_ms: now_ms,
                },
                rear: RpmReading {
                    wheel: Wheel::Rear,
                    rpm: rear.rpm,
                    sampled_at_ms: now_ms,
                },
            },
        }
    }
}
