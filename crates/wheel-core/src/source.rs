use crate::calculator::{CountRpmCalculator, FrequencyRpmCalculator, PulseIntervalCalculator};
use crate::counter::{spawn_edge_reader, EdgeCounter, EdgePolarity, ReaderStats};
use crate::hal::{Board, CaptureConfig, FrequencyCapture, HalError, PinBias};
use crate::reading::{SensorSample, Wheel, WheelSample};
use crate::timebase::TimeBase;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

/// How a wheel's speed is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acquisition {
    /// Count edges and divide by the sampling interval.
    #[default]
    EdgeCount,
    /// Count edges and divide by the time between the last edges.
    PulseInterval,
    /// Read the frequency from a hardware capture channel.
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelConfig {
    pub pin: u8,
    pub bias: PinBias,
    pub polarity: EdgePolarity,
    pub capture: CaptureConfig,
}

impl WheelConfig {
    pub const FRONT_PIN: u8 = 11;
    pub const REAR_PIN: u8 = 13;

    pub fn on_pin(pin: u8) -> Self {
        Self {
            pin,
            bias: PinBias::PullUp,
            polarity: EdgePolarity::Rising,
            capture: CaptureConfig::default(),
        }
    }

    pub fn front() -> Self {
        Self::on_pin(Self::FRONT_PIN)
    }

    pub fn rear() -> Self {
        Self::on_pin(Self::REAR_PIN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigConfig {
    pub acquisition: Acquisition,
    pub front: WheelConfig,
    pub rear: WheelConfig,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            acquisition: Acquisition::EdgeCount,
            front: WheelConfig::front(),
            rear: WheelConfig::rear(),
        }
    }
}

impl RigConfig {
    pub fn wheel(&self, wheel: Wheel) -> &WheelConfig {
        match wheel {
            Wheel::Front => &self.front,
            Wheel::Rear => &self.rear,
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Hal(#[from] HalError),
    #[error("failed to start edge reader: {0}")]
    Spawn(#[from] io::Error),
}

/// Per-wheel speed source, fixed at configuration time.
pub enum WheelSource {
    EdgeCount {
        counter: EdgeCounter,
        calculator: CountRpmCalculator,
    },
    PulseInterval {
        counter: EdgeCounter,
        calculator: PulseIntervalCalculator,
    },
    Frequency(FrequencyRpmCalculator<Box<dyn FrequencyCapture>>),
    /// The sensor could not be opened; reads as a stopped wheel. The count
    /// column stays empty when the rest of the rig never reports counts.
    Offline { reports_count: bool },
}

impl WheelSource {
    pub fn edge_count(counter: EdgeCounter, start_ms: u64) -> Self {
        Self::EdgeCount {
            counter,
            calculator: CountRpmCalculator::new(start_ms),
        }
    }

    pub fn pulse_interval(counter: EdgeCounter) -> Self {
        Self::PulseInterval {
            counter,
            calculator: PulseIntervalCalculator::new(),
        }
    }

    pub fn frequency(capture: Box<dyn FrequencyCapture>) -> Self {
        Self::Frequency(FrequencyRpmCalculator::new(capture))
    }

    /// Stand-in for a wheel whose sensor failed to open under `acquisition`.
    pub fn offline(acquisition: Acquisition) -> Self {
        Self::Offline {
            reports_count: acquisition != Acquisition::Frequency,
        }
    }

    pub fn sample(&mut self, now_ms: u64) -> WheelSample {
        match self {
            Self::EdgeCount {
                counter,
                calculator,
            } => {
                let sample = SensorSample {
                    timestamp_ms: now_ms,
                    edge_count: counter.count(),
                };
                WheelSample {
                    count: Some(sample.edge_count),
                    rpm: calculator.apply(sample),
                }
            }
            Self::PulseInterval {
                counter,
                calculator,
            } => {
                let snapshot = counter.snapshot();
                WheelSample {
                    count: Some(snapshot.count),
                    rpm: calculator.update(snapshot),
                }
            }
            Self::Frequency(calculator) => WheelSample {
                count: None,
                rpm: calculator.read(),
            },
            Self::Offline { reports_count } => WheelSample {
                count: reports_count.then_some(0),
                rpm: 0.0,
            },
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EdgeCount { .. } => "edge_count",
            Self::PulseInterval { .. } => "pulse_interval",
            Self::Frequency(_) => "frequency",
            Self::Offline { .. } => "offline",
        }
    }
}

impl fmt::Debug for WheelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WheelSource").field(&self.kind()).finish()
    }
}

/// An opened wheel plus its edge reader thread, if it has one.
#[derive(Debug)]
pub struct WheelHandle {
    pub wheel: Wheel,
    pub source: WheelSource,
    pub reader: Option<JoinHandle<ReaderStats>>,
}

/// Opens one wheel's sensor. A sensor that fails to open leaves the wheel
/// [`WheelSource::Offline`] instead of failing the whole rig.
pub fn open_wheel(
    board: &mut dyn Board,
    wheel: Wheel,
    acquisition: Acquisition,
    config: &WheelConfig,
    timebase: TimeBase,
    stop: &Arc<AtomicBool>,
) -> WheelHandle {
    match try_open_wheel(board, wheel, acquisition, config, timebase, stop) {
        Ok(handle) => {
            info!(
                "{} wheel sensor on pin {} ready ({})",
                wheel,
                config.pin,
                handle.source.kind()
            );
            handle
        }
        Err(e) => {
            error!(
                "{} wheel sensor on pin {} unavailable, running degraded: {}",
                wheel, config.pin, e
            );
            WheelHandle {
                wheel,
                source: WheelSource::offline(acquisition),
                reader: None,
            }
        }
    }
}

fn try_open_wheel(
    board: &mut dyn Board,
    wheel: Wheel,
    acquisition: Acquisition,
    config: &WheelConfig,
    timebase: TimeBase,
    stop: &Arc<AtomicBool>,
) -> Result<WheelHandle, SourceError> {
    if acquisition == Acquisition::Frequency {
        let capture = board.open_capture(config.pin, config.capture)?;
        return Ok(WheelHandle {
            wheel,
            source: WheelSource::frequency(capture),
            reader: None,
        });
    }

    let input = board.open_input(config.pin, config.bias)?;
    let start_ms = timebase.now_ms();
    let (counter, reader) = spawn_edge_reader(
        &wheel.to_string(),
        input,
        config.polarity,
        timebase,
        Arc::clone(stop),
    )?;
    let source = match acquisition {
        Acquisition::PulseInterval => WheelSource::pulse_interval(counter),
        _ => WheelSource::edge_count(counter, start_ms),
    };
    Ok(WheelHandle {
        wheel,
        source,
        reader: Some(reader),
    })
}
