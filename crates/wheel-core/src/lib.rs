pub mod calculator;
pub mod counter;
pub mod format;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod reading;
pub mod sampler;
pub mod sink;
pub mod source;
pub mod sync;
pub mod timebase;

pub use calculator::{CountRpmCalculator, FrequencyRpmCalculator, PulseIntervalCalculator};
pub use counter::{spawn_edge_reader, EdgeCounter, EdgePolarity, ReaderStats};
pub use format::{Field, LineFormat, Precision};
pub use hal::{Board, CaptureConfig, FrequencyCapture, HalError, PinBias, PulseInput};
#[cfg(feature = "simulation")]
pub use hal_sim::SimulatedBoard;
pub use reading::{DeltaReading, RpmReading, SensorSample, TickRecord, Wheel, WheelSample};
pub use sampler::{EmissionGate, EmissionPolicy, SamplerConfig, SamplerStats, SamplingLoop};
pub use sink::{MemorySink, OutputSink, SinkError};
pub use source::{open_wheel, Acquisition, RigConfig, WheelConfig, WheelHandle, WheelSource};
pub use sync::{EdgeCell, EdgeSnapshot};
pub use timebase::TimeBase;
