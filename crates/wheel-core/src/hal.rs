use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HalError {
    #[error("pin {pin} is not available on this board")]
    PinUnavailable { pin: u8 },
    #[error("pin {pin} is already open")]
    PinBusy { pin: u8 },
    #[error("connection to the board was lost")]
    ConnectionLost,
    #[error("capture channel on pin {pin} has no reading yet")]
    NotReady { pin: u8 },
}

/// Input bias applied when a digital pin is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinBias {
    #[default]
    PullUp,
    PullDown,
    Floating,
}

/// Time base of a pulse-capture channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureClock {
    Mhz16,
    Mhz2,
    #[default]
    Khz250,
    Khz62,
}

impl CaptureClock {
    pub fn hz(self) -> u32 {
        match self {
            Self::Mhz16 => 16_000_000,
            Self::Mhz2 => 2_000_000,
            Self::Khz250 => 250_000,
            Self::Khz62 => 62_500,
        }
    }
}

/// How many input edges the capture hardware folds into one measured period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyScale {
    #[default]
    Every,
    Every4,
    Every16,
}

impl FrequencyScale {
    pub fn divisor(self) -> u32 {
        match self {
            Self::Every => 1,
            Self::Every4 => 4,
            Self::Every16 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub clock: CaptureClock,
    pub scale: FrequencyScale,
    pub double_precision: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            clock: CaptureClock::Khz250,
            scale: FrequencyScale::Every,
            double_precision: true,
        }
    }
}

/// Digital input that can block until it reads a given level.
pub trait PulseInput: Send {
    /// Blocks until the pin reads `high`, or until `timeout` passes.
    /// Returns `Ok(false)` on timeout.
    fn wait_for_level(&mut self, high: bool, timeout: Duration) -> Result<bool, HalError>;
}

/// Hardware pulse-capture channel reporting an instantaneous frequency.
pub trait FrequencyCapture: Send {
    fn frequency_hz(&mut self) -> Result<f64, HalError>;
}

/// Opens inputs on a concrete board.
pub trait Board {
    fn open_input(&mut self, pin: u8, bias: PinBias) -> Result<Box<dyn PulseInput>, HalError>;
    fn open_capture(
        &mut self,
        pin: u8,
        config: CaptureConfig,
    ) -> Result<Box<dyn FrequencyCapture>, HalError>;
}

impl<T: PulseInput + ?Sized> PulseInput for Box<T> {
    fn wait_for_level(&mut self, high: bool, timeout: Duration) -> Result<bool, HalError> {
        (**self).wait_for_level(high, timeout)
    }
}

impl<T: FrequencyCapture + ?Sized> FrequencyCapture for Box<T> {
    fn frequency_hz(&mut self) -> Result<f64, HalError> {
        (**self).frequency_hz()
    }
}
