use crate::hal::{Board, CaptureConfig, FrequencyCapture, HalError, PinBias, PulseInput};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Fraction of a revolution during which the magnet holds the pickup low.
const MAGNET_WIDTH: f64 = 0.1;
const IDLE_POLL: Duration = Duration::from_millis(20);
const MIN_NAP: Duration = Duration::from_micros(50);

/// Shared, adjustable wheel speed for a simulated pickup.
#[derive(Debug, Clone)]
pub struct SimulatedSpeed(Arc<AtomicU64>);

impl SimulatedSpeed {
    pub fn new(rpm: f64) -> Self {
        Self(Arc::new(AtomicU64::new(rpm.to_bits())))
    }

    pub fn set(&self, rpm: f64) {
        self.0.store(rpm.to_bits(), Ordering::Relaxed);
    }

    pub fn rpm(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Releases the pin on the board when the owning input is dropped.
#[derive(Debug)]
struct PinClaim {
    pin: u8,
    open: Arc<Mutex<HashSet<u8>>>,
}

impl Drop for PinClaim {
    fn drop(&mut self) {
        self.open.lock().unwrap().remove(&self.pin);
    }
}

/// Board with one magnetic pickup per configured pin.
#[derive(Debug, Default)]
pub struct SimulatedBoard {
    wheels: HashMap<u8, SimulatedSpeed>,
    capture_faults: HashMap<u8, u64>,
    open: Arc<Mutex<HashSet<u8>>>,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wheel(mut self, pin: u8, rpm: f64) -> Self {
        self.wheels.insert(pin, SimulatedSpeed::new(rpm));
        self
    }

    /// Every `n`th frequency read on `pin` fails with `NotReady`.
    pub fn with_capture_fault_every(mut self, pin: u8, n: u64) -> Self {
        if n > 0 {
            self.capture_faults.insert(pin, n);
        }
        self
    }

    pub fn speed(&self, pin: u8) -> Option<SimulatedSpeed> {
        self.wheels.get(&pin).cloned()
    }

    pub fn is_open(&self, pin: u8) -> bool {
        self.open.lock().unwrap().contains(&pin)
    }

    fn claim(&self, pin: u8) -> Result<(SimulatedSpeed, PinClaim), HalError> {
        let speed = self
            .wheels
            .get(&pin)
            .cloned()
            .ok_or(HalError::PinUnavailable { pin })?;
        let mut open = self.open.lock().unwrap();
        if !open.insert(pin) {
            return Err(HalError::PinBusy { pin });
        }
        Ok((
            speed,
            PinClaim {
                pin,
                open: Arc::clone(&self.open),
            },
        ))
    }
}

impl Board for SimulatedBoard {
    fn open_input(&mut self, pin: u8, _bias: PinBias) -> Result<Box<dyn PulseInput>, HalError> {
        let (speed, claim) = self.claim(pin)?;
        Ok(Box::new(SimulatedPickup::new(speed, claim)))
    }

    fn open_capture(
        &mut self,
        pin: u8,
        config: CaptureConfig,
    ) -> Result<Box<dyn FrequencyCapture>, HalError> {
        let (speed, claim) = self.claim(pin)?;
        Ok(Box::new(SimulatedCapture {
            pin,
            speed,
            config,
            reads: 0,
            fault_every: self.capture_faults.get(&pin).copied(),
            _claim: claim,
        }))
    }
}

/// Pulled-up pickup: reads low while the magnet passes, high otherwise.
#[derive(Debug)]
pub struct SimulatedPickup {
    speed: SimulatedSpeed,
    revs: f64,
    last: Instant,
    _claim: PinClaim,
}

impl SimulatedPickup {
    fn new(speed: SimulatedSpeed, claim: PinClaim) -> Self {
        Self {
            speed,
            // Start just past the magnet.
            revs: MAGNET_WIDTH,
            last: Instant::now(),
            _claim: claim,
        }
    }

    fn revs_per_sec(&self) -> f64 {
        self.speed.rpm().max(0.0) / 60.0
    }

    fn advance(&mut self) {
        let now = Instant::now();
        self.revs += now.duration_since(self.last).as_secs_f64() * self.revs_per_sec();
        self.last = now;
    }

    fn is_high(&self) -> bool {
        self.revs.fract() >= MAGNET_WIDTH
    }
}

impl PulseInput for SimulatedPickup {
    fn wait_for_level(&mut self, high: bool, timeout: Duration) -> Result<bool, HalError> {
        self.advance();
        if self.is_high() == high {
            return Ok(true);
        }

        // Wait on the revolution position rather than the level so an
        // oversleep past a narrow window still registers the transition.
        let target = if high {
            self.revs.floor() + MAGNET_WIDTH
        } else {
            self.revs.floor() + 1.0
        };
        let deadline = Instant::now() + timeout;

        loop {
            self.advance();
            if self.revs >= target {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let remaining = deadline - now;
            let rps = self.revs_per_sec();
            let nap = if rps > 0.0 {
                Duration::from_secs_f64((target - self.revs) / rps).min(remaining)
            } else {
                remaining.min(IDLE_POLL)
            };
            thread::sleep(nap.max(MIN_NAP));
        }
    }
}

/// Capture channel measuring the pickup period in clock ticks.
#[derive(Debug)]
pub struct SimulatedCapture {
    pin: u8,
    speed: SimulatedSpeed,
    config: CaptureConfig,
    reads: u64,
    fault_every: Option<u64>,
    _claim: PinClaim,
}

impl FrequencyCapture for SimulatedCapture {
    fn frequency_hz(&mut self) -> Result<f64, HalError> {
        self.reads += 1;
        if let Some(n) = self.fault_every {
            if self.reads % n == 0 {
                return Err(HalError::NotReady { pin: self.pin });
            }
        }

        let hz = self.speed.rpm() / 60.0;
        if hz <= 0.0 {
            return Ok(0.0);
        }

        let clock = self.config.clock.hz() as f64 * self.config.scale.divisor() as f64;
        let ticks = (clock / hz).round();
        let max_ticks = if self.config.double_precision {
            u32::MAX as f64
        } else {
            u16::MAX as f64
        };
        if ticks < 1.0 || ticks > max_ticks {
            // Period outside the counter range reads as no signal.
            return Ok(0.0);
        }
        Ok(clock / ticks)
    }
}
