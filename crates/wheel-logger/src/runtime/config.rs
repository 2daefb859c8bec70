use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use wheel_core::{
    Acquisition, CaptureConfig, EdgePolarity, EmissionPolicy, Field, PinBias, Precision,
    RigConfig, SamplerConfig,
};

/// Where emitted lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    #[default]
    Console,
    File,
    Both,
}

impl OutputTarget {
    pub fn console(self) -> bool {
        matches!(self, Self::Console | Self::Both)
    }

    pub fn file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing value for {flag}")]
    MissingValue { flag: String },
    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },
    #[error("unknown option {0}")]
    UnknownOption(String),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("tick interval must be greater than zero")]
    ZeroTick,
    #[error("tick interval must be at most {max_ms} ms")]
    TickTooLong { max_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub diag_log_dir: Option<PathBuf>,
    pub rig: RigConfig,
    pub sampler: SamplerConfig,
    pub output: OutputTarget,
    pub log_dir: PathBuf,
    pub sim_front_rpm: f64,
    pub sim_rear_rpm: f64,
    pub sim_capture_fault_every: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            json_logs: false,
            diag_log_dir: None,
            rig: RigConfig::default(),
            sampler: SamplerConfig::default(),
            output: OutputTarget::Console,
            log_dir: PathBuf::from("."),
            sim_front_rpm: 600.0,
            sim_rear_rpm: 480.0,
            sim_capture_fault_every: None,
        }
    }
}

/// JSON config file. Every key is optional; command-line flags win.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    run_seconds: Option<u64>,
    json_logs: Option<bool>,
    diag_log_dir: Option<PathBuf>,
    tick_ms: Option<u64>,
    emission: Option<EmissionPolicy>,
    precision: Option<Precision>,
    fields: Option<Vec<Field>>,
    tag: Option<String>,
    header_every: Option<u32>,
    acquisition: Option<Acquisition>,
    polarity: Option<EdgePolarity>,
    bias: Option<PinBias>,
    front_pin: Option<u8>,
    rear_pin: Option<u8>,
    capture: Option<CaptureConfig>,
    output: Option<OutputTarget>,
    log_dir: Option<PathBuf>,
    sim_front_rpm: Option<f64>,
    sim_rear_rpm: Option<f64>,
    sim_capture_fault_every: Option<u64>,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        if wants_help(args) {
            cfg.show_help = true;
            return Ok(cfg);
        }
        if let Some(path) = config_path(args)? {
            cfg.apply_file(&path)?;
        }

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--config" => {
                    // Already applied.
                    value(args, &mut i, flag)?;
                }
                "--run-seconds" => {
                    cfg.run_seconds = Some(number(flag, value(args, &mut i, flag)?)?);
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--diag-log" => {
                    cfg.diag_log_dir = Some(PathBuf::from(value(args, &mut i, flag)?));
                }
                "--tick-ms" => {
                    cfg.sampler.tick = Duration::from_millis(number(flag, value(args, &mut i, flag)?)?);
                }
                "--emission" => {
                    cfg.sampler.emission = named(flag, value(args, &mut i, flag)?)?;
                }
                "--precision" => {
                    cfg.sampler.format.precision = named(flag, value(args, &mut i, flag)?)?;
                }
                "--fields" => {
                    let raw = value(args, &mut i, flag)?;
                    cfg.sampler.format.fields = raw
                        .split(',')
                        .map(|f| named(flag, f.trim()))
                        .collect::<Result<_, _>>()?;
                }
                "--tag" => {
                    cfg.sampler.format.tag = Some(value(args, &mut i, flag)?.to_string());
                }
                "--no-tag" => {
                    cfg.sampler.format.tag = None;
                }
                "--header-every" => {
                    cfg.sampler.header_every = Some(number(flag, value(args, &mut i, flag)?)?);
                }
                "--acquisition" => {
                    cfg.rig.acquisition = named(flag, value(args, &mut i, flag)?)?;
                }
                "--polarity" => {
                    let polarity = named(flag, value(args, &mut i, flag)?)?;
                    cfg.rig.front.polarity = polarity;
                    cfg.rig.rear.polarity = polarity;
                }
                "--bias" => {
                    let bias = named(flag, value(args, &mut i, flag)?)?;
                    cfg.rig.front.bias = bias;
                    cfg.rig.rear.bias = bias;
                }
                "--front-pin" => {
                    cfg.rig.front.pin = number(flag, value(args, &mut i, flag)?)?;
                }
                "--rear-pin" => {
                    cfg.rig.rear.pin = number(flag, value(args, &mut i, flag)?)?;
                }
                "--capture-clock" => {
                    let clock = named(flag, value(args, &mut i, flag)?)?;
                    cfg.rig.front.capture.clock = clock;
                    cfg.rig.rear.capture.clock = clock;
                }
                "--capture-scale" => {
                    let scale = named(flag, value(args, &mut i, flag)?)?;
                    cfg.rig.front.capture.scale = scale;
                    cfg.rig.rear.capture.scale = scale;
                }
                "--capture-single-precision" => {
                    cfg.rig.front.capture.double_precision = false;
                    cfg.rig.rear.capture.double_precision = false;
                }
                "--output" => {
                    cfg.output = named(flag, value(args, &mut i, flag)?)?;
                }
                "--log-dir" => {
                    cfg.log_dir = PathBuf::from(value(args, &mut i, flag)?);
                }
                "--sim-front-rpm" => {
                    cfg.sim_front_rpm = rpm(flag, value(args, &mut i, flag)?)?;
                }
                "--sim-rear-rpm" => {
                    cfg.sim_rear_rpm = rpm(flag, value(args, &mut i, flag)?)?;
                }
                "--sim-capture-fault-every" => {
                    cfg.sim_capture_fault_every = Some(number(flag, value(args, &mut i, flag)?)?);
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
            i += 1;
        }

        if cfg.sampler.tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }
        if cfg.sampler.tick > SamplerConfig::MAX_TICK {
            return Err(ConfigError::TickTooLong {
                max_ms: SamplerConfig::MAX_TICK.as_millis() as u64,
            });
        }
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(v) = file.run_seconds {
            self.run_seconds = Some(v);
        }
        if let Some(v) = file.json_logs {
            self.json_logs = v;
        }
        if let Some(v) = file.diag_log_dir {
            self.diag_log_dir = Some(v);
        }
        if let Some(v) = file.tick_ms {
            self.sampler.tick = Duration::from_millis(v);
        }
        if let Some(v) = file.emission {
            self.sampler.emission = v;
        }
        if let Some(v) = file.precision {
            self.sampler.format.precision = v;
        }
        if let Some(v) = file.fields {
            self.sampler.format.fields = v;
        }
        if let Some(v) = file.tag {
            self.sampler.format.tag = Some(v).filter(|t| !t.is_empty());
        }
        if let Some(v) = file.header_every {
            self.sampler.header_every = Some(v);
        }
        if let Some(v) = file.acquisition {
            self.rig.acquisition = v;
        }
        for wheel in [&mut self.rig.front, &mut self.rig.rear] {
            if let Some(v) = file.polarity {
                wheel.polarity = v;
            }
            if let Some(v) = file.bias {
                wheel.bias = v;
            }
            if let Some(v) = file.capture {
                wheel.capture = v;
            }
        }
        if let Some(v) = file.front_pin {
            self.rig.front.pin = v;
        }
        if let Some(v) = file.rear_pin {
            self.rig.rear.pin = v;
        }
        if let Some(v) = file.output {
            self.output = v;
        }
        if let Some(v) = file.log_dir {
            self.log_dir = v;
        }
        if let Some(v) = file.sim_front_rpm {
            self.sim_front_rpm = v;
        }
        if let Some(v) = file.sim_rear_rpm {
            self.sim_rear_rpm = v;
        }
        if let Some(v) = file.sim_capture_fault_every {
            self.sim_capture_fault_every = Some(v);
        }
        Ok(())
    }

    pub fn print_help() {
        println!(
            r#"wheel-logger - front/rear wheel speed and slip logger

USAGE:
    wheel-logger [OPTIONS]

OPTIONS:
    --config <PATH>              Load settings from a JSON file (flags override it)
    --run-seconds <SECS>         Run for a fixed duration then exit
    --tick-ms <MS>               Sampling interval, at most 3600000 [default: 1000]
    --emission <POLICY>          always_if_moving | change_gated | every_tick [default: always_if_moving]
    --precision <MODE>           integer | one_decimal [default: integer]
    --fields <LIST>              Comma-separated columns from time, front_count, front_rpm,
                                 rear_count, rear_rpm, delta_rpm [default: all]
    --tag <STR>                  Leading column on every line [default: data]
    --no-tag                     Omit the leading column
    --header-every <N>           Repeat the header after every N lines
    --acquisition <MODE>         edge_count | pulse_interval | frequency [default: edge_count]
    --polarity <EDGE>            rising | falling [default: rising]
    --bias <BIAS>                pull_up | pull_down | floating [default: pull_up]
    --front-pin <PIN>            Front sensor pin [default: 11]
    --rear-pin <PIN>             Rear sensor pin [default: 13]
    --capture-clock <CLOCK>      mhz16 | mhz2 | khz250 | khz62 [default: khz250]
    --capture-scale <SCALE>      every | every4 | every16 [default: every]
    --capture-single-precision   Use the 16-bit capture counter
    --output <TARGET>            console | file | both [default: console]
    --log-dir <DIR>              Directory for wheels-<start time>.csv [default: .]
    --json-logs                  Output diagnostics in JSON format
    --diag-log <DIR>             Write diagnostics to a daily-rolling file in DIR
    --sim-front-rpm <RPM>        Simulated front wheel speed [default: 600]
    --sim-rear-rpm <RPM>         Simulated rear wheel speed [default: 480]
    --sim-capture-fault-every <N> Fail every Nth simulated frequency read
    -h, --help                   Print this help message

The simulated harness has pickups on pins 11 (front) and 13 (rear); any other
pin reports unavailable and that wheel runs degraded at 0 rpm.

ENVIRONMENT VARIABLES:
    RUST_LOG                     Diagnostic filter (e.g., RUST_LOG=debug,wheel_core=trace)

EXAMPLES:
    # Half-second ticks, one decimal, only log changes
    wheel-logger --tick-ms 500 --precision one_decimal --emission change_gated

    # Log to a file for ten minutes
    wheel-logger --output both --log-dir /var/log/wheels --run-seconds 600
"#
        );
    }
}

fn wants_help(args: &[String]) -> bool {
    args.iter().skip(1).any(|a| a == "--help" || a == "-h")
}

fn config_path(args: &[String]) -> Result<Option<PathBuf>, ConfigError> {
    match args.iter().position(|a| a == "--config") {
        Some(pos) => args
            .get(pos + 1)
            .map(|p| Some(PathBuf::from(p)))
            .ok_or_else(|| ConfigError::MissingValue {
                flag: "--config".to_string(),
            }),
        None => Ok(None),
    }
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, ConfigError> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue {
            flag: flag.to_string(),
        })
}

fn invalid(flag: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: raw.to_string(),
    }
}

fn number<T: FromStr>(flag: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| invalid(flag, raw))
}

fn rpm(flag: &str, raw: &str) -> Result<f64, ConfigError> {
    let rpm: f64 = number(flag, raw)?;
    if rpm.is_finite() && rpm >= 0.0 {
        Ok(rpm)
    } else {
        Err(invalid(flag, raw))
    }
}

/// Parses a snake_case enum name with the same spelling the config file uses.
fn named<T: DeserializeOwned>(flag: &str, raw: &str) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| invalid(flag, raw))
}
