use crate::infra::console::ConsoleSink;
use crate::infra::csv_log::CsvLogFile;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use chrono::{DateTime, Local};
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};
use wheel_core::{
    open_wheel, OutputSink, ReaderStats, SamplingLoop, SimulatedBoard, TimeBase, Wheel,
    WheelConfig, WheelHandle,
};

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wheel-logger: {e}");
            eprintln!("Try 'wheel-logger --help' for more information.");
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

fn run(config: RuntimeConfig) -> ExitCode {
    // Initialize tracing
    let _log_guard = init_tracing(config.json_logs, config.diag_log_dir.as_deref());

    let timebase = TimeBase::new();
    let started = timebase.wall_clock();
    let stop = Arc::new(AtomicBool::new(false));

    info!(
        tick_ms = config.sampler.tick.as_millis() as u64,
        emission = ?config.sampler.emission,
        precision = ?config.sampler.format.precision,
        acquisition = ?config.rig.acquisition,
        front_pin = config.rig.front.pin,
        rear_pin = config.rig.rear.pin,
        "Starting wheel logger"
    );

    let mut board = build_board(&config);
    let [front, rear] = [Wheel::Front, Wheel::Rear].map(|wheel| {
        open_wheel(
            &mut board,
            wheel,
            config.rig.acquisition,
            config.rig.wheel(wheel),
            timebase,
            &stop,
        )
    });
    if front.source.is_offline() && rear.source.is_offline() {
        warn!("No wheel sensor could be opened; logging zeros");
    }

    let WheelHandle {
        source: front_source,
        reader: front_reader,
        ..
    } = front;
    let WheelHandle {
        source: rear_source,
        reader: rear_reader,
        ..
    } = rear;
    let readers = [(Wheel::Front, front_reader), (Wheel::Rear, rear_reader)];

    let sink = build_sinks(&config, &started);
    let sampler_config = config.sampler.clone();
    let stop_sampler = Arc::clone(&stop);

    let spawned = thread::Builder::new()
        .name("sampler".to_string())
        .spawn(move || {
            let mut sampler =
                SamplingLoop::new(front_source, rear_source, sink, sampler_config, timebase);
            sampler.run(&stop_sampler);
            sampler.stats().clone()
        });
    let sampler_handle = match spawned {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "Failed to start sampling thread");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
            join_readers(readers);
            return ExitCode::FAILURE;
        }
    };

    info!("Wheel logger running");

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    let stats = match sampler_handle.join() {
        Ok(stats) => stats,
        Err(_) => {
            error!("Sampling thread panicked");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
            join_readers(readers);
            return ExitCode::FAILURE;
        }
    };
    join_readers(readers);

    info!(
        ticks = stats.ticks,
        emissions = stats.emissions,
        overruns = stats.overruns,
        sink_failures = stats.sink_failures,
        "Run complete"
    );
    ExitCode::SUCCESS
}

/// Simulated harness wired like the reference rig: pickups on the default
/// front and rear pins.
fn build_board(config: &RuntimeConfig) -> SimulatedBoard {
    let mut board = SimulatedBoard::new()
        .with_wheel(WheelConfig::FRONT_PIN, config.sim_front_rpm)
        .with_wheel(WheelConfig::REAR_PIN, config.sim_rear_rpm);
    if let Some(n) = config.sim_capture_fault_every {
        board = board
            .with_capture_fault_every(WheelConfig::FRONT_PIN, n)
            .with_capture_fault_every(WheelConfig::REAR_PIN, n);
    }
    board
}

fn build_sinks(config: &RuntimeConfig, started: &DateTime<Local>) -> Vec<Box<dyn OutputSink>> {
    let mut sinks: Vec<Box<dyn OutputSink>> = Vec::new();

    if config.output.file() {
        match CsvLogFile::create(&config.log_dir, started) {
            Ok(log) => {
                info!(path = %log.path().display(), "Logging samples to file");
                sinks.push(Box::new(log));
            }
            Err(e) => {
                error!(
                    error = %e,
                    dir = %config.log_dir.display(),
                    "Failed to open sample log file"
                );
            }
        }
    }

    if config.output.console() || sinks.is_empty() {
        if !config.output.console() {
            warn!("Falling back to console output");
        }
        sinks.push(Box::new(ConsoleSink::new()));
    }

    sinks
}

fn join_readers(readers: [(Wheel, Option<JoinHandle<ReaderStats>>); 2]) {
    for (wheel, reader) in readers {
        let Some(handle) = reader else { continue };
        match handle.join() {
            Ok(stats) => info!(
                wheel = %wheel,
                edges = stats.edges,
                wait_errors = stats.wait_errors,
                "Edge reader stopped"
            ),
            Err(_) => warn!(wheel = %wheel, "Edge reader panicked"),
        }
    }
}
