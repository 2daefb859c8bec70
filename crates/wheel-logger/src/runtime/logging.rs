use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber with optional JSON output.
///
/// Diagnostics go to stderr, or to a daily-rolling file under `diag_dir`;
/// stdout is reserved for sample lines. Keep the returned guard alive for
/// the whole run or buffered file output is lost.
pub fn init_tracing(json_output: bool, diag_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wheel_logger=debug,wheel_core=debug"));

    let (writer, guard) = match diag_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "wheel-logger.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };
    let ansi = diag_dir.is_none();

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_ansi(ansi).with_writer(writer))
            .init();
    }

    guard
}
