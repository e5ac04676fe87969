use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Keeps the non-blocking file writer alive for the life of the process.
/// Dropping it flushes and closes the log file.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Installs the global subscriber: a stdout layer always, plus a daily-rolled
/// `intime-backend.log` when file logging is configured. Returns the writer
/// guard in that case; the caller holds it until shutdown.
pub fn init_tracing(config: &Config) -> Option<FileLogGuard> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match config.file_logs.as_ref().and_then(file_writer) {
        Some((writer, guard)) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false).with_target(true)),
            Some(FileLogGuard { _guard: guard }),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    guard
}

fn file_writer(
    file_logs: &crate::config::FileLogConfig,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(err) = std::fs::create_dir_all(&file_logs.directory) {
        eprintln!(
            "failed to create log directory {}: {err}",
            file_logs.directory
        );
        return None;
    }
    let appender = tracing_appender::rolling::daily(&file_logs.directory, "intime-backend.log");
    Some(tracing_appender::non_blocking(appender))
}
