use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG_FILE: &str = "UITEST_LOG";

/// Keeps the background log-file writer alive; buffered lines are flushed
/// when it is dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    _guard: Option<WorkerGuard>,
}

impl TelemetryGuard {
    fn disabled() -> Self {
        Self { _guard: None }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `default_level`;
/// `UITEST_LOG` redirects output to a file opened for append. A second
/// call leaves the first subscriber in place.
pub fn init_tracing(default_level: &str) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (writer, guard, ansi) = match log_file_path_from_env() {
        Some(path) => match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                (BoxMakeWriter::new(non_blocking), Some(guard), false)
            }
            Err(err) => {
                eprintln!(
                    "Warning: failed to open log file {}: {}",
                    path.display(),
                    err
                );
                (
                    BoxMakeWriter::new(std::io::stderr),
                    None,
                    std::io::stderr().is_terminal(),
                )
            }
        },
        None => (
            BoxMakeWriter::new(std::io::stderr),
            None,
            std::io::stderr().is_terminal(),
        ),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(writer);

    if subscriber.try_init().is_err() {
        return TelemetryGuard::disabled();
    }

    TelemetryGuard { _guard: guard }
}

fn log_file_path_from_env() -> Option<PathBuf> {
    std::env::var(ENV_LOG_FILE)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}
