//! Logging setup: stdout plus a daily-rotated file under the log directory,
//! pruned by age on startup. The core's `log::` macros arrive through the
//! compatibility layer `try_init` installs.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "dvbcast.log";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// The non-blocking file writer stops flushing once its guard drops; parked
/// here for the process lifetime.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialise stdout and file logging. `RUST_LOG` overrides the level
/// chosen by `verbose`.
pub fn init_logging(
    log_dir: &Path,
    retention_days: u64,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(log_dir)?;
    prune_old_logs(log_dir, retention_days)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));
    let _ = FILE_GUARD.set(guard);

    let console = fmt::layer().with_timer(ChronoLocal::new(TIME_FORMAT.into()));
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_timer(ChronoLocal::new(TIME_FORMAT.into()))
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}

/// Remove rotated log files older than the retention window.
fn prune_old_logs(log_dir: &Path, retention_days: u64) -> io::Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }
    let cutoff = Local::now() - chrono::Duration::days(retention_days as i64);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified: chrono::DateTime<Local> = modified.into();
            if modified < cutoff {
                if let Err(e) = fs::remove_file(&path) {
                    eprintln!("Failed to remove old log file {path:?}: {e}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_keeps_fresh_logs() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("dvbcast.log.2026-08-01");
        std::fs::write(&fresh, b"line").unwrap();

        prune_old_logs(dir.path(), 7).unwrap();
        assert!(fresh.exists());
    }

    #[test]
    fn prune_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("notes.txt");
        std::fs::write(&other, b"keep me").unwrap();

        prune_old_logs(dir.path(), 0).unwrap();
        assert!(other.exists());
    }
}
