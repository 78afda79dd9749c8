//! Tracing subscriber setup for the console front-end.
//!
//! Logs go to the configured file when one is set, otherwise to stderr so
//! they never interleave with the event output on stdout.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dlvx_config::LogConfig;
use tracing_subscriber::EnvFilter;

/// A log file larger than this is moved aside on startup (5 MB).
pub const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Ensure the parent directory of a log file exists.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Keep one previous log: when `log_path` exceeds `max_size` it replaces
/// `<name>.1`.
pub fn roll_log_file(log_path: &Path, max_size: u64) -> io::Result<()> {
    let len = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if len < max_size {
        return Ok(());
    }
    let mut previous = log_path.as_os_str().to_owned();
    previous.push(".1");
    fs::rename(log_path, PathBuf::from(previous))
}

/// Build the filter: `RUST_LOG` wins over the configured level.
fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()))
}

/// Install the global tracing subscriber.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let filter = env_filter(config);
    match &config.file {
        Some(path) => {
            ensure_log_dir(path)?;
            roll_log_file(path, MAX_LOG_SIZE)?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}
