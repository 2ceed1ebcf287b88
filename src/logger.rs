//! Session logger — a `log` sink that writes every record to one file.
//!
//! The file is **truncated (overwritten) when the logger is installed**, so it
//! only ever contains output from the most-recent session.
//!
//! Library code logs through the `log` facade; installing this sink is up to
//! the embedding application:
//!
//! ```no_run
//! hostimage::logger::init("hostimage.log", log::LevelFilter::Info).unwrap();
//! hostimage::log_info!("engine ready");
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

struct SessionLogger {
    file: Mutex<File>,
    path: PathBuf,
    level: log::LevelFilter,
}

impl log::Log for SessionLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Logging never fails the caller.
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "[{}] [{}] {}", timestamp(), record.level(), record.args());
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static Path> {
    LOGGER.get().map(|l| l.path.as_path())
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::__log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::__log::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::__log::error!($($arg)*)
    };
}

/// Create (or truncate) `path` and install it as the global `log` logger.
///
/// Fails if the file cannot be opened. Installing twice keeps the first
/// logger and returns `Ok`.
pub fn init(path: impl AsRef<Path>, level: log::LevelFilter) -> Result<()> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)?;
    writeln!(file, "=== hostimage session started (unix {}) ===", unix_seconds())?;

    let logger = LOGGER.get_or_init(|| SessionLogger {
        file: Mutex::new(file),
        path,
        level,
    });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level);
    }
    Ok(())
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// HH:MM:SS within the current (UTC) day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format_clock(d.as_secs()),
        Err(_) => "??:??:??".to_string(),
    }
}

fn format_clock(secs: u64) -> String {
    let h = (secs % 86400) / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_wraps_at_midnight() {
        assert_eq!(format_clock(0), "00:00:00");
        assert_eq!(format_clock(86400 + 3661), "01:01:01");
        assert_eq!(format_clock(86399), "23:59:59");
    }
}
