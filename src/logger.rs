// A tiny stderr logger for the `log` facade. The library logs through `log`
// and the binary installs this. Filtering is done entirely through
// `log::set_max_level`.

use std::{
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

use {jiff::tz::TimeZone, log::Log};

use crate::style::Theme;

/// Logs every record to stderr, prefixed with a timestamp and the level.
#[derive(Debug)]
pub struct Logger {
    tz: Mutex<Option<TimeZone>>,
}

impl Logger {
    /// Create a new logger and install it as the global logger.
    pub fn init() -> Result<&'static Logger, log::SetLoggerError> {
        let logger = Box::leak(Box::new(Logger { tz: Mutex::new(None) }));
        log::set_logger(logger)?;
        Ok(logger)
    }

    /// Render timestamps in the given time zone from now on. Until this is
    /// called, they are rendered in UTC.
    pub fn set_time_zone(&self, tz: TimeZone) {
        *self.tz.lock().unwrap() = Some(tz);
    }
}

impl Log for Logger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        // `Zoned::now()` could look up the system time zone, which logs.
        let ts = jiff::Timestamp::now();
        let now = match *self.tz.lock().unwrap() {
            None => ts.to_string(),
            Some(ref tz) => ts.to_zoned(tz.clone()).to_string(),
        };
        let theme = Theme::stderr();
        let level = theme.level(record.level());
        let location = match (record.file(), record.line()) {
            (Some(file), Some(line)) => format!("{}:{line}", relative(file)),
            (Some(file), None) => relative(file).to_string(),
            _ => record.target().to_string(),
        };
        eprintln!(
            "{}|{level}|{location}: {}",
            theme.highlight(now),
            record.args(),
        );
    }

    fn flush(&self) {}
}

fn relative<'p>(path: &'p str) -> &'p str {
    let Some(cwd) = cwd() else { return path };
    let Ok(relative) = Path::new(path).strip_prefix(cwd) else { return path };
    relative.to_str().unwrap_or(path)
}

fn cwd() -> Option<&'static Path> {
    static CWD: LazyLock<Option<PathBuf>> =
        LazyLock::new(|| std::env::current_dir().ok());
    CWD.as_deref()
}
