//! Leveled logger.
//!
//! Filters calls by level, forwards them to the rotating sink (when one is
//! configured) and mirrors them to stderr when console output is on.

use crate::clock::{Clock, SystemClock};
use crate::error::{LogError, Result};
use crate::level::{LogLevel, SizeUnit};
use crate::policy::RotationMode;
use crate::sink::{RotatingFileSink, TIMESTAMP_FORMAT, short_file};
use std::any::Any;
use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe, Location};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

pub struct Logger {
    level: AtomicU8,
    console: AtomicBool,
    clock: Arc<dyn Clock>,
    sink: OnceLock<Arc<RotatingFileSink>>,
    configuring: Mutex<()>,
}

impl Logger {
    /// Threshold `Error`, console output on, no file.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            level: AtomicU8::new(LogLevel::default() as u8),
            console: AtomicBool::new(true),
            clock,
            sink: OnceLock::new(),
            configuring: Mutex::new(()),
        }
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_console(&self, enabled: bool) {
        self.console.store(enabled, Ordering::Relaxed);
    }

    pub fn console_enabled(&self) -> bool {
        self.console.load(Ordering::Relaxed)
    }

    /// Persist to `<dir>/<name>`, rolling once the file reaches
    /// `max_size * unit` bytes and keeping `max_segments` numbered archives.
    pub fn set_roll_by_size(
        &self,
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        max_size: u64,
        max_segments: u32,
        unit: SizeUnit,
    ) -> Result<()> {
        let max_bytes = max_size.checked_mul(unit.bytes()).ok_or_else(|| {
            LogError::InvalidConfig(format!("maximum file size {max_size} {unit:?} overflows"))
        })?;
        self.configure_rotation(dir, name, RotationMode::BySize { max_bytes, max_segments })
    }

    /// Persist to `<dir>/<name>`, rolling every `interval_days` days into
    /// `<name>.<YYYY-MM-DD>` archives.
    pub fn set_roll_by_date(
        &self,
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        interval_days: u32,
    ) -> Result<()> {
        self.configure_rotation(
            dir,
            name,
            RotationMode::ByDate { interval_days, max_segments: 0 },
        )
    }

    /// One-shot: once a sink is configured every later call is a no-op.
    pub fn configure_rotation(
        &self,
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        mode: RotationMode,
    ) -> Result<()> {
        let _guard = self.configuring.lock().unwrap_or_else(PoisonError::into_inner);
        if self.sink.get().is_some() {
            return Ok(());
        }
        let sink = RotatingFileSink::open(dir, name, mode, Arc::clone(&self.clock))?;
        // cannot fail: the slot is only set while holding `configuring`
        let _ = self.sink.set(Arc::new(sink));
        Ok(())
    }

    pub fn sink(&self) -> Option<&Arc<RotatingFileSink>> {
        self.sink.get()
    }

    pub fn rotation_mode(&self) -> RotationMode {
        self.sink.get().map_or(RotationMode::None, |sink| sink.mode())
    }

    /// Run the rotation check now instead of waiting for the monitor.
    pub fn check_and_rotate(&self) -> bool {
        self.sink.get().is_some_and(|sink| sink.check_and_rotate())
    }

    /// Stop the sink's monitor and close its file.
    pub fn close(&self) {
        if let Some(sink) = self.sink.get() {
            sink.close();
        }
    }

    #[track_caller]
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, args, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, args, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Warn, args, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Error, args, Location::caller());
    }

    /// Logs at `Fatal`. Does not terminate the process.
    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) {
        self.log(LogLevel::Fatal, args, Location::caller());
    }

    /// Console-only output, independent of the level threshold.
    #[track_caller]
    pub fn console(&self, args: fmt::Arguments<'_>) {
        let location = Location::caller();
        if !self.console_enabled() {
            return;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.write_console(None, &args.to_string(), location);
        }));
        if let Err(payload) = outcome {
            report_fallback(location, &panic_message(payload.as_ref()));
        }
    }

    /// Write `args` at `level`, attributing it to `location`. Failures are
    /// reported on stderr and never reach the caller.
    pub fn log(&self, level: LogLevel, args: fmt::Arguments<'_>, location: &Location<'_>) {
        if !level.passes(self.level()) {
            return;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let message = args.to_string();
            if let Some(sink) = self.sink.get() {
                if let Err(e) = sink.write_line(level, &message, location) {
                    report_fallback(location, &format!("log file write failed: {e}"));
                }
            }
            if self.console_enabled() {
                self.write_console(Some(level), &message, location);
            }
        }));
        if let Err(payload) = outcome {
            report_fallback(location, &panic_message(payload.as_ref()));
        }
    }

    /// Unlocked, best-effort line on stderr.
    fn write_console(&self, level: Option<LogLevel>, message: &str, location: &Location<'_>) {
        let stamp = self.clock.now().format(TIMESTAMP_FORMAT);
        let file = short_file(location.file());
        let line = location.line();
        let mut stderr = io::stderr().lock();
        let _ = match level {
            Some(level) => writeln!(stderr, "{stamp} {file}:{line} {level}: {message}"),
            None => writeln!(stderr, "{stamp} {file}:{line} {message}"),
        };
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level())
            .field("console", &self.console_enabled())
            .field("rotation", &self.rotation_mode())
            .finish()
    }
}

fn report_fallback(location: &Location<'_>, problem: &str) {
    let _ = writeln!(
        io::stderr().lock(),
        "rotalog: {}:{}: {}",
        short_file(location.file()),
        location.line(),
        problem
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("log call panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn quiet_logger() -> Logger {
        let logger = Logger::new();
        logger.set_console(false);
        logger
    }

    fn read(path: impl AsRef<Path>) -> String {
        fs::read_to_string(path).unwrap_or_default()
    }

    #[test]
    fn defaults() {
        let logger = Logger::new();
        assert_eq!(logger.level(), LogLevel::Error);
        assert!(logger.console_enabled());
        assert_eq!(logger.rotation_mode(), RotationMode::None);
    }

    #[test]
    fn level_threshold_filters_file_output() {
        let tmp = TempDir::new().unwrap();
        let logger = quiet_logger();
        logger.set_roll_by_size(tmp.path(), "app.log", 1, 2, SizeUnit::MB).unwrap();
        logger.set_level(LogLevel::Warn);

        crate::debug!(logger, "debug {}", 1);
        crate::info!(logger, "info {}", 2);
        crate::warn!(logger, "warn {}", 3);
        crate::error!(logger, "error {}", 4);
        crate::fatal!(logger, "fatal {}", 5);

        let content = read(tmp.path().join("app.log"));
        assert!(!content.contains("debug: debug 1"));
        assert!(!content.contains("info: info 2"));
        assert!(content.contains("warn: warn 3"));
        assert!(content.contains("error: error 4"));
        assert!(content.contains("fatal: fatal 5"));

        logger.set_level(LogLevel::Off);
        crate::fatal!(logger, "silenced");
        logger.set_level(LogLevel::All);
        crate::debug!(logger, "everything");

        let content = read(tmp.path().join("app.log"));
        assert!(!content.contains("silenced"));
        assert!(content.contains("debug: everything"));
    }

    #[test]
    fn lines_carry_call_site() {
        let tmp = TempDir::new().unwrap();
        let logger = quiet_logger();
        logger.set_roll_by_size(tmp.path(), "app.log", 1, 1, SizeUnit::KB).unwrap();

        let expected = line!() + 1;
        crate::error!(logger, "where am I");

        let content = read(tmp.path().join("app.log"));
        assert!(
            content.contains(&format!("logger.rs:{expected}: error: where am I")),
            "unexpected content: {content:?}"
        );
    }

    #[test]
    fn second_roll_configuration_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let logger = quiet_logger();
        logger.set_roll_by_size(tmp.path(), "app.log", 100, 2, SizeUnit::B).unwrap();
        logger.set_roll_by_date(tmp.path(), "other.log", 1).unwrap();
        logger.set_roll_by_size(tmp.path(), "third.log", 5, 5, SizeUnit::KB).unwrap();

        assert_eq!(
            logger.rotation_mode(),
            RotationMode::BySize { max_bytes: 100, max_segments: 2 }
        );
        assert!(!tmp.path().join("other.log").exists());
        assert!(!tmp.path().join("third.log").exists());
    }

    #[test]
    fn invalid_roll_configuration() {
        let tmp = TempDir::new().unwrap();
        let logger = quiet_logger();
        assert!(matches!(
            logger.set_roll_by_size(tmp.path(), "app.log", 0, 2, SizeUnit::KB),
            Err(LogError::InvalidConfig(_))
        ));
        assert!(matches!(
            logger.set_roll_by_size(tmp.path(), "app.log", 1, 0, SizeUnit::KB),
            Err(LogError::InvalidConfig(_))
        ));
        assert!(matches!(
            logger.set_roll_by_size(tmp.path(), "app.log", u64::MAX, 2, SizeUnit::TB),
            Err(LogError::InvalidConfig(_))
        ));
        assert!(matches!(
            logger.set_roll_by_date("", "app.log", 1),
            Err(LogError::InvalidConfig(_))
        ));
        assert!(matches!(
            logger.set_roll_by_date(tmp.path(), "app.log", 0),
            Err(LogError::InvalidConfig(_))
        ));
        assert!(matches!(
            logger.set_roll_by_date(tmp.path(), "app.log", 200_000_000),
            Err(LogError::InvalidConfig(_))
        ));

        // A failed attempt does not use up the one configuration.
        logger.set_roll_by_date(tmp.path(), "app.log", 1).unwrap();
        assert!(matches!(logger.rotation_mode(), RotationMode::ByDate { interval_days: 1, .. }));
    }

    #[test]
    fn size_unit_scales_limit() {
        let tmp = TempDir::new().unwrap();
        let logger = quiet_logger();
        logger.set_roll_by_size(tmp.path(), "app.log", 2, 3, SizeUnit::KB).unwrap();
        assert_eq!(
            logger.rotation_mode(),
            RotationMode::BySize { max_bytes: 2048, max_segments: 3 }
        );
    }

    #[test]
    fn date_rotation_with_simulated_clock() {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::at_date(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()));
        let logger = Logger::with_clock(clock.clone());
        logger.set_console(false);
        logger.set_level(LogLevel::Info);
        logger.set_roll_by_date(tmp.path(), "app.log", 1).unwrap();

        crate::info!(logger, "day one");
        clock.advance_days(1);
        assert!(logger.check_and_rotate());

        assert!(read(tmp.path().join("app.log.2024-03-10")).contains("info: day one"));
        assert_eq!(read(tmp.path().join("app.log")), "");
    }

    #[test]
    fn panicking_argument_is_contained() {
        struct Explodes;
        impl fmt::Display for Explodes {
            fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
                panic!("display blew up");
            }
        }

        let tmp = TempDir::new().unwrap();
        let logger = quiet_logger();
        logger.set_roll_by_size(tmp.path(), "app.log", 1, 1, SizeUnit::MB).unwrap();

        crate::error!(logger, "{}", Explodes);
        crate::error!(logger, "still alive");
        assert!(read(tmp.path().join("app.log")).contains("error: still alive"));
    }

    #[test]
    fn write_after_close_is_reported_not_raised() {
        let tmp = TempDir::new().unwrap();
        let logger = quiet_logger();
        logger.set_roll_by_size(tmp.path(), "app.log", 1, 1, SizeUnit::MB).unwrap();
        crate::error!(logger, "before close");
        logger.close();
        crate::error!(logger, "after close");

        let content = read(tmp.path().join("app.log"));
        assert!(content.contains("before close"));
        assert!(!content.contains("after close"));
    }

    #[test]
    fn logs_without_file_configuration() {
        let logger = quiet_logger();
        logger.set_level(LogLevel::All);
        crate::info!(logger, "nowhere to go");
        crate::console!(logger, "console only");
        assert!(!logger.check_and_rotate());
    }

    #[test]
    fn shared_across_threads() {
        let tmp = TempDir::new().unwrap();
        let logger = Arc::new(quiet_logger());
        logger.set_level(LogLevel::Info);
        logger.set_roll_by_size(tmp.path(), "app.log", 512, 3, SizeUnit::B).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let logger = Arc::clone(&logger);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        crate::info!(logger, "thread {} line {}", t, i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let archives = (1..=4)
            .filter(|n| tmp.path().join(format!("app.log.{n}")).exists())
            .count();
        assert!(archives <= 3);
        assert!(!tmp.path().join("app.log.4").exists());
    }
}
