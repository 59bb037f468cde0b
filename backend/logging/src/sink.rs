//! Rotating file sink.
//!
//! Owns the live log file and the one mutex that guards it. Every append and
//! every rotation (from the write path or the background monitor) happens
//! under that lock, so a line never straddles a rotation boundary.

use crate::clock::Clock;
use crate::error::{LogError, Result};
use crate::level::LogLevel;
use crate::monitor::Monitor;
use crate::policy::{FsIndex, FsOp, RotationMode, RotationPlan, RotationPolicy, SegmentPaths};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the monitor re-checks the rotation policy.
pub(crate) const MONITOR_INTERVAL: Duration = Duration::from_secs(60);

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

struct FileState {
    writer: Option<LineWriter<File>>,
    /// Last calendar day the live file covers (date mode).
    covered_until: Option<NaiveDate>,
    /// The last rotation could not move the live file away. Writes stop
    /// retrying until the next periodic check.
    rotation_failed: bool,
    closed: bool,
}

struct SinkShared {
    paths: SegmentPaths,
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    state: Mutex<FileState>,
}

/// Outcome of one rotation attempt, reported once the lock is released.
#[derive(Debug, Default)]
struct RotationReport {
    rotated: bool,
    skipped: Option<PathBuf>,
    failures: Vec<String>,
}

impl RotationReport {
    fn emit(&self, live: &Path) {
        if let Some(archive) = &self.skipped {
            debug!(live = %live.display(), archive = %archive.display(), "Archive already exists; rotation skipped");
        }
        for failure in &self.failures {
            warn!(live = %live.display(), "Log rotation step failed: {}", failure);
        }
        if self.rotated {
            info!(live = %live.display(), "Rotated log file");
        }
    }
}

pub struct RotatingFileSink {
    shared: Arc<SinkShared>,
    monitor: Mutex<Option<Monitor>>,
}

impl RotatingFileSink {
    /// Open (or resume) `<dir>/<name>` under `mode` and start the monitor.
    ///
    /// An existing live file is appended to, unless it is already due, in
    /// which case it is rotated first.
    pub fn open(
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        mode: RotationMode,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::open_with_interval(dir.into(), name.into(), mode, clock, MONITOR_INTERVAL)
    }

    pub(crate) fn open_with_interval(
        dir: PathBuf,
        name: String,
        mode: RotationMode,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Result<Self> {
        if dir.as_os_str().is_empty() {
            return Err(LogError::InvalidConfig("log directory must not be empty".into()));
        }
        if name.trim().is_empty() {
            return Err(LogError::InvalidConfig("log file name must not be empty".into()));
        }
        if name.contains(['/', '\\']) {
            return Err(LogError::InvalidConfig(format!(
                "log file name \"{name}\" must not contain a path separator"
            )));
        }
        mode.validate()?;

        fs::create_dir_all(&dir).map_err(|e| LogError::io(&dir, e))?;

        let paths = SegmentPaths::new(dir, name);
        let live = paths.live();
        let policy = RotationPolicy::new(mode);
        let today = clock.today();
        // A non-empty file left by an earlier run starts its period on the day
        // it was last written.
        let start = resumed_file_date(&live).map_or(today, |date| date.min(today));

        let shared = Arc::new(SinkShared {
            policy,
            clock,
            state: Mutex::new(FileState {
                writer: None,
                covered_until: policy.covered_until(start),
                rotation_failed: false,
                closed: false,
            }),
            paths,
        });

        let report = {
            let mut state = shared.lock();
            if shared.is_due(&state) {
                Some(shared.rotate_locked(&mut state))
            } else {
                let file = open_append(&live).map_err(|e| LogError::io(&live, e))?;
                state.writer = Some(LineWriter::new(file));
                None
            }
        };
        if let Some(report) = report {
            report.emit(&live);
        }

        let ticker = Arc::clone(&shared);
        let monitor = Monitor::spawn(interval, move || {
            ticker.check_and_rotate();
        })
        .map_err(|e| LogError::io(&live, e))?;

        info!(path = %live.display(), mode = ?mode, "Log sink opened");
        Ok(Self {
            shared,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    pub fn mode(&self) -> RotationMode {
        self.shared.policy.mode()
    }

    pub fn paths(&self) -> &SegmentPaths {
        &self.shared.paths
    }

    pub fn live_path(&self) -> PathBuf {
        self.shared.paths.live()
    }

    /// Append one formatted line, rotating first if the policy says so.
    pub fn write_line(
        &self,
        level: LogLevel,
        message: &str,
        location: &Location<'_>,
    ) -> io::Result<()> {
        let line = format_line(self.shared.clock.now(), level, message, location);
        self.shared.append(line.as_bytes()).map(|_| ())
    }

    /// Append pre-formatted bytes under the same rotation discipline.
    pub fn write_raw(&self, buf: &[u8]) -> io::Result<usize> {
        self.shared.append(buf)
    }

    /// Run the rotation check outside of any write. Returns whether the live
    /// file was rotated.
    pub fn check_and_rotate(&self) -> bool {
        self.shared.check_and_rotate()
    }

    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.shared.lock();
        match state.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Stop the monitor and close the live file. Later writes fail.
    pub fn close(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(monitor) = monitor else {
            return;
        };
        monitor.stop();

        let flushed = {
            let mut state = self.shared.lock();
            state.closed = true;
            match state.writer.take() {
                Some(mut writer) => writer.flush(),
                None => Ok(()),
            }
        };
        let live = self.shared.paths.live();
        if let Err(e) = flushed {
            warn!(path = %live.display(), "Failed to flush log file on close: {}", e);
        }
        debug!(path = %live.display(), "Log sink closed");
    }
}

impl Drop for RotatingFileSink {
    fn drop(&mut self) {
        self.close();
    }
}

impl SinkShared {
    fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_due(&self, state: &FileState) -> bool {
        let live_len = if self.policy.tracks_size() {
            fs::metadata(self.paths.live()).map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };
        self.policy
            .is_due(state.covered_until, self.clock.today(), live_len)
    }

    fn check_and_rotate(&self) -> bool {
        let report = {
            let mut state = self.lock();
            state.rotation_failed = false;
            if state.closed || !self.is_due(&state) {
                return false;
            }
            self.rotate_locked(&mut state)
        };
        report.emit(&self.paths.live());
        report.rotated
    }

    fn append(&self, buf: &[u8]) -> io::Result<usize> {
        let (result, report) = {
            let mut state = self.lock();
            if state.closed {
                return Err(io::Error::other("log sink is closed"));
            }
            let report = if !state.rotation_failed && self.is_due(&state) {
                Some(self.rotate_locked(&mut state))
            } else {
                None
            };
            let result = self
                .writer_locked(&mut state)
                .and_then(|writer| writer.write_all(buf))
                .map(|()| buf.len());
            (result, report)
        };
        if let Some(report) = report {
            report.emit(&self.paths.live());
        }
        result
    }

    /// The live writer, reopened in append mode if an earlier rotation left
    /// the sink without one.
    fn writer_locked<'a>(&self, state: &'a mut FileState) -> io::Result<&'a mut LineWriter<File>> {
        if state.writer.is_none() {
            let file = open_append(&self.paths.live())?;
            state.writer = Some(LineWriter::new(file));
        }
        state
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::other("log file is not open"))
    }

    /// Close, shift, reopen. Must be called with the state lock held.
    fn rotate_locked(&self, state: &mut FileState) -> RotationReport {
        let live = self.paths.live();
        let mut report = RotationReport::default();

        let plan = self
            .policy
            .plan(&self.paths, self.clock.today(), &FsIndex::new(&self.paths));
        let (ops, covered_until) = match plan {
            RotationPlan::Skip { archive } => {
                report.skipped = Some(archive);
                return report;
            }
            RotationPlan::Rotate { ops, covered_until } => (ops, covered_until),
        };

        if let Some(mut writer) = state.writer.take() {
            if let Err(e) = writer.flush().and_then(|()| writer.get_ref().sync_all()) {
                report.failures.push(format!("flush {}: {}", live.display(), e));
            }
        }

        for op in &ops {
            let applied = match op {
                // An archive left in place by an earlier failed step is never
                // overwritten.
                FsOp::Rename { to, .. } if to.exists() => {
                    Err(io::Error::new(io::ErrorKind::AlreadyExists, "destination exists"))
                }
                _ => op.apply(),
            };
            if let Err(e) = applied {
                report.failures.push(format!("{op}: {e}"));
            }
        }
        state.covered_until = covered_until;

        // If the live file could not be moved away it keeps its content and
        // is appended to until the next check.
        let kept = live.exists();
        report.rotated = !kept;
        state.rotation_failed = kept;
        let reopened = if kept {
            open_append(&live)
        } else {
            create_fresh(&live)
        };
        match reopened {
            Ok(file) => {
                let mut writer = LineWriter::new(file);
                let stamp = self.clock.now().format(TIMESTAMP_FORMAT);
                let unrecorded: Vec<String> = report
                    .failures
                    .iter()
                    .filter_map(|failure| {
                        writeln!(writer, "{stamp} rotalog: rotation error: {failure}")
                            .err()
                            .map(|e| format!("record rotation error in {}: {}", live.display(), e))
                    })
                    .collect();
                report.failures.extend(unrecorded);
                state.writer = Some(writer);
            }
            Err(e) => report.failures.push(format!("reopen {}: {}", live.display(), e)),
        }

        report
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
}

fn create_fresh(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create_new(true)
        .open(path)
}

/// Local date a non-empty existing file was last modified on.
fn resumed_file_date(path: &Path) -> Option<NaiveDate> {
    let meta = fs::metadata(path).ok()?;
    if meta.len() == 0 {
        return None;
    }
    let modified = meta.modified().ok()?;
    Some(DateTime::<Local>::from(modified).date_naive())
}

/// Strip the directories from a source path, keeping `file.rs`.
pub(crate) fn short_file(file: &str) -> &str {
    file.rsplit(['/', '\\']).next().unwrap_or(file)
}

/// `YYYY/MM/DD HH:MM:SS file.rs:LINE: level: message\n`
pub(crate) fn format_line(
    now: NaiveDateTime,
    level: LogLevel,
    message: &str,
    location: &Location<'_>,
) -> String {
    format!(
        "{} {}:{}: {}: {}\n",
        now.format(TIMESTAMP_FORMAT),
        short_file(location.file()),
        location.line(),
        level,
        message
    )
}
