//! Rotation policy.
//!
//! Decides whether the live log file must roll over and which renames and
//! removals that takes. Nothing here touches the filesystem except through a
//! [`SegmentIndex`] and [`FsOp::apply`], so the decisions can be checked
//! against an in-memory view of the log directory.

use crate::error::{LogError, Result};
use chrono::{Days, NaiveDate};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Date suffix of date-mode archives.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Longest accepted date interval (one hundred years).
pub const MAX_INTERVAL_DAYS: u32 = 36_525;

/// How the live file rolls over. Fixed for the lifetime of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    #[default]
    None,
    /// Roll every `interval_days` calendar days. `max_segments == 1` keeps no
    /// history, `0` keeps every dated archive, `N > 1` keeps the newest `N`.
    ByDate { interval_days: u32, max_segments: u32 },
    /// Roll once the live file reaches `max_bytes`. Archives are numbered
    /// `1..=max_segments`, newest first; `max_segments == 1` keeps no history.
    BySize { max_bytes: u64, max_segments: u32 },
}

impl RotationMode {
    pub fn validate(&self) -> Result<()> {
        match *self {
            RotationMode::None => Err(LogError::InvalidConfig(
                "a rotation mode (by size or by date) is required".into(),
            )),
            RotationMode::ByDate { interval_days, .. } if interval_days == 0 => Err(
                LogError::InvalidConfig("date rotation interval must be at least one day".into()),
            ),
            RotationMode::ByDate { interval_days, .. } if interval_days > MAX_INTERVAL_DAYS => {
                Err(LogError::InvalidConfig(format!(
                    "date rotation interval {interval_days} exceeds {MAX_INTERVAL_DAYS} days"
                )))
            }
            RotationMode::BySize { max_bytes, .. } if max_bytes == 0 => Err(
                LogError::InvalidConfig("maximum file size must be greater than zero".into()),
            ),
            RotationMode::BySize { max_segments, .. } if max_segments == 0 => Err(
                LogError::InvalidConfig("maximum segment count must be greater than zero".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Names of the live file and its archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPaths {
    dir: PathBuf,
    name: String,
}

impl SegmentPaths {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn live(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// `<name>.<index>`
    pub fn numbered(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, index))
    }

    /// `<name>.<YYYY-MM-DD>`
    pub fn dated(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.name, date.format(DATE_FORMAT)))
    }

    /// Inverse of [`SegmentPaths::dated`] for a bare file name.
    pub fn parse_dated(&self, file_name: &str) -> Option<NaiveDate> {
        let suffix = file_name.strip_prefix(&self.name)?.strip_prefix('.')?;
        NaiveDate::parse_from_str(suffix, DATE_FORMAT).ok()
    }
}

/// What the policy is allowed to know about the log directory.
pub trait SegmentIndex {
    fn exists(&self, path: &Path) -> bool;

    /// Dates of every `<name>.<YYYY-MM-DD>` archive present.
    fn dated_archives(&self) -> Vec<NaiveDate>;
}

/// [`SegmentIndex`] backed by the real directory.
pub struct FsIndex<'a> {
    paths: &'a SegmentPaths,
}

impl<'a> FsIndex<'a> {
    pub fn new(paths: &'a SegmentPaths) -> Self {
        Self { paths }
    }
}

impl SegmentIndex for FsIndex<'_> {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn dated_archives(&self) -> Vec<NaiveDate> {
        let Ok(entries) = fs::read_dir(self.paths.dir()) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                self.paths.parse_dated(name.to_str()?)
            })
            .collect()
    }
}

/// A single filesystem step of a rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    Remove(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
}

impl FsOp {
    pub fn apply(&self) -> io::Result<()> {
        match self {
            FsOp::Remove(path) => fs::remove_file(path),
            FsOp::Rename { from, to } => fs::rename(from, to),
        }
    }
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsOp::Remove(path) => write!(f, "remove {}", path.display()),
            FsOp::Rename { from, to } => {
                write!(f, "rename {} -> {}", from.display(), to.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationPlan {
    /// The dated archive for this cycle already exists; leave everything alone.
    Skip { archive: PathBuf },
    Rotate {
        ops: Vec<FsOp>,
        /// New last day covered by the live file (date mode only).
        covered_until: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    mode: RotationMode,
}

impl RotationPolicy {
    pub fn new(mode: RotationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RotationMode {
        self.mode
    }

    /// Whether [`RotationPolicy::is_due`] needs the live file's length.
    pub fn tracks_size(&self) -> bool {
        matches!(self.mode, RotationMode::BySize { .. })
    }

    /// Last day covered by a live file whose period starts on `start`.
    /// Saturates at the last representable date.
    pub fn covered_until(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self.mode {
            RotationMode::ByDate { interval_days, .. } => {
                let extra = Days::new(u64::from(interval_days.max(1) - 1));
                Some(start.checked_add_days(extra).unwrap_or(NaiveDate::MAX))
            }
            _ => None,
        }
    }

    pub fn is_due(&self, covered_until: Option<NaiveDate>, today: NaiveDate, live_len: u64) -> bool {
        match self.mode {
            RotationMode::None => false,
            RotationMode::ByDate { .. } => covered_until.is_some_and(|until| today > until),
            RotationMode::BySize { max_bytes, .. } => live_len >= max_bytes,
        }
    }

    pub fn plan(&self, paths: &SegmentPaths, today: NaiveDate, index: &dyn SegmentIndex) -> RotationPlan {
        let live = paths.live();
        let live_exists = index.exists(&live);
        let mut ops = Vec::new();

        match self.mode {
            RotationMode::None => {}
            RotationMode::BySize { max_segments, .. } => {
                if max_segments == 1 {
                    if live_exists {
                        ops.push(FsOp::Remove(live));
                    }
                } else {
                    for n in (1..=max_segments).rev() {
                        let segment = paths.numbered(n);
                        if !index.exists(&segment) {
                            continue;
                        }
                        if n == max_segments {
                            ops.push(FsOp::Remove(segment));
                        } else {
                            ops.push(FsOp::Rename {
                                from: segment,
                                to: paths.numbered(n + 1),
                            });
                        }
                    }
                    if live_exists {
                        ops.push(FsOp::Rename {
                            from: live,
                            to: paths.numbered(1),
                        });
                    }
                }
            }
            RotationMode::ByDate { max_segments, .. } => {
                let yesterday = today.pred_opt().unwrap_or(today);
                let archive = paths.dated(yesterday);
                if index.exists(&archive) {
                    return RotationPlan::Skip { archive };
                }
                if live_exists {
                    if max_segments == 1 {
                        ops.push(FsOp::Remove(live));
                    } else {
                        ops.push(FsOp::Rename { from: live, to: archive });
                    }
                }
                if max_segments > 1 {
                    let mut older: Vec<NaiveDate> = index
                        .dated_archives()
                        .into_iter()
                        .filter(|date| *date != yesterday)
                        .collect();
                    older.sort_unstable_by(|a, b| b.cmp(a));
                    // yesterday's archive takes one of the slots
                    let keep = (max_segments as usize).saturating_sub(usize::from(live_exists));
                    ops.extend(older.into_iter().skip(keep).map(|d| FsOp::Remove(paths.dated(d))));
                }
            }
        }

        RotationPlan::Rotate {
            ops,
            covered_until: self.covered_until(today),
        }
    }
}
