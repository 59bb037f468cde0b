//! Logger configuration: typed schema, file loading and env overrides.
//!
//! ```yaml
//! level: info
//! console: false
//! roll:
//!   by: size
//!   dir: /var/log/myapp
//!   name: app.log
//!   maxSize: 10
//!   unit: MB
//!   maxSegments: 5
//! ```

use crate::level::{LogLevel, SizeUnit};
use crate::logger::Logger;
use crate::policy::RotationMode;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Overrides the configured level.
pub const LEVEL_ENV: &str = "ROTALOG_LEVEL";
/// Overrides console output (`1`/`true`/`on` or `0`/`false`/`off`).
pub const CONSOLE_ENV: &str = "ROTALOG_CONSOLE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default = "default_console")]
    pub console: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<RollConfig>,
}

fn default_console() -> bool {
    true
}

fn default_interval_days() -> u32 {
    1
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            console: default_console(),
            roll: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "camelCase")]
pub enum RollConfig {
    #[serde(rename_all = "camelCase")]
    Size {
        dir: PathBuf,
        name: String,
        max_size: u64,
        #[serde(default)]
        unit: SizeUnit,
        max_segments: u32,
    },
    #[serde(rename_all = "camelCase")]
    Date {
        dir: PathBuf,
        name: String,
        #[serde(default = "default_interval_days")]
        interval_days: u32,
        /// 0 keeps every dated archive.
        #[serde(default)]
        max_segments: u32,
    },
}

impl RollConfig {
    pub fn dir(&self) -> &Path {
        match self {
            RollConfig::Size { dir, .. } | RollConfig::Date { dir, .. } => dir,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RollConfig::Size { name, .. } | RollConfig::Date { name, .. } => name,
        }
    }

    pub fn mode(&self) -> Result<RotationMode> {
        Ok(match *self {
            RollConfig::Size { max_size, unit, max_segments, .. } => RotationMode::BySize {
                max_bytes: max_size
                    .checked_mul(unit.bytes())
                    .with_context(|| format!("maxSize {max_size} {unit:?} overflows"))?,
                max_segments,
            },
            RollConfig::Date { interval_days, max_segments, .. } => RotationMode::ByDate {
                interval_days,
                max_segments,
            },
        })
    }
}

impl LoggerConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Failed to parse logger config YAML")
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse logger config JSON")
    }

    /// Apply `ROTALOG_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_env_overrides_from(&std::env::vars().collect())
    }

    /// Apply overrides from an explicit map (useful for testing).
    pub fn with_env_overrides_from(mut self, env: &HashMap<String, String>) -> Result<Self> {
        if let Some(raw) = env.get(LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.level = raw
                .parse::<LogLevel>()
                .with_context(|| format!("Invalid {LEVEL_ENV} value"))?;
        }
        if let Some(raw) = env.get(CONSOLE_ENV).filter(|v| !v.trim().is_empty()) {
            self.console = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                other => bail!("Invalid {CONSOLE_ENV} value \"{other}\""),
            };
        }
        Ok(self)
    }

    /// Build a logger with this configuration applied.
    pub fn build(&self) -> Result<Logger> {
        let logger = Logger::new();
        self.apply(&logger)?;
        Ok(logger)
    }

    /// Apply level, console flag and (if set) the roll policy to `logger`.
    pub fn apply(&self, logger: &Logger) -> Result<()> {
        logger.set_level(self.level);
        logger.set_console(self.console);
        if let Some(roll) = &self.roll {
            logger
                .configure_rotation(roll.dir(), roll.name(), roll.mode()?)
                .with_context(|| {
                    format!("Failed to configure log file {}", roll.dir().join(roll.name()).display())
                })?;
        }
        Ok(())
    }
}

/// Load a logger config from `.yaml`/`.yml` or `.json`.
///
/// Returns the defaults if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<LoggerConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Logger config does not exist; using defaults");
        return Ok(LoggerConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read logger config: {}", path.display()))?;

    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => LoggerConfig::from_json_str(&raw),
        _ => LoggerConfig::from_yaml_str(&raw),
    }
    .with_context(|| format!("Invalid logger config at: {}", path.display()))?;

    debug!(path = %path.display(), "Loaded logger config");
    Ok(config)
}
