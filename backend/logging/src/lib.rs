//! Leveled logging with rotating log files.
//!
//! A [`Logger`] filters calls by [`LogLevel`], mirrors them to stderr and,
//! once a roll policy is configured, appends them to a file that is rotated
//! either by size (`app.log.1`, `app.log.2`, ...) or by calendar days
//! (`app.log.2024-03-10`). Rotation is checked on every write and by a
//! background monitor thread owned by the sink.
//!
//! ```no_run
//! use rotalog_logging::{Logger, LogLevel, SizeUnit};
//!
//! let logger = Logger::new();
//! logger.set_level(LogLevel::Info);
//! logger.set_roll_by_size("/var/log/myapp", "app.log", 10, 5, SizeUnit::MB)?;
//! rotalog_logging::info!(logger, "started with {} workers", 4);
//! # Ok::<(), rotalog_logging::LogError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod level;
pub mod logger;
mod macros;
mod monitor;
pub mod policy;
pub mod sink;
pub mod subscriber;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LoggerConfig, RollConfig, load_config};
pub use error::{LogError, Result};
pub use level::{LogLevel, SizeUnit};
pub use logger::Logger;
pub use policy::{RotationMode, RotationPolicy};
pub use sink::RotatingFileSink;
pub use subscriber::{SinkMakeWriter, build_subscriber, init_tracing};
