use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by logger configuration and sink lifecycle calls.
#[derive(Debug, Error)]
pub enum LogError {
    /// Missing or zero parameter in a roll configuration. A caller bug.
    #[error("invalid logger configuration: {0}")]
    InvalidConfig(String),

    #[error("log file I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
