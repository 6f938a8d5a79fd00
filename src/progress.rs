// src/progress.rs

use chrono::{DateTime, Local};
use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::error::{PipelineError, Result};

/// `Year-Mon-Day-Hour:Minute:Second`, e.g. `2024-Mar-07-14:02:59`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%b-%d-%H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogEvent {
    pub fn line(&self) -> String {
        format!("{} : {}", self.timestamp.format(TIMESTAMP_FORMAT), self.message)
    }
}

/// Append-only milestone log. The pipeline never reads it back.
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp `message` with the local time and append it as one line.
    pub fn record(&self, message: &str) -> Result<LogEvent> {
        let event = LogEvent {
            timestamp: Local::now(),
            message: message.to_string(),
        };
        info!(target: "progress", "{}", message);

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| PipelineError::ProgressLog {
                path: self.path.clone(),
                source,
            })?;
        writeln!(f, "{}", event.line()).map_err(|source| PipelineError::ProgressLog {
            path: self.path.clone(),
            source,
        })?;
        Ok(event)
    }
}
