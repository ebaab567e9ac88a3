//! Append-only failure log.
//!
//! Every stage that degrades a record to a sentinel or skips an asset writes
//! one entry here, so a run can be audited after the console output is gone.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::jsonl::{read_jsonl, JsonlAppender, JsonlError};

/// A single failure event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FailureRecord {
    /// One failed detail request for an entity (1-based attempt).
    DetailAttempt {
        id: i64,
        attempt: u32,
        error: String,
    },
    /// Detail fetch gave up; the entity carries the failure sentinel.
    DetailExhausted { id: i64, attempts: u32 },
    /// An image could not be downloaded.
    AssetFailed {
        id: i64,
        kind: String,
        lat: f64,
        lon: f64,
        error: String,
    },
    /// A classification task failed for an asset.
    ClassificationFailed { identifier: String, error: String },
}

impl FailureRecord {
    /// True for entries that mark a record as permanently failed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FailureRecord::DetailAttempt { .. })
    }
}

/// A timestamped log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: FailureRecord,
}

/// Shared failure log. Clone the `Arc`, not the log.
#[derive(Debug)]
pub struct ErrorLog {
    appender: JsonlAppender,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            appender: JsonlAppender::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.appender.path()
    }

    /// Append a record. A log write failure is reported but never fails the caller.
    pub async fn record(&self, record: FailureRecord) {
        let entry = LogEntry {
            at: Utc::now(),
            record,
        };
        if let Err(e) = self.appender.append(&entry).await {
            warn!(
                "Failed to write error log {}: {}",
                self.appender.path().display(),
                e
            );
        }
    }

    /// Read all entries; a missing file is an empty log.
    pub fn read(path: &Path) -> Result<Vec<LogEntry>, JsonlError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_jsonl(path)
    }
}
