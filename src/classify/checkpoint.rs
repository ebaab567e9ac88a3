//! Append-only classification output that doubles as resume state.

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{JsonlAppender, JsonlError};

/// One line of a checkpoint file: the asset filename plus one field per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    #[serde(rename = "Filename")]
    pub filename: String,
    #[serde(flatten)]
    pub predictions: BTreeMap<String, String>,
}

impl ClassificationRecord {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            predictions: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize)]
struct Identifier {
    #[serde(rename = "Filename")]
    filename: String,
}

/// A checkpoint file. Never truncated; each completed asset appends one line.
#[derive(Debug)]
pub struct Checkpoint {
    appender: JsonlAppender,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            appender: JsonlAppender::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.appender.path()
    }

    /// Identifiers already recorded. A missing file means nothing is done;
    /// lines that don't parse are skipped so a torn final write can't block resume.
    pub async fn completed(&self) -> Result<HashSet<String>, JsonlError> {
        let path = self.path();
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(e.into()),
        };
        let mut done = HashSet::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Identifier>(line) {
                Ok(id) => {
                    done.insert(id.filename);
                }
                Err(e) => warn!(
                    "Skipping malformed line {} in {}: {}",
                    idx + 1,
                    path.display(),
                    e
                ),
            }
        }
        Ok(done)
    }

    /// Append one record as a single line under the file lock.
    pub async fn append(&self, record: &ClassificationRecord) -> Result<(), JsonlError> {
        self.appender.append(record).await
    }
}
