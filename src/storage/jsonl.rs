//! Line-delimited JSON files.
//!
//! Whole-file writes go through a temp file in the same directory and a
//! rename, so readers never observe a half-written file. Appends are
//! serialized through an async mutex and land as one `write_all` per line.
//! A torn final line left by a crash is terminated before the first append,
//! so the next record always starts on its own line.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("blocking file task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Read every non-blank line of a JSONL file.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, JsonlError> {
    let file = std::fs::File::open(path)?;
    let mut items = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|source| JsonlError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        items.push(item);
    }
    Ok(items)
}

/// Replace a JSONL file with the given items.
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), JsonlError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    {
        let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
        for item in items {
            serde_json::to_writer(&mut writer, item).map_err(JsonlError::Serialize)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| JsonlError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// [`read_jsonl`] on the blocking pool.
pub async fn load_jsonl<T>(path: &Path) -> Result<Vec<T>, JsonlError>
where
    T: DeserializeOwned + Send + 'static,
{
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || read_jsonl(&path)).await?
}

/// [`write_jsonl`] on the blocking pool.
pub async fn store_jsonl<T>(path: &Path, items: Vec<T>) -> Result<(), JsonlError>
where
    T: Serialize + Send + 'static,
{
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_jsonl(&path, &items)).await?
}

/// Append-only JSONL writer safe to share between tasks.
#[derive(Debug)]
pub struct JsonlAppender {
    path: PathBuf,
    /// Set once the existing tail has been checked for a missing newline.
    lock: Mutex<bool>,
}

impl JsonlAppender {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    pub async fn append<T: Serialize + ?Sized>(&self, record: &T) -> Result<(), JsonlError> {
        let mut line = serde_json::to_vec(record).map_err(JsonlError::Serialize)?;
        line.push(b'\n');

        let mut tail_checked = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;
        if !*tail_checked {
            if file.metadata().await?.len() > 0 {
                file.seek(std::io::SeekFrom::End(-1)).await?;
                let mut last = [0u8; 1];
                file.read_exact(&mut last).await?;
                if last[0] != b'\n' {
                    line.insert(0, b'\n');
                }
            }
            *tail_checked = true;
        }
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
