//! Image classification with resumable, checkpointed output.
//!
//! Each asset is sent to every task of its domain. The merged record is
//! appended to the domain's checkpoint file only once all tasks answered, and
//! assets already present in the checkpoint are skipped on the next run.

mod checkpoint;
mod pool;
mod tasks;
mod vision;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::JsonlError;

pub use checkpoint::{Checkpoint, ClassificationRecord};
pub use pool::{list_assets, ClassificationPool, PoolReport};
pub use tasks::{Domain, TaskSpec};
pub use vision::VisionClassifier;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed API response: {0}")]
    Parse(String),
    #[error("API response had no content")]
    EmptyResponse,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] JsonlError),
}

/// An image loaded once and shared by all tasks that classify it.
#[derive(Debug, Clone)]
pub struct AssetImage {
    /// File name, also the record identifier.
    pub filename: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl AssetImage {
    pub async fn load(path: &Path) -> Result<Self, std::io::Error> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
            _ => "image/jpeg",
        };
        Ok(Self {
            filename,
            path: path.to_path_buf(),
            bytes,
            mime,
        })
    }
}

/// One classification task.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Output field this task fills.
    fn field(&self) -> &str;

    /// Raw textual answer for the image.
    async fn classify(&self, image: &AssetImage) -> Result<String, ClassifyError>;
}
