//! Idempotent image downloads.
//!
//! The destination path is the ledger: an asset whose file already exists is
//! never requested again. This check is not a lock, so two processes targeting
//! the same job can both download the same asset. Files are written under a
//! temporary name and renamed, so a crash never leaves a partial file behind
//! under the final name.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use super::providers::ImageSource;
use super::{asset_path, AssetKind};
use crate::credentials::CredentialRotator;
use crate::http_client::{redact, HttpClient};
use crate::models::Entity;
use crate::progress::ProgressEvent;
use crate::rate_limit::RetryPolicy;
use crate::storage::{ErrorLog, FailureRecord};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(u16),
}

impl FetchError {
    /// Client errors other than not-found, timeout and rate-limit cannot
    /// succeed on retry (e.g. 422 for an unprocessable request).
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(_) => true,
            FetchError::Status(code) => {
                !(400..500).contains(code) || matches!(*code, 404 | 408 | 429)
            }
        }
    }
}

/// Downloads raw asset bytes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpAssetFetcher {
    http: HttpClient,
}

impl HttpAssetFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http
            .get(url.as_str())
            .await
            .map_err(|e| FetchError::Request(e.without_url().to_string()))?;
        if !response.is_success() {
            return Err(FetchError::Status(response.status_code()));
        }
        response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.without_url().to_string()))
    }
}

/// How a single asset ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Downloaded,
    Skipped,
    Failed(String),
}

/// Counts for a batch of downloads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcquireReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Downloads one kind of asset for a batch of entities.
#[derive(Clone)]
pub struct ImageAcquirer {
    fetcher: Arc<dyn AssetFetcher>,
    source: Arc<dyn ImageSource>,
    credentials: Arc<CredentialRotator>,
    retry: RetryPolicy,
    root: PathBuf,
    job: String,
    concurrency: usize,
    error_log: Option<Arc<ErrorLog>>,
}

impl ImageAcquirer {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        source: Arc<dyn ImageSource>,
        credentials: Arc<CredentialRotator>,
        root: impl Into<PathBuf>,
        job: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            source,
            credentials,
            retry: RetryPolicy::fixed(3, std::time::Duration::from_secs(2)),
            root: root.into(),
            job: job.into(),
            concurrency: 4,
            error_log: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn with_error_log(mut self, log: Arc<ErrorLog>) -> Self {
        self.error_log = Some(log);
        self
    }

    pub fn kind(&self) -> AssetKind {
        self.source.kind()
    }

    /// Where this acquirer stores the asset for `id`.
    pub fn path_for(&self, id: i64) -> PathBuf {
        asset_path(&self.root, &self.job, self.kind(), id)
    }

    /// Download the asset for one entity unless it is already on disk.
    pub async fn acquire_one(&self, entity: &Entity) -> AcquireOutcome {
        let path = self.path_for(entity.id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("{} exists, skipping", path.display());
            return AcquireOutcome::Skipped;
        }

        let error = match self.download(entity, &path).await {
            Ok(()) => return AcquireOutcome::Downloaded,
            Err(e) => e,
        };

        warn!(
            "Failed to acquire {} image for {} at ({}, {}): {}",
            self.kind(),
            entity.id,
            entity.lat,
            entity.lon,
            error
        );
        if let Some(log) = &self.error_log {
            log.record(FailureRecord::AssetFailed {
                id: entity.id,
                kind: self.kind().slug().to_string(),
                lat: entity.lat,
                lon: entity.lon,
                error: error.clone(),
            })
            .await;
        }
        AcquireOutcome::Failed(error)
    }

    async fn download(&self, entity: &Entity, path: &Path) -> Result<(), String> {
        let mut last_error = String::new();

        for attempt in 0..self.retry.attempts {
            let url = self
                .source
                .url(entity, self.credentials.next())
                .map_err(|e| format!("invalid request URL: {}", e))?;

            match self.fetcher.fetch(&url).await {
                Ok(bytes) => {
                    return write_asset(path, &bytes)
                        .await
                        .map_err(|e| format!("write {}: {}", path.display(), e));
                }
                Err(e) => {
                    debug!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt + 1,
                        self.retry.attempts,
                        redact(url.as_str()),
                        e
                    );
                    last_error = e.to_string();
                    if !e.is_retryable() {
                        break;
                    }
                    self.retry.pause(attempt).await;
                }
            }
        }

        Err(last_error)
    }

    /// Acquire assets for every entity using a pool of workers.
    /// A failed asset is logged and counted; the batch always completes.
    pub async fn acquire_all(
        &self,
        entities: Vec<Entity>,
        event_tx: mpsc::Sender<ProgressEvent>,
    ) -> AcquireReport {
        let label = self.kind().slug().to_string();
        let total = entities.len();
        let _ = event_tx
            .send(ProgressEvent::Started {
                label: label.clone(),
                total,
            })
            .await;

        let queue = Arc::new(Mutex::new(VecDeque::from(entities)));
        let downloaded = Arc::new(AtomicUsize::new(0));
        let skipped = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let workers = self.concurrency.min(total.max(1));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let acquirer = self.clone();
            let queue = queue.clone();
            let downloaded = downloaded.clone();
            let skipped = skipped.clone();
            let failed = failed.clone();
            let event_tx = event_tx.clone();

            let handle = tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(entity) = next else {
                        break;
                    };
                    let item = entity.id.to_string();

                    let event = match acquirer.acquire_one(&entity).await {
                        AcquireOutcome::Downloaded => {
                            downloaded.fetch_add(1, Ordering::Relaxed);
                            ProgressEvent::Completed { worker_id, item }
                        }
                        AcquireOutcome::Skipped => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                            ProgressEvent::Skipped {
                                worker_id,
                                item,
                                reason: "exists".to_string(),
                            }
                        }
                        AcquireOutcome::Failed(error) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            ProgressEvent::Failed {
                                worker_id,
                                item,
                                error,
                            }
                        }
                    };
                    let _ = event_tx.send(event).await;
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Acquisition worker panicked: {}", e);
            }
        }

        let report = AcquireReport {
            downloaded: downloaded.load(Ordering::Relaxed),
            skipped: skipped.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        info!(
            "{} images: {} downloaded, {} skipped, {} failed",
            label, report.downloaded, report.skipped, report.failed
        );
        let _ = event_tx.send(ProgressEvent::Finished { label }).await;
        report
    }
}

/// Write through a sibling temp file, then rename into place.
async fn write_asset(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    tokio::fs::write(&partial, bytes).await?;
    tokio::fs::rename(&partial, path).await
}
