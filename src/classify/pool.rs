//! Worker pool that classifies a directory of assets.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use super::{AssetImage, Checkpoint, ClassificationRecord, Classifier, ClassifyError};
use crate::progress::ProgressEvent;
use crate::storage::{ErrorLog, FailureRecord};

/// Counts for one pool run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// `.jpg` and `.png` files directly inside `dir`, sorted by name.
pub async fn list_assets(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut assets = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("png"));
        if is_image && tokio::fs::metadata(&path).await?.is_file() {
            assets.push(path);
        }
    }
    assets.sort();
    Ok(assets)
}

/// Runs every classifier over every pending asset and checkpoints the results.
pub struct ClassificationPool {
    classifiers: Arc<Vec<Arc<dyn Classifier>>>,
    checkpoint: Arc<Checkpoint>,
    max_workers: Option<usize>,
    error_log: Option<Arc<ErrorLog>>,
}

impl ClassificationPool {
    pub fn new(classifiers: Vec<Arc<dyn Classifier>>, checkpoint: Checkpoint) -> Self {
        Self {
            classifiers: Arc::new(classifiers),
            checkpoint: Arc::new(checkpoint),
            max_workers: None,
            error_log: None,
        }
    }

    /// Cap concurrent assets; unbounded when `None`.
    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_error_log(mut self, log: Arc<ErrorLog>) -> Self {
        self.error_log = Some(log);
        self
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Classify every asset in `dir` not yet in the checkpoint.
    ///
    /// The checkpoint is read once, before scheduling. Two runs started
    /// together on the same checkpoint can therefore both process an asset
    /// and append duplicate records; readers should key on `Filename`.
    pub async fn run(
        &self,
        dir: &Path,
        event_tx: mpsc::Sender<ProgressEvent>,
    ) -> Result<PoolReport, ClassifyError> {
        let assets = list_assets(dir).await?;
        let completed = self.checkpoint.completed().await?;

        let (pending, done): (Vec<PathBuf>, Vec<PathBuf>) =
            assets.into_iter().partition(|path| {
                path.file_name()
                    .map(|n| !completed.contains(&*n.to_string_lossy()))
                    .unwrap_or(false)
            });
        let skipped = done.len();
        info!(
            "{}: {} assets pending, {} already in {}",
            dir.display(),
            pending.len(),
            skipped,
            self.checkpoint.path().display()
        );

        let label = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "classify".to_string());
        let _ = event_tx
            .send(ProgressEvent::Started {
                label: label.clone(),
                total: pending.len(),
            })
            .await;

        let semaphore = self
            .max_workers
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let processed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(pending.len());
        for (worker_id, path) in pending.into_iter().enumerate() {
            let classifiers = self.classifiers.clone();
            let checkpoint = self.checkpoint.clone();
            let error_log = self.error_log.clone();
            let semaphore = semaphore.clone();
            let processed = processed.clone();
            let failed = failed.clone();
            let event_tx = event_tx.clone();

            let handle = tokio::spawn(async move {
                let _permit = match &semaphore {
                    Some(s) => s.clone().acquire_owned().await.ok(),
                    None => None,
                };
                let item = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();

                match classify_asset(&classifiers, &checkpoint, &path).await {
                    Ok(()) => {
                        processed.fetch_add(1, Ordering::Relaxed);
                        let _ = event_tx
                            .send(ProgressEvent::Completed { worker_id, item })
                            .await;
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!("Classification failed for {}: {}", item, e);
                        if let Some(log) = &error_log {
                            log.record(FailureRecord::ClassificationFailed {
                                identifier: item.clone(),
                                error: e.to_string(),
                            })
                            .await;
                        }
                        let _ = event_tx
                            .send(ProgressEvent::Failed {
                                worker_id,
                                item,
                                error: e.to_string(),
                            })
                            .await;
                    }
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Classification task panicked: {}", e);
                failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        let _ = event_tx.send(ProgressEvent::Finished { label }).await;

        Ok(PoolReport {
            processed: processed.load(Ordering::Relaxed),
            skipped,
            failed: failed.load(Ordering::Relaxed),
        })
    }
}

/// Run all tasks for one asset concurrently and append the merged record.
async fn classify_asset(
    classifiers: &[Arc<dyn Classifier>],
    checkpoint: &Checkpoint,
    path: &Path,
) -> Result<(), ClassifyError> {
    let image = AssetImage::load(path).await?;
    let answers = try_join_all(classifiers.iter().map(|c| {
        let image = &image;
        async move {
            let answer = c.classify(image).await?;
            Ok::<_, ClassifyError>((c.field().to_string(), answer))
        }
    }))
    .await?;

    let mut record = ClassificationRecord::new(image.filename.clone());
    record.predictions.extend(answers);
    checkpoint.append(&record).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records every filename it sees; fails for names containing "bad".
    struct Recording {
        field: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Classifier for Recording {
        fn field(&self) -> &str {
            self.field
        }

        async fn classify(&self, image: &AssetImage) -> Result<String, ClassifyError> {
            self.seen.lock().unwrap().push(image.filename.clone());
            if image.filename.contains("bad") {
                return Err(ClassifyError::EmptyResponse);
            }
            tokio::task::yield_now().await;
            Ok(format!("Filename: {}, Type_Class: 1", image.filename))
        }
    }

    fn classifiers(seen: &Arc<Mutex<Vec<String>>>) -> Vec<Arc<dyn Classifier>> {
        ["Roof_Type_Prediction", "Green_Prediction"]
            .into_iter()
            .map(|field| {
                Arc::new(Recording {
                    field,
                    seen: seen.clone(),
                }) as Arc<dyn Classifier>
            })
            .collect()
    }

    fn assets(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), b"img").unwrap();
        }
    }

    #[tokio::test]
    async fn test_resume_skips_completed_identifiers() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        assets(&images, &["A.png", "B.png", "notes.txt"]);

        let checkpoint_path = dir.path().join("job_house.jsonl");
        std::fs::write(
            &checkpoint_path,
            "{\"Filename\":\"A.png\",\"Roof_Type_Prediction\":\"x\",\"Green_Prediction\":\"y\"}\n",
        )
        .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let pool = ClassificationPool::new(classifiers(&seen), Checkpoint::new(&checkpoint_path));
        let report = pool.run(&images, progress::detached()).await.unwrap();

        assert_eq!(
            report,
            PoolReport {
                processed: 1,
                skipped: 1,
                failed: 0
            }
        );
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec!["B.png".to_string(), "B.png".to_string()]);

        let records: Vec<ClassificationRecord> =
            crate::storage::read_jsonl(&checkpoint_path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].filename, "B.png");
        assert_eq!(records[1].predictions.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_asset_is_isolated() {
        let dir = tempdir().unwrap();
        assets(dir.path(), &["1_house.png", "2_bad.png", "3_house.png"]);
        let log = Arc::new(ErrorLog::new(dir.path().join("errors.jsonl")));
        let checkpoint = Checkpoint::new(dir.path().join("out").join("job_house.jsonl"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let pool = ClassificationPool::new(classifiers(&seen), checkpoint)
            .with_max_workers(Some(1))
            .with_error_log(log.clone());
        let report = pool.run(dir.path(), progress::detached()).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        let done = pool.checkpoint().completed().await.unwrap();
        assert!(!done.contains("2_bad.png"));
        assert_eq!(done.len(), 2);

        let entries = ErrorLog::read(log.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(
            &entries[0].record,
            FailureRecord::ClassificationFailed { identifier, .. } if identifier == "2_bad.png"
        ));
    }

    #[tokio::test]
    async fn test_concurrent_pools_never_corrupt_checkpoint() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images");
        std::fs::create_dir(&images).unwrap();
        let names: Vec<String> = (0..20).map(|i| format!("{}_svi.jpg", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        assets(&images, &refs);
        let checkpoint_path = dir.path().join("job_svi.jsonl");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = ClassificationPool::new(classifiers(&seen), Checkpoint::new(&checkpoint_path));
        let second = ClassificationPool::new(classifiers(&seen), Checkpoint::new(&checkpoint_path));
        let (a, b) = tokio::join!(
            first.run(&images, progress::detached()),
            second.run(&images, progress::detached())
        );
        a.unwrap();
        b.unwrap();

        // Every line is a complete record; duplicates are allowed, gaps are not.
        let raw = std::fs::read_to_string(&checkpoint_path).unwrap();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for line in raw.lines() {
            let record: ClassificationRecord = serde_json::from_str(line).unwrap();
            assert_eq!(record.predictions.len(), 2);
            *counts.entry(record.filename).or_default() += 1;
        }
        assert_eq!(counts.len(), 20);
        assert!(counts.values().all(|&n| n == 1 || n == 2));

        // A later run finds everything complete.
        let third = ClassificationPool::new(classifiers(&seen), Checkpoint::new(&checkpoint_path));
        let report = third.run(&images, progress::detached()).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 20);
    }

    /// Counts simultaneous classifications; each holds for 30ms.
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for Gauge {
        fn field(&self) -> &str {
            "Roof_Type_Prediction"
        }

        async fn classify(&self, _image: &AssetImage) -> Result<String, ClassifyError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("Type_Class: 1".to_string())
        }
    }

    async fn peak_with(max_workers: Option<usize>) -> usize {
        let dir = tempdir().unwrap();
        let names: Vec<String> = (0..10).map(|i| format!("{}_house.png", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        assets(dir.path(), &refs);

        let gauge = Arc::new(Gauge {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let checkpoint = Checkpoint::new(dir.path().join("out").join("job_house.jsonl"));
        let classifiers: Vec<Arc<dyn Classifier>> = vec![gauge.clone()];
        let pool = ClassificationPool::new(classifiers, checkpoint).with_max_workers(max_workers);
        let report = pool.run(dir.path(), progress::detached()).await.unwrap();
        assert_eq!(report.processed, 10);
        gauge.peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_max_workers_bounds_concurrent_assets() {
        assert_eq!(peak_with(Some(2)).await, 2);
    }

    #[tokio::test]
    async fn test_unbounded_pool_overlaps_assets() {
        assert!(peak_with(None).await > 2);
    }
}
