//! Per-entity detail enrichment with bounded retries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::client::{OverpassResponse, SpatialQuery};
use crate::models::{DetailValue, Details, Entity};
use crate::progress::ProgressEvent;
use crate::rate_limit::RetryPolicy;
use crate::storage::{ErrorLog, FailureRecord};

/// Overpass QL returning a single way with its tags.
pub fn detail_query(id: i64) -> String {
    format!("[out:json][timeout:25];\nway({});\nout body;\n>;\nout skel qt;", id)
}

/// Street and height from the first returned element; missing tags are `N/A`.
pub fn parse_details(response: &OverpassResponse) -> Details {
    match response.elements.first() {
        Some(el) => Details {
            addr_street: DetailValue::from_tag(el.tags.get("addr:street").map(String::as_str)),
            height: DetailValue::from_tag(el.tags.get("height").map(String::as_str)),
        },
        None => Details::not_available(),
    }
}

/// How a single entity's fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailOutcome {
    Fetched { attempts: u32 },
    Failed { attempts: u32 },
}

/// Result of enriching a batch. Entities are in completion order.
#[derive(Debug)]
pub struct DetailReport {
    pub entities: Vec<Entity>,
    pub fetched: usize,
    pub failed: usize,
}

/// Fetches street and height attributes for discovered entities.
#[derive(Clone)]
pub struct DetailFetcher {
    query: Arc<dyn SpatialQuery>,
    retry: RetryPolicy,
    concurrency: usize,
    request_delay: Duration,
    error_log: Option<Arc<ErrorLog>>,
}

impl DetailFetcher {
    pub fn new(query: Arc<dyn SpatialQuery>, retry: RetryPolicy) -> Self {
        Self {
            query,
            retry,
            concurrency: 5,
            request_delay: Duration::from_millis(500),
            error_log: None,
        }
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Pause each worker takes after finishing an entity.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_error_log(mut self, log: Arc<ErrorLog>) -> Self {
        self.error_log = Some(log);
        self
    }

    async fn log(&self, record: FailureRecord) {
        if let Some(log) = &self.error_log {
            log.record(record).await;
        }
    }

    /// Fetch details for one entity, updating it in place.
    ///
    /// Request failures are retried with backoff. A malformed payload stops
    /// immediately. Either way a failed entity ends up carrying the `"Error"`
    /// sentinel and exactly one exhausted record is logged for it.
    pub async fn fetch_one(&self, entity: &mut Entity) -> DetailOutcome {
        let query = detail_query(entity.id);
        let mut attempts = 0;

        for attempt in 0..self.retry.attempts {
            attempts = attempt + 1;
            match self.query.run(&query).await {
                Ok(response) => {
                    entity.apply_details(parse_details(&response));
                    debug!("Fetched details for {} (attempt {})", entity.id, attempts);
                    return DetailOutcome::Fetched { attempts };
                }
                Err(e) => {
                    warn!(
                        "Detail fetch for {} failed (attempt {}/{}): {}",
                        entity.id, attempts, self.retry.attempts, e
                    );
                    self.log(FailureRecord::DetailAttempt {
                        id: entity.id,
                        attempt: attempts,
                        error: e.to_string(),
                    })
                    .await;
                    if !e.is_transient() {
                        break;
                    }
                    self.retry.pause(attempt).await;
                }
            }
        }

        entity.mark_failed();
        self.log(FailureRecord::DetailExhausted {
            id: entity.id,
            attempts,
        })
        .await;
        DetailOutcome::Failed { attempts }
    }

    /// Enrich every entity using a pool of workers. Failed entities are kept.
    pub async fn fetch_all(
        &self,
        entities: Vec<Entity>,
        event_tx: mpsc::Sender<ProgressEvent>,
    ) -> DetailReport {
        let total = entities.len();
        let _ = event_tx
            .send(ProgressEvent::Started {
                label: "details".to_string(),
                total,
            })
            .await;

        let queue = Arc::new(Mutex::new(VecDeque::from(entities)));
        let done = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let fetched = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let workers = self.concurrency.min(total.max(1));
        let mut handles = Vec::with_capacity(workers);

        for worker_id in 0..workers {
            let fetcher = self.clone();
            let queue = queue.clone();
            let done = done.clone();
            let fetched = fetched.clone();
            let failed = failed.clone();
            let event_tx = event_tx.clone();

            let handle = tokio::spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(mut entity) = next else {
                        break;
                    };

                    match fetcher.fetch_one(&mut entity).await {
                        DetailOutcome::Fetched { .. } => {
                            fetched.fetch_add(1, Ordering::Relaxed);
                            let _ = event_tx
                                .send(ProgressEvent::Completed {
                                    worker_id,
                                    item: entity.id.to_string(),
                                })
                                .await;
                        }
                        DetailOutcome::Failed { attempts } => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            let _ = event_tx
                                .send(ProgressEvent::Failed {
                                    worker_id,
                                    item: entity.id.to_string(),
                                    error: format!("gave up after {} attempts", attempts),
                                })
                                .await;
                        }
                    }

                    done.lock().await.push(entity);

                    if !fetcher.request_delay.is_zero() {
                        tokio::time::sleep(fetcher.request_delay).await;
                    }
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Detail worker panicked: {}", e);
            }
        }

        let _ = event_tx
            .send(ProgressEvent::Finished {
                label: "details".to_string(),
            })
            .await;

        let entities = std::mem::take(&mut *done.lock().await);
        DetailReport {
            entities,
            fetched: fetched.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overpass::client::{Element, QueryError};
    use crate::progress;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Fails the first `failures` calls, then answers with fixed tags.
    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
        error: QueryError,
    }

    impl Flaky {
        fn new(failures: usize, error: QueryError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                error,
            }
        }
    }

    #[async_trait]
    impl SpatialQuery for Flaky {
        async fn run(&self, _query: &str) -> Result<OverpassResponse, QueryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(self.error.clone());
            }
            let mut tags = HashMap::new();
            tags.insert("addr:street".to_string(), "Main St".to_string());
            Ok(OverpassResponse {
                elements: vec![Element {
                    kind: "way".into(),
                    id: 1,
                    tags,
                    center: None,
                }],
            })
        }
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::exponential(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let query = Arc::new(Flaky::new(2, QueryError::Status(504)));
        let fetcher = DetailFetcher::new(query.clone(), fast(3));
        let mut entity = Entity::new(1, 0.0, 0.0, "house");

        let outcome = fetcher.fetch_one(&mut entity).await;

        assert_eq!(outcome, DetailOutcome::Fetched { attempts: 3 });
        assert_eq!(entity.addr_street, Some(DetailValue::Value("Main St".into())));
        assert_eq!(entity.height, Some(DetailValue::NotAvailable));
        assert_eq!(query.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_marks_error_and_logs() {
        let dir = tempdir().unwrap();
        let log = Arc::new(ErrorLog::new(dir.path().join("errors.jsonl")));
        let query = Arc::new(Flaky::new(usize::MAX, QueryError::Request("timeout".into())));
        let fetcher = DetailFetcher::new(query.clone(), fast(3)).with_error_log(log.clone());
        let mut entity = Entity::new(7, 0.0, 0.0, "yes");

        let outcome = fetcher.fetch_one(&mut entity).await;

        assert_eq!(outcome, DetailOutcome::Failed { attempts: 3 });
        assert!(entity.is_failed());
        assert_eq!(query.calls.load(Ordering::SeqCst), 3);

        let entries = ErrorLog::read(log.path()).unwrap();
        let attempts = entries
            .iter()
            .filter(|e| matches!(e.record, FailureRecord::DetailAttempt { id: 7, .. }))
            .count();
        let terminal: Vec<_> = entries.iter().filter(|e| e.record.is_terminal()).collect();
        assert_eq!(attempts, 3);
        assert_eq!(terminal.len(), 1);
        assert_eq!(
            terminal[0].record,
            FailureRecord::DetailExhausted { id: 7, attempts: 3 }
        );
    }

    #[tokio::test]
    async fn test_parse_failure_is_not_retried() {
        let query = Arc::new(Flaky::new(usize::MAX, QueryError::Parse("eof".into())));
        let fetcher = DetailFetcher::new(query.clone(), fast(3));
        let mut entity = Entity::new(3, 0.0, 0.0, "yes");

        let outcome = fetcher.fetch_one(&mut entity).await;

        assert_eq!(outcome, DetailOutcome::Failed { attempts: 1 });
        assert_eq!(entity.height, Some(DetailValue::Error));
        assert_eq!(query.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_response_is_not_available() {
        let details = parse_details(&OverpassResponse::default());
        assert_eq!(details, Details::not_available());
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_every_entity() {
        let query = Arc::new(Flaky::new(0, QueryError::Status(500)));
        let fetcher = DetailFetcher::new(query, fast(3))
            .with_concurrency(3)
            .with_request_delay(Duration::ZERO);
        let entities: Vec<Entity> = (1..=10)
            .map(|id| Entity::new(id, 0.0, 0.0, "house"))
            .collect();

        let report = fetcher.fetch_all(entities, progress::detached()).await;

        assert_eq!(report.fetched, 10);
        assert_eq!(report.failed, 0);
        let mut ids: Vec<i64> = report.entities.iter().map(|e| e.id).collect();
        ids.sort();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    /// Tracks how many queries run at once; each holds for `hold`.
    struct Gauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        hold: Duration,
    }

    impl Gauge {
        fn new(hold: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                hold,
            }
        }
    }

    #[async_trait]
    impl SpatialQuery for Gauge {
        async fn run(&self, _query: &str) -> Result<OverpassResponse, QueryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.hold.is_zero() {
                tokio::time::sleep(self.hold).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(OverpassResponse::default())
        }
    }

    #[tokio::test]
    async fn test_default_concurrency_caps_in_flight_queries() {
        let query = Arc::new(Gauge::new(Duration::from_millis(20)));
        let fetcher =
            DetailFetcher::new(query.clone(), fast(3)).with_request_delay(Duration::ZERO);
        let entities: Vec<Entity> = (1..=40)
            .map(|id| Entity::new(id, 0.0, 0.0, "house"))
            .collect();

        let report = fetcher.fetch_all(entities, progress::detached()).await;

        assert_eq!(report.fetched, 40);
        assert_eq!(query.peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_request_delay_follows_each_fetch() {
        let query = Arc::new(Gauge::new(Duration::ZERO));
        let fetcher = DetailFetcher::new(query, fast(3))
            .with_concurrency(1)
            .with_request_delay(Duration::from_millis(50));
        let entities: Vec<Entity> = (1..=3)
            .map(|id| Entity::new(id, 0.0, 0.0, "house"))
            .collect();

        let started = std::time::Instant::now();
        fetcher.fetch_all(entities, progress::detached()).await;

        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_backoff_doubles_between_attempts() {
        let query = Arc::new(Flaky::new(usize::MAX, QueryError::Status(503)));
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100));
        let fetcher = DetailFetcher::new(query.clone(), policy);
        let mut entity = Entity::new(9, 0.0, 0.0, "yes");

        let started = std::time::Instant::now();
        let outcome = fetcher.fetch_one(&mut entity).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, DetailOutcome::Failed { attempts: 3 });
        assert_eq!(query.calls.load(Ordering::SeqCst), 3);
        // 100ms then 200ms; no pause after the final attempt.
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(700));
    }
}
