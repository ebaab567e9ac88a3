//! Progress events emitted by the pipeline stages.
//!
//! Services send events over an `mpsc` channel and never block on the
//! receiver; the CLI renders them as progress bars.

use tokio::sync::mpsc;

use crate::pipeline::Stage;

/// Events emitted while a stage fans work out to its workers.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The run moved to a new stage.
    StageChanged(Stage),
    /// A batch of work started.
    Started { label: String, total: usize },
    /// One unit of work completed.
    Completed { worker_id: usize, item: String },
    /// One unit of work was skipped (already present, unavailable, ...).
    Skipped {
        worker_id: usize,
        item: String,
        reason: String,
    },
    /// One unit of work failed; the batch continues.
    Failed {
        worker_id: usize,
        item: String,
        error: String,
    },
    /// The batch finished.
    Finished { label: String },
}

/// Sender whose receiver is already gone, for callers that don't render progress.
pub fn detached() -> mpsc::Sender<ProgressEvent> {
    let (tx, _rx) = mpsc::channel(1);
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detached_send_does_not_block() {
        let tx = detached();
        for _ in 0..10 {
            assert!(tx
                .send(ProgressEvent::Finished {
                    label: "x".into()
                })
                .await
                .is_err());
        }
    }
}
