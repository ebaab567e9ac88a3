//! Terminal rendering of pipeline progress events.

use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use geoenrich::progress::ProgressEvent;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg:12} [{bar:30.cyan/blue}] {pos}/{len} {elapsed}")
        .map(|s| s.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Draws one bar per batch. Stages run one batch at a time, so item events
/// always belong to the most recently started bar.
struct StageProgress {
    multi: MultiProgress,
    current: Option<ProgressBar>,
    failures: usize,
}

impl StageProgress {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current: None,
            failures: 0,
        }
    }

    fn println(&self, message: String) {
        if self.multi.println(&message).is_err() {
            println!("{}", message);
        }
    }

    fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::StageChanged(stage) => {
                self.println(format!("{} {}", style("→").cyan(), stage));
            }
            ProgressEvent::Started { label, total } => {
                let bar = self.multi.add(ProgressBar::new(total as u64));
                bar.set_style(bar_style());
                bar.set_message(label);
                bar.enable_steady_tick(Duration::from_millis(100));
                self.current = Some(bar);
            }
            ProgressEvent::Completed { .. } | ProgressEvent::Skipped { .. } => {
                if let Some(bar) = &self.current {
                    bar.inc(1);
                }
            }
            ProgressEvent::Failed { item, error, .. } => {
                self.failures += 1;
                self.println(format!("{} {}: {}", style("✗").red(), item, error));
                if let Some(bar) = &self.current {
                    bar.inc(1);
                }
            }
            ProgressEvent::Finished { .. } => {
                if let Some(bar) = self.current.take() {
                    bar.finish();
                }
            }
        }
    }
}

/// Spawn a renderer and return the sender services report to.
/// With `show` false events are drained without drawing anything.
pub fn spawn(show: bool) -> (mpsc::Sender<ProgressEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(256);
    let handle = tokio::spawn(async move {
        let mut progress = show.then(StageProgress::new);
        while let Some(event) = rx.recv().await {
            if let Some(p) = progress.as_mut() {
                p.handle(event);
            }
        }
        if let Some(p) = progress {
            if p.failures > 0 {
                p.println(format!(
                    "{} {} item(s) failed, see the error logs",
                    style("!").yellow(),
                    p.failures
                ));
            }
        }
    });
    (tx, handle)
}
