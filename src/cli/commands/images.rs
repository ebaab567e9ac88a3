//! Image acquisition command.

use std::path::Path;

use console::style;

use geoenrich::config::Settings;
use geoenrich::pipeline::{AcquireOptions, Pipeline};

use crate::cli::progress;

pub async fn cmd_images(
    settings: Settings,
    entities: &Path,
    options: &AcquireOptions,
    show_progress: bool,
) -> anyhow::Result<()> {
    if !tokio::fs::try_exists(entities).await.unwrap_or(false) {
        anyhow::bail!("entity file not found: {}", entities.display());
    }
    let pipeline = Pipeline::from_settings(settings)?;
    let (event_tx, renderer) = progress::spawn(show_progress);

    let result = pipeline.acquire(entities, options, &event_tx).await;
    drop(event_tx);
    if let Err(e) = renderer.await {
        tracing::warn!("Progress renderer failed: {}", e);
    }
    let (unavailable, reports) = result?;

    if unavailable > 0 {
        println!(
            "  {} {} locations without Street View were removed from {}",
            style("→").dim(),
            unavailable,
            entities.display()
        );
    }
    for (kind, report) in reports {
        println!(
            "{} {}: {} downloaded, {} already present, {} failed",
            style("✓").green(),
            kind,
            report.downloaded,
            report.skipped,
            report.failed
        );
    }
    Ok(())
}
