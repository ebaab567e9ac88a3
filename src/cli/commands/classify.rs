//! Classification command.

use std::path::Path;

use console::style;

use geoenrich::classify::Domain;
use geoenrich::config::Settings;
use geoenrich::pipeline::Pipeline;

use crate::cli::progress;

pub async fn cmd_classify(
    settings: Settings,
    entities: &Path,
    domains: &[Domain],
    show_progress: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;
    let (event_tx, renderer) = progress::spawn(show_progress);

    let result = pipeline.classify(entities, domains, &event_tx).await;
    drop(event_tx);
    if let Err(e) = renderer.await {
        tracing::warn!("Progress renderer failed: {}", e);
    }

    for (domain, report) in result? {
        println!(
            "{} {}: {} classified, {} already done, {} failed",
            style("✓").green(),
            domain,
            report.processed,
            report.skipped,
            report.failed
        );
    }
    Ok(())
}
