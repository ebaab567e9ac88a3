//! Discovery command.

use console::style;

use geoenrich::config::Settings;
use geoenrich::pipeline::{Pipeline, Target};

use crate::cli::progress;

pub async fn cmd_discover(
    settings: Settings,
    target: &Target,
    sample: usize,
    show_progress: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;
    let (event_tx, renderer) = progress::spawn(show_progress);

    let result = pipeline.discover(target, sample, &event_tx).await;
    drop(event_tx);
    if let Err(e) = renderer.await {
        tracing::warn!("Progress renderer failed: {}", e);
    }
    let summary = result?;

    println!(
        "{} Wrote {} buildings to {}",
        style("✓").green(),
        summary.entities,
        summary.entity_file.display()
    );
    if summary.detail_failures > 0 {
        println!(
            "  {} {} detail fetches failed (see {})",
            style("!").yellow(),
            summary.detail_failures,
            pipeline.settings().detail_error_log().display()
        );
    }
    Ok(())
}
