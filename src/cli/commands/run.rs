//! Full pipeline command.

use console::style;

use geoenrich::classify::Domain;
use geoenrich::config::Settings;
use geoenrich::pipeline::{AcquireOptions, Pipeline, Target};

use crate::cli::progress;

pub async fn cmd_run(
    settings: Settings,
    target: &Target,
    sample: usize,
    options: &AcquireOptions,
    domains: &[Domain],
    show_progress: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_settings(settings)?;
    let (event_tx, renderer) = progress::spawn(show_progress);

    let result = pipeline
        .run(target, sample, options, domains, event_tx)
        .await;
    if let Err(e) = renderer.await {
        tracing::warn!("Progress renderer failed: {}", e);
    }
    let summary = result?;

    println!(
        "{} {} buildings in {}",
        style("✓").green(),
        summary.discovery.entities,
        summary.discovery.entity_file.display()
    );
    if summary.discovery.detail_failures > 0 {
        println!(
            "  {} {} kept with \"Error\" details",
            style("!").yellow(),
            summary.discovery.detail_failures
        );
    }
    if summary.unavailable > 0 {
        println!(
            "  {} {} without Street View coverage",
            style("→").dim(),
            summary.unavailable
        );
    }
    for (kind, report) in &summary.acquisition {
        println!(
            "  {} {} images: {} new, {} present, {} failed",
            style("→").dim(),
            kind,
            report.downloaded,
            report.skipped,
            report.failed
        );
    }
    for (domain, report) in &summary.classification {
        println!(
            "  {} {} records: {} new, {} resumed, {} failed",
            style("→").dim(),
            domain,
            report.processed,
            report.skipped,
            report.failed
        );
    }
    Ok(())
}
