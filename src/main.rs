//! geoenrich - building discovery, imagery acquisition and classification.
//!
//! Resolves a place to a bounding box, samples buildings from OpenStreetMap,
//! downloads satellite and street-level imagery for each one and classifies
//! the images with vision models. Every stage can be re-run and resumes where
//! the previous run stopped.

mod cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "geoenrich=info"
    } else {
        "geoenrich=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run().await
}
