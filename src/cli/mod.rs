//! Command-line interface for geoenrich.

mod commands;
mod progress;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use geoenrich::classify::Domain;
use geoenrich::config::Settings;
use geoenrich::geo::BoundingBox;
use geoenrich::imagery::AssetKind;
use geoenrich::pipeline::Target;

#[derive(Parser)]
#[command(name = "geoenrich")]
#[command(about = "Building discovery, imagery acquisition and classification pipeline")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide progress bars
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check for `-v`/`--verbose` before clap runs, so logging is set up first.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Where to discover buildings.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Place name resolved through the geocoder (e.g. "Salt Lake City")
    place: Option<String>,

    /// Explicit bounding box as south,west,north,east
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    /// Name used in the entity file when --bbox is given
    #[arg(long)]
    name: Option<String>,

    /// Number of buildings to sample
    #[arg(short, long, default_value_t = 100)]
    sample: usize,
}

impl TargetArgs {
    fn target(&self) -> anyhow::Result<Target> {
        match (&self.bbox, &self.place) {
            (Some(bbox), place) => Ok(Target::Bbox {
                label: self
                    .name
                    .clone()
                    .or_else(|| place.clone())
                    .unwrap_or_else(|| "bbox".to_string()),
                bbox: *bbox,
            }),
            (None, Some(place)) => Ok(Target::Place(place.clone())),
            (None, None) => anyhow::bail!("give a place name or --bbox south,west,north,east"),
        }
    }
}

/// Which images to download.
#[derive(Args, Debug, Clone)]
pub struct ImageArgs {
    /// Asset kinds to download (house, neighbor, streetview)
    #[arg(long, value_delimiter = ',', default_values_t = AssetKind::ALL)]
    kinds: Vec<AssetKind>,

    /// Skip the Street View metadata probe (keeps every entity)
    #[arg(long)]
    no_availability_check: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for places by name (city, country)
    Places {
        /// Free-text query
        query: String,
    },

    /// Discover buildings and fetch their details into an entity file
    Discover {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Download imagery for an entity file
    Images {
        /// Entity JSONL file written by `discover`
        entities: PathBuf,

        #[command(flatten)]
        images: ImageArgs,
    },

    /// Classify downloaded imagery (resumes from existing output)
    Classify {
        /// Entity JSONL file the images were downloaded for
        entities: PathBuf,

        /// Domains to classify (house, neighbor, svi)
        #[arg(long, value_delimiter = ',', default_values_t = Domain::ALL)]
        domains: Vec<Domain>,
    },

    /// Run discovery, acquisition and classification end to end
    Run {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        images: ImageArgs,

        /// Domains to classify (house, neighbor, svi)
        #[arg(long, value_delimiter = ',', default_values_t = Domain::ALL)]
        domains: Vec<Domain>,
    },

    /// Show the effective configuration (credentials masked)
    Config,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).await?;
    let show_progress = !cli.quiet;

    match cli.command {
        Commands::Places { query } => commands::cmd_places(&settings, &query).await,
        Commands::Discover { target } => {
            commands::cmd_discover(settings, &target.target()?, target.sample, show_progress).await
        }
        Commands::Images { entities, images } => {
            commands::cmd_images(settings, &entities, &images.options(), show_progress).await
        }
        Commands::Classify { entities, domains } => {
            commands::cmd_classify(settings, &entities, &domains, show_progress).await
        }
        Commands::Run {
            target,
            images,
            domains,
        } => {
            commands::cmd_run(
                settings,
                &target.target()?,
                target.sample,
                &images.options(),
                &domains,
                show_progress,
            )
            .await
        }
        Commands::Config => commands::cmd_config(&settings),
    }
}

impl ImageArgs {
    fn options(&self) -> geoenrich::pipeline::AcquireOptions {
        geoenrich::pipeline::AcquireOptions {
            kinds: self.kinds.clone(),
            availability_check: !self.no_availability_check,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_bbox_and_lists() {
        let cli = Cli::try_parse_from([
            "geoenrich",
            "run",
            "--bbox",
            "40.7,-112.1,40.85,-111.7",
            "--sample",
            "25",
            "--kinds",
            "house,streetview",
            "--domains",
            "svi",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                target,
                images,
                domains,
            } => {
                assert_eq!(target.sample, 25);
                assert!(matches!(
                    target.target().unwrap(),
                    Target::Bbox { ref label, .. } if label == "bbox"
                ));
                assert_eq!(images.kinds, vec![AssetKind::House, AssetKind::StreetView]);
                assert_eq!(domains, vec![Domain::StreetView]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_target_requires_place_or_bbox() {
        let cli = Cli::try_parse_from(["geoenrich", "discover"]).unwrap();
        match cli.command {
            Commands::Discover { target } => assert!(target.target().is_err()),
            _ => panic!("expected discover"),
        }
    }
}
