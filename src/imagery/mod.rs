//! Imagery acquisition: URL building, availability pre-checks and downloads.

mod acquirer;
mod availability;
mod providers;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geo::{ground_resolution, pixel_dimensions};

pub use acquirer::{
    AcquireOutcome, AcquireReport, AssetFetcher, FetchError, HttpAssetFetcher, ImageAcquirer,
};
pub use availability::{AvailabilityFilter, AvailabilityProbe, FilterOutcome, StreetViewProbe};
pub use providers::{ImageSource, MapboxStatic, StreetViewImage, MAX_STATIC_PIXELS};

/// The kinds of image downloaded per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Close-up satellite tile of the building.
    House,
    /// Wider satellite tile of the surroundings.
    Neighbor,
    /// Street-level photo.
    #[serde(rename = "streetview")]
    StreetView,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [AssetKind::House, AssetKind::Neighbor, AssetKind::StreetView];

    pub fn slug(&self) -> &'static str {
        match self {
            AssetKind::House => "house",
            AssetKind::Neighbor => "neighbor",
            AssetKind::StreetView => "streetview",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AssetKind::House | AssetKind::Neighbor => "png",
            AssetKind::StreetView => "jpg",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "house" => Ok(AssetKind::House),
            "neighbor" | "neighbour" => Ok(AssetKind::Neighbor),
            "streetview" | "street_view" | "svi" => Ok(AssetKind::StreetView),
            other => Err(format!("unknown asset kind '{}'", other)),
        }
    }
}

/// Directory holding one kind of asset for a job.
pub fn asset_dir(root: &Path, job: &str, kind: AssetKind) -> PathBuf {
    root.join(job).join(kind.slug())
}

/// Deterministic path for an entity's asset: `<root>/<job>/<kind>/<id>_<kind>.<ext>`.
pub fn asset_path(root: &Path, job: &str, kind: AssetKind, id: i64) -> PathBuf {
    asset_dir(root, job, kind).join(format!("{}_{}.{}", id, kind.slug(), kind.extension()))
}

/// Physical footprint and zoom for a satellite tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageProfile {
    pub zoom: u8,
    /// Edge length of the covered square, in meters.
    pub size_meters: f64,
}

impl ImageProfile {
    /// Pixel dimensions covering the footprint at the given latitude.
    pub fn pixels_at(&self, latitude: f64) -> (u32, u32) {
        pixel_dimensions(self.size_meters, ground_resolution(latitude, self.zoom))
    }
}
