//! Request URLs for the imagery providers.

use url::Url;

use super::{AssetKind, ImageProfile};
use crate::config::{MapboxSettings, StreetViewSettings};
use crate::models::Entity;

/// Largest edge the Static Images API accepts.
pub const MAX_STATIC_PIXELS: u32 = 1280;

/// Builds the download URL for one kind of asset.
pub trait ImageSource: Send + Sync {
    fn kind(&self) -> AssetKind;
    fn url(&self, entity: &Entity, credential: &str) -> Result<Url, url::ParseError>;
}

/// Mapbox Static Images tile centered on the entity.
#[derive(Debug, Clone)]
pub struct MapboxStatic {
    endpoint: String,
    style: String,
    kind: AssetKind,
    profile: ImageProfile,
}

impl MapboxStatic {
    pub fn new(
        endpoint: impl Into<String>,
        style: impl Into<String>,
        kind: AssetKind,
        profile: ImageProfile,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            style: style.into(),
            kind,
            profile,
        }
    }

    pub fn house(settings: &MapboxSettings) -> Self {
        Self::new(&settings.endpoint, &settings.style, AssetKind::House, settings.house)
    }

    pub fn neighbor(settings: &MapboxSettings) -> Self {
        Self::new(
            &settings.endpoint,
            &settings.style,
            AssetKind::Neighbor,
            settings.neighbor,
        )
    }
}

impl ImageSource for MapboxStatic {
    fn kind(&self) -> AssetKind {
        self.kind
    }

    fn url(&self, entity: &Entity, credential: &str) -> Result<Url, url::ParseError> {
        let (w, h) = self.profile.pixels_at(entity.lat);
        let (w, h) = (w.clamp(1, MAX_STATIC_PIXELS), h.clamp(1, MAX_STATIC_PIXELS));
        let raw = format!(
            "{}/{}/static/{},{},{}/{}x{}",
            self.endpoint, self.style, entity.lon, entity.lat, self.profile.zoom, w, h
        );
        Url::parse_with_params(&raw, &[("access_token", credential)])
    }
}

/// Google Street View still image nearest to the entity.
#[derive(Debug, Clone)]
pub struct StreetViewImage {
    endpoint: String,
    size: String,
    radius: u32,
}

impl StreetViewImage {
    pub fn new(endpoint: impl Into<String>, size: impl Into<String>, radius: u32) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            size: size.into(),
            radius,
        }
    }

    pub fn from_settings(settings: &StreetViewSettings) -> Self {
        Self::new(&settings.endpoint, &settings.size, settings.radius)
    }

    fn location(lat: f64, lon: f64) -> String {
        format!("{},{}", lat, lon)
    }

    /// Metadata endpoint; answers whether imagery exists without billing an image.
    pub fn metadata_url(
        &self,
        lat: f64,
        lon: f64,
        credential: &str,
    ) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &format!("{}/metadata", self.endpoint),
            &[
                ("location", Self::location(lat, lon)),
                ("radius", self.radius.to_string()),
                ("key", credential.to_string()),
            ],
        )
    }
}

impl ImageSource for StreetViewImage {
    fn kind(&self) -> AssetKind {
        AssetKind::StreetView
    }

    fn url(&self, entity: &Entity, credential: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("size", self.size.clone()),
                ("location", Self::location(entity.lat, entity.lon)),
                ("radius", self.radius.to_string()),
                ("key", credential.to_string()),
            ],
        )
    }
}
