//! Cheap availability checks run before paying for a download.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use super::providers::StreetViewImage;
use crate::credentials::CredentialRotator;
use crate::http_client::HttpClient;
use crate::models::Entity;
use crate::storage::{load_jsonl, store_jsonl, JsonlError};

/// Answers whether imagery exists at a location.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn available(&self, lat: f64, lon: f64) -> bool;
}

#[derive(Debug, Deserialize)]
struct StreetViewMetadata {
    status: String,
}

/// Street View metadata probe. Any error counts as unavailable.
pub struct StreetViewProbe {
    http: HttpClient,
    source: StreetViewImage,
    credentials: Arc<CredentialRotator>,
}

impl StreetViewProbe {
    pub fn new(
        http: HttpClient,
        source: StreetViewImage,
        credentials: Arc<CredentialRotator>,
    ) -> Self {
        Self {
            http,
            source,
            credentials,
        }
    }
}

#[async_trait]
impl AvailabilityProbe for StreetViewProbe {
    async fn available(&self, lat: f64, lon: f64) -> bool {
        let url = match self.source.metadata_url(lat, lon, self.credentials.next()) {
            Ok(u) => u,
            Err(e) => {
                debug!("Bad metadata URL for {},{}: {}", lat, lon, e);
                return false;
            }
        };
        let response = match self.http.get(url.as_str()).await {
            Ok(r) if r.is_success() => r,
            Ok(r) => {
                debug!("Metadata probe HTTP {} for {},{}", r.status_code(), lat, lon);
                return false;
            }
            Err(e) => {
                debug!("Metadata probe failed for {},{}: {}", lat, lon, e);
                return false;
            }
        };
        match response.text().await {
            Ok(body) => serde_json::from_str::<StreetViewMetadata>(&body)
                .map(|m| m.status == "OK")
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Entities split by availability, each side in input order.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub available: Vec<Entity>,
    pub unavailable: Vec<Entity>,
}

/// Drops entities whose location has no imagery.
pub struct AvailabilityFilter {
    probe: Arc<dyn AvailabilityProbe>,
    concurrency: usize,
}

impl AvailabilityFilter {
    pub fn new(probe: Arc<dyn AvailabilityProbe>) -> Self {
        Self {
            probe,
            concurrency: 8,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Probe every entity and partition, preserving order.
    pub async fn partition(&self, entities: Vec<Entity>) -> FilterOutcome {
        let probe = self.probe.clone();
        let results: Vec<(bool, Entity)> = stream::iter(entities)
            .map(|entity| {
                let probe = probe.clone();
                async move { (probe.available(entity.lat, entity.lon).await, entity) }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut outcome = FilterOutcome::default();
        for (ok, entity) in results {
            if ok {
                outcome.available.push(entity);
            } else {
                outcome.unavailable.push(entity);
            }
        }
        outcome
    }

    /// Filter an entity file in place: only the available subset is written back.
    ///
    /// A probe that cannot reach the provider reports "unavailable", so a
    /// rejected API key marks every location unavailable and leaves the
    /// entity file empty.
    pub async fn apply(&self, entity_file: &Path) -> Result<FilterOutcome, JsonlError> {
        let entities: Vec<Entity> = load_jsonl(entity_file).await?;
        let total = entities.len();
        let outcome = self.partition(entities).await;
        store_jsonl(entity_file, outcome.available.clone()).await?;
        info!(
            "{} of {} locations have imagery; rewrote {}",
            outcome.available.len(),
            total,
            entity_file.display()
        );
        Ok(outcome)
    }
}
