//! End-to-end run orchestration.
//!
//! A run moves through `Idle -> Discovering -> Detailing -> Filtering ->
//! Acquiring -> Classifying -> Done`. Only discovery can stop a run early;
//! every later stage records failures and carries on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classify::{
    Checkpoint, ClassificationPool, Classifier, Domain, PoolReport, VisionClassifier,
};
use crate::config::Settings;
use crate::credentials::CredentialRotator;
use crate::geo::BoundingBox;
use crate::geocode::{Geocoder, NominatimGeocoder};
use crate::http_client::HttpClient;
use crate::imagery::{
    asset_dir, AcquireReport, AssetKind, AvailabilityFilter, HttpAssetFetcher, ImageAcquirer,
    ImageSource, MapboxStatic, StreetViewImage, StreetViewProbe,
};
use crate::models::Entity;
use crate::overpass::{
    CategoryFilter, DetailFetcher, EntityDiscoverer, OverpassClient, SpatialQuery,
};
use crate::progress::ProgressEvent;
use crate::storage::{entity_file_path, job_name, load_jsonl, store_jsonl, ErrorLog};

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Discovering,
    Detailing,
    Filtering,
    Acquiring,
    Classifying,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Discovering => "discovering",
            Stage::Detailing => "detailing",
            Stage::Filtering => "filtering",
            Stage::Acquiring => "acquiring",
            Stage::Classifying => "classifying",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Where to look for buildings.
#[derive(Debug, Clone)]
pub enum Target {
    /// Resolved through the geocoder.
    Place(String),
    /// Explicit box; `label` names the entity file.
    Bbox { label: String, bbox: BoundingBox },
}

/// Result of discovery plus detail enrichment.
#[derive(Debug, Clone)]
pub struct DiscoverSummary {
    pub entity_file: PathBuf,
    pub entities: usize,
    pub detail_failures: usize,
}

/// Counts for a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub discovery: DiscoverSummary,
    pub unavailable: usize,
    pub acquisition: Vec<(AssetKind, AcquireReport)>,
    pub classification: Vec<(Domain, PoolReport)>,
}

/// Options for the acquisition stage.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub kinds: Vec<AssetKind>,
    /// Probe Street View metadata and drop unavailable locations first.
    pub availability_check: bool,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            kinds: AssetKind::ALL.to_vec(),
            availability_check: true,
        }
    }
}

pub struct Pipeline {
    settings: Settings,
    http: HttpClient,
    geocoder: Arc<dyn Geocoder>,
    query: Arc<dyn SpatialQuery>,
}

impl Pipeline {
    /// Build a pipeline talking to the configured services.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let http =
            HttpClient::from_settings(&settings.http).context("failed to build HTTP client")?;
        let geocoder = Arc::new(NominatimGeocoder::new(http.clone(), &settings.geocoder.endpoint));
        let query = Arc::new(OverpassClient::new(http.clone(), &settings.overpass.endpoint));
        Ok(Self::new(settings, http, geocoder, query))
    }

    pub fn new(
        settings: Settings,
        http: HttpClient,
        geocoder: Arc<dyn Geocoder>,
        query: Arc<dyn SpatialQuery>,
    ) -> Self {
        Self {
            settings,
            http,
            geocoder,
            query,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn stage(&self, stage: Stage, event_tx: &mpsc::Sender<ProgressEvent>) {
        info!("Stage: {}", stage);
        let _ = event_tx.send(ProgressEvent::StageChanged(stage)).await;
    }

    /// Discover buildings, fetch their details and write the entity file.
    /// Returns an error only when discovery itself fails.
    pub async fn discover(
        &self,
        target: &Target,
        sample: usize,
        event_tx: &mpsc::Sender<ProgressEvent>,
    ) -> anyhow::Result<DiscoverSummary> {
        if sample == 0 {
            bail!("sample size must be at least 1");
        }
        self.stage(Stage::Discovering, event_tx).await;
        let (label, bbox) = match target {
            Target::Place(place) => {
                let bbox = self
                    .geocoder
                    .resolve(place)
                    .await
                    .with_context(|| format!("could not resolve '{}'", place))?;
                (place.clone(), bbox)
            }
            Target::Bbox { label, bbox } => (label.clone(), *bbox),
        };

        let overpass = &self.settings.overpass;
        let discoverer = EntityDiscoverer::new(self.query.clone())
            .with_categories(CategoryFilter::from_list(&overpass.categories))
            .with_seed(overpass.seed);
        let entities = discoverer
            .discover(&bbox, sample)
            .await
            .context("building discovery failed")?;

        self.stage(Stage::Detailing, event_tx).await;
        let error_log = Arc::new(ErrorLog::new(self.settings.detail_error_log()));
        let fetcher = DetailFetcher::new(self.query.clone(), overpass.retry_policy())
            .with_concurrency(overpass.concurrency)
            .with_request_delay(overpass.request_delay())
            .with_error_log(error_log);
        let report = fetcher.fetch_all(entities, event_tx.clone()).await;

        let kept = overpass.on_failure.apply(report.entities);
        let entity_file = entity_file_path(&self.settings.data_dir, &label, sample, &bbox);
        let entities = kept.len();
        store_jsonl(&entity_file, kept)
            .await
            .with_context(|| format!("failed to write {}", entity_file.display()))?;
        info!(
            "Wrote {} entities ({} detail failures) to {}",
            entities,
            report.failed,
            entity_file.display()
        );

        Ok(DiscoverSummary {
            entity_file,
            entities,
            detail_failures: report.failed,
        })
    }

    fn rotator(&self, name: &str, keys: &[String]) -> anyhow::Result<Arc<CredentialRotator>> {
        let rotator = CredentialRotator::new(name, keys.to_vec())?;
        debug!("Using {:?}", rotator);
        Ok(Arc::new(rotator))
    }

    fn source_for(&self, kind: AssetKind) -> Arc<dyn ImageSource> {
        let imagery = &self.settings.imagery;
        match kind {
            AssetKind::House => Arc::new(MapboxStatic::house(&imagery.mapbox)),
            AssetKind::Neighbor => Arc::new(MapboxStatic::neighbor(&imagery.mapbox)),
            AssetKind::StreetView => Arc::new(StreetViewImage::from_settings(&imagery.streetview)),
        }
    }

    fn credentials_for(&self, kind: AssetKind) -> anyhow::Result<Arc<CredentialRotator>> {
        let creds = &self.settings.credentials;
        match kind {
            AssetKind::House | AssetKind::Neighbor => self.rotator("mapbox", &creds.mapbox),
            AssetKind::StreetView => self.rotator("google", &creds.google),
        }
    }

    /// Optionally filter by Street View availability, then download each kind.
    /// Returns the number of entities dropped by the filter and per-kind counts.
    pub async fn acquire(
        &self,
        entity_file: &Path,
        options: &AcquireOptions,
        event_tx: &mpsc::Sender<ProgressEvent>,
    ) -> anyhow::Result<(usize, Vec<(AssetKind, AcquireReport)>)> {
        // Fail before any work when a requested provider has no keys.
        let mut plan = Vec::with_capacity(options.kinds.len());
        for &kind in &options.kinds {
            plan.push((kind, self.credentials_for(kind)?));
        }

        let mut unavailable = 0;
        if options.availability_check && options.kinds.contains(&AssetKind::StreetView) {
            self.stage(Stage::Filtering, event_tx).await;
            let google = self.credentials_for(AssetKind::StreetView)?;
            let probe = StreetViewProbe::new(
                self.http.clone(),
                StreetViewImage::from_settings(&self.settings.imagery.streetview),
                google,
            );
            let outcome = AvailabilityFilter::new(Arc::new(probe))
                .apply(entity_file)
                .await
                .with_context(|| format!("availability filter on {}", entity_file.display()))?;
            unavailable = outcome.unavailable.len();
        }

        self.stage(Stage::Acquiring, event_tx).await;
        let entities: Vec<Entity> = load_jsonl(entity_file)
            .await
            .with_context(|| format!("failed to read {}", entity_file.display()))?;
        let job = job_name(entity_file);
        let fetcher = Arc::new(HttpAssetFetcher::new(self.http.clone()));
        let error_log = Arc::new(ErrorLog::new(self.settings.acquisition_error_log()));
        let imagery = &self.settings.imagery;

        let mut reports = Vec::with_capacity(plan.len());
        for (kind, credentials) in plan {
            let acquirer = ImageAcquirer::new(
                fetcher.clone(),
                self.source_for(kind),
                credentials,
                &self.settings.images_dir,
                &job,
            )
            .with_retry(imagery.retry_policy())
            .with_concurrency(imagery.concurrency)
            .with_error_log(error_log.clone());
            let report = acquirer.acquire_all(entities.clone(), event_tx.clone()).await;
            reports.push((kind, report));
        }
        Ok((unavailable, reports))
    }

    /// Classify the acquired images of each domain into its checkpoint file.
    pub async fn classify(
        &self,
        entity_file: &Path,
        domains: &[Domain],
        event_tx: &mpsc::Sender<ProgressEvent>,
    ) -> anyhow::Result<Vec<(Domain, PoolReport)>> {
        self.stage(Stage::Classifying, event_tx).await;
        let openai = self.rotator("openai", &self.settings.credentials.openai)?;
        let job = job_name(entity_file);
        let classify = &self.settings.classify;
        let output_dir = self.settings.job_output_dir(&job);
        let error_log = Arc::new(ErrorLog::new(output_dir.join("classification_errors.jsonl")));

        let mut reports = Vec::with_capacity(domains.len());
        for &domain in domains {
            let dir = asset_dir(&self.settings.images_dir, &job, domain.asset_kind());
            let is_dir = tokio::fs::metadata(&dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                warn!("No {} images at {}, skipping", domain, dir.display());
                continue;
            }

            let classifiers: Vec<Arc<dyn Classifier>> = domain
                .tasks()
                .iter()
                .map(|task| {
                    Arc::new(
                        VisionClassifier::new(
                            self.http.clone(),
                            &classify.endpoint,
                            classify.model_for(task.name),
                            *task,
                            openai.clone(),
                        )
                        .with_max_tokens(classify.max_tokens),
                    ) as Arc<dyn Classifier>
                })
                .collect();

            let checkpoint_path = output_dir.join(format!("{}_{}.jsonl", job, domain.slug()));
            let checkpoint = Checkpoint::new(checkpoint_path);
            let pool = ClassificationPool::new(classifiers, checkpoint)
                .with_max_workers(classify.max_workers)
                .with_error_log(error_log.clone());
            let report = pool
                .run(&dir, event_tx.clone())
                .await
                .with_context(|| format!("classifying {}", dir.display()))?;
            info!(
                "{}: {} classified, {} skipped, {} failed",
                domain, report.processed, report.skipped, report.failed
            );
            reports.push((domain, report));
        }
        Ok(reports)
    }

    /// Run every stage. Failures after discovery are logged and the run continues.
    pub async fn run(
        &self,
        target: &Target,
        sample: usize,
        acquire: &AcquireOptions,
        domains: &[Domain],
        event_tx: mpsc::Sender<ProgressEvent>,
    ) -> anyhow::Result<RunSummary> {
        self.stage(Stage::Idle, &event_tx).await;
        let discovery = self.discover(target, sample, &event_tx).await?;

        let (unavailable, acquisition) =
            match self.acquire(&discovery.entity_file, acquire, &event_tx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Image acquisition stopped: {:#}", e);
                    (0, Vec::new())
                }
            };

        let classification = match self.classify(&discovery.entity_file, domains, &event_tx).await {
            Ok(reports) => reports,
            Err(e) => {
                warn!("Classification stopped: {:#}", e);
                Vec::new()
            }
        };

        self.stage(Stage::Done, &event_tx).await;
        Ok(RunSummary {
            discovery,
            unavailable,
            acquisition,
            classification,
        })
    }
}
