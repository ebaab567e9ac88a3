//! Configuration management for geoenrich.
//!
//! Settings come from a TOML or JSON file (picked by extension), then
//! environment overrides for credentials. Every field has a default so an
//! empty file is a valid configuration. Without `--config`, the file is
//! discovered by `prefer` in the standard locations for `geoenrich`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::imagery::ImageProfile;
use crate::models::SentinelPolicy;
use crate::rate_limit::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported config format: {0} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),
}

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Entity JSONL files and the detail error log.
    pub data_dir: PathBuf,
    /// Downloaded imagery, `{images_dir}/{job}/{kind}/`.
    pub images_dir: PathBuf,
    /// Classification checkpoints, `{output_dir}/{job}/`.
    pub output_dir: PathBuf,
    pub http: HttpSettings,
    pub geocoder: GeocoderSettings,
    pub overpass: OverpassSettings,
    pub imagery: ImagerySettings,
    pub classify: ClassifySettings,
    pub credentials: CredentialSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            images_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("output"),
            http: HttpSettings::default(),
            geocoder: GeocoderSettings::default(),
            overpass: OverpassSettings::default(),
            imagery: ImagerySettings::default(),
            classify: ClassifySettings::default(),
            credentials: CredentialSettings::default(),
        }
    }
}

/// `[http]` - applied to every outbound request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: 30,
        }
    }
}

/// `[geocoder]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderSettings {
    pub endpoint: String,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org".to_string(),
        }
    }
}

/// `[overpass]` - discovery and detail fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverpassSettings {
    pub endpoint: String,
    /// Building categories kept by discovery; `["*"]` keeps everything.
    pub categories: Vec<String>,
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub concurrency: usize,
    /// Pause each worker takes after a completed fetch.
    pub request_delay_ms: u64,
    pub on_failure: SentinelPolicy,
    /// Fixed sampling seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for OverpassSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://overpass-api.de/api/interpreter".to_string(),
            categories: vec!["yes".into(), "house".into(), "commercial".into()],
            attempts: 3,
            base_delay_ms: 1000,
            concurrency: 5,
            request_delay_ms: 500,
            on_failure: SentinelPolicy::Retain,
            seed: None,
        }
    }
}

impl OverpassSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.attempts, Duration::from_millis(self.base_delay_ms))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// `[imagery]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagerySettings {
    pub attempts: u32,
    pub retry_pause_ms: u64,
    pub concurrency: usize,
    pub mapbox: MapboxSettings,
    pub streetview: StreetViewSettings,
}

impl Default for ImagerySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_pause_ms: 2000,
            concurrency: 4,
            mapbox: MapboxSettings::default(),
            streetview: StreetViewSettings::default(),
        }
    }
}

impl ImagerySettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.attempts, Duration::from_millis(self.retry_pause_ms))
    }
}

/// `[imagery.mapbox]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapboxSettings {
    pub endpoint: String,
    pub style: String,
    pub house: ImageProfile,
    pub neighbor: ImageProfile,
}

impl Default for MapboxSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.mapbox.com/styles/v1/mapbox".to_string(),
            style: "satellite-v9".to_string(),
            house: ImageProfile {
                zoom: 20,
                size_meters: 100.0,
            },
            neighbor: ImageProfile {
                zoom: 17,
                size_meters: 500.0,
            },
        }
    }
}

/// `[imagery.streetview]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreetViewSettings {
    pub endpoint: String,
    /// `WIDTHxHEIGHT` in pixels.
    pub size: String,
    /// Search radius around the point, in meters.
    pub radius: u32,
}

impl Default for StreetViewSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://maps.googleapis.com/maps/api/streetview".to_string(),
            size: "600x300".to_string(),
            radius: 30,
        }
    }
}

/// `[classify]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifySettings {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    pub default_model: String,
    /// Per-task model overrides keyed by task name (e.g. `roof_type`).
    pub models: HashMap<String, String>,
    /// Concurrent assets; unbounded when unset.
    pub max_workers: Option<usize>,
    pub max_tokens: u32,
}

impl Default for ClassifySettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            default_model: "gpt-4o-2024-08-06".to_string(),
            models: HashMap::new(),
            max_workers: None,
            max_tokens: 300,
        }
    }
}

impl ClassifySettings {
    /// Model for a task: the override if configured, else the default.
    pub fn model_for(&self, task: &str) -> &str {
        self.models
            .get(task)
            .map(|s| s.as_str())
            .unwrap_or(&self.default_model)
    }
}

/// `[credentials]` - ordered key pools per provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub mapbox: Vec<String>,
    pub google: Vec<String>,
    pub openai: Vec<String>,
}

impl Settings {
    /// Load settings from an explicit path, or the config file `prefer`
    /// discovers, or defaults. Environment overrides always apply.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(p) => Self::from_file(p).await?,
            None => Self::discover().await?,
        };
        Ok(settings.with_env_overrides())
    }

    /// Use prefer for file discovery, then parse with serde.
    async fn discover() -> Result<Self, ConfigError> {
        match prefer::load("geoenrich").await {
            Ok(found) => match found.source_path() {
                Some(path) => Self::from_file(path).await,
                None => Ok(Self::default()),
            },
            Err(_) => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a TOML or JSON config file.
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let settings: Settings = match ext.as_deref() {
            Some("toml") => toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?,
            Some("json") => {
                serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `GEOENRICH_DATA_DIR`: entity file directory
    /// - `MAPBOX_API_KEY`: comma-separated Mapbox tokens
    /// - `GOOGLE_API_KEY`: comma-separated Google Maps keys
    /// - `OPENAI_API_KEYS`: comma-separated OpenAI keys
    /// - `OPENAI_API_KEY`: single OpenAI key, used when `OPENAI_API_KEYS` is unset
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("GEOENRICH_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(keys) = lookup("MAPBOX_API_KEY").map(|v| split_keys(&v)) {
            if !keys.is_empty() {
                self.credentials.mapbox = keys;
            }
        }
        if let Some(keys) = lookup("GOOGLE_API_KEY").map(|v| split_keys(&v)) {
            if !keys.is_empty() {
                self.credentials.google = keys;
            }
        }
        let openai = lookup("OPENAI_API_KEYS").or_else(|| lookup("OPENAI_API_KEY"));
        if let Some(keys) = openai.map(|v| split_keys(&v)) {
            if !keys.is_empty() {
                self.credentials.openai = keys;
            }
        }
        self
    }

    /// Log of per-entity detail failures.
    pub fn detail_error_log(&self) -> PathBuf {
        self.data_dir.join("building_data_errors.jsonl")
    }

    /// Log of image download failures.
    pub fn acquisition_error_log(&self) -> PathBuf {
        self.images_dir.join("acquisition_errors.jsonl")
    }

    /// Directory holding checkpoints for a job.
    pub fn job_output_dir(&self, job: &str) -> PathBuf {
        self.output_dir.join(job)
    }
}

fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}
