//! geoenrich - building discovery and enrichment pipeline.
//!
//! Discovers building footprints inside a bounding box, fetches their
//! attributes, downloads imagery for each one and runs vision classifiers over
//! the images. Every stage writes JSONL that doubles as resume state.

pub mod classify;
pub mod config;
pub mod credentials;
pub mod geo;
pub mod geocode;
pub mod http_client;
pub mod imagery;
pub mod models;
pub mod overpass;
pub mod pipeline;
pub mod progress;
pub mod rate_limit;
pub mod storage;
