//! Building discovery and detail enrichment against the Overpass API.

mod client;
mod details;
mod discovery;

pub use client::{Center, Element, OverpassClient, OverpassResponse, QueryError, SpatialQuery};
pub use details::{detail_query, parse_details, DetailFetcher, DetailOutcome, DetailReport};
pub use discovery::{
    building_query, extract_candidates, sample_entities, CategoryFilter, DiscoveryError,
    EntityDiscoverer,
};
