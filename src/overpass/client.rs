//! Overpass API client.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::http_client::HttpClient;

/// Errors from a spatial query.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    /// Network failure or timeout.
    #[error("request failed: {0}")]
    Request(String),
    /// Non-success HTTP status.
    #[error("HTTP {0}")]
    Status(u16),
    /// Payload was not the expected JSON shape.
    #[error("malformed response: {0}")]
    Parse(String),
}

impl QueryError {
    /// Request-level failures are worth retrying; malformed payloads are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, QueryError::Parse(_))
    }
}

/// Overpass JSON response (only the parts we read).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverpassResponse {
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub center: Option<Center>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Center {
    pub lat: f64,
    pub lon: f64,
}

/// A service that answers Overpass QL queries.
#[async_trait]
pub trait SpatialQuery: Send + Sync {
    async fn run(&self, query: &str) -> Result<OverpassResponse, QueryError>;
}

/// HTTP implementation against an Overpass interpreter endpoint.
pub struct OverpassClient {
    http: HttpClient,
    endpoint: String,
}

impl OverpassClient {
    pub fn new(http: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl SpatialQuery for OverpassClient {
    async fn run(&self, query: &str) -> Result<OverpassResponse, QueryError> {
        debug!("Overpass query: {}", query.trim());
        let response = self
            .http
            .get_with_query(&self.endpoint, &[("data", query)])
            .await
            .map_err(|e| QueryError::Request(e.to_string()))?;

        if !response.is_success() {
            return Err(QueryError::Status(response.status_code()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Request(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| QueryError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_center_response() {
        let body = r#"{
            "version": 0.6,
            "elements": [
                {"type": "way", "id": 42, "center": {"lat": 40.7, "lon": -111.9},
                 "tags": {"building": "house", "height": "7"}},
                {"type": "node", "id": 1, "lat": 0.0, "lon": 0.0}
            ]
        }"#;
        let resp: OverpassResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.elements.len(), 2);
        assert_eq!(resp.elements[0].tags["building"], "house");
        assert!(resp.elements[1].center.is_none());
        assert!(resp.elements[1].tags.is_empty());
    }

    #[test]
    fn test_missing_elements_is_malformed() {
        let body = r#"{"remark": "runtime error"}"#;
        assert!(serde_json::from_str::<OverpassResponse>(body).is_err());
    }

    #[test]
    fn test_transient_classification() {
        assert!(QueryError::Request("timeout".into()).is_transient());
        assert!(QueryError::Status(504).is_transient());
        assert!(!QueryError::Parse("eof".into()).is_transient());
    }
}
