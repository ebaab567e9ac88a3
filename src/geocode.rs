//! Place name resolution through a Nominatim-compatible geocoder.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::geo::BoundingBox;
use crate::http_client::HttpClient;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoder request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("geocoder returned HTTP {0}")]
    Status(u16),
    #[error("malformed geocoder response: {0}")]
    Parse(String),
    #[error("no results for '{0}'")]
    NotFound(String),
}

/// Resolves a free-text place name to a bounding box.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, place: &str) -> Result<BoundingBox, GeocodeError>;
}

/// A place candidate returned by [`NominatimGeocoder::search_places`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCandidate {
    pub city: String,
    pub country: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    boundingbox: Vec<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    country: Option<String>,
}

/// Parse Nominatim's `[south, north, west, east]` string array.
fn bbox_from_nominatim(raw: &[String]) -> Result<BoundingBox, GeocodeError> {
    if raw.len() != 4 {
        return Err(GeocodeError::Parse(format!(
            "boundingbox has {} values",
            raw.len()
        )));
    }
    let mut v = [0.0f64; 4];
    for (slot, s) in v.iter_mut().zip(raw) {
        *slot = s
            .parse()
            .map_err(|_| GeocodeError::Parse(format!("bad coordinate '{}'", s)))?;
    }
    let [south, north, west, east] = v;
    BoundingBox::new(south, west, north, east).map_err(|e| GeocodeError::Parse(e.to_string()))
}

fn candidate(place: &NominatimPlace) -> PlaceCandidate {
    let city = place
        .display_name
        .split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("N/A")
        .to_string();
    let country = place
        .address
        .as_ref()
        .and_then(|a| a.country.clone())
        .unwrap_or_else(|| "N/A".to_string());
    PlaceCandidate { city, country }
}

pub struct NominatimGeocoder {
    http: HttpClient,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(http: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    async fn search(
        &self,
        query: &str,
        address_details: bool,
    ) -> Result<Vec<NominatimPlace>, GeocodeError> {
        let url = format!("{}/search", self.endpoint);
        let mut params = vec![("q", query), ("format", "json")];
        if address_details {
            params.push(("addressdetails", "1"));
        }
        let response = self.http.get_with_query(&url, &params).await?;
        if !response.is_success() {
            return Err(GeocodeError::Status(response.status_code()));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| GeocodeError::Parse(e.to_string()))
    }

    /// Candidate `(city, country)` pairs matching a query.
    pub async fn search_places(&self, query: &str) -> Result<Vec<PlaceCandidate>, GeocodeError> {
        let places = self.search(query, true).await?;
        Ok(places.iter().map(candidate).collect())
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, place: &str) -> Result<BoundingBox, GeocodeError> {
        let places = self.search(place, false).await?;
        let first = places
            .first()
            .ok_or_else(|| GeocodeError::NotFound(place.to_string()))?;
        let bbox = bbox_from_nominatim(&first.boundingbox)?;
        debug!("Resolved '{}' to {}", place, bbox);
        Ok(bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bbox_order_is_south_north_west_east() {
        let bbox = bbox_from_nominatim(&strings(&["40.7", "40.85", "-112.1", "-111.7"])).unwrap();
        assert_eq!(bbox.south, 40.7);
        assert_eq!(bbox.north, 40.85);
        assert_eq!(bbox.west, -112.1);
        assert_eq!(bbox.east, -111.7);
    }

    #[test]
    fn test_bbox_rejects_bad_values() {
        assert!(bbox_from_nominatim(&strings(&["1", "2", "3"])).is_err());
        assert!(bbox_from_nominatim(&strings(&["x", "2", "3", "4"])).is_err());
    }

    #[test]
    fn test_candidate_from_search_result() {
        let body = r#"[
            {"display_name": "Salt Lake City, Salt Lake County, Utah, United States",
             "boundingbox": ["40.7", "40.85", "-112.1", "-111.7"],
             "address": {"city": "Salt Lake City", "country": "United States"}},
            {"display_name": "", "boundingbox": []}
        ]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        let got: Vec<PlaceCandidate> = places.iter().map(candidate).collect();
        assert_eq!(
            got,
            vec![
                PlaceCandidate {
                    city: "Salt Lake City".into(),
                    country: "United States".into()
                },
                PlaceCandidate {
                    city: "N/A".into(),
                    country: "N/A".into()
                },
            ]
        );
    }
}
