//! Building discovery inside a bounding box.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use super::client::{OverpassResponse, QueryError, SpatialQuery};
use crate::geo::BoundingBox;
use crate::models::Entity;

/// Categories kept when none are configured.
pub const DEFAULT_CATEGORIES: &[&str] = &["yes", "house", "commercial"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("building query failed: {0}")]
    Query(#[from] QueryError),
    #[error("no buildings found in {0}")]
    NoBuildings(BoundingBox),
}

/// Overpass QL for every building way in the box, with way centers.
pub fn building_query(bbox: &BoundingBox) -> String {
    format!(
        "[out:json][timeout:25];\n(\n  way[\"building\"]({});\n);\nout center;",
        bbox.to_overpass()
    )
}

/// Which `building` tag values are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    Any,
    Only(HashSet<String>),
}

impl CategoryFilter {
    /// Build from config values; a `*` entry keeps everything.
    pub fn from_list<S: AsRef<str>>(categories: &[S]) -> Self {
        if categories.iter().any(|c| c.as_ref() == "*") {
            return Self::Any;
        }
        let set: HashSet<String> = categories
            .iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if set.is_empty() {
            Self::default()
        } else {
            Self::Only(set)
        }
    }

    pub fn allows(&self, category: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(category),
        }
    }
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self::Only(DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect())
    }
}

/// Building ways with a center, filtered by category, first occurrence of each id.
pub fn extract_candidates(response: &OverpassResponse, filter: &CategoryFilter) -> Vec<Entity> {
    let mut seen = HashSet::new();
    response
        .elements
        .iter()
        .filter(|el| el.kind == "way")
        .filter_map(|el| {
            let category = el.tags.get("building")?;
            let center = el.center?;
            filter
                .allows(category)
                .then(|| Entity::new(el.id, center.lat, center.lon, category.clone()))
        })
        .filter(|entity| seen.insert(entity.id))
        .collect()
}

/// Uniform sample of `n` candidates without replacement, kept in input order.
/// All candidates are returned when there are `n` or fewer.
pub fn sample_entities<R: Rng + ?Sized>(
    candidates: Vec<Entity>,
    n: usize,
    rng: &mut R,
) -> Vec<Entity> {
    if candidates.len() <= n {
        return candidates;
    }
    let mut picked = rand::seq::index::sample(rng, candidates.len(), n).into_vec();
    picked.sort_unstable();

    let mut slots: Vec<Option<Entity>> = candidates.into_iter().map(Some).collect();
    picked
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// Queries the spatial service for buildings and samples them.
pub struct EntityDiscoverer {
    query: Arc<dyn SpatialQuery>,
    categories: CategoryFilter,
    seed: Option<u64>,
}

impl EntityDiscoverer {
    pub fn new(query: Arc<dyn SpatialQuery>) -> Self {
        Self {
            query,
            categories: CategoryFilter::default(),
            seed: None,
        }
    }

    pub fn with_categories(mut self, categories: CategoryFilter) -> Self {
        self.categories = categories;
        self
    }

    /// Fix the sampling seed so repeated runs pick the same entities.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Discover up to `sample` buildings. Any query failure is returned as-is;
    /// discovery is never retried.
    pub async fn discover(
        &self,
        bbox: &BoundingBox,
        sample: usize,
    ) -> Result<Vec<Entity>, DiscoveryError> {
        let response = self.query.run(&building_query(bbox)).await?;
        let candidates = extract_candidates(&response, &self.categories);
        debug!(
            "{} elements, {} candidate buildings in {}",
            response.elements.len(),
            candidates.len(),
            bbox
        );
        if candidates.is_empty() {
            return Err(DiscoveryError::NoBuildings(*bbox));
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let entities = sample_entities(candidates, sample, &mut rng);
        info!("Discovered {} buildings in {}", entities.len(), bbox);
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overpass::client::{Center, Element};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn way(id: i64, building: Option<&str>) -> Element {
        let mut tags = HashMap::new();
        if let Some(b) = building {
            tags.insert("building".to_string(), b.to_string());
        }
        Element {
            kind: "way".into(),
            id,
            tags,
            center: Some(Center {
                lat: 40.0 + id as f64 * 1e-4,
                lon: -111.0,
            }),
        }
    }

    fn response(n: i64) -> OverpassResponse {
        OverpassResponse {
            elements: (1..=n).map(|id| way(id, Some("house"))).collect(),
        }
    }

    struct Fixed(Result<OverpassResponse, QueryError>);

    #[async_trait]
    impl SpatialQuery for Fixed {
        async fn run(&self, _query: &str) -> Result<OverpassResponse, QueryError> {
            self.0.clone()
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(40.0, -112.0, 41.0, -111.0).unwrap()
    }

    #[test]
    fn test_building_query_embeds_bbox() {
        let q = building_query(&bbox());
        assert!(q.contains("way[\"building\"](40,-112,41,-111);"));
        assert!(q.ends_with("out center;"));
    }

    #[test]
    fn test_extract_filters_categories_and_shape() {
        let mut node = way(5, Some("house"));
        node.kind = "node".into();
        let mut no_center = way(6, Some("house"));
        no_center.center = None;
        let resp = OverpassResponse {
            elements: vec![
                way(1, Some("house")),
                way(2, Some("garage")),
                way(3, None),
                way(1, Some("house")),
                way(4, Some("commercial")),
                node,
                no_center,
            ],
        };

        let ids: Vec<i64> = extract_candidates(&resp, &CategoryFilter::default())
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![1, 4]);

        let all = extract_candidates(&resp, &CategoryFilter::from_list(&["*"]));
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_sample_exact_size_no_duplicates() {
        let mut rng = StdRng::seed_from_u64(7);
        for total in [11usize, 50, 200] {
            let candidates = extract_candidates(&response(total as i64), &CategoryFilter::Any);
            let sampled = sample_entities(candidates, 10, &mut rng);
            assert_eq!(sampled.len(), 10);
            let ids: HashSet<i64> = sampled.iter().map(|e| e.id).collect();
            assert_eq!(ids.len(), 10);
        }
    }

    #[test]
    fn test_sample_keeps_all_when_small() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = extract_candidates(&response(4), &CategoryFilter::Any);
        assert_eq!(sample_entities(candidates, 10, &mut rng).len(), 4);
    }

    #[tokio::test]
    async fn test_discover_seeded_is_reproducible() {
        let query: Arc<dyn SpatialQuery> = Arc::new(Fixed(Ok(response(100))));
        let a = EntityDiscoverer::new(query.clone())
            .with_seed(Some(42))
            .discover(&bbox(), 10)
            .await
            .unwrap();
        let b = EntityDiscoverer::new(query)
            .with_seed(Some(42))
            .discover(&bbox(), 10)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_discover_failure_is_terminal() {
        let query = Arc::new(Fixed(Err(QueryError::Parse("bad".into()))));
        let err = EntityDiscoverer::new(query)
            .discover(&bbox(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Query(QueryError::Parse(_))));

        let empty = Arc::new(Fixed(Ok(OverpassResponse::default())));
        let err = EntityDiscoverer::new(empty)
            .discover(&bbox(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::NoBuildings(_)));
    }
}
