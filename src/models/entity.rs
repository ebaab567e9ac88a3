//! Building entity model.
//!
//! One `Entity` per line in the entity JSONL file. Detail fields are absent
//! until the detail fetch has run, then hold a value or a sentinel.

use serde::{Deserialize, Serialize};

/// Sentinel written when the source has no value for a field.
pub const NOT_AVAILABLE: &str = "N/A";

/// Sentinel written when fetching the field failed.
pub const ERROR: &str = "Error";

/// A detail attribute: a real value or an explicit sentinel.
///
/// Serialized as a plain string so the file stays compatible with tools that
/// read `"N/A"` and `"Error"` literally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DetailValue {
    Value(String),
    NotAvailable,
    Error,
}

impl DetailValue {
    /// Wrap an optional tag value, mapping `None` to [`DetailValue::NotAvailable`].
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(v) => Self::from(v.to_string()),
            None => Self::NotAvailable,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// The real value, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<String> for DetailValue {
    fn from(s: String) -> Self {
        match s.as_str() {
            NOT_AVAILABLE => Self::NotAvailable,
            ERROR => Self::Error,
            _ => Self::Value(s),
        }
    }
}

impl From<DetailValue> for String {
    fn from(v: DetailValue) -> Self {
        match v {
            DetailValue::Value(s) => s,
            DetailValue::NotAvailable => NOT_AVAILABLE.to_string(),
            DetailValue::Error => ERROR.to_string(),
        }
    }
}

/// Supplementary attributes fetched per entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Details {
    pub addr_street: DetailValue,
    pub height: DetailValue,
}

impl Details {
    /// Both fields set to the failure sentinel.
    pub fn failed() -> Self {
        Self {
            addr_street: DetailValue::Error,
            height: DetailValue::Error,
        }
    }

    /// Both fields set to the not-available sentinel.
    pub fn not_available() -> Self {
        Self {
            addr_street: DetailValue::NotAvailable,
            height: DetailValue::NotAvailable,
        }
    }
}

/// A discovered building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    /// Value of the `building` tag (`yes`, `house`, `commercial`, ...).
    #[serde(rename = "building_type", alias = "type")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr_street: Option<DetailValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<DetailValue>,
}

impl Entity {
    pub fn new(id: i64, lat: f64, lon: f64, category: impl Into<String>) -> Self {
        Self {
            id,
            lat,
            lon,
            category: category.into(),
            addr_street: None,
            height: None,
        }
    }

    pub fn apply_details(&mut self, details: Details) {
        self.addr_street = Some(details.addr_street);
        self.height = Some(details.height);
    }

    /// Mark both detail fields with the failure sentinel.
    pub fn mark_failed(&mut self) {
        self.apply_details(Details::failed());
    }

    /// True when the detail fetch for this entity ended in failure.
    pub fn is_failed(&self) -> bool {
        self.addr_street.as_ref().is_some_and(DetailValue::is_error)
            || self.height.as_ref().is_some_and(DetailValue::is_error)
    }
}

/// What to do with entities whose detail fetch failed when writing output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentinelPolicy {
    /// Keep them, with `"Error"` in the detail fields.
    #[default]
    Retain,
    /// Drop them from the written file.
    Exclude,
}

impl SentinelPolicy {
    pub fn apply(self, entities: Vec<Entity>) -> Vec<Entity> {
        match self {
            Self::Retain => entities,
            Self::Exclude => entities.into_iter().filter(|e| !e.is_failed()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_value_sentinels_roundtrip_as_strings() {
        let mut entity = Entity::new(7, 40.0, -111.0, "house");
        entity.apply_details(Details {
            addr_street: DetailValue::Value("Main Street".into()),
            height: DetailValue::NotAvailable,
        });

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["addr_street"], "Main Street");
        assert_eq!(json["height"], "N/A");
        assert_eq!(json["building_type"], "house");
    }

    #[test]
    fn test_failed_entity_serializes_error() {
        let mut entity = Entity::new(2, 0.0, 0.0, "yes");
        entity.mark_failed();
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["addr_street"], "Error");
        assert_eq!(json["height"], "Error");
        assert!(entity.is_failed());
    }

    #[test]
    fn test_reads_type_alias_and_missing_details() {
        let entity: Entity =
            serde_json::from_str(r#"{"id": 1, "lat": 1.5, "lon": 2.5, "type": "commercial"}"#)
                .unwrap();
        assert_eq!(entity.category, "commercial");
        assert!(entity.addr_street.is_none());
        assert!(!entity.is_failed());
    }

    #[test]
    fn test_undetailed_entity_omits_fields() {
        let entity = Entity::new(1, 0.0, 0.0, "yes");
        let json = serde_json::to_string(&entity).unwrap();
        assert!(!json.contains("addr_street"));
        assert!(!json.contains("height"));
    }

    #[test]
    fn test_sentinel_policy() {
        let ok = Entity::new(1, 0.0, 0.0, "yes");
        let mut bad = Entity::new(2, 0.0, 0.0, "yes");
        bad.mark_failed();

        let retained = SentinelPolicy::Retain.apply(vec![ok.clone(), bad.clone()]);
        assert_eq!(retained.len(), 2);

        let excluded = SentinelPolicy::Exclude.apply(vec![ok, bad]);
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].id, 1);
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(DetailValue::from_tag(None), DetailValue::NotAvailable);
        assert_eq!(
            DetailValue::from_tag(Some("12")),
            DetailValue::Value("12".into())
        );
        assert_eq!(DetailValue::from_tag(Some("12")).value(), Some("12"));
    }
}
