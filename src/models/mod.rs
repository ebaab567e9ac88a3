//! Data models for discovered buildings.

mod entity;

pub use entity::{DetailValue, Details, Entity, SentinelPolicy};
