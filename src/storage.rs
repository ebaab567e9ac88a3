//! Storage helpers for JSONL outputs and failure logs on disk.

mod error_log;
mod jsonl;

pub use error_log::{ErrorLog, FailureRecord, LogEntry};
pub use jsonl::{load_jsonl, read_jsonl, store_jsonl, write_jsonl, JsonlAppender, JsonlError};

use std::path::{Path, PathBuf};

use crate::geo::BoundingBox;

/// Construct the entity file path for a discovery run.
///
/// `{data_dir}/{place}_{sample}_{south}_{west}_{north}_{east}.jsonl`
pub fn entity_file_path(
    data_dir: &Path,
    place: &str,
    sample: usize,
    bbox: &BoundingBox,
) -> PathBuf {
    data_dir.join(format!(
        "{}_{}_{}.jsonl",
        sanitize_component(place),
        sample,
        bbox
    ))
}

/// Job name used for image and output directories: the entity file's stem.
pub fn job_name(entity_file: &Path) -> String {
    entity_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string())
}

/// Replace path separators and control characters so a place name is a
/// single path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | ':') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.is_empty() {
        "place".to_string()
    } else {
        cleaned
    }
}
