//! Error types for tag state ingestion

use thiserror::Error;

use super::types::{SnapshotReport, TagPath};

/// Errors reported by the tag state layer
///
/// None of these are fatal to the store. They are returned to the immediate
/// caller, which decides how to render them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TagError {
    /// Payload was not valid structured data; the store was not touched
    #[error("failed to decode payload on {topic}: {reason}")]
    Decode { topic: String, reason: String },

    /// Snapshot document had the wrong shape or contained bad entries.
    /// Valid entries were still committed, see `report`.
    #[error(
        "malformed snapshot: {reason} ({} committed, {} rejected)",
        .report.committed(),
        .report.failures.len()
    )]
    MalformedSnapshot {
        reason: String,
        report: SnapshotReport,
    },

    #[error("tag not found: {0}")]
    NotFound(TagPath),

    #[error("invalid tag path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

impl TagError {
    pub(crate) fn decode(topic: &str, reason: impl ToString) -> Self {
        TagError::Decode {
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type TagResult<T> = Result<T, TagError>;
