//! Tag state type definitions
//!
//! Defines tag paths, canonical tag values and the records kept by the TagStateStore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::error::TagError;

/// Separator between segments of a tag path
pub const PATH_SEPARATOR: char = '/';
/// Separator between segments of a tag topic
pub const TOPIC_SEPARATOR: char = '.';
/// Prefix of every topic in the tag namespace
pub const TOPIC_PREFIX: &str = "tags/";
/// Reserved topic carrying the full tag database
pub const SNAPSHOT_TOPIC: &str = "tags/database";

const RESERVED_SEGMENT: &str = "database";

/// Hierarchical tag path, e.g. `US/TX/AUSTIN/AREA1/LINE1/MACHINE1/PUMP1/PRESSURE`
///
/// Stored as the canonical `/`-joined string. Segments are non-empty and never
/// contain `/`, `.`, `+` or `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagPath(String);

impl TagPath {
    /// Parse a `/`-delimited tag path
    pub fn parse(raw: &str) -> Result<Self, TagError> {
        Self::build(raw, raw.split(PATH_SEPARATOR))
    }

    /// Parse the dotted part of a tag topic (everything after `tags/`)
    pub fn from_topic_suffix(dotted: &str) -> Result<Self, TagError> {
        Self::build(dotted, dotted.split(TOPIC_SEPARATOR))
    }

    fn build<'a>(raw: &str, segments: impl Iterator<Item = &'a str>) -> Result<Self, TagError> {
        let mut canonical = String::with_capacity(raw.len());
        for (idx, segment) in segments.enumerate() {
            if let Err(reason) = validate_segment(segment) {
                return Err(TagError::InvalidPath {
                    path: raw.to_string(),
                    reason,
                });
            }
            if idx > 0 {
                canonical.push(PATH_SEPARATOR);
            }
            canonical.push_str(segment);
        }

        if canonical == RESERVED_SEGMENT {
            return Err(TagError::InvalidPath {
                path: raw.to_string(),
                reason: "path is reserved for the snapshot topic",
            });
        }

        Ok(Self(canonical))
    }

    /// Canonical `/`-joined form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEPARATOR)
    }

    /// MQTT topic for this tag (`tags/` + segments joined by `.`)
    pub fn to_topic(&self) -> String {
        let mut topic = String::with_capacity(TOPIC_PREFIX.len() + self.0.len());
        topic.push_str(TOPIC_PREFIX);
        for (idx, segment) in self.segments().enumerate() {
            if idx > 0 {
                topic.push(TOPIC_SEPARATOR);
            }
            topic.push_str(segment);
        }
        topic
    }
}

fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty path segment");
    }
    if segment.contains([PATH_SEPARATOR, TOPIC_SEPARATOR]) {
        return Err("path segment contains a delimiter");
    }
    if segment.contains(['+', '#']) {
        return Err("path segment contains an MQTT wildcard");
    }
    Ok(())
}

impl FromStr for TagPath {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag value as published, compared in canonical form
///
/// The JSON value is kept exactly as it arrived and is what gets encoded
/// again, so republishing never rewrites another publisher's data. Equality
/// goes through a canonical form instead: numeric text equals the number it
/// spells (`"99.9"` and `99.9`, `"00123"` and `123`), integers compare exactly
/// at any magnitude JSON carries, and `1` equals `1.0`. Objects and arrays
/// compare structurally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct TagValue {
    raw: Value,
    canonical: Canonical,
}

#[derive(Debug, Clone, Default, PartialEq)]
enum Canonical {
    #[default]
    Null,
    Bool(bool),
    Integer(i128),
    /// Finite and non-integral
    Float(f64),
    Text(String),
    /// Objects and arrays
    Structured(Value),
}

/// Integral floats below this magnitude convert to `i128` exactly
const MAX_INTEGRAL_FLOAT: f64 = 1.0e38;

impl Canonical {
    fn of(raw: &Value) -> Self {
        match raw {
            Value::Null => Canonical::Null,
            Value::Bool(b) => Canonical::Bool(*b),
            Value::Number(n) => Self::number(n),
            Value::String(s) => Self::numeric_text(s).unwrap_or_else(|| Canonical::Text(s.clone())),
            other => Canonical::Structured(other.clone()),
        }
    }

    fn number(n: &Number) -> Self {
        if let Some(i) = n.as_i64() {
            return Canonical::Integer(i.into());
        }
        if let Some(u) = n.as_u64() {
            return Canonical::Integer(u.into());
        }
        n.as_f64()
            .and_then(Self::float)
            .unwrap_or_else(|| Canonical::Text(n.to_string()))
    }

    fn float(f: f64) -> Option<Self> {
        if !f.is_finite() {
            return None;
        }
        if f.fract() == 0.0 && f.abs() < MAX_INTEGRAL_FLOAT {
            Some(Canonical::Integer(f as i128))
        } else {
            Some(Canonical::Float(f))
        }
    }

    fn numeric_text(text: &str) -> Option<Self> {
        if let Ok(i) = text.parse::<i128>() {
            return Some(Canonical::Integer(i));
        }
        text.parse::<f64>().ok().and_then(Self::float)
    }
}

impl TagValue {
    /// Free text, published as a JSON string
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from(Value::String(text.into()))
    }

    /// The value as it appears on the wire
    pub fn as_json(&self) -> &Value {
        &self.raw
    }
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl From<Value> for TagValue {
    fn from(raw: Value) -> Self {
        let canonical = Canonical::of(&raw);
        Self { raw, canonical }
    }
}

impl From<TagValue> for Value {
    fn from(value: TagValue) -> Self {
        value.raw
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::from_text(s)
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::from_text(s)
    }
}

impl From<f64> for TagValue {
    fn from(n: f64) -> Self {
        Self::from(Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null))
    }
}

impl From<i64> for TagValue {
    fn from(n: i64) -> Self {
        Self::from(Value::from(n))
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        Self::from(Value::Bool(b))
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// Last known state of one tag, stored in the TagStateStore
#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    pub path: TagPath,
    /// Human-readable name
    pub name: Option<String>,
    pub description: Option<String>,
    /// Last known value (not a history)
    pub value: TagValue,
    /// When the value last changed
    pub last_updated: DateTime<Utc>,
}

impl TagRecord {
    pub fn new(path: TagPath, value: TagValue, last_updated: DateTime<Utc>) -> Self {
        Self {
            path,
            name: None,
            description: None,
            value,
            last_updated,
        }
    }
}

/// Outcome of ingesting a single-tag update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateClassification {
    /// Path was not known before
    New,
    /// Value differs from the stored one
    Updated { previous: TagValue },
    /// Same value as stored, nothing changed
    Unchanged,
}

impl UpdateClassification {
    pub fn label(&self) -> &'static str {
        match self {
            UpdateClassification::New => "NEW",
            UpdateClassification::Updated { .. } => "UPDATED",
            UpdateClassification::Unchanged => "UNCHANGED",
        }
    }
}

impl fmt::Display for UpdateClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A snapshot entry that could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    /// Key as found in the snapshot document
    pub key: String,
    pub reason: String,
}

/// Result of applying a snapshot document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Paths that were added or updated, in application order
    pub changed: Vec<TagPath>,
    pub failures: Vec<EntryFailure>,
}

impl SnapshotReport {
    /// Number of entries written to the store
    pub fn committed(&self) -> usize {
        self.added + self.updated
    }

    /// Number of entries seen, including failed ones
    pub fn total(&self) -> usize {
        self.added + self.updated + self.unchanged + self.failures.len()
    }

    pub fn touched(&self, path: &TagPath) -> bool {
        self.changed.contains(path)
    }
}

/// Point-in-time copy of the store contents, sorted by path
///
/// Cheap to clone and iterate any number of times; later store mutations
/// are not reflected.
#[derive(Debug, Clone, Default)]
pub struct TagListing {
    records: Arc<[TagRecord]>,
}

impl TagListing {
    pub(crate) fn new(mut records: Vec<TagRecord>) -> Self {
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            records: records.into(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TagRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find a record by path
    pub fn find(&self, path: &TagPath) -> Option<&TagRecord> {
        self.records
            .binary_search_by(|record| record.path.cmp(path))
            .ok()
            .map(|idx| &self.records[idx])
    }
}

impl<'a> IntoIterator for &'a TagListing {
    type Item = &'a TagRecord;
    type IntoIter = std::slice::Iter<'a, TagRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
