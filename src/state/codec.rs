//! Wire codec for the tag namespace
//!
//! Maps MQTT topics to tag paths and decodes/encodes the JSON payloads
//! carried on them:
//!
//! - `tags/<dotted.path>` carries one tag: `{"path", "name", "description", "value"}`
//! - `tags/database` carries the full database: `{"tags": {"<a/b/c>": {...}, ...}}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{TagError, TagResult};
use super::types::{TagListing, TagPath, TagValue, SNAPSHOT_TOPIC, TOPIC_PREFIX};

/// What a topic means for the tag namespace
#[derive(Debug, Clone, PartialEq)]
pub enum TopicKind {
    /// `tags/database`: full snapshot
    Snapshot,
    /// `tags/<dotted>`: single tag update
    Tag(TagPath),
    /// Outside the tag namespace, ignored
    Foreign,
}

/// Classify an incoming topic
///
/// Topics under `tags/` whose remainder is not a valid path are a decode error.
pub fn classify_topic(topic: &str) -> TagResult<TopicKind> {
    if topic == SNAPSHOT_TOPIC {
        return Ok(TopicKind::Snapshot);
    }

    match topic.strip_prefix(TOPIC_PREFIX) {
        Some(dotted) => TagPath::from_topic_suffix(dotted)
            .map(TopicKind::Tag)
            .map_err(|e| TagError::decode(topic, e)),
        None => Ok(TopicKind::Foreign),
    }
}

/// Payload of a single-tag topic
///
/// Only `value` takes part in reconciliation; the rest is informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagUpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: TagValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

impl TagUpdatePayload {
    pub fn new(path: &TagPath, value: TagValue) -> Self {
        Self {
            path: Some(path.to_string()),
            name: None,
            description: None,
            value,
            timestamp: None,
        }
    }
}

fn payload_text<'a>(topic: &str, payload: &'a [u8]) -> TagResult<&'a str> {
    std::str::from_utf8(payload)
        .map_err(|e| TagError::decode(topic, format!("payload is not UTF-8: {}", e)))
}

/// Decode a single-tag payload
pub fn decode_update(topic: &str, payload: &[u8]) -> TagResult<TagUpdatePayload> {
    let text = payload_text(topic, payload)?;
    serde_json::from_str(text).map_err(|e| TagError::decode(topic, e))
}

/// Decode a payload into an untyped JSON document (used for snapshots)
pub fn decode_document(topic: &str, payload: &[u8]) -> TagResult<Value> {
    let text = payload_text(topic, payload)?;
    serde_json::from_str(text).map_err(|e| TagError::decode(topic, e))
}

pub fn encode_update(payload: &TagUpdatePayload) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(payload)
}

/// One decoded entry of a snapshot document
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub path: TagPath,
    pub value: TagValue,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Snapshot key paired with its decoded entry or the reason it was rejected
pub type SnapshotItem = (String, Result<SnapshotEntry, String>);

/// Split a snapshot document into per-tag entries
///
/// Fails only when the document itself has the wrong shape. Bad entries are
/// returned as `Err` items so the caller can apply the good ones.
pub fn snapshot_entries(doc: &Value) -> Result<Vec<SnapshotItem>, String> {
    let root = doc.as_object().ok_or("snapshot document is not a mapping")?;
    let tags = root
        .get("tags")
        .ok_or("snapshot document has no `tags` field")?
        .as_object()
        .ok_or("`tags` is not a mapping")?;

    Ok(tags
        .iter()
        .map(|(key, raw)| (key.clone(), parse_entry(key, raw)))
        .collect())
}

fn parse_entry(key: &str, raw: &Value) -> Result<SnapshotEntry, String> {
    let path = TagPath::parse(key).map_err(|e| e.to_string())?;
    let fields = raw.as_object().ok_or("entry is not a mapping")?;
    let value = fields.get("value").ok_or("entry has no `value`")?;

    Ok(SnapshotEntry {
        path,
        value: TagValue::from(value.clone()),
        name: text_field(fields, "name"),
        description: text_field(fields, "description"),
    })
}

fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields.get(name).and_then(Value::as_str).map(str::to_string)
}

/// Encode a store listing as a snapshot document
pub fn encode_snapshot(listing: &TagListing) -> serde_json::Result<Vec<u8>> {
    let mut tags = Map::new();
    for record in listing {
        let mut entry = Map::new();
        entry.insert("path".to_string(), Value::from(record.path.as_str()));
        if let Some(name) = &record.name {
            entry.insert("name".to_string(), Value::from(name.as_str()));
        }
        if let Some(description) = &record.description {
            entry.insert("description".to_string(), Value::from(description.as_str()));
        }
        entry.insert("value".to_string(), record.value.as_json().clone());
        tags.insert(record.path.to_string(), Value::Object(entry));
    }

    let mut root = Map::new();
    root.insert("tags".to_string(), Value::Object(tags));
    serde_json::to_vec(&Value::Object(root))
}
