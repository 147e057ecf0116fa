//! Routing of raw transport messages into the TagStateStore

use super::codec::{self, TopicKind};
use super::error::TagResult;
use super::store::TagStateStore;
use super::types::{SnapshotReport, TagPath, TagValue, UpdateClassification};

/// What happened to one delivered message
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// Single-tag update applied
    Update {
        path: TagPath,
        classification: UpdateClassification,
        /// Value now stored for the path
        value: TagValue,
    },
    /// Full snapshot merged
    Snapshot(SnapshotReport),
    /// Topic outside the tag namespace
    Ignored,
}

impl TagStateStore {
    /// Ingest a raw `(topic, payload)` pair as delivered by the transport
    ///
    /// `tags/database` goes to snapshot ingestion, `tags/<dotted>` to update
    /// ingestion, anything else is ignored. Payloads that fail to decode leave
    /// the store untouched.
    pub fn ingest_message(&self, topic: &str, payload: &[u8]) -> TagResult<Ingested> {
        match codec::classify_topic(topic)? {
            TopicKind::Snapshot => {
                let doc = codec::decode_document(topic, payload)?;
                self.ingest_snapshot(&doc).map(Ingested::Snapshot)
            }
            TopicKind::Tag(path) => {
                let update = codec::decode_update(topic, payload)?;
                let classification = self.ingest_update_with_meta(
                    &path,
                    update.value.clone(),
                    update.name,
                    update.description,
                );
                Ok(Ingested::Update {
                    path,
                    classification,
                    value: update.value,
                })
            }
            TopicKind::Foreign => Ok(Ingested::Ignored),
        }
    }
}
