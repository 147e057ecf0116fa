//! TagStateStore - Last known value per tag path
//!
//! Reconciles single-tag updates and full database snapshots into one view
//! and classifies every update as new, updated or unchanged.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use super::codec::{self, SnapshotEntry};
use super::error::{TagError, TagResult};
use super::types::{
    EntryFailure, SnapshotReport, TagListing, TagPath, TagRecord, TagValue, UpdateClassification,
};

type TagMap = HashMap<TagPath, TagRecord>;

/// Stores the last known record of every tag
///
/// Cloning yields another handle to the same state. Every operation takes the
/// single lock once, so a snapshot is never interleaved with an update and an
/// update's compare-and-write is never split. The store does no I/O and never
/// logs.
#[derive(Clone, Default)]
pub struct TagStateStore {
    tags: Arc<Mutex<TagMap>>,
}

impl TagStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single-tag update and classify it against the stored value
    ///
    /// `last_updated` only moves when the value actually changes.
    pub fn ingest_update(&self, path: &TagPath, value: TagValue) -> UpdateClassification {
        self.ingest_update_with_meta(path, value, None, None)
    }

    /// Apply an update together with the name and description it carried
    ///
    /// Value and metadata land under one lock acquisition, so readers never
    /// see one without the other. Absent metadata keeps what is stored, and
    /// metadata never affects the classification or `last_updated`.
    pub fn ingest_update_with_meta(
        &self,
        path: &TagPath,
        value: TagValue,
        name: Option<String>,
        description: Option<String>,
    ) -> UpdateClassification {
        let now = Utc::now();
        let mut tags = self.tags.lock();

        match tags.entry(path.clone()) {
            Entry::Vacant(slot) => {
                let mut record = TagRecord::new(path.clone(), value, now);
                record.name = name;
                record.description = description;
                slot.insert(record);
                UpdateClassification::New
            }
            Entry::Occupied(mut slot) => {
                let record = slot.get_mut();
                merge_text(&mut record.name, name);
                merge_text(&mut record.description, description);

                if record.value == value {
                    UpdateClassification::Unchanged
                } else {
                    let previous = std::mem::replace(&mut record.value, value);
                    record.last_updated = now;
                    UpdateClassification::Updated { previous }
                }
            }
        }
    }

    /// Merge a full database snapshot into the store
    ///
    /// Tags missing from the snapshot are left alone. Each entry commits on
    /// its own: bad entries are reported in a `MalformedSnapshot` error whose
    /// report still lists what was applied. Applying the same snapshot twice
    /// leaves the store as it was after the first time.
    pub fn ingest_snapshot(&self, doc: &Value) -> TagResult<SnapshotReport> {
        let items = codec::snapshot_entries(doc).map_err(|reason| TagError::MalformedSnapshot {
            reason,
            report: SnapshotReport::default(),
        })?;

        let now = Utc::now();
        let mut report = SnapshotReport::default();
        {
            let mut tags = self.tags.lock();
            for (key, item) in items {
                match item {
                    Ok(entry) => apply_entry(&mut tags, entry, now, &mut report),
                    Err(reason) => report.failures.push(EntryFailure { key, reason }),
                }
            }
        }

        if report.failures.is_empty() {
            Ok(report)
        } else {
            Err(TagError::MalformedSnapshot {
                reason: format!(
                    "{} of {} entries rejected",
                    report.failures.len(),
                    report.total()
                ),
                report,
            })
        }
    }

    /// Get the record for a path
    pub fn get(&self, path: &TagPath) -> TagResult<TagRecord> {
        self.tags
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| TagError::NotFound(path.clone()))
    }

    /// Copy of the current contents, sorted by path
    pub fn list(&self) -> TagListing {
        let records = self.tags.lock().values().cloned().collect();
        TagListing::new(records)
    }

    pub fn len(&self) -> usize {
        self.tags.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.lock().is_empty()
    }
}

fn apply_entry(
    tags: &mut TagMap,
    entry: SnapshotEntry,
    now: DateTime<Utc>,
    report: &mut SnapshotReport,
) {
    let SnapshotEntry {
        path,
        value,
        name,
        description,
    } = entry;

    match tags.entry(path) {
        Entry::Vacant(slot) => {
            let path = slot.key().clone();
            let mut record = TagRecord::new(path.clone(), value, now);
            record.name = name;
            record.description = description;
            slot.insert(record);
            report.added += 1;
            report.changed.push(path);
        }
        Entry::Occupied(mut slot) => {
            let record = slot.get_mut();
            let mut changed = false;

            if record.value != value {
                record.value = value;
                record.last_updated = now;
                changed = true;
            }
            changed |= merge_text(&mut record.name, name);
            changed |= merge_text(&mut record.description, description);

            if changed {
                report.updated += 1;
                report.changed.push(record.path.clone());
            } else {
                report.unchanged += 1;
            }
        }
    }
}

/// Overwrite metadata only when the message carries it
fn merge_text(slot: &mut Option<String>, incoming: Option<String>) -> bool {
    match incoming {
        Some(text) if slot.as_deref() != Some(text.as_str()) => {
            *slot = Some(text);
            true
        }
        _ => false,
    }
}
