//! Console rendering of ingest events and tag listings

use chrono::{DateTime, Local, Utc};
use std::fmt::Write;

use crate::state::{
    IngestEvent, Ingested, TagError, TagListing, TagPath, TagRecord, UpdateClassification,
};

const NOT_AVAILABLE: &str = "N/A";

fn stamp(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// One console line for an ingest event
///
/// Unchanged updates render as `None`; they are noise for a change monitor.
pub fn format_event(event: &IngestEvent) -> Option<String> {
    let ts = stamp(&event.received_at);

    match &event.outcome {
        Ok(Ingested::Update {
            path,
            classification,
            value,
        }) => match classification {
            UpdateClassification::New => Some(format!("[{}] NEW {}: {}", ts, path, value)),
            UpdateClassification::Updated { previous } => Some(format!(
                "[{}] UPDATED {}: {} -> {}",
                ts, path, previous, value
            )),
            UpdateClassification::Unchanged => None,
        },
        Ok(Ingested::Snapshot(report)) => Some(format!(
            "[{}] snapshot: {} added, {} updated, {} unchanged",
            ts, report.added, report.updated, report.unchanged
        )),
        Ok(Ingested::Ignored) => None,
        Err(TagError::MalformedSnapshot { reason, report }) => {
            let mut line = format!("[{}] snapshot rejected: {}", ts, reason);
            for failure in &report.failures {
                let _ = write!(line, "\n    {}: {}", failure.key, failure.reason);
            }
            Some(line)
        }
        Err(e) => Some(format!("[{}] error: {}", ts, e)),
    }
}

/// Line for a single watched tag
pub fn format_watched(record: &TagRecord, at: &DateTime<Utc>, from_database: bool) -> String {
    let suffix = if from_database { " (from database)" } else { "" };
    format!("[{}] {} = {}{}", stamp(at), record.path, record.value, suffix)
}

/// Whether an event concerns the watched path
pub fn concerns(event: &IngestEvent, watched: &TagPath) -> bool {
    match &event.outcome {
        Ok(Ingested::Update { path, .. }) => path == watched,
        Ok(Ingested::Snapshot(report)) => report.touched(watched),
        Err(TagError::MalformedSnapshot { report, .. }) => report.touched(watched),
        Err(_) => event.topic == watched.to_topic(),
        Ok(Ingested::Ignored) => false,
    }
}

/// Full listing of known tags
pub fn format_listing(listing: &TagListing) -> String {
    if listing.is_empty() {
        return "No tags available yet. Waiting for updates...".to_string();
    }

    let mut out = format!("=== Available Tags ({}) ===", listing.len());
    for record in listing {
        let _ = write!(
            out,
            "\nPath: {}\n  Name: {}\n  Description: {}\n  Value: {}\n  Last updated: {}",
            record.path,
            record.name.as_deref().unwrap_or(NOT_AVAILABLE),
            record.description.as_deref().unwrap_or(NOT_AVAILABLE),
            record.value,
            stamp(&record.last_updated),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EntryFailure, SnapshotReport, TagStateStore, TagValue};

    fn event(outcome: Result<Ingested, TagError>) -> IngestEvent {
        IngestEvent {
            topic: "tags/A.B".to_string(),
            received_at: Utc::now(),
            outcome,
        }
    }

    fn update(classification: UpdateClassification, value: TagValue) -> Ingested {
        Ingested::Update {
            path: TagPath::parse("A/B").unwrap(),
            classification,
            value,
        }
    }

    #[test]
    fn test_new_line() {
        let line = format_event(&event(Ok(update(
            UpdateClassification::New,
            TagValue::from("on"),
        ))))
        .unwrap();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] NEW A/B: on"), "{line}");
    }

    #[test]
    fn test_updated_line_shows_previous() {
        let line = format_event(&event(Ok(update(
            UpdateClassification::Updated {
                previous: TagValue::from(45.7),
            },
            TagValue::from(50.2),
        ))))
        .unwrap();
        assert!(line.ends_with("UPDATED A/B: 45.7 -> 50.2"), "{line}");
    }

    #[test]
    fn test_unchanged_is_silent() {
        let outcome = Ok(update(UpdateClassification::Unchanged, TagValue::from(1_i64)));
        assert!(format_event(&event(outcome)).is_none());
    }

    #[test]
    fn test_snapshot_lines() {
        let report = SnapshotReport {
            added: 2,
            updated: 1,
            ..SnapshotReport::default()
        };
        let line = format_event(&event(Ok(Ingested::Snapshot(report.clone())))).unwrap();
        assert!(line.ends_with("snapshot: 2 added, 1 updated, 0 unchanged"), "{line}");

        let rejected = SnapshotReport {
            failures: vec![EntryFailure {
                key: "A/C".to_string(),
                reason: "entry has no `value`".to_string(),
            }],
            ..report
        };
        let line = format_event(&event(Err(TagError::MalformedSnapshot {
            reason: "1 of 4 entries rejected".to_string(),
            report: rejected,
        })))
        .unwrap();
        assert!(line.contains("snapshot rejected: 1 of 4 entries rejected"));
        assert!(line.contains("A/C: entry has no `value`"));
    }

    #[test]
    fn test_concerns_watched_path() {
        let watched = TagPath::parse("A/B").unwrap();
        let other = TagPath::parse("A/C").unwrap();

        let ev = event(Ok(update(UpdateClassification::New, TagValue::default())));
        assert!(concerns(&ev, &watched));
        assert!(!concerns(&ev, &other));

        let snapshot = event(Ok(Ingested::Snapshot(SnapshotReport {
            added: 1,
            changed: vec![other.clone()],
            ..SnapshotReport::default()
        })));
        assert!(concerns(&snapshot, &other));
        assert!(!concerns(&snapshot, &watched));

        let broken = event(Err(TagError::Decode {
            topic: "tags/A.B".to_string(),
            reason: "expected value".to_string(),
        }));
        assert!(concerns(&broken, &watched));
        assert!(!concerns(&broken, &other));
    }

    #[test]
    fn test_listing() {
        let store = TagStateStore::new();
        assert!(format_listing(&store.list()).starts_with("No tags"));

        let path = TagPath::parse("US/TX/PUMP1/STATUS").unwrap();
        store.ingest_update(&path, TagValue::from("RUNNING"));
        let text = format_listing(&store.list());
        assert!(text.starts_with("=== Available Tags (1) ==="));
        assert!(text.contains("Path: US/TX/PUMP1/STATUS"));
        assert!(text.contains("  Name: N/A"));
        assert!(text.contains("  Value: RUNNING"));
    }

    #[test]
    fn test_watched_line() {
        let store = TagStateStore::new();
        let path = TagPath::parse("A/B").unwrap();
        store.ingest_update(&path, TagValue::from(3_i64));
        let record = store.get(&path).unwrap();

        assert!(format_watched(&record, &Utc::now(), true).ends_with("A/B = 3 (from database)"));
        assert!(format_watched(&record, &Utc::now(), false).ends_with("A/B = 3"));
    }
}
