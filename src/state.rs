//! Tag state management
//!
//! This module provides the TagStateStore, which keeps the last known value of
//! every tag in the namespace and reconciles single-tag updates with full
//! database snapshots. The wire codec maps MQTT topics and JSON payloads onto
//! the store, and the TagActor serializes delivery from the transport.

mod actor;
mod actor_handle;
pub mod codec;
mod commands;
mod error;
mod ingest;
mod store;
mod types;

pub use actor::{TagActor, DEFAULT_QUEUE_CAPACITY};
pub use actor_handle::TagActorHandle;
pub use commands::{IngestEvent, TagCommand};
pub use error::{TagError, TagResult};
pub use ingest::Ingested;
pub use store::TagStateStore;
pub use types::{
    EntryFailure, SnapshotReport, TagListing, TagPath, TagRecord, TagValue, UpdateClassification,
    SNAPSHOT_TOPIC, TOPIC_PREFIX,
};
