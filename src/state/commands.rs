//! Command and event types for the tag actor
//!
//! Deliveries are fire-and-forget from the transport's point of view (they
//! only wait for queue space). Queries carry a oneshot channel for the reply.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::error::{TagError, TagResult};
use super::ingest::Ingested;
use super::types::{TagListing, TagPath, TagRecord};

/// Commands for the tag actor
#[derive(Debug)]
pub enum TagCommand {
    /// Raw message delivered by the transport
    Deliver {
        topic: String,
        payload: Bytes,
        received_at: DateTime<Utc>,
    },

    /// Get the record for one path
    Get {
        path: TagPath,
        response: oneshot::Sender<TagResult<TagRecord>>,
    },

    /// Copy of the whole store
    List {
        response: oneshot::Sender<TagListing>,
    },

    /// Stop the actor
    Shutdown,
}

/// Outcome of one delivered message, emitted by the actor
///
/// Messages on topics outside the tag namespace produce no event.
#[derive(Debug, Clone)]
pub struct IngestEvent {
    pub topic: String,
    /// When the transport handed the message over
    pub received_at: DateTime<Utc>,
    pub outcome: Result<Ingested, TagError>,
}
