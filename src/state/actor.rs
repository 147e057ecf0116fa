//! TagActor - Single consumer feeding the TagStateStore
//!
//! The transport pushes raw messages into a bounded queue and this actor
//! applies them one at a time, in arrival order. That keeps per-topic order
//! intact and makes the queue the only place where delivery can wait.
//!
//! ```text
//!  MQTT event loop ──deliver()──▶ [bounded queue] ──▶ TagActor ──▶ TagStateStore
//!                                                        │
//!                                                        └──▶ IngestEvent channel ──▶ renderer
//! ```

use super::actor_handle::TagActorHandle;
use super::commands::{IngestEvent, TagCommand};
use super::ingest::Ingested;
use super::store::TagStateStore;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Default capacity of the command queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub struct TagActor {
    store: TagStateStore,
    command_rx: mpsc::Receiver<TagCommand>,
    event_tx: mpsc::Sender<IngestEvent>,
    /// Total messages delivered
    delivered: u64,
    /// Deliveries that failed to decode or apply
    failed: u64,
}

impl TagActor {
    /// Spawn the actor on the current tokio runtime
    ///
    /// Returns the handle used to feed and query it, and the receiver for
    /// ingest events. `capacity` bounds both the command queue and the event
    /// channel and must be non-zero.
    pub fn spawn(
        store: TagStateStore,
        capacity: usize,
    ) -> (TagActorHandle, mpsc::Receiver<IngestEvent>) {
        let (cmd_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);

        let actor = TagActor {
            store,
            command_rx,
            event_tx,
            delivered: 0,
            failed: 0,
        };

        tokio::spawn(actor.run());
        info!(capacity, "TagActor spawned");

        (TagActorHandle::new(cmd_tx), event_rx)
    }

    async fn run(mut self) {
        debug!("TagActor run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                TagCommand::Deliver {
                    topic,
                    payload,
                    received_at,
                } => {
                    let outcome = self.store.ingest_message(&topic, &payload);
                    self.delivered += 1;

                    match &outcome {
                        Ok(Ingested::Ignored) => {
                            trace!(%topic, "Ignoring topic outside the tag namespace");
                            continue;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            self.failed += 1;
                            warn!(%topic, "Ingest failed: {}", e);
                        }
                    }

                    let event = IngestEvent {
                        topic,
                        received_at,
                        outcome,
                    };
                    // Nobody listening is fine, the store is still updated
                    let _ = self.event_tx.send(event).await;
                }
                TagCommand::Get { path, response } => {
                    let _ = response.send(self.store.get(&path));
                }
                TagCommand::List { response } => {
                    let _ = response.send(self.store.list());
                }
                TagCommand::Shutdown => {
                    info!("TagActor received shutdown command");
                    break;
                }
            }
        }

        info!(
            delivered = self.delivered,
            failed = self.failed,
            tags = self.store.len(),
            "TagActor stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::error::TagError;
    use crate::state::types::{TagPath, TagValue, UpdateClassification};
    use bytes::Bytes;

    fn payload(value: i64) -> Bytes {
        Bytes::from(format!("{{\"value\":{}}}", value))
    }

    #[tokio::test]
    async fn test_burst_for_one_topic_keeps_order() {
        let store = TagStateStore::new();
        let (handle, mut events) = TagActor::spawn(store.clone(), 16);

        let feeder = {
            let handle = handle.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    assert!(handle.deliver("tags/LINE1.COUNTER", payload(i)).await);
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 100 {
            let event = events.recv().await.unwrap();
            match event.outcome.unwrap() {
                Ingested::Update {
                    classification,
                    value,
                    ..
                } => seen.push((classification, value)),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        feeder.await.unwrap();

        assert_eq!(seen[0].0, UpdateClassification::New);
        for (i, (classification, value)) in seen.iter().enumerate() {
            assert_eq!(*value, TagValue::from(i as i64));
            if i > 0 {
                assert_eq!(
                    *classification,
                    UpdateClassification::Updated {
                        previous: TagValue::from(i as i64 - 1)
                    }
                );
            }
        }

        let path = TagPath::parse("LINE1/COUNTER").unwrap();
        assert_eq!(store.get(&path).unwrap().value, TagValue::from(99_i64));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_foreign_topics_emit_nothing() {
        let (handle, mut events) = TagActor::spawn(TagStateStore::new(), 4);

        handle.deliver("other/topic", Bytes::from_static(b"x")).await;
        handle.deliver("tags/A.B", payload(1)).await;

        let event = events.recv().await.unwrap();
        assert_eq!(event.topic, "tags/A.B");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_errors_are_emitted() {
        let (handle, mut events) = TagActor::spawn(TagStateStore::new(), 4);

        handle
            .deliver("tags/A.B", Bytes::from_static(b"{oops"))
            .await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event.outcome, Err(TagError::Decode { .. })));
        assert!(handle.list().await.is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_keeps_ingesting_without_listener() {
        let (handle, events) = TagActor::spawn(TagStateStore::new(), 2);
        drop(events);

        for i in 0..10 {
            handle.deliver(format!("tags/T.{}", i), payload(i)).await;
        }

        assert_eq!(handle.list().await.len(), 10);
        handle.shutdown().await;
    }
}
