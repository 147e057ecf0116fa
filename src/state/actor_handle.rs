//! TagActorHandle - Public API for the TagActor
//!
//! Wraps message passing with async methods. Deliveries wait only for queue
//! space; queries wait for the actor's reply on a oneshot channel.

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use super::commands::TagCommand;
use super::error::{TagError, TagResult};
use super::types::{TagListing, TagPath, TagRecord};

/// Handle for interacting with the TagActor
///
/// Cheap to clone and share between the transport pump and readers.
#[derive(Clone)]
pub struct TagActorHandle {
    cmd_tx: mpsc::Sender<TagCommand>,
}

impl TagActorHandle {
    pub fn new(cmd_tx: mpsc::Sender<TagCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Hand a raw transport message to the actor
    ///
    /// Waits while the queue is full. Returns false if the actor has stopped.
    pub async fn deliver(&self, topic: impl Into<String>, payload: Bytes) -> bool {
        let cmd = TagCommand::Deliver {
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
        };
        self.cmd_tx.send(cmd).await.is_ok()
    }

    /// Get the record for a path
    ///
    /// A stopped actor answers like an empty store.
    pub async fn get(&self, path: TagPath) -> TagResult<TagRecord> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = TagCommand::Get {
            path: path.clone(),
            response: response_tx,
        };

        if self.cmd_tx.send(cmd).await.is_err() {
            return Err(TagError::NotFound(path));
        }

        response_rx
            .await
            .unwrap_or_else(|_| Err(TagError::NotFound(path)))
    }

    /// Copy of the store contents
    pub async fn list(&self) -> TagListing {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = TagCommand::List {
            response: response_tx,
        };

        if self.cmd_tx.send(cmd).await.is_err() {
            return TagListing::default();
        }

        response_rx.await.unwrap_or_default()
    }

    /// Returns false once the actor's queue is closed
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Ask the actor to stop after the commands already queued
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(TagCommand::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::actor::TagActor;
    use crate::state::store::TagStateStore;
    use crate::state::types::TagValue;

    #[test]
    fn test_handle_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<TagActorHandle>();
    }

    #[tokio::test]
    async fn test_is_alive_when_channel_open() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = TagActorHandle::new(tx);
        assert!(handle.is_alive());
    }

    #[tokio::test]
    async fn test_closed_channel_answers_empty() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = TagActorHandle::new(tx);
        let path = TagPath::parse("A/B").unwrap();

        assert!(!handle.is_alive());
        assert!(!handle.deliver("tags/A.B", Bytes::from_static(b"{}")).await);
        assert_eq!(handle.get(path.clone()).await, Err(TagError::NotFound(path)));
        assert!(handle.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_after_deliver() {
        let (handle, _events) = TagActor::spawn(TagStateStore::new(), 8);
        let path = TagPath::parse("US/TX/PUMP1/STATUS").unwrap();

        handle
            .deliver(
                "tags/US.TX.PUMP1.STATUS",
                Bytes::from_static(br#"{"value":"RUNNING"}"#),
            )
            .await;

        let record = handle.get(path).await.unwrap();
        assert_eq!(record.value, TagValue::from("RUNNING"));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let (handle, _events) = TagActor::spawn(TagStateStore::new(), 8);
        handle.shutdown().await;

        // The actor drops its receiver once the shutdown command is processed
        for _ in 0..50 {
            if !handle.is_alive() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("actor did not stop");
    }
}
