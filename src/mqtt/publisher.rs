//! Publishing of tag updates and full database snapshots
//!
//! Both go out retained, so a monitor that subscribes later still receives the
//! last value of every tag and the last snapshot.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use super::client::MqttTransport;
use crate::state::codec::{self, TagUpdatePayload};
use crate::state::{TagListing, TagPath, TagValue, SNAPSHOT_TOPIC};

/// Publishes tag payloads through a transport
#[derive(Clone)]
pub struct TagPublisher {
    transport: Arc<dyn MqttTransport>,
}

impl TagPublisher {
    pub fn new(transport: Arc<dyn MqttTransport>) -> Self {
        Self { transport }
    }

    /// Publish one tag to its own topic
    pub async fn publish_update(
        &self,
        path: &TagPath,
        value: TagValue,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<()> {
        let payload = TagUpdatePayload {
            name,
            description,
            ..TagUpdatePayload::new(path, value)
        };
        let bytes = codec::encode_update(&payload).context("Failed to encode tag update")?;
        let topic = path.to_topic();

        debug!(%topic, bytes = bytes.len(), "Publishing tag update");
        self.transport.publish(&topic, bytes, true).await
    }

    /// Publish the full database to `tags/database`
    pub async fn publish_snapshot(&self, listing: &TagListing) -> Result<()> {
        let bytes = codec::encode_snapshot(listing).context("Failed to encode tag snapshot")?;

        debug!(tags = listing.len(), bytes = bytes.len(), "Publishing tag snapshot");
        self.transport.publish(SNAPSHOT_TOPIC, bytes, true).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::state::{Ingested, TagStateStore, UpdateClassification};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// In-memory transport recording every publish
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub published: Mutex<Vec<(String, Vec<u8>, bool)>>,
        pub subscriptions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MqttTransport for RecordingTransport {
        async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
            self.published.lock().push((topic.to_string(), payload, retain));
            Ok(())
        }

        async fn subscribe(&self, filter: &str) -> Result<()> {
            self.subscriptions.lock().push(filter.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_publish_update() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = TagPublisher::new(transport.clone());
        let path = TagPath::parse("US/TX/AUSTIN/AREA1/LINE1/MACHINE1/PUMP1/PRESSURE").unwrap();

        publisher
            .publish_update(
                &path,
                TagValue::from("45.7"),
                Some("Pump 1 Pressure".to_string()),
                Some("Pressure sensor for Pump 1".to_string()),
            )
            .await
            .unwrap();

        let published = transport.published.lock();
        assert_eq!(published.len(), 1);
        let (topic, payload, retain) = &published[0];
        assert_eq!(topic, "tags/US.TX.AUSTIN.AREA1.LINE1.MACHINE1.PUMP1.PRESSURE");
        assert!(*retain);

        let decoded = codec::decode_update(topic, payload).unwrap();
        assert_eq!(decoded.value, TagValue::from(45.7));
        assert_eq!(decoded.name.as_deref(), Some("Pump 1 Pressure"));
        assert_eq!(decoded.path.as_deref(), Some(path.as_str()));
    }

    #[tokio::test]
    async fn test_published_messages_feed_a_store() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = TagPublisher::new(transport.clone());

        let source = TagStateStore::new();
        for (raw, value) in [("A/B", "1"), ("A/C", "on")] {
            source.ingest_update(&TagPath::parse(raw).unwrap(), TagValue::from(value));
        }
        publisher.publish_snapshot(&source.list()).await.unwrap();
        publisher
            .publish_update(&TagPath::parse("A/B").unwrap(), TagValue::from(2_i64), None, None)
            .await
            .unwrap();

        let mirror = TagStateStore::new();
        let outcomes: Vec<_> = transport
            .published
            .lock()
            .iter()
            .map(|(topic, payload, _)| mirror.ingest_message(topic, payload).unwrap())
            .collect();

        assert!(matches!(&outcomes[0], Ingested::Snapshot(report) if report.added == 2));
        assert!(matches!(
            &outcomes[1],
            Ingested::Update {
                classification: UpdateClassification::Updated { .. },
                ..
            }
        ));
        assert_eq!(mirror.len(), 2);
    }
}
