//! Broker connection and the publish/subscribe seam

use anyhow::{Context, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use std::time::Duration;
use tracing::debug;

use crate::config::MqttConfig;

/// Publish/subscribe operations the tag layer needs from a transport
///
/// Implemented for `rumqttc::AsyncClient`; tests use an in-memory recorder.
#[async_trait]
pub trait MqttTransport: Send + Sync {
    /// Publish a payload with at-least-once delivery
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;

    /// Subscribe to a topic filter with at-least-once delivery
    async fn subscribe(&self, filter: &str) -> Result<()>;
}

#[async_trait]
impl MqttTransport for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, retain, payload)
            .await
            .with_context(|| format!("Failed to publish to {}", topic))
    }

    async fn subscribe(&self, filter: &str) -> Result<()> {
        AsyncClient::subscribe(self, filter, QoS::AtLeastOnce)
            .await
            .with_context(|| format!("Failed to subscribe to {}", filter))
    }
}

/// Create a client and its event loop
///
/// Nothing touches the network until the event loop is polled.
pub fn connect(config: &MqttConfig, client_id: &str) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    debug!(
        host = %config.host,
        port = config.port,
        client_id,
        "Creating MQTT client"
    );

    AsyncClient::new(options, config.request_capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requests_are_queued_before_connect() {
        let config = MqttConfig {
            request_capacity: 4,
            ..MqttConfig::default()
        };
        let (client, _eventloop) = connect(&config, "uns-monitor-test");

        // The event loop is never polled, so requests only land in its queue
        MqttTransport::subscribe(&client, "tags/#").await.unwrap();
        MqttTransport::publish(&client, "tags/A.B", b"{\"value\":1}".to_vec(), true)
            .await
            .unwrap();
    }
}
