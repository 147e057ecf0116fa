//! Event loop pump: broker → TagActor
//!
//! Polls the `rumqttc` event loop, (re)subscribes after every connection
//! acknowledgement and forwards incoming publishes to the TagActor in the
//! order the broker delivered them.

use anyhow::Result;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::state::TagActorHandle;

/// Pause between polls after a connection error
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Extract topic and payload from an incoming publish
pub fn incoming_publish(event: Event) -> Option<(String, Bytes)> {
    match event {
        Event::Incoming(Packet::Publish(publish)) => Some((publish.topic, publish.payload)),
        _ => None,
    }
}

/// Run the event loop until `shutdown` resolves or the actor stops
pub async fn pump(
    client: AsyncClient,
    mut eventloop: EventLoop,
    filters: Vec<String>,
    handle: TagActorHandle,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            event = eventloop.poll() => event,
            _ = &mut shutdown => break,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "Connected to MQTT broker");
                // Sessions are clean, so subscriptions are lost on every reconnect
                for filter in &filters {
                    match client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                        Ok(()) => info!("Subscribed to {}", filter),
                        Err(e) => warn!("Failed to subscribe to {}: {}", filter, e),
                    }
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                debug!(pkid = ack.pkid, "Subscription acknowledged");
            }
            Ok(event) => {
                let Some((topic, payload)) = incoming_publish(event) else {
                    continue;
                };
                // A full actor queue must not hold off shutdown
                let delivered = tokio::select! {
                    delivered = handle.deliver(topic, payload) => delivered,
                    _ = &mut shutdown => break,
                };
                if !delivered {
                    warn!("Tag actor stopped, leaving MQTT event loop");
                    break;
                }
            }
            Err(e) => {
                warn!("MQTT connection error: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    _ = &mut shutdown => break,
                }
            }
        }
    }

    info!("Stopping MQTT event loop");
    if let Err(e) = client.try_disconnect() {
        debug!("Disconnect request not queued: {}", e);
    }
    Ok(())
}
