//! MQTT transport glue
//!
//! Connects the tag state layer to a broker through `rumqttc`. The protocol
//! itself is the client crate's job; this module only opens the connection,
//! publishes tag payloads and pumps incoming publishes into the TagActor.

pub mod client;
pub mod publisher;
pub mod pump;

pub use client::{connect, MqttTransport};
pub use publisher::TagPublisher;
pub use pump::pump;
