//! uns-monitor - tag state synchronization over MQTT
//!
//! Keeps the last known value of every tag in a Unified Namespace, fed by
//! single-tag updates on `tags/<dotted.path>` and full snapshots on
//! `tags/database`.

pub mod config;
pub mod mqtt;
pub mod render;
pub mod state;
