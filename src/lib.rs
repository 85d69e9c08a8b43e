//! P1 smart meter bridge
//!
//! Reads DSMR telegrams from the P1 port of a smart meter, verifies their
//! checksum, keeps track of which readings changed and publishes them to MQTT.

pub mod config;
pub mod mqtt;
pub mod obis_utils;
pub mod p1;

// Re-export common types for easier access
pub use config::{Config, ConfigError};
pub use mqtt::{MqttManager, MqttSink, Transmission};
pub use p1::P1Manager;
pub use p1::decoder::{LineDecoder, LineOutcome};
pub use p1::registry::{MetricDefinition, MetricRegistry, MetricState, RegistryError};
pub use p1::scheduler::{LineSource, MetricSink, PollOutcome, PublishScheduler};
