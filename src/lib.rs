//! docbridge - MQTT to document store forwarder
//!
//! Subscribes to every topic on a local MQTT v3.1.1 broker and writes each
//! received message as one `{topic, payload, timestamp}` document into a
//! document store. Also renders the Mosquitto bridge configuration that
//! links the local broker to a remote one.

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod forwarder;
pub mod handler;
pub mod message;
pub mod mosquitto;
pub mod protocol;
pub mod store;
pub mod topic;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{BrokerClient, ClientError};
pub use config::Config;
pub use dispatch::Dispatcher;
pub use forwarder::Forwarder;
pub use handler::{ForwardError, MessageHandler, StoreHandler};
pub use message::{Message, StoredDocument};
pub use mosquitto::MosquittoBridge;
pub use protocol::QoS;
pub use store::{DocumentStore, StoreError};
