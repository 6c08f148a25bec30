//! Inbound messages and the documents written for them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A PUBLISH received from the broker, stamped at receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Topic name, verbatim
    pub topic: String,
    /// Opaque payload bytes
    pub payload: Bytes,
    /// UTC instant the forwarder received the message
    pub received_at: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::received_at(topic, payload, Utc::now())
    }

    /// Create a message with an explicit receipt time
    pub fn received_at(
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at,
        }
    }
}

/// One document per message: `{topic, payload, timestamp}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub topic: String,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredDocument {
    /// Build the document for a message, decoding the payload as UTF-8
    pub fn from_message(message: &Message) -> Result<Self, std::str::Utf8Error> {
        let payload = std::str::from_utf8(&message.payload)?;
        Ok(Self {
            topic: message.topic.clone(),
            payload: payload.to_string(),
            timestamp: message.received_at,
        })
    }
}
