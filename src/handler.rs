//! Message handling: one received message, one document insert.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::message::{Message, StoredDocument};
use crate::store::{DocumentStore, StoreError};

/// Per-message failures. None of them stop the subscription.
#[derive(Debug)]
pub enum ForwardError {
    /// Payload is not valid UTF-8
    InvalidUtf8(std::str::Utf8Error),
    /// Store rejected the insert
    Store(StoreError),
    /// Writer queue full under the drop policy
    QueueFull,
    /// Dispatcher already shut down
    DispatcherClosed,
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8(e) => write!(f, "payload is not valid UTF-8: {}", e),
            Self::Store(e) => write!(f, "store write failed: {}", e),
            Self::QueueFull => write!(f, "writer queue is full"),
            Self::DispatcherClosed => write!(f, "dispatcher is closed"),
        }
    }
}

impl std::error::Error for ForwardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidUtf8(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::str::Utf8Error> for ForwardError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8(e)
    }
}

impl From<StoreError> for ForwardError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Invoked by the connection loop for every PUBLISH
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: Message) -> Result<(), ForwardError>;
}

/// Writes each message to the document store
pub struct StoreHandler {
    store: Arc<dyn DocumentStore>,
}

impl StoreHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for StoreHandler {
    async fn on_message(&self, message: Message) -> Result<(), ForwardError> {
        info!(
            "Received message on {}: {}",
            message.topic,
            String::from_utf8_lossy(&message.payload)
        );

        let document = match StoredDocument::from_message(&message) {
            Ok(document) => document,
            Err(e) => {
                warn!("Dropping message on {}: invalid UTF-8 payload: {}", message.topic, e);
                return Err(e.into());
            }
        };

        match self.store.insert_one(&document).await {
            Ok(()) => {
                info!("Stored message from {}", document.topic);
                Ok(())
            }
            Err(e) => {
                error!("Failed to store message from {}: {}", document.topic, e);
                Err(e.into())
            }
        }
    }
}
