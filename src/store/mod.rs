//! Document store backends.
//!
//! Every received message becomes one document `{topic, payload, timestamp}`
//! inserted into a single collection. The backend is picked by URI scheme:
//! - `mongodb://`, `mongodb+srv://` - `MongoStore`
//! - `fjall://<path>` - `FjallStore`, local LSM-tree storage
//! - `memory://` - `MemoryStore`, in-process

mod error;
mod fjall;
mod memory;
mod mongo;

pub use error::{Result, StoreError};
pub use fjall::FjallStore;
pub use memory::MemoryStore;
pub use mongo::MongoStore;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::StoreConfig;
use crate::message::StoredDocument;

/// A collection that documents are appended to
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Insert one document
    async fn insert_one(&self, document: &StoredDocument) -> Result<()>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Flush pending writes to durable storage
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Close the store
    async fn close(&self) -> Result<()>;
}

/// Split `scheme://rest`
fn split_uri(uri: &str) -> Result<(&str, &str)> {
    uri.split_once("://")
        .filter(|(scheme, _)| !scheme.is_empty())
        .ok_or_else(|| StoreError::InvalidUri(uri.to_string()))
}

/// Open the store named by `config.uri` and verify it is reachable
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    let (scheme, rest) = split_uri(&config.uri)?;

    let store: Arc<dyn DocumentStore> = match scheme {
        "mongodb" | "mongodb+srv" => Arc::new(
            MongoStore::connect(&config.uri, &config.database, &config.collection).await?,
        ),
        "fjall" => {
            if rest.is_empty() {
                return Err(StoreError::InvalidUri(config.uri.clone()));
            }
            Arc::new(FjallStore::open(rest, &config.database, &config.collection)?)
        }
        "memory" => Arc::new(MemoryStore::new()),
        other => return Err(StoreError::UnsupportedScheme(other.to_string())),
    };

    store.ping().await?;
    info!(
        "Document store ready: {} ({}.{})",
        store.name(),
        config.database,
        config.collection
    );

    Ok(store)
}
