//! Fjall-based document store.
//!
//! Uses fjall (an LSM-tree based embedded database) for local storage. Each
//! `database`/`collection` pair maps to one partition; documents are JSON
//! encoded and keyed by receipt time plus a random UUID, so iteration yields
//! them in receipt order and identical documents never collide.

use std::path::Path;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use uuid::Uuid;

use super::error::{Result, StoreError};
use super::DocumentStore;
use crate::message::StoredDocument;

/// Fjall-based document store
pub struct FjallStore {
    keyspace: Keyspace,
    partition: String,
    documents: PartitionHandle,
}

/// Partition name for a collection; fjall only accepts a restricted charset
fn partition_name(database: &str, collection: &str) -> String {
    format!("{}__{}", database, collection)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sortable key: zero-padded receipt time in microseconds, then a UUID
fn document_key(document: &StoredDocument) -> String {
    format!(
        "{:020}-{}",
        document.timestamp.timestamp_micros().max(0),
        Uuid::new_v4()
    )
}

impl FjallStore {
    /// Open a fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P, database: &str, collection: &str) -> Result<Self> {
        let keyspace = Config::new(path).open()?;
        let partition = partition_name(database, collection);
        let documents = keyspace.open_partition(&partition, PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            partition,
            documents,
        })
    }

    /// All documents in receipt order
    pub fn list(&self) -> Result<Vec<StoredDocument>> {
        let mut result = Vec::new();
        for item in self.documents.iter() {
            let (_, value) = item?;
            let document: StoredDocument = serde_json::from_slice(&value)
                .map_err(|e| StoreError::Deserialize(e.to_string()))?;
            result.push(document);
        }
        Ok(result)
    }

    /// Number of stored documents
    pub fn count(&self) -> Result<usize> {
        Ok(self.documents.len()?)
    }
}

#[async_trait]
impl DocumentStore for FjallStore {
    fn name(&self) -> &'static str {
        "fjall"
    }

    async fn insert_one(&self, document: &StoredDocument) -> Result<()> {
        let bytes =
            serde_json::to_vec(document).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.documents.insert(document_key(document), bytes)?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.keyspace.partition_exists(&self.partition) {
            Ok(())
        } else {
            Err(StoreError::Storage("document partition is missing".to_string()))
        }
    }

    async fn flush(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.flush().await
    }
}
