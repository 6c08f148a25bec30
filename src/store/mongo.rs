//! MongoDB document store.

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use tracing::debug;

use super::error::Result;
use super::DocumentStore;
use crate::message::StoredDocument;

/// Give up on server selection quickly so an unreachable store fails startup
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// MongoDB collection accessed through the official driver
pub struct MongoStore {
    client: Client,
    database: Database,
    collection: Collection<Document>,
}

/// BSON form of a document; `timestamp` is a BSON date
fn to_bson(document: &StoredDocument) -> Document {
    doc! {
        "topic": document.topic.as_str(),
        "payload": document.payload.as_str(),
        "timestamp": BsonDateTime::from_millis(document.timestamp.timestamp_millis()),
    }
}

impl MongoStore {
    /// Build a client for `uri`. No network traffic happens until the first operation.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let mut options = ClientOptions::parse(uri).await?;
        if options.app_name.is_none() {
            options.app_name = Some("docbridge".to_string());
        }
        if options.server_selection_timeout.is_none() {
            options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
        }

        let client = Client::with_options(options)?;
        let database = client.database(database);
        let collection = database.collection::<Document>(collection);

        Ok(Self {
            client,
            database,
            collection,
        })
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn insert_one(&self, document: &StoredDocument) -> Result<()> {
        let result = self.collection.insert_one(to_bson(document)).await?;
        debug!("Inserted document {}", result.inserted_id);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
