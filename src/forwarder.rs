//! Forwarder
//!
//! Owns the broker client, the dispatcher and the store handle, and drives
//! the connection lifecycle:
//! - the first connection must succeed, otherwise `run` fails
//! - a lost connection is re-established with exponential backoff
//! - on shutdown: DISCONNECT, drain the dispatcher, flush and close the store

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::client::{BrokerClient, BrokerStream, ClientError, Session};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::handler::StoreHandler;
use crate::store::DocumentStore;

/// Broker-to-store forwarding process
pub struct Forwarder {
    client: BrokerClient,
    dispatcher: Dispatcher,
    store: Arc<dyn DocumentStore>,
}

impl Forwarder {
    /// Wire the store handler behind a dispatcher. Must be called inside a
    /// Tokio runtime when a writer pool is configured.
    pub fn new(config: &Config, store: Arc<dyn DocumentStore>) -> Result<Self, ClientError> {
        let client = BrokerClient::new(config.broker.clone())?;
        let handler = Arc::new(StoreHandler::new(store.clone()));
        let dispatcher = Dispatcher::new(handler, &config.forwarder);

        Ok(Self {
            client,
            dispatcher,
            store,
        })
    }

    /// Run until shutdown is signalled or the connection is lost for good
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ClientError> {
        let result = self.run_sessions(&mut shutdown).await;

        self.dispatcher.shutdown().await;
        if let Err(e) = self.store.flush().await {
            error!("Failed to flush document store: {}", e);
        }
        if let Err(e) = self.store.close().await {
            error!("Failed to close document store: {}", e);
        }

        info!("Forwarder stopped");
        result
    }

    async fn run_sessions(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), ClientError> {
        let broker = self.client.config();

        let mut session = tokio::select! {
            result = self.client.connect() => match result {
                Ok(session) => session,
                Err(e) => {
                    error!("Failed to connect to broker at {}: {}", broker.address(), e);
                    return Err(e);
                }
            },
            _ = shutdown.recv() => return Ok(()),
        };

        loop {
            match session.run(&self.dispatcher, shutdown).await {
                Ok(()) => {
                    info!("Disconnected from broker");
                    return Ok(());
                }
                Err(e) if !broker.reconnect => {
                    error!("Connection to broker lost: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Connection to broker lost: {}", e);
                    match self.reconnect(shutdown).await {
                        Some(next) => session = next,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Retry with exponential backoff; None if shutdown arrives first
    async fn reconnect(
        &self,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Option<Session<Box<dyn BrokerStream>>> {
        let broker = self.client.config();
        let mut retry_interval = broker.reconnect_interval;

        loop {
            debug!("Reconnecting in {:?}", retry_interval);

            tokio::select! {
                _ = tokio::time::sleep(retry_interval) => {}
                _ = shutdown.recv() => return None,
            }

            let result = tokio::select! {
                result = self.client.connect() => result,
                _ = shutdown.recv() => return None,
            };

            match result {
                Ok(session) => {
                    info!("Reconnected to broker at {}", broker.address());
                    return Some(session);
                }
                Err(e) => {
                    warn!("Reconnect to {} failed: {}", broker.address(), e);
                    retry_interval = std::cmp::min(retry_interval * 2, broker.max_reconnect_interval);
                }
            }
        }
    }
}
