//! Dispatch from the connection loop to the message handler.
//!
//! Inline mode awaits the handler in the connection loop, one message in
//! flight. Pool mode hands messages to N writer tasks with bounded queues.
//! A topic always routes to the same writer so per-topic order is kept.

use std::hash::Hasher;
use std::sync::Arc;

use fnv::FnvHasher;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ForwarderConfig, OverflowPolicy};
use crate::handler::{ForwardError, MessageHandler};
use crate::message::Message;

struct Writer {
    tx: mpsc::Sender<Message>,
    task: JoinHandle<()>,
}

enum Mode {
    Inline(Arc<dyn MessageHandler>),
    Pool {
        writers: Vec<Writer>,
        overflow: OverflowPolicy,
    },
}

/// Hands received messages to the handler
pub struct Dispatcher {
    mode: Mode,
}

/// Stable writer index for a topic
fn route(topic: &str, workers: usize) -> usize {
    let mut hasher = FnvHasher::default();
    hasher.write(topic.as_bytes());
    (hasher.finish() % workers as u64) as usize
}

impl Dispatcher {
    /// Create a dispatcher; spawns writer tasks when `config.workers > 0`
    pub fn new(handler: Arc<dyn MessageHandler>, config: &ForwarderConfig) -> Self {
        if !config.uses_pool() {
            return Self::inline(handler);
        }

        let writers = (0..config.workers)
            .map(|id| {
                let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
                let task = tokio::spawn(Self::writer_loop(id, handler.clone(), rx));
                Writer { tx, task }
            })
            .collect();

        info!(
            "Dispatching to {} writers (queue capacity {}, overflow {})",
            config.workers, config.queue_capacity, config.overflow
        );

        Self {
            mode: Mode::Pool {
                writers,
                overflow: config.overflow,
            },
        }
    }

    /// Await the handler in the caller's task
    pub fn inline(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            mode: Mode::Inline(handler),
        }
    }

    /// Number of writer tasks, 0 for inline dispatch
    pub fn workers(&self) -> usize {
        match &self.mode {
            Mode::Inline(_) => 0,
            Mode::Pool { writers, .. } => writers.len(),
        }
    }

    /// Dispatch one message.
    ///
    /// Inline: returns the handler's result. Pool: returns once the message
    /// is queued; under the drop policy a full queue yields `QueueFull`.
    pub async fn dispatch(&self, message: Message) -> Result<(), ForwardError> {
        match &self.mode {
            Mode::Inline(handler) => handler.on_message(message).await,
            Mode::Pool { writers, overflow } => {
                let writer = &writers[route(&message.topic, writers.len())];
                match overflow {
                    OverflowPolicy::Block => writer
                        .tx
                        .send(message)
                        .await
                        .map_err(|_| ForwardError::DispatcherClosed),
                    OverflowPolicy::Drop => match writer.tx.try_send(message) {
                        Ok(()) => Ok(()),
                        Err(mpsc::error::TrySendError::Full(message)) => {
                            warn!("Writer queue full, dropping message on {}", message.topic);
                            Err(ForwardError::QueueFull)
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            Err(ForwardError::DispatcherClosed)
                        }
                    },
                }
            }
        }
    }

    /// Close the queues and wait for writers to drain them
    pub async fn shutdown(self) {
        if let Mode::Pool { writers, .. } = self.mode {
            let tasks: Vec<_> = writers
                .into_iter()
                .map(|Writer { tx, task }| {
                    drop(tx);
                    task
                })
                .collect();

            for task in tasks {
                if let Err(e) = task.await {
                    warn!("Writer task failed: {}", e);
                }
            }
            info!("Dispatcher drained");
        }
    }

    async fn writer_loop(
        id: usize,
        handler: Arc<dyn MessageHandler>,
        mut rx: mpsc::Receiver<Message>,
    ) {
        while let Some(message) = rx.recv().await {
            // Outcome already logged by the handler
            if let Err(e) = handler.on_message(message).await {
                debug!("Writer {}: message dropped: {}", id, e);
            }
        }
        debug!("Writer {} exited", id);
    }
}
