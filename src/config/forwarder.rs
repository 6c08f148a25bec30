//! Forwarder dispatch configuration.

use serde::Deserialize;

/// What to do when a writer queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Wait for space; the connection loop stops reading from the broker
    #[default]
    Block,
    /// Drop the message and log a warning
    Drop,
}

impl std::fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::Block => write!(f, "block"),
            OverflowPolicy::Drop => write!(f, "drop"),
        }
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Number of writer tasks (0 = write inline in the connection loop)
    pub workers: usize,

    /// Capacity of each writer queue
    pub queue_capacity: usize,

    /// Policy when a writer queue is full
    pub overflow: OverflowPolicy,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: 1024,
            overflow: OverflowPolicy::Block,
        }
    }
}

impl ForwarderConfig {
    /// Check if messages are handed to a writer pool
    pub fn uses_pool(&self) -> bool {
        self.workers > 0
    }
}
