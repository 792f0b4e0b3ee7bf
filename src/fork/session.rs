//! Fork session handle
//!
//! A session is the explicit context every engine step receives: the fork,
//! the chain client connected to it, and what chain it is.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::engine::Fork;
use super::types::StorageBatch;
use crate::chain::ChainClient;
use crate::error::{Result, SimulationError};
use crate::topology::ChainDescriptor;

/// Bounds for every polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    /// Attempts while waiting for the head to advance after a block request.
    pub head_attempts: u32,
    /// Attempts while waiting for a new fork to answer.
    pub ready_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            head_attempts: 120,
            ready_attempts: 240,
        }
    }
}

pub struct ForkSession {
    key: String,
    descriptor: ChainDescriptor,
    fork: Arc<dyn Fork>,
    client: Arc<dyn ChainClient>,
    polling: PollingConfig,
}

impl ForkSession {
    pub fn new(
        key: impl Into<String>,
        descriptor: ChainDescriptor,
        fork: Arc<dyn Fork>,
        client: Arc<dyn ChainClient>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            key: key.into(),
            descriptor,
            fork,
            client,
            polling,
        }
    }

    /// Network key of this fork.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn descriptor(&self) -> &ChainDescriptor {
        &self.descriptor
    }

    pub fn fork(&self) -> &Arc<dyn Fork> {
        &self.fork
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    pub async fn head_number(&self) -> Result<u32> {
        self.fork.head_number().await
    }

    /// Apply a storage batch. The state is not readable until a block is
    /// produced.
    pub async fn write(&self, batch: &StorageBatch) -> Result<()> {
        debug!("[{}] applying storage batch", self.key);
        self.fork.set_storage(batch).await
    }

    /// Apply a storage batch and produce the one block that commits it.
    pub async fn commit(&self, batch: &StorageBatch) -> Result<u32> {
        self.write(batch).await?;
        self.produce_block().await
    }

    /// Build one block and wait until the head has strictly advanced.
    pub async fn produce_block(&self) -> Result<u32> {
        let before = self.fork.head_number().await?;
        self.fork.new_block().await?;

        for _ in 0..self.polling.head_attempts {
            let head = self.fork.head_number().await?;
            if head > before {
                debug!("[{}] head advanced {} -> {}", self.key, before, head);
                return Ok(head);
            }
            tokio::time::sleep(self.polling.interval).await;
        }

        Err(SimulationError::Timeout(format!(
            "[{}] head did not advance past #{} after {} attempts",
            self.key, before, self.polling.head_attempts
        )))
    }

    /// Wait until the fork answers head queries.
    pub async fn wait_ready(&self) -> Result<u32> {
        let mut last_error = None;
        for _ in 0..self.polling.ready_attempts {
            match self.fork.head_number().await {
                Ok(head) => {
                    info!("[{}] fork ready at #{} ({})", self.key, head, self.fork.endpoint());
                    return Ok(head);
                }
                Err(e) => last_error = Some(e),
            }
            tokio::time::sleep(self.polling.interval).await;
        }

        Err(SimulationError::Timeout(format!(
            "[{}] fork at {} not ready after {} attempts{}",
            self.key,
            self.fork.endpoint(),
            self.polling.ready_attempts,
            last_error.map(|e| format!(": {}", e)).unwrap_or_default()
        )))
    }
}
