//! Fork engine seam

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::{ForkConfig, StorageBatch};
use crate::error::Result;

/// An ephemeral, mutable replica of a live chain.
#[async_trait]
pub trait Fork: Send + Sync {
    /// Websocket endpoint of the fork.
    fn endpoint(&self) -> &str;

    async fn head_number(&self) -> Result<u32>;

    /// Ask the engine to build one block.
    ///
    /// The call may return before the new block is the head; callers poll
    /// `head_number` until it advances.
    async fn new_block(&self) -> Result<()>;

    async fn set_storage(&self, batch: &StorageBatch) -> Result<()>;

    /// Keep the fork alive for manual inspection.
    async fn pause(&self) -> Result<()>;

    async fn teardown(&self) -> Result<()>;
}

/// Creates forks.
#[async_trait]
pub trait ForkEngine: Send + Sync {
    async fn setup(&self, config: &ForkConfig) -> Result<Arc<dyn Fork>>;

    /// Fork several chains at once. Relay and parachain forks are wired
    /// together by the engine, which recognises the relay by its network key.
    async fn setup_network(
        &self,
        configs: &BTreeMap<String, ForkConfig>,
    ) -> Result<BTreeMap<String, Arc<dyn Fork>>>;
}
