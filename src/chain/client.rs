//! Chain client seam
//!
//! Typed storage access and call decoding need live runtime metadata, which is
//! the chain client's concern. The simulation only talks to it through these
//! traits.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::types::{Bytes, ChainEvent, DecodedCall, StorageEntry};
use crate::error::Result;

/// Read access to one chain (live or forked).
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Runtime spec name, e.g. `polkadot` or `asset-hub-polkadot`.
    async fn spec_name(&self) -> Result<String>;

    /// Decoded value of a storage item; `keys` is empty for plain values.
    async fn storage(&self, pallet: &str, item: &str, keys: &[Value]) -> Result<Option<Value>>;

    /// Every entry of a storage map.
    async fn storage_entries(&self, pallet: &str, item: &str) -> Result<Vec<StorageEntry>>;

    async fn constant(&self, pallet: &str, name: &str) -> Result<Value>;

    /// Decode call data against the current runtime metadata.
    async fn decode_call(&self, call: &Bytes) -> Result<DecodedCall>;

    /// Events of the current head block.
    async fn events(&self) -> Result<Vec<ChainEvent>>;

    async fn disconnect(&self) -> Result<()>;
}

/// Opens scoped chain clients.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainClient>>;

    /// Spec name of a live chain. The client is released on every path.
    async fn spec_name(&self, endpoint: &str) -> Result<String> {
        let client = self.connect(endpoint).await?;
        let result = client.spec_name().await;
        if let Err(e) = client.disconnect().await {
            tracing::warn!("Failed to disconnect from {}: {}", endpoint, e);
        }
        result
    }
}
