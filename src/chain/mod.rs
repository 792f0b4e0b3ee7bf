//! Chain client boundary
//!
//! Traits for the external chain client, the values it hands over, and a
//! small JSON-RPC helper used for probing live endpoints.

pub mod client;
pub mod rpc;
pub mod types;

pub use client::{ChainClient, ChainConnector};
pub use rpc::RpcClient;
pub use types::{Bytes, ChainEvent, DecodedCall, StorageEntry};
