//! JSON-RPC over HTTP
//!
//! Substrate nodes and the fork engine both serve JSON-RPC over HTTP on the
//! same port as their websocket endpoint, so `ws://` endpoints are rewritten
//! to `http://` and queried with plain POST requests.

use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{Result, SimulationError};

pub struct RpcClient {
    url: String,
    http_client: Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            url: http_url(endpoint),
            http_client: Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request and unwrap the `result` member.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("RPC {} -> {} (id {})", method, self.url, id);

        let response = self
            .http_client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SimulationError::Rpc(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(SimulationError::Rpc(format!("{} failed: {}", method, message)));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| SimulationError::Rpc(format!("{} returned no result", method)))
    }

    pub async fn spec_name(&self) -> Result<String> {
        let version = self.request("state_getRuntimeVersion", json!([])).await?;
        version
            .get("specName")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SimulationError::Rpc("runtime version has no specName".to_string()))
    }

    pub async fn head_number(&self) -> Result<u32> {
        let header = self.request("chain_getHeader", json!([])).await?;
        let number = header
            .get("number")
            .ok_or_else(|| SimulationError::Rpc("header has no number".to_string()))?;
        parse_block_number(number)
    }
}

/// Rewrite a websocket endpoint to its HTTP counterpart.
pub fn http_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = endpoint.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else {
        endpoint.to_string()
    }
}

/// Block numbers arrive as hex strings from RPC and as plain numbers elsewhere.
/// A malformed value is a decode error, never a transport one.
pub fn parse_block_number(value: &Value) -> Result<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| SimulationError::Decode(format!("block number out of range: {}", n))),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(digits) => u32::from_str_radix(digits, 16),
                None => s.replace(',', "").parse::<u32>(),
            };
            parsed.map_err(|e| SimulationError::Decode(format!("invalid block number {}: {}", s, e)))
        }
        other => Err(SimulationError::Decode(format!(
            "unexpected block number value: {}",
            other
        ))),
    }
}
