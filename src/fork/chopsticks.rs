//! Chopsticks fork engine
//!
//! Spawns the Chopsticks CLI with generated YAML configs and drives the forks
//! through its `dev_*` JSON-RPC methods.

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::engine::{Fork, ForkEngine};
use super::types::{ForkConfig, StorageBatch};
use crate::chain::rpc::{parse_block_number, RpcClient};
use crate::config::RunnerConfig;
use crate::error::{Result, SimulationError};
use crate::topology::RELAY_NETWORK_KEYS;

type SharedProcess = Arc<Mutex<Option<Child>>>;

pub struct ChopsticksEngine {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    host: String,
    next_port: AtomicU16,
}

impl ChopsticksEngine {
    pub fn new(config: &RunnerConfig) -> Result<Self> {
        let mut parts = config.fork_command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| SimulationError::Config("fork engine command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
            work_dir: config.work_dir.clone(),
            host: "127.0.0.1".to_string(),
            next_port: AtomicU16::new(config.base_port),
        })
    }

    fn allocate_port(&self) -> u16 {
        self.next_port.fetch_add(1, Ordering::SeqCst)
    }

    fn endpoint_for(&self, port: u16) -> String {
        format!("ws://{}:{}", self.host, port)
    }

    /// Write one fork's YAML config and return its path.
    pub fn write_config(&self, name: &str, config: &ForkConfig) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.work_dir)?;
        let path = self.work_dir.join(format!("{}.yml", name));
        let yaml = serde_yaml::to_string(config)?;
        std::fs::write(&path, yaml)?;
        Ok(path)
    }

    fn spawn(&self, extra_args: &[String]) -> Result<SharedProcess> {
        info!("Starting fork engine: {} {} {}", self.program, self.args.join(" "), extra_args.join(" "));
        let child = Command::new(&self.program)
            .args(&self.args)
            .args(extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| SimulationError::Fork(format!("failed to start {}: {}", self.program, e)))?;
        Ok(Arc::new(Mutex::new(Some(child))))
    }

    fn with_port(&self, config: &ForkConfig) -> ForkConfig {
        let mut config = config.clone();
        if config.port.is_none() {
            config.port = Some(self.allocate_port());
        }
        config
    }
}

#[async_trait]
impl ForkEngine for ChopsticksEngine {
    async fn setup(&self, config: &ForkConfig) -> Result<Arc<dyn Fork>> {
        let config = self.with_port(config);
        let port = config.port.unwrap_or_default();
        let path = self.write_config(&format!("fork-{}", port), &config)?;
        let process = self.spawn(&["--config".to_string(), path_arg(&path)])?;
        Ok(Arc::new(ChopsticksFork::with_process(
            self.endpoint_for(port),
            process,
        )))
    }

    async fn setup_network(
        &self,
        configs: &BTreeMap<String, ForkConfig>,
    ) -> Result<BTreeMap<String, Arc<dyn Fork>>> {
        let relay_key = configs
            .keys()
            .find(|key| RELAY_NETWORK_KEYS.contains(&key.as_str()))
            .cloned();

        let Some(relay_key) = relay_key else {
            warn!("No relay chain in network; forking {} chains independently", configs.len());
            let mut forks = BTreeMap::new();
            for (key, config) in configs {
                forks.insert(key.clone(), self.setup(config).await?);
            }
            return Ok(forks);
        };

        let mut args = vec!["xcm".to_string()];
        let mut endpoints = BTreeMap::new();
        for (key, config) in configs {
            let config = self.with_port(config);
            let port = config.port.unwrap_or_default();
            let path = self.write_config(key, &config)?;
            let flag = if *key == relay_key { "-r" } else { "-p" };
            args.push(flag.to_string());
            args.push(path_arg(&path));
            endpoints.insert(key.clone(), self.endpoint_for(port));
        }

        let process = self.spawn(&args)?;
        Ok(endpoints
            .into_iter()
            .map(|(key, endpoint)| {
                let fork: Arc<dyn Fork> =
                    Arc::new(ChopsticksFork::with_process(endpoint, process.clone()));
                (key, fork)
            })
            .collect())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// A running Chopsticks fork.
pub struct ChopsticksFork {
    endpoint: String,
    rpc: RpcClient,
    process: Option<SharedProcess>,
}

impl ChopsticksFork {
    /// Attach to a fork that is already running.
    pub fn connect(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            rpc: RpcClient::new(&endpoint),
            endpoint,
            process: None,
        }
    }

    fn with_process(endpoint: String, process: SharedProcess) -> Self {
        Self {
            rpc: RpcClient::new(&endpoint),
            endpoint,
            process: Some(process),
        }
    }
}

#[async_trait]
impl Fork for ChopsticksFork {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn head_number(&self) -> Result<u32> {
        let header = self.rpc.request("chain_getHeader", json!([])).await?;
        let number = header
            .get("number")
            .ok_or_else(|| SimulationError::Rpc("header has no number".to_string()))?;
        parse_block_number(number)
    }

    async fn new_block(&self) -> Result<()> {
        self.rpc.request("dev_newBlock", json!([{"count": 1}])).await?;
        Ok(())
    }

    async fn set_storage(&self, batch: &StorageBatch) -> Result<()> {
        self.rpc
            .request("dev_setStorage", json!([batch.to_json()]))
            .await
            .map_err(|e| SimulationError::Storage(format!("{}: {}", self.endpoint, e)))?;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        Err(SimulationError::Unsupported(format!(
            "chopsticks has no pause hook; {} is left running",
            self.endpoint
        )))
    }

    async fn teardown(&self) -> Result<()> {
        let Some(process) = &self.process else {
            return Ok(());
        };
        let mut guard = process.lock().await;
        if let Some(mut child) = guard.take() {
            info!("Stopping fork engine serving {}", self.endpoint);
            child
                .kill()
                .await
                .map_err(|e| SimulationError::Fork(format!("failed to stop fork engine: {}", e)))?;
        }
        Ok(())
    }
}
