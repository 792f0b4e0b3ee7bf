//! In-memory fork engine and chain client
//!
//! `MockChain` keeps decoded storage in a map and runs a block hook every time
//! a block is built, so the whole force/relocate/verify cycle can run without a
//! network. The default hook dispatches the scheduler agenda of the new block.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::engine::{Fork, ForkEngine};
use super::types::{ForkConfig, StorageBatch, StorageWrite};
use crate::chain::{Bytes, ChainClient, ChainConnector, ChainEvent, DecodedCall, StorageEntry};
use crate::error::{Result, SimulationError};

/// Runs after the head has advanced to the given block.
pub type BlockHook = Arc<dyn Fn(&mut MockState, u32) + Send + Sync>;

type ItemKey = (String, String);

#[derive(Debug, Default)]
pub struct MockState {
    pub spec_name: String,
    pub head: u32,
    storage: BTreeMap<ItemKey, BTreeMap<String, (Vec<Value>, Value)>>,
    pub constants: BTreeMap<ItemKey, Value>,
    /// Call data (lowercase hex) to the call it decodes to.
    pub calls: BTreeMap<String, DecodedCall>,
    /// Events of the head block.
    pub events: Vec<ChainEvent>,
    pub writes: Vec<StorageBatch>,
    pub blocks_built: u32,
    /// When set, block requests are accepted but the head never moves.
    pub stalled: bool,
    pub pausable: bool,
    pub paused: bool,
    pub torn_down: bool,
    pub disconnects: u32,
}

fn entry_key(keys: &[Value]) -> String {
    Value::Array(keys.to_vec()).to_string()
}

impl MockState {
    pub fn get(&self, pallet: &str, item: &str, keys: &[Value]) -> Option<&Value> {
        self.storage
            .get(&(pallet.to_string(), item.to_string()))?
            .get(&entry_key(keys))
            .map(|(_, value)| value)
    }

    /// Store a value; `null` removes it.
    pub fn put(&mut self, pallet: &str, item: &str, keys: Vec<Value>, value: Value) {
        let map = self
            .storage
            .entry((pallet.to_string(), item.to_string()))
            .or_default();
        if value.is_null() {
            map.remove(&entry_key(&keys));
        } else {
            map.insert(entry_key(&keys), (keys, value));
        }
    }

    pub fn remove(&mut self, pallet: &str, item: &str, keys: &[Value]) -> Option<Value> {
        self.storage
            .get_mut(&(pallet.to_string(), item.to_string()))?
            .remove(&entry_key(keys))
            .map(|(_, value)| value)
    }

    pub fn entries(&self, pallet: &str, item: &str) -> Vec<StorageEntry> {
        self.storage
            .get(&(pallet.to_string(), item.to_string()))
            .map(|map| {
                map.values()
                    .map(|(keys, value)| StorageEntry {
                        keys: keys.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn apply(&mut self, batch: &StorageBatch) {
        for (pallet, item, write) in batch.iter() {
            match write {
                StorageWrite::Value(value) => self.put(pallet, item, Vec::new(), value.clone()),
                StorageWrite::Entries(entries) => {
                    for (keys, value) in entries {
                        self.put(pallet, item, keys.clone(), value.clone());
                    }
                }
            }
        }
    }

    pub fn emit(&mut self, pallet: &str, variant: &str, data: Value) {
        self.events.push(ChainEvent::new(pallet, variant, data));
    }

    /// Take the agenda slot of `block` and emit one successful
    /// `Scheduler.Dispatched` per item. Returns the dispatched items.
    pub fn dispatch_agenda(&mut self, block: u32) -> Vec<Value> {
        let Some(Value::Array(items)) = self.remove("Scheduler", "Agenda", &[json!(block)]) else {
            return Vec::new();
        };

        let mut dispatched = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            if item.is_null() {
                continue;
            }
            let id = item.get("maybeId").cloned().unwrap_or(Value::Null);
            self.emit(
                "Scheduler",
                "Dispatched",
                json!({"task": [block, index], "id": id, "result": {"ok": null}}),
            );
            dispatched.push(item);
        }
        dispatched
    }
}

fn default_hook() -> BlockHook {
    Arc::new(|state: &mut MockState, block: u32| {
        state.dispatch_agenda(block);
    })
}

/// A forked chain held in memory.
pub struct MockChain {
    endpoint: String,
    state: Mutex<MockState>,
    hook: Mutex<BlockHook>,
}

impl MockChain {
    pub fn new(endpoint: impl Into<String>, spec_name: &str, head: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Mutex::new(MockState {
                spec_name: spec_name.to_string(),
                head,
                pausable: true,
                ..MockState::default()
            }),
            hook: Mutex::new(default_hook()),
        }
    }

    pub fn set_hook(&self, hook: BlockHook) {
        *self.hook.lock().unwrap_or_else(|e| e.into_inner()) = hook;
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut *self.state())
    }

    /// Register call data the client can decode.
    pub fn register_call(&self, call: &Bytes, decoded: DecodedCall) {
        self.state().calls.insert(call.to_hex(), decoded);
    }
}

#[async_trait]
impl Fork for MockChain {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn head_number(&self) -> Result<u32> {
        Ok(self.state().head)
    }

    async fn new_block(&self) -> Result<()> {
        let hook = self.hook.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut state = self.state();
        if state.torn_down {
            return Err(SimulationError::Fork(format!("{} was torn down", self.endpoint)));
        }
        if state.stalled {
            return Ok(());
        }
        state.head += 1;
        state.blocks_built += 1;
        state.events.clear();
        let head = state.head;
        hook(&mut *state, head);
        Ok(())
    }

    async fn set_storage(&self, batch: &StorageBatch) -> Result<()> {
        let mut state = self.state();
        state.apply(batch);
        state.writes.push(batch.clone());
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut state = self.state();
        if !state.pausable {
            return Err(SimulationError::Unsupported("mock fork cannot pause".to_string()));
        }
        state.paused = true;
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        self.state().torn_down = true;
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn spec_name(&self) -> Result<String> {
        Ok(self.state().spec_name.clone())
    }

    async fn storage(&self, pallet: &str, item: &str, keys: &[Value]) -> Result<Option<Value>> {
        Ok(self.state().get(pallet, item, keys).cloned())
    }

    async fn storage_entries(&self, pallet: &str, item: &str) -> Result<Vec<StorageEntry>> {
        Ok(self.state().entries(pallet, item))
    }

    async fn constant(&self, pallet: &str, name: &str) -> Result<Value> {
        self.state()
            .constants
            .get(&(pallet.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SimulationError::NotFound(format!("constant {}.{}", pallet, name)))
    }

    async fn decode_call(&self, call: &Bytes) -> Result<DecodedCall> {
        let hex = call.to_hex();
        self.state()
            .calls
            .get(&hex)
            .cloned()
            .ok_or_else(|| SimulationError::call_decode(&hex, "unknown call index"))
    }

    async fn events(&self) -> Result<Vec<ChainEvent>> {
        Ok(self.state().events.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state().disconnects += 1;
        Ok(())
    }
}

/// Hands out registered `MockChain`s as forks and clients.
#[derive(Default)]
pub struct MockEngine {
    chains: Mutex<BTreeMap<String, Arc<MockChain>>>,
    setups: Mutex<Vec<ForkConfig>>,
    networks: Mutex<Vec<BTreeMap<String, ForkConfig>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chain under its endpoint.
    pub fn register(&self, chain: Arc<MockChain>) -> Arc<MockChain> {
        self.chains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(chain.endpoint().to_string(), chain.clone());
        chain
    }

    pub fn chain(&self, endpoint: &str) -> Result<Arc<MockChain>> {
        self.chains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .cloned()
            .ok_or_else(|| SimulationError::Fork(format!("no mock chain at {}", endpoint)))
    }

    /// Every single-fork setup, in order.
    pub fn setups(&self) -> Vec<ForkConfig> {
        self.setups.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every network setup, in order.
    pub fn networks(&self) -> Vec<BTreeMap<String, ForkConfig>> {
        self.networks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn fork_chain(&self, config: &ForkConfig) -> Result<Arc<MockChain>> {
        let chain = self.chain(&config.endpoint)?;
        chain.with_state(|state| {
            if let Some(block) = config.block {
                state.head = block;
            }
            if let Some(batch) = &config.import_storage {
                state.apply(batch);
            }
        });
        Ok(chain)
    }
}

#[async_trait]
impl ForkEngine for MockEngine {
    async fn setup(&self, config: &ForkConfig) -> Result<Arc<dyn Fork>> {
        let chain = self.fork_chain(config)?;
        self.setups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(config.clone());
        Ok(chain)
    }

    async fn setup_network(
        &self,
        configs: &BTreeMap<String, ForkConfig>,
    ) -> Result<BTreeMap<String, Arc<dyn Fork>>> {
        let mut forks = BTreeMap::new();
        for (key, config) in configs {
            let fork: Arc<dyn Fork> = self.fork_chain(config)?;
            forks.insert(key.clone(), fork);
        }
        self.networks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(configs.clone());
        Ok(forks)
    }
}

#[async_trait]
impl ChainConnector for MockEngine {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainClient>> {
        let chain: Arc<dyn ChainClient> = self.chain(endpoint)?;
        Ok(chain)
    }
}
