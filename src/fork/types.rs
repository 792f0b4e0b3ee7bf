//! Fork configuration and storage batches

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// When the fork engine builds blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildBlockMode {
    Batch,
    Instant,
    /// Only on explicit request; every mutation is followed by one block.
    #[default]
    Manual,
}

/// Configuration for one forked chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ForkConfig {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<u32>,
    pub build_block_mode: BuildBlockMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_storage: Option<StorageBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_log_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ForkConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            block: None,
            build_block_mode: BuildBlockMode::Manual,
            import_storage: None,
            runtime_log_level: None,
            port: None,
        }
    }

    /// Add storage to inject at startup, merging with anything already set.
    pub fn inject(&mut self, batch: StorageBatch) {
        if batch.is_empty() {
            return;
        }
        match self.import_storage.as_mut() {
            Some(existing) => existing.merge(batch),
            None => self.import_storage = Some(batch),
        }
    }
}

/// Write to one storage item.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageWrite {
    Value(Value),
    /// Map entries as `(keys, value)`; a `null` value deletes the entry.
    Entries(Vec<(Vec<Value>, Value)>),
}

/// A set of storage writes applied as one unit.
///
/// Serialises to the fork engine's bulk-import shape
/// `{pallet: {item: [[keys, value], ...]}}`, or `{pallet: {item: value}}` for
/// plain storage values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageBatch {
    pallets: BTreeMap<String, BTreeMap<String, StorageWrite>>,
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, pallet: &str, item: &str, value: Value) -> &mut Self {
        self.pallets
            .entry(pallet.to_string())
            .or_default()
            .insert(item.to_string(), StorageWrite::Value(value));
        self
    }

    pub fn set_entry(&mut self, pallet: &str, item: &str, keys: Vec<Value>, value: Value) -> &mut Self {
        let items = self.pallets.entry(pallet.to_string()).or_default();
        let write = items
            .entry(item.to_string())
            .or_insert_with(|| StorageWrite::Entries(Vec::new()));
        match write {
            StorageWrite::Entries(entries) => entries.push((keys, value)),
            StorageWrite::Value(_) => *write = StorageWrite::Entries(vec![(keys, value)]),
        }
        self
    }

    pub fn remove_entry(&mut self, pallet: &str, item: &str, keys: Vec<Value>) -> &mut Self {
        self.set_entry(pallet, item, keys, Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.pallets.values().all(BTreeMap::is_empty)
    }

    pub fn entries(&self, pallet: &str, item: &str) -> Option<&[(Vec<Value>, Value)]> {
        match self.pallets.get(pallet)?.get(item)? {
            StorageWrite::Entries(entries) => Some(entries),
            StorageWrite::Value(_) => None,
        }
    }

    pub fn value(&self, pallet: &str, item: &str) -> Option<&Value> {
        match self.pallets.get(pallet)?.get(item)? {
            StorageWrite::Value(value) => Some(value),
            StorageWrite::Entries(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &StorageWrite)> {
        self.pallets.iter().flat_map(|(pallet, items)| {
            items
                .iter()
                .map(move |(item, write)| (pallet.as_str(), item.as_str(), write))
        })
    }

    /// Fold another batch into this one; later writes win for plain values.
    pub fn merge(&mut self, other: StorageBatch) {
        for (pallet, items) in other.pallets {
            for (item, write) in items {
                match write {
                    StorageWrite::Value(value) => {
                        self.set_value(&pallet, &item, value);
                    }
                    StorageWrite::Entries(entries) => {
                        for (keys, value) in entries {
                            self.set_entry(&pallet, &item, keys, value);
                        }
                    }
                }
            }
        }
    }

    pub fn to_json(&self) -> Value {
        let mut pallets = Map::new();
        for (pallet, items) in &self.pallets {
            let mut out = Map::new();
            for (item, write) in items {
                out.insert(item.clone(), write_to_json(write));
            }
            pallets.insert(pallet.clone(), Value::Object(out));
        }
        Value::Object(pallets)
    }
}

fn write_to_json(write: &StorageWrite) -> Value {
    match write {
        StorageWrite::Value(value) => value.clone(),
        StorageWrite::Entries(entries) => Value::Array(
            entries
                .iter()
                .map(|(keys, value)| Value::Array(vec![Value::Array(keys.clone()), value.clone()]))
                .collect(),
        ),
    }
}

impl Serialize for StorageBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.pallets.len()))?;
        for (pallet, items) in &self.pallets {
            let out: BTreeMap<&String, Value> = items
                .iter()
                .map(|(item, write)| (item, write_to_json(write)))
                .collect();
            map.serialize_entry(pallet, &out)?;
        }
        map.end()
    }
}
