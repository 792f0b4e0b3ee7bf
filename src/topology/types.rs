//! Chain descriptors and the multi-fork topology

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ChainEndpoint;
use crate::fork::ForkConfig;

/// Spec names that identify a relay chain.
pub const RELAY_SPEC_NAMES: &[&str] = &["polkadot", "kusama", "westend", "rococo", "paseo"];

/// Relay key used when a relay chain's network is not recognised.
pub const GENERIC_RELAY_KEY: &str = "relaychain";

/// Network keys the fork engine treats as relay chains when wiring forks.
pub const RELAY_NETWORK_KEYS: &[&str] =
    &["polkadot", "kusama", "westend", "rococo", "paseo", GENERIC_RELAY_KEY];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Polkadot,
    Kusama,
    Paseo,
    Westend,
    Rococo,
    Unknown,
}

impl Network {
    /// Infer the network from a runtime spec name.
    ///
    /// System parachains carry the network in their spec name
    /// (`asset-hub-kusama`, `collectives-polkadot`); the legacy Asset Hub names
    /// `statemint` and `statemine` are mapped explicitly.
    pub fn from_spec_name(spec_name: &str) -> Self {
        let name = spec_name.to_ascii_lowercase();
        if name.contains("polkadot") || name == "statemint" {
            Network::Polkadot
        } else if name.contains("kusama") || name == "statemine" {
            Network::Kusama
        } else if name.contains("paseo") {
            Network::Paseo
        } else if name.contains("westend") || name == "westmint" {
            Network::Westend
        } else if name.contains("rococo") {
            Network::Rococo
        } else {
            Network::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Polkadot => "polkadot",
            Network::Kusama => "kusama",
            Network::Paseo => "paseo",
            Network::Westend => "westend",
            Network::Rococo => "rococo",
            Network::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Relay,
    Parachain,
}

impl ChainKind {
    pub fn from_spec_name(spec_name: &str) -> Self {
        if RELAY_SPEC_NAMES.contains(&spec_name) {
            ChainKind::Relay
        } else {
            ChainKind::Parachain
        }
    }
}

/// Identity of one chain taking part in a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub endpoint: String,
    pub block: Option<u32>,
    pub network: Network,
    pub kind: ChainKind,
    pub label: String,
    pub spec_name: String,
}

impl ChainDescriptor {
    pub fn from_spec_name(endpoint: &ChainEndpoint, spec_name: &str) -> Self {
        Self {
            endpoint: endpoint.url.clone(),
            block: endpoint.block,
            network: Network::from_spec_name(spec_name),
            kind: ChainKind::from_spec_name(spec_name),
            label: spec_name.to_string(),
            spec_name: spec_name.to_string(),
        }
    }

    pub fn is_relay(&self) -> bool {
        self.kind == ChainKind::Relay
    }

    /// Asset Hub runtimes gate referendum submission behind the migration stage.
    pub fn is_asset_hub(&self) -> bool {
        self.spec_name.starts_with("asset-hub")
            || matches!(self.spec_name.as_str(), "statemint" | "statemine" | "westmint")
    }
}

/// Logical role a chain plays in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChainRole {
    Governance,
    Fellowship,
    Additional(usize),
}

impl ChainRole {
    pub fn label(&self) -> String {
        match self {
            ChainRole::Governance => "governance".to_string(),
            ChainRole::Fellowship => "fellowship".to_string(),
            ChainRole::Additional(n) => format!("additional_{}", n),
        }
    }
}

impl fmt::Display for ChainRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One fork in the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyEntry {
    pub key: String,
    pub roles: Vec<ChainRole>,
    pub descriptor: ChainDescriptor,
    pub fork_config: ForkConfig,
}

/// Every fork of a run, keyed by network key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkTopology {
    pub entries: BTreeMap<String, TopologyEntry>,
    /// Chain label to network key, one entry per fork.
    pub chain_keys: BTreeMap<String, String>,
    /// Role to network key, including roles folded into a shared fork.
    pub role_keys: BTreeMap<ChainRole, String>,
    /// Whether the fork engine should wire relay and parachain forks together.
    pub wired: bool,
}

impl NetworkTopology {
    pub fn key_for(&self, role: ChainRole) -> Option<&str> {
        self.role_keys.get(&role).map(String::as_str)
    }

    pub fn entry_for(&self, role: ChainRole) -> Option<&TopologyEntry> {
        self.key_for(role).and_then(|key| self.entries.get(key))
    }

    pub fn relay_key(&self) -> Option<&str> {
        self.entries
            .values()
            .find(|entry| entry.descriptor.is_relay())
            .map(|entry| entry.key.as_str())
    }

    pub fn fork_configs(&self) -> BTreeMap<String, ForkConfig> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.fork_config.clone()))
            .collect()
    }

    /// Distinct keys of forks that only serve additional roles.
    pub fn additional_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .values()
            .filter(|entry| {
                entry
                    .roles
                    .iter()
                    .all(|role| matches!(role, ChainRole::Additional(_)))
            })
            .map(|entry| entry.key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_detection_is_exact() {
        assert_eq!(ChainKind::from_spec_name("polkadot"), ChainKind::Relay);
        assert_eq!(ChainKind::from_spec_name("kusama"), ChainKind::Relay);
        assert_eq!(ChainKind::from_spec_name("asset-hub-polkadot"), ChainKind::Parachain);
        assert_eq!(ChainKind::from_spec_name("Polkadot"), ChainKind::Parachain);
    }

    #[test]
    fn test_network_from_parachain_spec_names() {
        assert_eq!(Network::from_spec_name("collectives-polkadot"), Network::Polkadot);
        assert_eq!(Network::from_spec_name("statemine"), Network::Kusama);
        assert_eq!(Network::from_spec_name("asset-hub-paseo"), Network::Paseo);
        assert_eq!(Network::from_spec_name("moonbeam"), Network::Unknown);
    }

    #[test]
    fn test_role_labels() {
        assert_eq!(ChainRole::Governance.label(), "governance");
        assert_eq!(ChainRole::Additional(2).label(), "additional_2");
    }
}
