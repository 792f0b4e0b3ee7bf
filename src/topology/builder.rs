//! Topology construction
//!
//! Turns the chains of a run into fork configurations keyed by network key.
//! Relay chains are keyed by their network name because the fork engine wires
//! relay and parachain forks by that name; parachains get their role label.

use std::collections::BTreeMap;
use tracing::{info, warn};

use super::injection::{asset_hub_migration_done, fellowship_registration, funded_account, ALICE};
use super::types::{
    ChainDescriptor, ChainRole, Network, NetworkTopology, TopologyEntry, GENERIC_RELAY_KEY,
};
use crate::config::{ChainEndpoint, ReferendumSource, RunnerConfig, SimulationPlan};
use crate::fork::{ForkConfig, StorageBatch};

pub struct ChainTopologyBuilder {
    runtime_log_level: Option<u8>,
    session_epoch: u32,
    topology: NetworkTopology,
    /// Endpoint URL to the key of the fork already serving it.
    endpoints: BTreeMap<String, String>,
}

impl ChainTopologyBuilder {
    pub fn new(runtime_log_level: Option<u8>, session_epoch: u32) -> Self {
        Self {
            runtime_log_level,
            session_epoch,
            topology: NetworkTopology::default(),
            endpoints: BTreeMap::new(),
        }
    }

    /// Every chain a plan needs, with its role.
    pub fn plan_roles(plan: &SimulationPlan) -> Vec<(ChainRole, ChainEndpoint)> {
        let mut roles = Vec::new();
        if let Some(governance) = &plan.governance {
            roles.push((ChainRole::Governance, governance.endpoint.clone()));
        }
        if let Some(fellowship) = &plan.fellowship {
            roles.push((ChainRole::Fellowship, fellowship.endpoint.clone()));
        }
        for (index, endpoint) in plan.additional_chains.iter().enumerate() {
            roles.push((ChainRole::Additional(index), endpoint.clone()));
        }
        roles
    }

    /// Build the topology of a plan from the detected descriptors, including
    /// the storage presets referendum creation needs.
    pub fn from_plan(
        plan: &SimulationPlan,
        descriptors: Vec<(ChainRole, ChainDescriptor)>,
        runner: &RunnerConfig,
    ) -> NetworkTopology {
        let mut builder = Self::new(runner.runtime_log_level, runner.session_epoch);
        for (role, descriptor) in descriptors {
            builder.add(role, descriptor);
        }

        if let Some(governance) = &plan.governance {
            if matches!(governance.source, ReferendumSource::Create { .. }) {
                builder.inject(ChainRole::Governance, funded_account(ALICE));
                let on_asset_hub = builder
                    .topology
                    .entry_for(ChainRole::Governance)
                    .map(|entry| entry.descriptor.is_asset_hub())
                    .unwrap_or(false);
                if on_asset_hub {
                    builder.inject(ChainRole::Governance, asset_hub_migration_done());
                }
            }
        }

        if let Some(fellowship) = &plan.fellowship {
            if matches!(fellowship.source, ReferendumSource::Create { .. }) {
                builder.inject(ChainRole::Fellowship, fellowship_registration(ALICE));
                builder.inject(ChainRole::Fellowship, funded_account(ALICE));
            }
        }

        builder.build()
    }

    /// Register a chain for `role` and return the key of the fork serving it.
    ///
    /// An endpoint that is already registered folds the role into the existing
    /// fork. A relay chain whose key is taken is skipped and `None` returned.
    pub fn add(&mut self, role: ChainRole, descriptor: ChainDescriptor) -> Option<String> {
        if let Some(key) = self.endpoints.get(&descriptor.endpoint).cloned() {
            info!(
                "{} shares {} with fork '{}', skipping duplicate",
                role, descriptor.endpoint, key
            );
            if let Some(entry) = self.topology.entries.get_mut(&key) {
                entry.roles.push(role);
            }
            self.topology.role_keys.insert(role, key.clone());
            return Some(key);
        }

        let key = if descriptor.is_relay() {
            relay_key(descriptor.network)
        } else {
            role.label()
        };

        if self.topology.entries.contains_key(&key) {
            warn!(
                "{} ({}) would reuse network key '{}', skipping",
                role, descriptor.endpoint, key
            );
            return None;
        }

        let mut fork_config = ForkConfig::new(descriptor.endpoint.clone());
        fork_config.block = descriptor.block.map(|block| {
            if descriptor.is_relay() {
                self.off_session_boundary(block)
            } else {
                block
            }
        });
        fork_config.runtime_log_level = self.runtime_log_level;

        info!(
            "{}: {} ({}, {:?}) as '{}'",
            role, descriptor.label, descriptor.network, descriptor.kind, key
        );

        self.endpoints.insert(descriptor.endpoint.clone(), key.clone());
        self.topology.chain_keys.insert(role.label(), key.clone());
        self.topology.role_keys.insert(role, key.clone());
        self.topology.entries.insert(
            key.clone(),
            TopologyEntry {
                key: key.clone(),
                roles: vec![role],
                descriptor,
                fork_config,
            },
        );
        Some(key)
    }

    /// Add startup storage to the fork serving `role`.
    pub fn inject(&mut self, role: ChainRole, batch: StorageBatch) {
        let Some(key) = self.topology.role_keys.get(&role) else {
            warn!("no fork serves {}, dropping storage injection", role);
            return;
        };
        if let Some(entry) = self.topology.entries.get_mut(key) {
            entry.fork_config.inject(batch);
        }
    }

    pub fn build(mut self) -> NetworkTopology {
        let governs_relay = [ChainRole::Governance, ChainRole::Fellowship]
            .iter()
            .filter_map(|role| self.topology.entry_for(*role))
            .any(|entry| entry.descriptor.is_relay());

        self.topology.wired = governs_relay && self.topology.entries.len() > 1;
        if !self.topology.wired && self.topology.entries.len() > 1 {
            info!("no governance chain is a relay chain, forking chains independently");
        }
        self.topology
    }

    fn off_session_boundary(&self, block: u32) -> u32 {
        if self.session_epoch > 0 && block > 0 && block % self.session_epoch == 0 {
            info!(
                "relay fork block #{} is on a session boundary, forking at #{}",
                block,
                block - 1
            );
            block - 1
        } else {
            block
        }
    }
}

fn relay_key(network: Network) -> String {
    match network {
        Network::Unknown => GENERIC_RELAY_KEY.to_string(),
        network => network.as_str().to_string(),
    }
}
