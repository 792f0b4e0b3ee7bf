//! Simulation results

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::state::CoordinatorState;
use crate::chain::ChainEvent;
use crate::referendum::Domain;
use crate::topology::Network;

/// Result of simulating one referendum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub domain: Domain,
    pub referendum_id: Option<u32>,
    pub track: Option<String>,
    pub network: Network,
    /// Network key of the fork the referendum ran on.
    pub chain_key: String,
    pub success: bool,
    pub execution_succeeded: bool,
    pub executed_block: Option<u32>,
    pub events: Vec<ChainEvent>,
    pub errors: Option<Vec<String>>,
    pub note: Option<String>,
}

impl SimulationOutcome {
    pub(crate) fn new(domain: Domain, network: Network, chain_key: &str) -> Self {
        Self {
            domain,
            referendum_id: None,
            track: None,
            network,
            chain_key: chain_key.to_string(),
            success: false,
            execution_succeeded: false,
            executed_block: None,
            events: Vec::new(),
            errors: None,
            note: None,
        }
    }

    pub(crate) fn failed(mut self, errors: Vec<String>) -> Self {
        self.success = false;
        self.execution_succeeded = false;
        self.errors = Some(errors);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<SimulationOutcome>,
    /// Events surfaced on each additional chain, by network key.
    pub additional_events: BTreeMap<String, Vec<ChainEvent>>,
    pub final_state: CoordinatorState,
}

impl SimulationRun {
    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.success)
    }
}
