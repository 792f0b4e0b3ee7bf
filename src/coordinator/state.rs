//! Coordinator states

use serde::Serialize;
use std::fmt;

use crate::referendum::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinatorState {
    Idle,
    DetectingChainTypes,
    Forking,
    WaitingReady,
    CreatingReferenda,
    FetchingReferenda,
    ForcingAndExecuting(Domain),
    PropagatingXcm,
    CollectingAdditionalChainEvents,
    Cleanup,
    /// Forks were left running for inspection.
    Paused,
}

impl CoordinatorState {
    pub fn is_final(&self) -> bool {
        matches!(self, CoordinatorState::Cleanup | CoordinatorState::Paused)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Idle => f.write_str("idle"),
            CoordinatorState::DetectingChainTypes => f.write_str("detecting chain types"),
            CoordinatorState::Forking => f.write_str("forking"),
            CoordinatorState::WaitingReady => f.write_str("waiting for forks"),
            CoordinatorState::CreatingReferenda => f.write_str("creating referenda"),
            CoordinatorState::FetchingReferenda => f.write_str("fetching referenda"),
            CoordinatorState::ForcingAndExecuting(domain) => {
                write!(f, "forcing and executing {} referendum", domain)
            }
            CoordinatorState::PropagatingXcm => f.write_str("propagating XCM"),
            CoordinatorState::CollectingAdditionalChainEvents => {
                f.write_str("collecting additional chain events")
            }
            CoordinatorState::Cleanup => f.write_str("cleanup"),
            CoordinatorState::Paused => f.write_str("paused"),
        }
    }
}
