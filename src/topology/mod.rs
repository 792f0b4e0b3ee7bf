//! Multi-chain fork topology

pub mod builder;
pub mod injection;
pub mod types;

pub use builder::ChainTopologyBuilder;
pub use injection::{asset_hub_migration_done, fellowship_registration, funded_account, ALICE};
pub use types::{
    ChainDescriptor, ChainKind, ChainRole, Network, NetworkTopology, TopologyEntry,
    GENERIC_RELAY_KEY, RELAY_NETWORK_KEYS, RELAY_SPEC_NAMES,
};
