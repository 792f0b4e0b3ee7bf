//! Forked chains
//!
//! The fork engine seam, the session handle passed through every simulation
//! step, and the engines shipped with the crate.

pub mod chopsticks;
pub mod engine;
pub mod mock;
pub mod session;
pub mod types;

pub use chopsticks::{ChopsticksEngine, ChopsticksFork};
pub use engine::{Fork, ForkEngine};
pub use mock::{MockChain, MockEngine, MockState};
pub use session::{ForkSession, PollingConfig};
pub use types::{BuildBlockMode, ForkConfig, StorageBatch, StorageWrite};
