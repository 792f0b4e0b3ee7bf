pub mod chain;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fork;
pub mod format;
pub mod referendum;
pub mod scheduler;
pub mod topology;
pub mod verification;

pub use coordinator::{NetworkCoordinator, SimulationOutcome, SimulationRun};
pub use error::{Result, SimulationError};
