//! Execution result verification

pub mod dispatch;
pub mod verifier;

pub use dispatch::{interpret_dispatch_result, DispatchOutcome};
pub use verifier::{DispatchRecord, ExecutionReport, ExecutionVerifier};
