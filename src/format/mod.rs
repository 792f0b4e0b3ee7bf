//! Format conversion between the chain client's representation and the fork
//! engine's storage-write representation.

pub mod convert;
pub mod types;

pub use convert::{convert_agenda, convert_call, convert_origin, convert_proposal, convert_tagged};
pub use types::{Origin, Proposal};
