//! Referendum records, tracks, creation and state forcing

pub mod create;
pub mod forcer;
pub mod tracks;
pub mod types;

pub use create::create_referendum;
pub use forcer::{ForceOutcome, ReferendumStateForcer, SchedulingBlocks};
pub use tracks::{find_track, track_name, tracks_for, Track};
pub use types::{
    parse_balance, Deciding, Domain, OngoingReferendum, ReferendumRecord, ReferendumStatus, Tally,
};
