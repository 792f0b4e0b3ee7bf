//! Scheduler agenda manipulation

pub mod dispatch;
pub mod preimage;
pub mod relocator;

pub use dispatch::{dispatch_as, MAX_INLINE_CALL_LEN};
pub use preimage::{note_preimage, preimage_hash};
pub use relocator::{AgendaMatch, ScheduledCallType, SchedulerRelocator};
