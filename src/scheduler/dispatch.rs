//! Dispatch an arbitrary call with an arbitrary origin through the scheduler

use serde_json::{json, Value};
use tracing::info;

use crate::chain::Bytes;
use crate::error::{Result, SimulationError};
use crate::fork::{ForkSession, StorageBatch};
use crate::format::{convert_agenda, Origin};
use crate::referendum::{Domain, ReferendumStateForcer};
use crate::verification::{ExecutionReport, ExecutionVerifier};

use super::preimage::note_preimage;

/// Largest call the scheduler accepts inline.
pub const MAX_INLINE_CALL_LEN: usize = 128;

/// Schedule `call` as `origin` at the next block, build that block, and
/// verify the dispatch.
///
/// The call is decoded against the fork's runtime first, so call data built
/// for another runtime fails here with a decode error. Items already
/// scheduled at that block keep their positions; the call is appended after
/// them. Calls over the inline bound are scheduled by hash with their
/// preimage injected in the same batch.
pub async fn dispatch_as(
    session: &ForkSession,
    domain: Domain,
    call: &Bytes,
    origin: &Origin,
) -> Result<ExecutionReport> {
    let decoded = session
        .client()
        .decode_call(call)
        .await
        .map_err(|e| match e {
            SimulationError::Decode(_) => e,
            e if e.is_fork_failure() => e,
            e => SimulationError::call_decode(&call.to_hex(), e),
        })?;

    let blocks = ReferendumStateForcer::get_scheduling_blocks(session, domain).await?;
    let target = blocks.target;

    let mut items = match session
        .client()
        .storage("Scheduler", "Agenda", &[json!(target)])
        .await?
    {
        Some(existing) => match convert_agenda(&existing) {
            Value::Array(items) => items,
            _ => Vec::new(),
        },
        None => Vec::new(),
    };
    let mut batch = StorageBatch::new();
    let bounded = if call.len() > MAX_INLINE_CALL_LEN {
        let hash = note_preimage(&mut batch, call);
        json!({"lookup": {"hash": hash.to_hex(), "len": call.len()}})
    } else {
        json!({"inline": call.to_hex()})
    };

    items.push(json!({
        "maybeId": null,
        "priority": 0,
        "call": bounded,
        "maybePeriodic": null,
        "origin": origin.to_storage(),
    }));
    let index = items.len() - 1;

    info!(
        "[{}] dispatching {}.{} ({} bytes) as {} at ({}, {})",
        session.key(),
        decoded.pallet,
        decoded.method,
        call.len(),
        origin.to_storage(),
        target,
        index
    );

    batch.set_entry("Scheduler", "Agenda", vec![json!(target)], Value::Array(items));
    session.commit(&batch).await?;

    let events = session.client().events().await?;
    Ok(ExecutionVerifier::check_task_result(&events, target, index as u32))
}
