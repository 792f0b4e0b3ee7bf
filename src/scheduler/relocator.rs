//! Scheduler call relocation
//!
//! Finds the calls the runtime itself scheduled for a referendum and moves
//! their whole agenda slot to the next block.

use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info, warn};

use crate::chain::rpc::parse_block_number;
use crate::chain::{Bytes, DecodedCall, StorageEntry};
use crate::error::{Result, SimulationError};
use crate::fork::{ForkSession, StorageBatch};
use crate::format::{convert_agenda, Proposal};
use crate::referendum::{Domain, ReferendumStateForcer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledCallType {
    /// The referenda pallet's `nudge_referendum` alarm.
    Nudge,
    /// The enactment of the approved proposal.
    Execute,
}

impl fmt::Display for ScheduledCallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduledCallType::Nudge => f.write_str("nudge"),
            ScheduledCallType::Execute => f.write_str("execute"),
        }
    }
}

/// A matched agenda item.
#[derive(Debug, Clone, PartialEq)]
pub struct AgendaMatch {
    pub block: u32,
    pub index: usize,
    /// The whole slot the item was found in.
    pub slot: Value,
}

pub struct SchedulerRelocator;

impl SchedulerRelocator {
    /// Move the slot holding the referendum's `call_type` call to the next
    /// scheduling block and return that block. The batch is written but not
    /// committed; the next block built dispatches it.
    pub async fn move_scheduled_call(
        session: &ForkSession,
        referendum_id: u32,
        domain: Domain,
        call_type: ScheduledCallType,
        proposal_hash: Option<&Bytes>,
    ) -> Result<u32> {
        let found = Self::find_scheduled_call(session, referendum_id, domain, call_type, proposal_hash)
            .await?
            .ok_or_else(|| SimulationError::scheduled_call_not_found(referendum_id, call_type))?;

        let blocks = ReferendumStateForcer::get_scheduling_blocks(session, domain).await?;
        let target = blocks.target;

        info!(
            "[{}] moving {} call of referendum #{} from #{} (item {}) to #{}",
            session.key(),
            call_type,
            referendum_id,
            found.block,
            found.index,
            target
        );

        let batch = Self::relocation_batch(session, &found, target).await?;
        session.write(&batch).await?;
        Ok(target)
    }

    /// Scan every agenda slot, lowest block first, for the first matching item.
    pub async fn find_scheduled_call(
        session: &ForkSession,
        referendum_id: u32,
        domain: Domain,
        call_type: ScheduledCallType,
        proposal_hash: Option<&Bytes>,
    ) -> Result<Option<AgendaMatch>> {
        let mut slots: Vec<(u32, StorageEntry)> = session
            .client()
            .storage_entries("Scheduler", "Agenda")
            .await?
            .into_iter()
            .filter_map(|entry| {
                let block = entry.keys.first().and_then(|k| parse_block_number(k).ok())?;
                Some((block, entry))
            })
            .collect();
        slots.sort_by_key(|(block, _)| *block);

        for (block, entry) in slots {
            let Value::Array(items) = &entry.value else {
                continue;
            };
            for (index, item) in items.iter().enumerate() {
                let Some(call) = item.get("call") else {
                    continue;
                };
                let matched = match call_type {
                    ScheduledCallType::Nudge => {
                        Self::is_nudge(session, call, referendum_id, domain).await
                    }
                    ScheduledCallType::Execute => Self::is_execute(call, proposal_hash),
                };
                if matched {
                    return Ok(Some(AgendaMatch {
                        block,
                        index,
                        slot: entry.value.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Null the source slot, write the converted slot at `target`, and point
    /// the lookup alias of every named task in the slot at its new address.
    async fn relocation_batch(
        session: &ForkSession,
        found: &AgendaMatch,
        target: u32,
    ) -> Result<StorageBatch> {
        let converted = convert_agenda(&found.slot);

        if found.block != target {
            if let Some(existing) = session
                .client()
                .storage("Scheduler", "Agenda", &[json!(target)])
                .await?
            {
                let occupied = existing
                    .as_array()
                    .map(|items| items.iter().any(|i| !i.is_null()))
                    .unwrap_or(false);
                if occupied {
                    warn!(
                        "[{}] agenda slot #{} is not empty and will be replaced",
                        session.key(),
                        target
                    );
                }
            }
        }

        let mut batch = StorageBatch::new();
        if found.block != target {
            batch.remove_entry("Scheduler", "Agenda", vec![json!(found.block)]);
        }
        batch.set_entry("Scheduler", "Agenda", vec![json!(target)], converted.clone());

        if let Value::Array(items) = &converted {
            for (index, item) in items.iter().enumerate() {
                let Some(id) = item.get("maybeId").filter(|id| !id.is_null()) else {
                    continue;
                };
                debug!("[{}] relocating task alias {} to ({}, {})", session.key(), id, target, index);
                batch.set_entry("Scheduler", "Lookup", vec![id.clone()], json!([target, index]));
            }
        }

        Ok(batch)
    }

    async fn is_nudge(session: &ForkSession, call: &Value, referendum_id: u32, domain: Domain) -> bool {
        match Proposal::parse(call) {
            Proposal::Inline(bytes) => match session.client().decode_call(&bytes).await {
                Ok(decoded) => is_nudge_call(&decoded, referendum_id, domain),
                Err(e) => {
                    warn!("[{}] skipping undecodable agenda call: {}", session.key(), e);
                    false
                }
            },
            Proposal::Unknown(raw) => {
                let matched = structural_nudge(&raw, referendum_id, domain);
                if matched {
                    warn!(
                        "[{}] matched nudge for referendum #{} by call structure, not by decoding",
                        session.key(),
                        referendum_id
                    );
                }
                matched
            }
            _ => false,
        }
    }

    fn is_execute(call: &Value, proposal_hash: Option<&Bytes>) -> bool {
        match (Proposal::parse(call), proposal_hash) {
            (Proposal::Lookup { hash, .. }, Some(expected))
            | (Proposal::Legacy { hash }, Some(expected)) => hash == *expected,
            (Proposal::Inline(_), None) => true,
            (Proposal::Inline(bytes), Some(expected)) => {
                bytes.to_hex().eq_ignore_ascii_case(&expected.to_hex())
            }
            _ => false,
        }
    }
}

/// Pallet and method names compared without case or underscores.
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_nudge_call(call: &DecodedCall, referendum_id: u32, domain: Domain) -> bool {
    normalize_name(&call.pallet) == normalize_name(domain.referenda_pallet())
        && normalize_name(&call.method) == "nudgereferendum"
        && call_index(&call.args) == Some(referendum_id)
}

fn call_index(args: &Value) -> Option<u32> {
    let index = args.get("index").or_else(|| args.get(0))?;
    parse_block_number(index).ok()
}

/// Recognise a nudge given as an already decoded call object:
/// `{section, method, args}` / `{pallet, call, args}` or the nested
/// `{Pallet: {nudge_referendum: {index}}}` form.
fn structural_nudge(raw: &Value, referendum_id: u32, domain: Domain) -> bool {
    let flat = ["section", "pallet"]
        .iter()
        .find_map(|k| raw.get(*k).and_then(Value::as_str))
        .zip(["method", "call"].iter().find_map(|k| raw.get(*k).and_then(Value::as_str)));
    if let Some((pallet, method)) = flat {
        let decoded = DecodedCall {
            pallet: pallet.to_string(),
            method: method.to_string(),
            args: raw.get("args").cloned().unwrap_or(Value::Null),
        };
        return is_nudge_call(&decoded, referendum_id, domain);
    }

    let Some(obj) = raw.as_object().filter(|o| o.len() == 1) else {
        return false;
    };
    let Some((pallet, inner)) = obj.iter().next() else {
        return false;
    };
    let Some(inner) = inner.as_object().filter(|o| o.len() == 1) else {
        return false;
    };
    inner.iter().any(|(method, args)| {
        let decoded = DecodedCall {
            pallet: pallet.clone(),
            method: method.clone(),
            args: args.clone(),
        };
        is_nudge_call(&decoded, referendum_id, domain)
    })
}
