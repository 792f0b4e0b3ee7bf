//! Shared fixtures: mock chains whose block hook behaves like the referenda
//! and scheduler pallets closely enough for a full force/execute cycle.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;

use referenda_tester::chain::{Bytes, DecodedCall};
use referenda_tester::config::{ChainEndpoint, RunnerConfig};
use referenda_tester::fork::mock::BlockHook;
use referenda_tester::fork::{Fork, ForkSession, MockChain, MockState, PollingConfig};
use referenda_tester::format::Proposal;
use referenda_tester::topology::ChainDescriptor;

pub const TOTAL_ISSUANCE: u128 = 15_000_000_000_000_000_000;

/// Distance between a referendum's submission and its original alarm.
pub const ALARM_DELAY: u32 = 1_000;

pub fn proposal_hash() -> Bytes {
    Bytes::new([0xab, 0xc0].repeat(16))
}

pub fn lookup_proposal() -> Value {
    json!({"type": "Lookup", "value": {"hash": proposal_hash().to_hex(), "len": 42}})
}

pub fn nudge_call(id: u32) -> Bytes {
    let mut call = vec![0x15, 0x03];
    call.extend_from_slice(&id.to_le_bytes());
    Bytes::new(call)
}

fn task_id(tag: u8, id: u32) -> String {
    let mut raw = vec![tag; 28];
    raw.extend_from_slice(&id.to_le_bytes());
    Bytes::new(raw).to_hex()
}

pub fn fast_polling() -> PollingConfig {
    PollingConfig {
        interval: std::time::Duration::from_millis(1),
        head_attempts: 5,
        ready_attempts: 5,
    }
}

pub fn fast_runner() -> RunnerConfig {
    RunnerConfig {
        poll_interval_ms: 1,
        head_attempts: 5,
        ready_attempts: 5,
        ..RunnerConfig::default()
    }
}

/// An ongoing record as the chain client returns it.
pub fn ongoing_record(track: u16, proposal: Value, submitted: u32, fellowship: bool) -> Value {
    let tally = if fellowship {
        json!({"bareAyes": 1, "ayes": 3, "nays": 0})
    } else {
        json!({"ayes": "1,000", "nays": "0", "support": "1,000"})
    };
    json!({
        "type": "Ongoing",
        "value": {
            "track": track,
            "origin": {"type": "System", "value": {"type": "Root"}},
            "proposal": proposal,
            "enactment": {"type": "After", "value": 100},
            "submitted": submitted,
            "submissionDeposit": {"who": "0x01", "amount": "1,000"},
            "decisionDeposit": null,
            "deciding": null,
            "tally": tally,
            "inQueue": false,
            "alarm": null,
        }
    })
}

/// A governance chain with total issuance set and the referenda hook
/// installed. `relay_block` turns it into a parachain driven by relay numbers.
pub fn governance_chain(endpoint: &str, spec_name: &str, head: u32, relay_block: Option<u32>) -> Arc<MockChain> {
    let chain = Arc::new(MockChain::new(endpoint, spec_name, head));
    chain.with_state(|state| {
        state.put(
            "Balances",
            "TotalIssuance",
            Vec::new(),
            json!(TOTAL_ISSUANCE.to_string()),
        );
        if let Some(relay) = relay_block {
            state.put("ParachainSystem", "LastRelayChainBlockNumber", Vec::new(), json!(relay));
        }
    });
    chain.set_hook(referenda_hook(relay_block.is_some()));
    chain
}

pub fn fellowship_chain(endpoint: &str, spec_name: &str, head: u32) -> Arc<MockChain> {
    let chain = Arc::new(MockChain::new(endpoint, spec_name, head));
    chain.set_hook(referenda_hook(false));
    chain
}

/// Store an ongoing referendum and schedule its alarm nudge, preceded by an
/// unrelated task in the same agenda slot.
pub fn add_referendum(chain: &MockChain, pallet: &str, id: u32, track: u16, proposal: Value) {
    let fellowship = pallet.starts_with("Fellowship");
    chain.with_state(|state| {
        let now = state
            .get("ParachainSystem", "LastRelayChainBlockNumber", &[])
            .and_then(Value::as_u64)
            .map_or(state.head, |relay| relay as u32);
        let alarm = now + ALARM_DELAY;
        state.put(
            pallet,
            "ReferendumInfoFor",
            vec![json!(id)],
            ongoing_record(track, proposal, state.head.saturating_sub(10), fellowship),
        );
        schedule_nudge(state, pallet, id, alarm);
    });
}

pub fn schedule_nudge(state: &mut MockState, pallet: &str, id: u32, block: u32) {
    let nudge = nudge_call(id);
    state.calls.insert(
        nudge.to_hex(),
        DecodedCall {
            pallet: pallet.to_string(),
            method: "nudge_referendum".to_string(),
            args: json!({"index": id}),
        },
    );
    let alias = task_id(0xaa, id);
    state.put(
        "Scheduler",
        "Agenda",
        vec![json!(block)],
        json!([
            {
                "maybeId": null,
                "priority": 127,
                "call": {"type": "Inline", "value": "0x0000"},
                "maybePeriodic": null,
                "origin": {"type": "System", "value": {"type": "Root"}},
            },
            {
                "maybeId": alias,
                "priority": 128,
                "call": {"type": "Inline", "value": nudge.to_hex()},
                "maybePeriodic": null,
                "origin": {"type": "System", "value": {"type": "Root"}},
            },
        ]),
    );
    state.put("Scheduler", "Lookup", vec![json!(alias)], json!([block, 1]));
}

/// Make every dispatch of `call` (inline hex or preimage hash) fail.
pub fn fail_dispatch(chain: &MockChain, call: &str, error: &str) {
    chain.with_state(|state| {
        state.put("Test", "Failing", vec![json!(call.to_lowercase())], json!(error))
    });
}

pub fn session(key: &str, chain: &Arc<MockChain>) -> ForkSession {
    let spec_name = chain.state().spec_name.clone();
    let descriptor =
        ChainDescriptor::from_spec_name(&ChainEndpoint::new(chain.endpoint()), &spec_name);
    ForkSession::new(key, descriptor, chain.clone(), chain.clone(), fast_polling())
}

/// Dispatches every agenda slot that is due, the way the scheduler services
/// `incomplete_since..=now`. Calls into either referenda pallet are executed.
pub fn referenda_hook(relay_numbering: bool) -> BlockHook {
    Arc::new(move |state: &mut MockState, head: u32| {
        let now = if relay_numbering {
            let last = state
                .get("ParachainSystem", "LastRelayChainBlockNumber", &[])
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32;
            state.put("ParachainSystem", "LastRelayChainBlockNumber", Vec::new(), json!(last + 1));
            last + 1
        } else {
            head
        };

        let mut due: Vec<u32> = state
            .entries("Scheduler", "Agenda")
            .iter()
            .filter_map(|entry| entry.keys.first().and_then(Value::as_u64))
            .map(|block| block as u32)
            .filter(|block| *block <= now)
            .collect();
        due.sort_unstable();

        for block in due {
            let Some(Value::Array(items)) = state.remove("Scheduler", "Agenda", &[json!(block)]) else {
                continue;
            };
            for (index, item) in items.into_iter().enumerate() {
                if item.is_null() {
                    continue;
                }
                let result = dispatch_item(state, now, &item);
                let id = item.get("maybeId").cloned().unwrap_or(Value::Null);
                state.emit(
                    "Scheduler",
                    "Dispatched",
                    json!({"task": [block, index], "id": id, "result": result}),
                );
            }
        }
    })
}

fn ok() -> Value {
    json!({"ok": null})
}

fn err(error: &str) -> Value {
    json!({"err": {"module": {"index": 0, "error": error}}})
}

fn dispatch_item(state: &mut MockState, now: u32, item: &Value) -> Value {
    let proposal = Proposal::parse(item.get("call").unwrap_or(&Value::Null));
    let marker = match &proposal {
        Proposal::Inline(call) => Some(call.to_hex()),
        Proposal::Lookup { hash, .. } | Proposal::Legacy { hash } => Some(hash.to_hex()),
        Proposal::Unknown(_) => None,
    };
    if let Some(error) = marker
        .as_ref()
        .and_then(|m| state.get("Test", "Failing", &[json!(m)]))
        .and_then(Value::as_str)
    {
        return err(error);
    }

    let call = match &proposal {
        Proposal::Inline(call) => Some(call.clone()),
        Proposal::Lookup { hash, len } => state
            .get("Preimage", "PreimageFor", &[json!([hash.to_hex(), len])])
            .and_then(Bytes::from_value),
        _ => None,
    };
    let Some(decoded) = call.and_then(|c| state.calls.get(&c.to_hex()).cloned()) else {
        return ok();
    };
    if !decoded.pallet.ends_with("Referenda") {
        return ok();
    }
    let pallet = decoded.pallet.as_str();

    match decoded.method.as_str() {
        "nudge_referendum" => {
            let index = decoded.args["index"].as_u64().unwrap_or(u64::MAX) as u32;
            nudge(state, pallet, now, index)
        }
        "submit" => {
            let signed = item
                .get("origin")
                .and_then(|o| o.get("system"))
                .and_then(|s| s.get("signed"))
                .is_some();
            if !signed {
                return err("BadOrigin");
            }
            submit(state, pallet, now, &decoded.args)
        }
        _ => ok(),
    }
}

fn nudge(state: &mut MockState, pallet: &str, now: u32, index: u32) -> Value {
    let Some(record) = state.get(pallet, "ReferendumInfoFor", &[json!(index)]).cloned() else {
        return err("NotOngoing");
    };
    let Some(ongoing) = record.get("ongoing") else {
        return ok();
    };
    let confirmed = ongoing
        .get("deciding")
        .and_then(|d| d.get("confirming"))
        .map_or(false, |c| !c.is_null());
    if !confirmed {
        return ok();
    }

    state.put(
        pallet,
        "ReferendumInfoFor",
        vec![json!(index)],
        json!({"approved": [now, null, null]}),
    );
    state.emit(pallet, "Confirmed", json!({"index": index}));
    state.emit(pallet, "Approved", json!({"index": index}));

    let enactment = task_id(0xee, index);
    state.put(
        "Scheduler",
        "Agenda",
        vec![json!(now + 1)],
        json!([{
            "maybeId": enactment,
            "priority": 63,
            "call": ongoing["proposal"],
            "maybePeriodic": null,
            "origin": ongoing["origin"],
        }]),
    );
    state.put("Scheduler", "Lookup", vec![json!(enactment)], json!([now + 1, 0]));
    ok()
}

fn submit(state: &mut MockState, pallet: &str, now: u32, args: &Value) -> Value {
    let id = state
        .get(pallet, "ReferendumCount", &[])
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let record = ongoing_record(
        args["track"].as_u64().unwrap_or(0) as u16,
        args["proposal"].clone(),
        now,
        pallet.starts_with("Fellowship"),
    );
    state.put(pallet, "ReferendumInfoFor", vec![json!(id)], record);
    state.put(pallet, "ReferendumCount", Vec::new(), json!(id + 1));
    state.emit(pallet, "Submitted", json!({"index": id}));
    schedule_nudge(state, pallet, id, now + ALARM_DELAY);
    ok()
}
