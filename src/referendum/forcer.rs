//! Referendum state forcing
//!
//! Rewrites an ongoing referendum into a state that passes at its next
//! alarm: confirmation already elapsed, overwhelming tally, immediate
//! enactment.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::types::{parse_balance, Deciding, Domain, ReferendumRecord, ReferendumStatus, Tally};
use crate::chain::rpc::parse_block_number;
use crate::error::{Result, SimulationError};
use crate::fork::{ForkSession, StorageBatch};

/// Block numbers used for anything scheduled on a fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingBlocks {
    pub current: u32,
    pub target: u32,
    /// Whether the numbers follow the relay chain rather than the fork itself.
    pub relay_numbering: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceOutcome {
    /// The passing record was written and committed in `committed_at`.
    Forced {
        committed_at: u32,
        blocks: SchedulingBlocks,
    },
    /// The referendum was already approved; nothing was written.
    AlreadyApproved,
}

pub struct ReferendumStateForcer;

impl ReferendumStateForcer {
    pub async fn read_referendum(
        session: &ForkSession,
        id: u32,
        domain: Domain,
    ) -> Result<ReferendumRecord> {
        let pallet = domain.referenda_pallet();
        let raw = session
            .client()
            .storage(pallet, "ReferendumInfoFor", &[json!(id)])
            .await?
            .ok_or_else(|| SimulationError::referendum_not_found(id, pallet))?;
        ReferendumRecord::parse(id, &raw)
    }

    /// Fellowship referenda always follow the fork's own block numbers. Main
    /// governance on a parachain is driven by relay chain blocks, which the
    /// fork exposes as `ParachainSystem.LastRelayChainBlockNumber`.
    pub async fn get_scheduling_blocks(
        session: &ForkSession,
        domain: Domain,
    ) -> Result<SchedulingBlocks> {
        let head = session.head_number().await?;
        let own = SchedulingBlocks {
            current: head,
            target: head
                .checked_add(1)
                .ok_or_else(|| SimulationError::block_overflow(head))?,
            relay_numbering: false,
        };

        if domain == Domain::Fellowship {
            return Ok(own);
        }

        let last_relay = match session
            .client()
            .storage("ParachainSystem", "LastRelayChainBlockNumber", &[])
            .await
        {
            Ok(value) => value,
            Err(e) => {
                debug!("[{}] no relay block indicator: {}", session.key(), e);
                None
            }
        };

        match last_relay.as_ref().map(parse_block_number) {
            Some(Ok(last_relay)) => Ok(SchedulingBlocks {
                current: last_relay.saturating_sub(1),
                target: last_relay,
                relay_numbering: true,
            }),
            Some(Err(e)) => {
                debug!("[{}] unreadable relay block indicator: {}", session.key(), e);
                Ok(own)
            }
            None => Ok(own),
        }
    }

    /// Build the replacement `ReferendumInfoFor` value.
    pub fn build_passing_record(
        record: &ReferendumRecord,
        domain: Domain,
        current: u32,
        total_issuance: Option<u128>,
    ) -> Result<Value> {
        let info = record.ongoing.as_ref().ok_or_else(|| {
            SimulationError::invalid_referendum_status(record.id, record.status.as_str())
        })?;

        let tally = match domain {
            Domain::Main => {
                let issuance = total_issuance.ok_or_else(|| {
                    SimulationError::NotFound("Balances.TotalIssuance".to_string())
                })?;
                Tally::passing_governance(issuance)
            }
            Domain::Fellowship => Tally::passing_fellowship(),
        };

        let confirmed_at = current.saturating_sub(1);
        let deciding = Deciding {
            since: confirmed_at,
            confirming: Some(confirmed_at),
        };
        let alarm = current
            .checked_add(1)
            .ok_or_else(|| SimulationError::block_overflow(current))?;

        let decision_deposit = if info.decision_deposit.is_null() {
            info.submission_deposit.clone()
        } else {
            info.decision_deposit.clone()
        };

        Ok(json!({
            "ongoing": {
                "track": info.track,
                "origin": info.origin.to_storage(),
                "proposal": info.proposal.to_storage(),
                "enactment": {"after": 0},
                "submitted": info.submitted,
                "submissionDeposit": info.submission_deposit,
                "decisionDeposit": decision_deposit,
                "deciding": deciding.to_storage(),
                "tally": tally.to_storage(),
                "inQueue": false,
                "alarm": [alarm, [alarm, 0]],
            }
        }))
    }

    pub async fn apply_passing_state(
        session: &ForkSession,
        id: u32,
        domain: Domain,
    ) -> Result<ForceOutcome> {
        let record = Self::read_referendum(session, id, domain).await?;

        match record.status {
            ReferendumStatus::Ongoing => {}
            ReferendumStatus::Approved => {
                warn!(
                    "[{}] {} referendum #{} is already approved, skipping to execution",
                    session.key(),
                    domain,
                    id
                );
                return Ok(ForceOutcome::AlreadyApproved);
            }
            status => {
                return Err(SimulationError::invalid_referendum_status(id, status.as_str()));
            }
        }

        let total_issuance = match domain {
            Domain::Main => {
                let raw = session
                    .client()
                    .storage("Balances", "TotalIssuance", &[])
                    .await?
                    .ok_or_else(|| SimulationError::NotFound("Balances.TotalIssuance".to_string()))?;
                Some(parse_balance(&raw).ok_or_else(|| {
                    SimulationError::Decode(format!("Balances.TotalIssuance: {}", raw))
                })?)
            }
            Domain::Fellowship => None,
        };

        let blocks = Self::get_scheduling_blocks(session, domain).await?;
        let forced = Self::build_passing_record(&record, domain, blocks.current, total_issuance)?;

        info!(
            "[{}] forcing {} referendum #{} to pass (current #{}, relay numbering: {})",
            session.key(),
            domain,
            id,
            blocks.current,
            blocks.relay_numbering
        );

        let mut batch = StorageBatch::new();
        batch.set_entry(
            domain.referenda_pallet(),
            "ReferendumInfoFor",
            vec![json!(id)],
            forced.clone(),
        );
        let committed_at = session.commit(&batch).await?;

        Self::log_verification(session, id, domain, &forced).await;

        Ok(ForceOutcome::Forced {
            committed_at,
            blocks,
        })
    }

    async fn log_verification(session: &ForkSession, id: u32, domain: Domain, forced: &Value) {
        let reread = match Self::read_referendum(session, id, domain).await {
            Ok(record) => record,
            Err(e) => {
                warn!("[{}] could not re-read referendum #{}: {}", session.key(), id, e);
                return;
            }
        };

        let expected_tally = Tally::parse(&forced["ongoing"]["tally"], domain);
        let actual_tally = reread
            .ongoing
            .as_ref()
            .and_then(|info| Tally::parse(&info.tally, domain));

        if reread.status == ReferendumStatus::Ongoing && expected_tally == actual_tally {
            info!("[{}] referendum #{} forced state verified", session.key(), id);
        } else {
            warn!(
                "[{}] referendum #{} differs after forcing: status {}, tally {:?} (expected {:?})",
                session.key(),
                id,
                reread.status,
                actual_tally,
                expected_tally
            );
        }
    }
}
