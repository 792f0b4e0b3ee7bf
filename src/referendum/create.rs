//! Referendum creation on a fork
//!
//! Notes the preimage (if any) and submits the referendum as the funded test
//! account through the scheduler, then confirms the new record exists.

use serde_json::Value;
use tracing::info;

use super::forcer::ReferendumStateForcer;
use super::types::Domain;
use crate::chain::rpc::parse_block_number;
use crate::chain::Bytes;
use crate::error::{Result, SimulationError};
use crate::fork::ForkSession;
use crate::format::Origin;
use crate::scheduler::dispatch_as;
use crate::verification::ExecutionReport;

/// Create a referendum and return its id.
///
/// The id is the pallet's `ReferendumCount` read before submission.
pub async fn create_referendum(
    session: &ForkSession,
    domain: Domain,
    submit_call: &Bytes,
    preimage_call: Option<&Bytes>,
    submitter: &str,
) -> Result<u32> {
    let origin = Origin::signed(submitter);

    if let Some(preimage_call) = preimage_call {
        info!(
            "[{}] noting {} byte preimage for new {} referendum",
            session.key(),
            preimage_call.len(),
            domain
        );
        let report = dispatch_as(session, domain, preimage_call, &origin).await?;
        ensure_dispatched(&report, "preimage note")?;
    }

    let pallet = domain.referenda_pallet();
    let id = match session.client().storage(pallet, "ReferendumCount", &[]).await? {
        Some(count) => count_value(&count)?,
        None => 0,
    };

    info!("[{}] submitting {} referendum #{}", session.key(), domain, id);
    let report = dispatch_as(session, domain, submit_call, &origin).await?;
    ensure_dispatched(&report, "referendum submission")?;

    ReferendumStateForcer::read_referendum(session, id, domain).await?;
    info!("[{}] created {} referendum #{}", session.key(), domain, id);
    Ok(id)
}

fn count_value(value: &Value) -> Result<u32> {
    parse_block_number(value)
        .map_err(|_| SimulationError::Decode(format!("ReferendumCount: {}", value)))
}

fn ensure_dispatched(report: &ExecutionReport, what: &str) -> Result<()> {
    if report.execution_succeeded {
        Ok(())
    } else {
        Err(SimulationError::InvalidState(format!(
            "{} failed: {}",
            what,
            report.errors.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainEvent;
    use serde_json::json;

    #[test]
    fn test_failed_report_is_invalid_state() {
        let report = ExecutionReport {
            execution_succeeded: false,
            dispatches: Vec::new(),
            errors: vec!["BadOrigin".to_string()],
            events: vec![ChainEvent::new("System", "ExtrinsicFailed", json!({}))],
        };
        let err = ensure_dispatched(&report, "referendum submission").unwrap_err();
        assert!(matches!(err, SimulationError::InvalidState(msg) if msg.contains("BadOrigin")));
    }

    #[test]
    fn test_count_accepts_formatted_numbers() {
        assert_eq!(count_value(&json!("1,841")).unwrap(), 1841);
        assert!(count_value(&json!({"x": 1})).is_err());
    }
}
