//! Execution verification
//!
//! Reads the events of the block a proposal was dispatched in and decides
//! whether it executed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::dispatch::{interpret_dispatch_result, DispatchOutcome};
use crate::chain::rpc::parse_block_number;
use crate::chain::ChainEvent;
use crate::error::Result;
use crate::fork::ForkSession;

/// One `Scheduler.Dispatched` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// Block component of the dispatched task address.
    pub block: Option<u32>,
    pub index: Option<u32>,
    pub outcome: DispatchOutcome,
    /// Whether the record counts towards the verdict.
    pub authoritative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub execution_succeeded: bool,
    pub dispatches: Vec<DispatchRecord>,
    pub errors: Vec<String>,
    pub events: Vec<ChainEvent>,
}

impl ExecutionReport {
    pub fn authoritative(&self) -> impl Iterator<Item = &DispatchRecord> {
        self.dispatches.iter().filter(|d| d.authoritative)
    }
}

pub struct ExecutionVerifier;

impl ExecutionVerifier {
    /// Classify the events of one block.
    ///
    /// With `expected_block` set, only dispatches of tasks scheduled at that
    /// block decide the verdict. Any `System.ExtrinsicFailed` fails it.
    pub fn check_execution_results(
        events: &[ChainEvent],
        referendum_id: u32,
        expected_block: Option<u32>,
    ) -> ExecutionReport {
        Self::check(events, referendum_id, expected_block, None)
    }

    /// Like `check_execution_results`, but only the task at `(block, index)`
    /// decides the verdict.
    pub fn check_task_result(events: &[ChainEvent], block: u32, index: u32) -> ExecutionReport {
        Self::check(events, 0, Some(block), Some(index))
    }

    fn check(
        events: &[ChainEvent],
        referendum_id: u32,
        expected_block: Option<u32>,
        expected_index: Option<u32>,
    ) -> ExecutionReport {
        let mut dispatches = Vec::new();
        let mut errors = Vec::new();
        let mut extrinsic_failures = 0;

        for event in events {
            if event.is("System", "ExtrinsicFailed") {
                let error = event
                    .data
                    .get("dispatchError")
                    .unwrap_or(&event.data);
                errors.push(format!("System.ExtrinsicFailed: {}", error));
                extrinsic_failures += 1;
            } else if event.is("Scheduler", "Scheduled") {
                debug!("Referendum #{}: Scheduler.Scheduled {}", referendum_id, event.data);
            } else if event.is("Scheduler", "Dispatched") {
                let (block, index) = task_address(event.data.get("task"));
                let outcome = interpret_dispatch_result(
                    event.data.get("result").unwrap_or(&Value::Null),
                );
                let authoritative = expected_block.map_or(true, |b| block == Some(b))
                    && expected_index.map_or(true, |i| index == Some(i));
                if !authoritative {
                    debug!(
                        "Referendum #{}: ignoring dispatch of task {:?}/{:?} ({})",
                        referendum_id, block, index, outcome
                    );
                }
                dispatches.push(DispatchRecord {
                    block,
                    index,
                    outcome,
                    authoritative,
                });
            }
        }

        let mut successes = 0;
        let mut failures = 0;
        let mut counted = 0;
        for dispatch in dispatches.iter().filter(|d| d.authoritative) {
            counted += 1;
            match &dispatch.outcome {
                DispatchOutcome::Success => successes += 1,
                DispatchOutcome::Failure(message) => {
                    failures += 1;
                    errors.push(format!(
                        "Scheduler.Dispatched failed for task {}: {}",
                        describe_task(dispatch.block, dispatch.index),
                        message
                    ));
                }
                DispatchOutcome::Unknown => warn!(
                    "Referendum #{}: dispatch of task {} has an unrecognised result",
                    referendum_id,
                    describe_task(dispatch.block, dispatch.index)
                ),
            }
        }

        if counted == 0 {
            errors.push(match expected_block {
                Some(block) => format!(
                    "No Scheduler.Dispatched event found for block {} - proposal execution did not happen",
                    block
                ),
                None => "No Scheduler.Dispatched event found - proposal execution did not happen"
                    .to_string(),
            });
        }

        let execution_succeeded = successes > 0 && failures == 0 && extrinsic_failures == 0;

        ExecutionReport {
            execution_succeeded,
            dispatches,
            errors,
            events: events.to_vec(),
        }
    }

    /// Check the events of the fork's head block.
    pub async fn verify(
        session: &ForkSession,
        referendum_id: u32,
        expected_block: Option<u32>,
    ) -> Result<ExecutionReport> {
        let events = session.client().events().await?;
        let report = Self::check_execution_results(&events, referendum_id, expected_block);
        if report.execution_succeeded {
            info!(
                "[{}] referendum #{} executed successfully",
                session.key(),
                referendum_id
            );
        } else {
            warn!(
                "[{}] referendum #{} did not execute cleanly: {}",
                session.key(),
                referendum_id,
                report.errors.join("; ")
            );
        }
        Ok(report)
    }
}

fn task_address(task: Option<&Value>) -> (Option<u32>, Option<u32>) {
    let Some(task) = task else {
        return (None, None);
    };
    let part = |i: usize| {
        task.get(i)
            .or_else(|| task.get(i.to_string()))
            .and_then(|v| parse_block_number(v).ok())
    };
    (part(0), part(1))
}

fn describe_task(block: Option<u32>, index: Option<u32>) -> String {
    match (block, index) {
        (Some(block), Some(index)) => format!("({}, {})", block, index),
        (Some(block), None) => format!("({}, ?)", block),
        _ => "(?)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatched(block: u32, result: Value) -> ChainEvent {
        ChainEvent::new(
            "Scheduler",
            "Dispatched",
            json!({"task": [block, 0], "id": null, "result": result}),
        )
    }

    #[test]
    fn test_single_success() {
        let report = ExecutionVerifier::check_execution_results(
            &[dispatched(500, json!({"ok": null}))],
            1840,
            Some(500),
        );
        assert!(report.execution_succeeded);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_non_matching_blocks_are_ignored() {
        let report = ExecutionVerifier::check_execution_results(
            &[dispatched(499, json!({"ok": null})), dispatched(501, json!(true))],
            1840,
            Some(500),
        );
        assert!(!report.execution_succeeded);
        assert_eq!(report.authoritative().count(), 0);
        assert_eq!(
            report.errors,
            vec!["No Scheduler.Dispatched event found for block 500 - proposal execution did not happen"]
        );
    }

    #[test]
    fn test_no_dispatch_without_block() {
        let report = ExecutionVerifier::check_execution_results(&[], 1, None);
        assert!(!report.execution_succeeded);
        assert!(report.errors[0].starts_with("No Scheduler.Dispatched event found -"));
    }

    #[test]
    fn test_failure_and_extrinsic_failed_fail_verdict() {
        let report = ExecutionVerifier::check_execution_results(
            &[
                dispatched(500, json!({"ok": null})),
                dispatched(500, json!({"err": "BadOrigin"})),
            ],
            7,
            Some(500),
        );
        assert!(!report.execution_succeeded);
        assert!(report.errors[0].contains("BadOrigin"));

        let report = ExecutionVerifier::check_execution_results(
            &[
                dispatched(500, json!({"ok": null})),
                ChainEvent::new("System", "ExtrinsicFailed", json!({"dispatchError": "Other"})),
            ],
            7,
            Some(500),
        );
        assert!(!report.execution_succeeded);
        assert_eq!(report.errors, vec!["System.ExtrinsicFailed: \"Other\""]);
    }

    #[test]
    fn test_task_result_ignores_sibling_items() {
        let sibling = ChainEvent::new(
            "Scheduler",
            "Dispatched",
            json!({"task": [500, 0], "result": {"err": "BadOrigin"}}),
        );
        let ours = ChainEvent::new(
            "Scheduler",
            "Dispatched",
            json!({"task": [500, 1], "result": {"ok": null}}),
        );
        let report = ExecutionVerifier::check_task_result(&[sibling, ours], 500, 1);
        assert!(report.execution_succeeded);
        assert_eq!(report.authoritative().count(), 1);
    }

    #[test]
    fn test_task_address_as_strings() {
        assert_eq!(
            task_address(Some(&json!(["1,024", "3"]))),
            (Some(1024), Some(3))
        );
        assert_eq!(task_address(Some(&json!({"0": 5, "1": 1}))), (Some(5), Some(1)));
        assert_eq!(task_address(None), (None, None));
    }
}
