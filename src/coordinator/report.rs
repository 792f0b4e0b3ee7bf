//! Text report of a simulation run

use std::fmt::Write;

use super::outcome::{SimulationOutcome, SimulationRun};
use crate::chain::ChainEvent;

const MAX_EVENT_DATA: usize = 120;

pub fn render(run: &SimulationRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Simulation {} ({})", run.run_id, run.started_at.to_rfc3339());

    for outcome in &run.outcomes {
        out.push('\n');
        out.push_str(&render_outcome(outcome));
    }

    for (key, events) in &run.additional_events {
        let _ = writeln!(out, "\n[{}] {} events", key, events.len());
        render_events(&mut out, events);
    }

    let passed = run.outcomes.iter().filter(|o| o.success).count();
    let elapsed = run.finished_at - run.started_at;
    let _ = writeln!(
        out,
        "\n{}/{} referenda passed in {}s ({})",
        passed,
        run.outcomes.len(),
        elapsed.num_seconds(),
        run.final_state
    );
    out
}

pub fn render_outcome(outcome: &SimulationOutcome) -> String {
    let mut out = String::new();
    let id = outcome
        .referendum_id
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "(not created)".to_string());
    let _ = writeln!(
        out,
        "{} referendum {} on {} ({})",
        outcome.domain, id, outcome.chain_key, outcome.network
    );
    if let Some(track) = &outcome.track {
        let _ = writeln!(out, "  track:    {}", track);
    }
    if let Some(block) = outcome.executed_block {
        let _ = writeln!(out, "  executed: block #{}", block);
    }
    let verdict = match (outcome.success, outcome.execution_succeeded) {
        (true, true) => "PASSED".to_string(),
        (true, false) => format!(
            "PASSED ({})",
            outcome.note.as_deref().unwrap_or("not executed")
        ),
        (false, _) => "FAILED".to_string(),
    };
    let _ = writeln!(out, "  result:   {}", verdict);

    if !outcome.events.is_empty() {
        let _ = writeln!(out, "  events:");
        render_events(&mut out, &outcome.events);
    }
    if let Some(errors) = &outcome.errors {
        let _ = writeln!(out, "  errors:");
        for error in errors {
            let _ = writeln!(out, "    - {}", error);
        }
    }
    out
}

fn render_events(out: &mut String, events: &[ChainEvent]) {
    let width = events
        .iter()
        .map(|e| e.name().len())
        .max()
        .unwrap_or(0);
    for event in events {
        let _ = writeln!(
            out,
            "    {:<width$}  {}",
            event.name(),
            compact(&event.data.to_string()),
            width = width
        );
    }
}

fn compact(data: &str) -> String {
    if data.chars().count() <= MAX_EVENT_DATA {
        return data.to_string();
    }
    let cut: String = data.chars().take(MAX_EVENT_DATA).collect();
    format!("{}...", cut)
}

/// Process exit status for a run.
pub fn exit_code(run: &SimulationRun) -> i32 {
    if run.all_succeeded() {
        0
    } else {
        1
    }
}
