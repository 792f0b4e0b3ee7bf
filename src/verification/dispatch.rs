//! Dispatch result interpretation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::format::types::variant_parts;

/// Outcome of one scheduled dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    Success,
    /// Carries a non-empty description of the failure.
    Failure(String),
    Unknown,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DispatchOutcome::Failure(_))
    }

    fn failure(error: Option<&Value>) -> Self {
        DispatchOutcome::Failure(describe_error(error))
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Success => f.write_str("success"),
            DispatchOutcome::Failure(message) => write!(f, "failure: {}", message),
            DispatchOutcome::Unknown => f.write_str("unknown"),
        }
    }
}

/// Map every shape a `Scheduler.Dispatched` result can arrive in to one
/// outcome. Checked in order: booleans, strings, `{success}`, `{isOk, asErr}`,
/// `{isErr}`, `{ok}`/`{err}` in any case, `{type, value}`.
pub fn interpret_dispatch_result(result: &Value) -> DispatchOutcome {
    match result {
        Value::Bool(true) => DispatchOutcome::Success,
        Value::Bool(false) => DispatchOutcome::failure(None),
        Value::String(s) => interpret_string(s),
        Value::Object(fields) => {
            if let Some(success) = fields.get("success").and_then(Value::as_bool) {
                return if success {
                    DispatchOutcome::Success
                } else {
                    DispatchOutcome::failure(fields.get("value").or_else(|| fields.get("error")))
                };
            }

            if let Some(is_ok) = fields.get("isOk").and_then(Value::as_bool) {
                return if is_ok {
                    DispatchOutcome::Success
                } else {
                    DispatchOutcome::failure(fields.get("asErr"))
                };
            }

            if fields.get("isErr").and_then(Value::as_bool) == Some(true) {
                return DispatchOutcome::failure(fields.get("asErr"));
            }

            if let Some((kind, inner)) = variant_parts(result) {
                return match kind.to_ascii_lowercase().as_str() {
                    "ok" => DispatchOutcome::Success,
                    "err" => DispatchOutcome::failure(Some(inner)),
                    _ => DispatchOutcome::Unknown,
                };
            }

            DispatchOutcome::Unknown
        }
        _ => DispatchOutcome::Unknown,
    }
}

fn interpret_string(s: &str) -> DispatchOutcome {
    match s.trim().to_ascii_lowercase().as_str() {
        "ok" | "success" | "true" => DispatchOutcome::Success,
        "err" | "error" | "failed" | "failure" | "false" => {
            DispatchOutcome::Failure(format!("dispatch returned {}", s.trim()))
        }
        _ => DispatchOutcome::Unknown,
    }
}

fn describe_error(error: Option<&Value>) -> String {
    match error {
        None | Some(Value::Null) => "dispatch failed".to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => "dispatch failed".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => match variant_parts(other) {
            Some((kind, inner)) if inner.is_null() => kind.to_string(),
            _ => other.to_string(),
        },
    }
}
