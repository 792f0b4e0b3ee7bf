use thiserror::Error;

impl From<serde_json::Error> for SimulationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(format!("JSON serialization error: {}", err))
    }
}

impl From<serde_yaml::Error> for SimulationError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(format!("YAML serialization error: {}", err))
    }
}

impl From<reqwest::Error> for SimulationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Rpc(format!("HTTP transport error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Scheduled {call_type} call not found for referendum #{referendum_id}")]
    ScheduledCallNotFound {
        referendum_id: u32,
        call_type: String,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Fork engine error: {0}")]
    Fork(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, SimulationError>;

impl SimulationError {
    pub fn referendum_not_found(id: u32, pallet: &str) -> Self {
        Self::NotFound(format!("Referendum #{} not found in {}", id, pallet))
    }

    pub fn invalid_referendum_status(id: u32, status: &str) -> Self {
        Self::InvalidState(format!(
            "Referendum #{} is {} and cannot be forced to pass",
            id, status
        ))
    }

    /// Call data that fails to decode is most often built for another runtime.
    pub fn call_decode(hex: &str, reason: impl std::fmt::Display) -> Self {
        let preview: String = hex.chars().take(24).collect();
        Self::Decode(format!(
            "Failed to decode call {}...: {}. The call data may target a different runtime version",
            preview, reason
        ))
    }

    pub fn block_overflow(block: u32) -> Self {
        Self::InvalidState(format!("block #{} has no successor", block))
    }

    /// Errors that leave the fork itself unusable for further blocks.
    pub fn is_fork_failure(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Fork(_) | Self::Rpc(_))
    }

    pub fn scheduled_call_not_found(referendum_id: u32, call_type: impl ToString) -> Self {
        Self::ScheduledCallNotFound {
            referendum_id,
            call_type: call_type.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_hints_runtime_version() {
        let err = SimulationError::call_decode("0x0000ffffffffffffffffffffffffffff", "bad index");
        let msg = err.to_string();
        assert!(msg.contains("different runtime version"));
        assert!(msg.contains("bad index"));
    }

    #[test]
    fn test_decode_preview_respects_char_boundaries() {
        let err = SimulationError::call_decode(&"€".repeat(20), "not hex");
        assert!(err.to_string().contains(&"€".repeat(20)));

        let err = SimulationError::call_decode(&"€".repeat(30), "not hex");
        assert!(err.to_string().contains(&format!("{}...", "€".repeat(24))));
    }

    #[test]
    fn test_scheduled_call_not_found_message() {
        let err = SimulationError::scheduled_call_not_found(42, "nudge");
        assert_eq!(
            err.to_string(),
            "Scheduled nudge call not found for referendum #42"
        );
    }
}
