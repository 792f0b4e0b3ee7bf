//! Run file loader
//! Loads a simulation request, and optionally runner settings, from YAML

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use super::{RunnerConfig, SimulationPlan, SimulationRequest};
use crate::error::{Result, SimulationError};

/// A YAML run file: the request options at the top level plus an optional
/// `runner:` section.
///
/// ```yaml
/// governance-chain-url: wss://polkadot.example,24000000
/// referendum: "1840"
/// runner:
///   base-port: 8100
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RunFile {
    #[serde(flatten)]
    pub request: SimulationRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<RunnerConfig>,
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading run file from: {:?}", path);

        if !path.exists() {
            return Err(SimulationError::Config(format!(
                "Run file not found: {:?}",
                path
            )));
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            SimulationError::Config(format!("Failed to read {:?}: {}", path, e))
        })?;

        serde_yaml::from_str(&contents)
            .map_err(|e| SimulationError::Config(format!("Failed to parse {:?}: {}", path, e)))
    }

    /// Runner settings from the file, or from the environment when absent.
    pub fn runner_config(&self) -> Result<RunnerConfig> {
        match &self.runner {
            Some(runner) => Ok(runner.clone()),
            None => RunnerConfig::load(),
        }
    }

    pub fn validate(&self) -> Result<SimulationPlan> {
        self.request.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferendumSource;
    use std::io::Write;

    #[test]
    fn test_load_run_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "governance-chain-url: wss://polkadot.example,100\n\
             fellowship-chain-url: wss://collectives.example\n\
             referendum: \"1840\"\n\
             fellowship: \"12\"\n\
             no-cleanup: true\n\
             runner:\n  base-port: 8100\n  session-epoch: 20"
        )
        .unwrap();

        let run = RunFile::load(file.path()).unwrap();
        let runner = run.runner_config().unwrap();
        assert_eq!(runner.base_port, 8100);
        assert_eq!(runner.session_epoch, 20);
        assert_eq!(runner.head_attempts, RunnerConfig::default().head_attempts);

        let plan = run.validate().unwrap();
        assert_eq!(plan.fellowship.unwrap().source, ReferendumSource::Existing(12));
        assert!(!plan.cleanup);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunFile::load(&dir.path().join("absent.yml")).unwrap_err();
        assert!(err.to_string().contains("Run file not found"));
    }
}
