pub mod loader;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::chain::Bytes;
use crate::error::{Result, SimulationError};
use crate::fork::PollingConfig;
use crate::format::Origin;

/// Process-level settings for the fork engine and polling loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunnerConfig {
    pub fork_command: String,
    pub base_port: u16,
    pub runtime_log_level: Option<u8>,
    pub poll_interval_ms: u64,
    pub head_attempts: u32,
    pub ready_attempts: u32,
    /// Session length used to move relay fork points off a session boundary;
    /// 0 disables the adjustment.
    pub session_epoch: u32,
    pub work_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let polling = PollingConfig::default();
        Self {
            fork_command: "npx @acala-network/chopsticks@latest".to_string(),
            base_port: 8000,
            runtime_log_level: None,
            poll_interval_ms: polling.interval.as_millis() as u64,
            head_attempts: polling.head_attempts,
            ready_attempts: polling.ready_attempts,
            session_epoch: 0,
            work_dir: env::temp_dir().join("referenda-tester"),
        }
    }
}

impl RunnerConfig {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let fork_command = env::var("REFERENDA_TESTER_FORK_COMMAND")
            .unwrap_or(defaults.fork_command);

        let base_port = env_or("REFERENDA_TESTER_BASE_PORT", defaults.base_port)?;

        let runtime_log_level = match env::var("REFERENDA_TESTER_RUNTIME_LOG_LEVEL") {
            Ok(raw) => Some(parse_env("REFERENDA_TESTER_RUNTIME_LOG_LEVEL", &raw)?),
            Err(_) => defaults.runtime_log_level,
        };

        let poll_interval_ms = env_or("REFERENDA_TESTER_POLL_INTERVAL_MS", defaults.poll_interval_ms)?;
        let head_attempts = env_or("REFERENDA_TESTER_POLL_ATTEMPTS", defaults.head_attempts)?;
        let ready_attempts = env_or("REFERENDA_TESTER_READY_ATTEMPTS", defaults.ready_attempts)?;
        let session_epoch = env_or("REFERENDA_TESTER_SESSION_EPOCH", defaults.session_epoch)?;

        let work_dir = env::var("REFERENDA_TESTER_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);

        Ok(RunnerConfig {
            fork_command,
            base_port,
            runtime_log_level,
            poll_interval_ms,
            head_attempts,
            ready_attempts,
            session_epoch,
            work_dir,
        })
    }

    pub fn polling(&self) -> PollingConfig {
        PollingConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            head_attempts: self.head_attempts,
            ready_attempts: self.ready_attempts,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_env(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_env<T: FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| SimulationError::Config(format!("{}={}: {}", name, raw, e)))
}

/// A chain URL with an optional pinned fork block, written `<url>[,<block>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoint {
    pub url: String,
    pub block: Option<u32>,
}

impl ChainEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            block: None,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let (url, block) = match input.split_once(',') {
            Some((url, block)) => {
                let block = block.trim().parse::<u32>().map_err(|_| {
                    SimulationError::Config(format!("invalid block number in '{}'", input))
                })?;
                (url.trim(), Some(block))
            }
            None => (input.trim(), None),
        };
        if url.is_empty() {
            return Err(SimulationError::Config(format!("missing chain url in '{}'", input)));
        }
        Ok(Self {
            url: url.to_string(),
            block,
        })
    }

    /// Parse a comma separated list of endpoints. A number directly after a URL
    /// pins that URL's block.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        let mut endpoints: Vec<Self> = Vec::new();
        for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Ok(block) = token.parse::<u32>() {
                match endpoints.last_mut() {
                    Some(last) if last.block.is_none() => last.block = Some(block),
                    _ => {
                        return Err(SimulationError::Config(format!(
                            "block number {} does not follow a chain url",
                            block
                        )))
                    }
                }
            } else {
                endpoints.push(Self::new(token));
            }
        }
        Ok(endpoints)
    }
}

impl fmt::Display for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block {
            Some(block) => write!(f, "{},{}", self.url, block),
            None => f.write_str(&self.url),
        }
    }
}

/// Raw options for one run, as given on the command line or in a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SimulationRequest {
    pub governance_chain_url: Option<String>,
    pub fellowship_chain_url: Option<String>,
    pub additional_chains: Option<String>,
    pub referendum: Option<String>,
    pub fellowship: Option<String>,
    pub call_to_create_governance_referendum: Option<String>,
    pub call_to_note_preimage_for_governance_referendum: Option<String>,
    pub call_to_create_fellowship_referendum: Option<String>,
    pub call_to_note_preimage_for_fellowship_referendum: Option<String>,
    pub pre_call: Option<String>,
    pub pre_origin: Option<String>,
    pub no_cleanup: bool,
}

/// Where a domain's referendum comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferendumSource {
    Existing(u32),
    Create {
        submit_call: Bytes,
        preimage_call: Option<Bytes>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainPlan {
    pub endpoint: ChainEndpoint,
    pub source: ReferendumSource,
}

/// A call dispatched on the governance fork before any referendum is forced.
#[derive(Debug, Clone, PartialEq)]
pub struct PreCall {
    pub call: Bytes,
    pub origin: Origin,
}

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    pub governance: Option<DomainPlan>,
    pub fellowship: Option<DomainPlan>,
    pub additional_chains: Vec<ChainEndpoint>,
    pub pre_call: Option<PreCall>,
    pub cleanup: bool,
}

impl SimulationRequest {
    pub fn validate(&self) -> Result<SimulationPlan> {
        if self.referendum.is_some() && self.call_to_create_governance_referendum.is_some() {
            return Err(config_error(
                "cannot specify both --referendum and --call-to-create-governance-referendum",
            ));
        }
        if self.fellowship.is_some() && self.call_to_create_fellowship_referendum.is_some() {
            return Err(config_error(
                "cannot specify both --fellowship and --call-to-create-fellowship-referendum",
            ));
        }

        let wants_governance =
            self.referendum.is_some() || self.call_to_create_governance_referendum.is_some();
        let wants_fellowship =
            self.fellowship.is_some() || self.call_to_create_fellowship_referendum.is_some();
        if !wants_governance && !wants_fellowship {
            return Err(config_error("at least one referendum must be specified"));
        }

        let governance = if wants_governance {
            let url = self
                .governance_chain_url
                .as_deref()
                .ok_or_else(|| config_error("--governance-chain-url is required"))?;
            Some(DomainPlan {
                endpoint: ChainEndpoint::parse(url)?,
                source: source(
                    self.referendum.as_deref(),
                    self.call_to_create_governance_referendum.as_deref(),
                    self.call_to_note_preimage_for_governance_referendum.as_deref(),
                    "invalid referendum id",
                )?,
            })
        } else {
            None
        };

        let fellowship = if wants_fellowship {
            let url = self
                .fellowship_chain_url
                .as_deref()
                .ok_or_else(|| config_error("--fellowship-chain-url is required"))?;
            Some(DomainPlan {
                endpoint: ChainEndpoint::parse(url)?,
                source: source(
                    self.fellowship.as_deref(),
                    self.call_to_create_fellowship_referendum.as_deref(),
                    self.call_to_note_preimage_for_fellowship_referendum.as_deref(),
                    "invalid fellowship referendum id",
                )?,
            })
        } else {
            None
        };

        let pre_call = match &self.pre_call {
            Some(call) => {
                if governance.is_none() {
                    return Err(config_error("--pre-call requires a governance referendum"));
                }
                Some(PreCall {
                    call: Bytes::from_hex(call)?,
                    origin: parse_origin(self.pre_origin.as_deref().unwrap_or("root"))?,
                })
            }
            None => None,
        };

        let additional_chains = match &self.additional_chains {
            Some(list) => ChainEndpoint::parse_list(list)?,
            None => Vec::new(),
        };

        Ok(SimulationPlan {
            governance,
            fellowship,
            additional_chains,
            pre_call,
            cleanup: !self.no_cleanup,
        })
    }
}

fn config_error(message: &str) -> SimulationError {
    SimulationError::Config(message.to_string())
}

fn source(
    id: Option<&str>,
    submit_call: Option<&str>,
    preimage_call: Option<&str>,
    invalid_id: &str,
) -> Result<ReferendumSource> {
    if let Some(raw) = id {
        let id = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| SimulationError::Config(format!("{}: {}", invalid_id, raw)))?;
        return Ok(ReferendumSource::Existing(id));
    }

    let submit_call = submit_call
        .map(Bytes::from_hex)
        .transpose()?
        .ok_or_else(|| config_error("no referendum id or creation call given"))?;
    let preimage_call = preimage_call.map(Bytes::from_hex).transpose()?;
    Ok(ReferendumSource::Create {
        submit_call,
        preimage_call,
    })
}

/// Parse a dispatch origin: `root`, `<Caller>:<Variant>` such as
/// `Origins:WhitelistedCaller`, or an origin in JSON form.
pub fn parse_origin(input: &str) -> Result<Origin> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("root") {
        return Ok(Origin::root());
    }

    if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| SimulationError::Config(format!("invalid origin {}: {}", trimmed, e)))?;
        return match Origin::parse(&value) {
            Origin::Unknown(_) => Err(SimulationError::Config(format!("invalid origin {}", trimmed))),
            origin => Ok(origin),
        };
    }

    match trimmed.split_once(':') {
        Some((caller, variant)) if !caller.is_empty() && !variant.is_empty() => Ok(Origin::Caller {
            caller: caller.to_string(),
            variant: variant.to_string(),
        }),
        _ => Err(SimulationError::Config(format!("invalid origin {}", trimmed))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SimulationRequest {
        SimulationRequest {
            governance_chain_url: Some("wss://polkadot.example,100".to_string()),
            referendum: Some("1840".to_string()),
            ..SimulationRequest::default()
        }
    }

    fn message(err: SimulationError) -> String {
        err.to_string()
    }

    #[test]
    fn test_endpoint_with_block() {
        let endpoint = ChainEndpoint::parse("wss://polkadot.example,24000000").unwrap();
        assert_eq!(endpoint.url, "wss://polkadot.example");
        assert_eq!(endpoint.block, Some(24_000_000));
        assert_eq!(endpoint.to_string(), "wss://polkadot.example,24000000");

        assert!(ChainEndpoint::parse("wss://x,abc").is_err());
    }

    #[test]
    fn test_endpoint_list_pins() {
        let list = ChainEndpoint::parse_list("wss://a,10,wss://b").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].block, Some(10));
        assert_eq!(list[1].block, None);
        assert!(ChainEndpoint::parse_list("10,wss://a").is_err());
    }

    #[test]
    fn test_validate_existing_referendum() {
        let plan = request().validate().unwrap();
        let governance = plan.governance.unwrap();
        assert_eq!(governance.source, ReferendumSource::Existing(1840));
        assert_eq!(governance.endpoint.block, Some(100));
        assert!(plan.fellowship.is_none());
        assert!(plan.cleanup);
    }

    #[test]
    fn test_validate_messages() {
        let empty = SimulationRequest::default();
        assert!(message(empty.validate().unwrap_err())
            .contains("at least one referendum must be specified"));

        let both = SimulationRequest {
            call_to_create_governance_referendum: Some("0x00".to_string()),
            ..request()
        };
        assert!(message(both.validate().unwrap_err()).contains("cannot specify both"));

        let no_url = SimulationRequest {
            governance_chain_url: None,
            ..request()
        };
        assert!(message(no_url.validate().unwrap_err())
            .contains("--governance-chain-url is required"));

        let fellowship_no_url = SimulationRequest {
            fellowship: Some("12".to_string()),
            ..request()
        };
        assert!(message(fellowship_no_url.validate().unwrap_err())
            .contains("--fellowship-chain-url is required"));

        let bad_id = SimulationRequest {
            referendum: Some("abc".to_string()),
            ..request()
        };
        assert!(message(bad_id.validate().unwrap_err()).contains("invalid referendum id: abc"));

        let bad_fellowship_id = SimulationRequest {
            fellowship: Some("x1".to_string()),
            fellowship_chain_url: Some("wss://collectives.example".to_string()),
            ..request()
        };
        assert!(message(bad_fellowship_id.validate().unwrap_err())
            .contains("invalid fellowship referendum id: x1"));
    }

    #[test]
    fn test_validate_creation_and_pre_call() {
        let req = SimulationRequest {
            referendum: None,
            call_to_create_governance_referendum: Some("0x1500".to_string()),
            call_to_note_preimage_for_governance_referendum: Some("0x2000".to_string()),
            pre_call: Some("0x0000".to_string()),
            pre_origin: Some("Origins:WhitelistedCaller".to_string()),
            no_cleanup: true,
            ..request()
        };
        let plan = req.validate().unwrap();
        match plan.governance.unwrap().source {
            ReferendumSource::Create {
                submit_call,
                preimage_call,
            } => {
                assert_eq!(submit_call.to_hex(), "0x1500");
                assert_eq!(preimage_call.unwrap().to_hex(), "0x2000");
            }
            other => panic!("unexpected source {:?}", other),
        }
        let pre_call = plan.pre_call.unwrap();
        assert_eq!(
            pre_call.origin,
            Origin::Caller {
                caller: "Origins".to_string(),
                variant: "WhitelistedCaller".to_string()
            }
        );
        assert!(!plan.cleanup);
    }

    #[test]
    fn test_parse_origin() {
        assert_eq!(parse_origin("Root").unwrap(), Origin::root());
        assert!(parse_origin("{\"system\": \"Root\"}").is_ok());
        assert!(matches!(
            parse_origin("nonsense"),
            Err(SimulationError::Config(msg)) if msg.starts_with("invalid origin")
        ));
    }

    #[test]
    fn test_runner_defaults_match_polling() {
        let config = RunnerConfig::default();
        assert_eq!(config.polling(), PollingConfig::default());
        assert_eq!(config.session_epoch, 0);
    }
}
