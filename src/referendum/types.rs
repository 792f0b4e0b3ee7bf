//! Referendum records as read from forked storage

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::chain::rpc::parse_block_number;
use crate::error::{Result, SimulationError};
use crate::format::types::variant_parts;
use crate::format::{Origin, Proposal};

/// Governance domain a referendum belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Token-weighted governance (`Referenda`).
    Main,
    /// Rank-weighted fellowship governance (`FellowshipReferenda`).
    Fellowship,
}

impl Domain {
    pub fn referenda_pallet(&self) -> &'static str {
        match self {
            Domain::Main => "Referenda",
            Domain::Fellowship => "FellowshipReferenda",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Domain::Main => "governance",
            Domain::Fellowship => "fellowship",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferendumStatus {
    Ongoing,
    Approved,
    Rejected,
    Cancelled,
    TimedOut,
    Killed,
}

impl ReferendumStatus {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "ongoing" => Some(Self::Ongoing),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            "timedout" => Some(Self::TimedOut),
            "killed" => Some(Self::Killed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Ongoing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "Ongoing",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Cancelled => "Cancelled",
            Self::TimedOut => "TimedOut",
            Self::Killed => "Killed",
        }
    }
}

impl fmt::Display for ReferendumStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vote tally in the shape of its domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tally {
    Governance { ayes: u128, nays: u128, support: u128 },
    Fellowship { bare_ayes: u32, ayes: u32, nays: u32 },
}

impl Tally {
    /// A tally that passes every governance track: everything but one unit of
    /// issuance votes aye.
    pub fn passing_governance(total_issuance: u128) -> Self {
        let weight = total_issuance.saturating_sub(1);
        Tally::Governance {
            ayes: weight,
            nays: 0,
            support: weight,
        }
    }

    pub fn passing_fellowship() -> Self {
        Tally::Fellowship {
            bare_ayes: 100,
            ayes: 1000,
            nays: 0,
        }
    }

    pub fn parse(value: &Value, domain: Domain) -> Option<Self> {
        match domain {
            Domain::Main => Some(Tally::Governance {
                ayes: parse_balance(value.get("ayes")?)?,
                nays: parse_balance(value.get("nays")?)?,
                support: parse_balance(value.get("support")?)?,
            }),
            Domain::Fellowship => Some(Tally::Fellowship {
                bare_ayes: parse_u32(value.get("bareAyes").or_else(|| value.get("bare_ayes"))?)?,
                ayes: parse_u32(value.get("ayes")?)?,
                nays: parse_u32(value.get("nays")?)?,
            }),
        }
    }

    /// Balances are written as decimal strings, they do not fit a JSON number.
    pub fn to_storage(&self) -> Value {
        match self {
            Tally::Governance { ayes, nays, support } => json!({
                "ayes": ayes.to_string(),
                "nays": nays.to_string(),
                "support": support.to_string(),
            }),
            Tally::Fellowship { bare_ayes, ayes, nays } => json!({
                "bareAyes": bare_ayes,
                "ayes": ayes,
                "nays": nays,
            }),
        }
    }
}

/// Decision phase of an ongoing referendum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deciding {
    pub since: u32,
    pub confirming: Option<u32>,
}

impl Deciding {
    pub fn parse(value: &Value) -> Option<Self> {
        let since = parse_block_number(value.get("since")?).ok()?;
        let confirming = value
            .get("confirming")
            .filter(|v| !v.is_null())
            .and_then(|v| parse_block_number(v).ok());
        Some(Self { since, confirming })
    }

    pub fn to_storage(&self) -> Value {
        json!({"since": self.since, "confirming": self.confirming})
    }
}

/// Fields of an `Ongoing` referendum.
#[derive(Debug, Clone, PartialEq)]
pub struct OngoingReferendum {
    pub track: u16,
    pub origin: Origin,
    pub proposal: Proposal,
    pub submitted: u32,
    pub submission_deposit: Value,
    pub decision_deposit: Value,
    pub deciding: Option<Deciding>,
    pub tally: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferendumRecord {
    pub id: u32,
    pub status: ReferendumStatus,
    /// Present only while the referendum is ongoing.
    pub ongoing: Option<OngoingReferendum>,
}

impl ReferendumRecord {
    /// Parse a `ReferendumInfoFor` value in either the tagged or the
    /// single-key encoding.
    pub fn parse(id: u32, value: &Value) -> Result<Self> {
        let (kind, inner) = variant_parts(value).ok_or_else(|| {
            SimulationError::Decode(format!("Referendum #{} has an unrecognised shape", id))
        })?;
        let status = ReferendumStatus::parse(kind).ok_or_else(|| {
            SimulationError::Decode(format!("Referendum #{} has unknown status {}", id, kind))
        })?;

        if status != ReferendumStatus::Ongoing {
            return Ok(Self {
                id,
                status,
                ongoing: None,
            });
        }

        let field = |name: &str| {
            inner.get(name).ok_or_else(|| {
                SimulationError::Decode(format!("Referendum #{} is missing {}", id, name))
            })
        };

        let track = parse_u32(field("track")?)
            .and_then(|t| u16::try_from(t).ok())
            .ok_or_else(|| SimulationError::Decode(format!("Referendum #{} has a bad track", id)))?;
        let submitted = parse_block_number(field("submitted")?)?;
        let proposal = Proposal::parse(field("proposal")?);

        Ok(Self {
            id,
            status,
            ongoing: Some(OngoingReferendum {
                track,
                origin: Origin::parse(field("origin")?),
                proposal,
                submitted,
                submission_deposit: inner
                    .get("submissionDeposit")
                    .cloned()
                    .unwrap_or(Value::Null),
                decision_deposit: inner
                    .get("decisionDeposit")
                    .cloned()
                    .unwrap_or(Value::Null),
                deciding: inner
                    .get("deciding")
                    .filter(|v| !v.is_null())
                    .and_then(Deciding::parse),
                tally: inner.get("tally").cloned().unwrap_or(Value::Null),
            }),
        })
    }

    pub fn track(&self) -> Option<u16> {
        self.ongoing.as_ref().map(|o| o.track)
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.ongoing.as_ref().map(|o| &o.proposal)
    }
}

/// Parse a balance given as a number, a decimal string (commas allowed) or a
/// `0x` hex string.
pub fn parse_balance(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16).ok(),
                None => s.replace(',', "").parse().ok(),
            }
        }
        _ => None,
    }
}

fn parse_u32(value: &Value) -> Option<u32> {
    parse_balance(value).and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ongoing() -> Value {
        json!({
            "type": "Ongoing",
            "value": {
                "track": "33",
                "origin": {"type": "Origins", "value": {"type": "MediumSpender"}},
                "proposal": {"type": "Lookup", "value": {"hash": "0xabc0", "len": 60}},
                "enactment": {"after": 100},
                "submitted": "1,000",
                "submissionDeposit": {"who": "0x01", "amount": 10},
                "decisionDeposit": null,
                "deciding": {"since": 1200, "confirming": null},
                "tally": {"ayes": "5", "nays": "1", "support": "2"},
                "inQueue": false,
                "alarm": null
            }
        })
    }

    #[test]
    fn test_parse_ongoing_record() {
        let record = ReferendumRecord::parse(1840, &ongoing()).unwrap();
        assert_eq!(record.status, ReferendumStatus::Ongoing);
        let info = record.ongoing.as_ref().unwrap();
        assert_eq!(info.track, 33);
        assert_eq!(info.submitted, 1000);
        assert_eq!(info.proposal.kind(), "Lookup");
        assert_eq!(info.deciding, Some(Deciding { since: 1200, confirming: None }));
        assert_eq!(
            Tally::parse(&info.tally, Domain::Main),
            Some(Tally::Governance { ayes: 5, nays: 1, support: 2 })
        );
    }

    #[test]
    fn test_parse_terminal_record() {
        let record = ReferendumRecord::parse(7, &json!({"approved": [100, null, null]})).unwrap();
        assert_eq!(record.status, ReferendumStatus::Approved);
        assert!(record.ongoing.is_none());

        let record = ReferendumRecord::parse(7, &json!({"type": "TimedOut", "value": []})).unwrap();
        assert_eq!(record.status, ReferendumStatus::TimedOut);
        assert!(record.status.is_terminal());
    }

    #[test]
    fn test_parse_balance_forms() {
        assert_eq!(parse_balance(&json!(42)), Some(42));
        assert_eq!(parse_balance(&json!("1,000,000")), Some(1_000_000));
        assert_eq!(parse_balance(&json!("0x00000000000000000000000000000100")), Some(256));
        assert_eq!(parse_balance(&json!(null)), None);
    }

    #[test]
    fn test_passing_tallies() {
        assert_eq!(
            Tally::passing_governance(1_000).to_storage(),
            json!({"ayes": "999", "nays": "0", "support": "999"})
        );
        assert_eq!(
            Tally::passing_fellowship().to_storage(),
            json!({"bareAyes": 100, "ayes": 1000, "nays": 0})
        );
    }
}
