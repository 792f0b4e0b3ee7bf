//! Closed sum types for the polymorphic values found in referendum and
//! scheduler storage.

use serde_json::{Map, Value};

use super::convert::convert_tagged;
use crate::chain::Bytes;

/// Split a value into its discriminant and payload.
///
/// Two encodings are recognised: the chain client's `{type, value}` form and
/// the single-key `{Variant: payload}` form used by storage writes.
pub(crate) fn variant_parts(value: &Value) -> Option<(&str, &Value)> {
    tagged_parts(value).or_else(|| single_key_parts(value))
}

/// `{type, value?}` with no other members.
pub(crate) fn tagged_parts(value: &Value) -> Option<(&str, &Value)> {
    let obj = value.as_object()?;
    let kind = obj.get("type")?.as_str()?;
    if obj.keys().any(|k| k != "type" && k != "value") {
        return None;
    }
    Some((kind, obj.get("value").unwrap_or(&Value::Null)))
}

fn single_key_parts(value: &Value) -> Option<(&str, &Value)> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// Dispatch origin of a referendum or scheduled task.
#[derive(Debug, Clone, PartialEq)]
pub enum Origin {
    /// An origin caller and its variant, e.g. `system` / `Root`.
    Caller { caller: String, variant: String },
    /// `system` / `Signed(account)`.
    Signed { account: String },
    Unknown(Value),
}

impl Origin {
    pub fn root() -> Self {
        Self::Caller {
            caller: "system".to_string(),
            variant: "Root".to_string(),
        }
    }

    pub fn signed(account: impl Into<String>) -> Self {
        Self::Signed {
            account: account.into(),
        }
    }

    pub fn parse(value: &Value) -> Self {
        if let Some(account) = signed_account(value) {
            return Self::signed(account);
        }

        if let Some((caller, inner)) = tagged_parts(value) {
            if let Some((variant, payload)) = tagged_parts(inner) {
                if payload.is_null() {
                    return Self::Caller {
                        caller: caller.to_string(),
                        variant: variant.to_string(),
                    };
                }
            }
            if let Some(variant) = inner.as_str() {
                return Self::Caller {
                    caller: caller.to_string(),
                    variant: variant.to_string(),
                };
            }
            return Self::Unknown(value.clone());
        }

        if let Some((caller, Value::String(variant))) = single_key_parts(value) {
            return Self::Caller {
                caller: caller.to_string(),
                variant: variant.clone(),
            };
        }

        Self::Unknown(value.clone())
    }

    pub fn to_storage(&self) -> Value {
        match self {
            Self::Caller { caller, variant } => {
                let mut map = Map::new();
                map.insert(caller.to_lowercase(), Value::String(variant.clone()));
                Value::Object(map)
            }
            Self::Signed { account } => {
                single("system", single("signed", Value::String(account.clone())))
            }
            Self::Unknown(value) => convert_tagged(value),
        }
    }
}

fn signed_account(value: &Value) -> Option<String> {
    let (caller, inner) = variant_parts(value)?;
    if !caller.eq_ignore_ascii_case("system") {
        return None;
    }
    let (variant, payload) = variant_parts(inner)?;
    if !variant.eq_ignore_ascii_case("signed") {
        return None;
    }
    match Bytes::from_value(payload) {
        Some(bytes) => Some(bytes.to_hex()),
        None => payload.as_str().map(str::to_string),
    }
}

/// A bounded call: referendum proposal or scheduler agenda call.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    Inline(Bytes),
    Lookup { hash: Bytes, len: u32 },
    Legacy { hash: Bytes },
    Unknown(Value),
}

impl Proposal {
    pub fn parse(value: &Value) -> Self {
        let parsed = variant_parts(value).and_then(|(kind, inner)| {
            match kind.to_ascii_lowercase().as_str() {
                "inline" => Bytes::from_value(inner).map(Self::Inline),
                "lookup" => {
                    let hash = inner.get("hash").and_then(Bytes::from_value)?;
                    let len = inner.get("len").and_then(parse_len)?;
                    Some(Self::Lookup { hash, len })
                }
                "legacy" => inner
                    .get("hash")
                    .and_then(Bytes::from_value)
                    .map(|hash| Self::Legacy { hash }),
                _ => None,
            }
        });
        parsed.unwrap_or_else(|| Self::Unknown(value.clone()))
    }

    pub fn to_storage(&self) -> Value {
        match self {
            Self::Inline(bytes) => single("inline", Value::String(bytes.to_hex())),
            Self::Lookup { hash, len } => {
                let mut inner = Map::new();
                inner.insert("hash".to_string(), Value::String(hash.to_hex()));
                inner.insert("len".to_string(), Value::from(*len));
                single("lookup", Value::Object(inner))
            }
            Self::Legacy { hash } => {
                let mut inner = Map::new();
                inner.insert("hash".to_string(), Value::String(hash.to_hex()));
                single("legacy", Value::Object(inner))
            }
            Self::Unknown(value) => convert_tagged(value),
        }
    }

    /// Preimage hash for `Lookup` and `Legacy` proposals.
    pub fn hash(&self) -> Option<&Bytes> {
        match self {
            Self::Lookup { hash, .. } | Self::Legacy { hash } => Some(hash),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Inline(_) => "Inline",
            Self::Lookup { .. } => "Lookup",
            Self::Legacy { .. } => "Legacy",
            Self::Unknown(_) => "Unknown",
        }
    }
}

fn parse_len(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.replace(',', "").parse().ok(),
        _ => None,
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}
