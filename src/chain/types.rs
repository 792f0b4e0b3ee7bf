//! Values exchanged with the chain client

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, SimulationError};

/// Binary payload as handed over by the chain client.
///
/// Chain clients expose bytes either as `0x`-prefixed hex strings or as plain
/// arrays of octets. Both are collapsed into this type once, at the boundary,
/// and rendered back as canonical lowercase `0x` hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse hex with or without the `0x` prefix.
    pub fn from_hex(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        hex::decode(digits)
            .map(Self)
            .map_err(|e| SimulationError::Decode(format!("Invalid hex {}: {}", trimmed, e)))
    }

    /// Recognise a binary payload inside a loosely typed value.
    ///
    /// Only `0x` strings and non-empty arrays of octets qualify; everything
    /// else is not considered binary.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if s.starts_with("0x") || s.starts_with("0X") => {
                Self::from_hex(s).ok()
            }
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_u64().filter(|b| *b <= u8::MAX as u64).map(|b| b as u8))
                .collect::<Option<Vec<u8>>>()
                .map(Self),
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl Serialize for Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// One event emitted in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub pallet: String,
    pub variant: String,
    #[serde(default)]
    pub data: Value,
}

impl ChainEvent {
    pub fn new(pallet: impl Into<String>, variant: impl Into<String>, data: Value) -> Self {
        Self {
            pallet: pallet.into(),
            variant: variant.into(),
            data,
        }
    }

    pub fn is(&self, pallet: &str, variant: &str) -> bool {
        self.pallet.eq_ignore_ascii_case(pallet) && self.variant.eq_ignore_ascii_case(variant)
    }

    /// `Section.Method` form used in reports.
    pub fn name(&self) -> String {
        format!("{}.{}", self.pallet, self.variant)
    }
}

/// A call decoded against live runtime metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedCall {
    pub pallet: String,
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

/// One key/value pair of a storage map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub keys: Vec<Value>,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bytes_from_hex_string_is_lowercased() {
        let bytes = Bytes::from_value(&json!("0xABcd")).unwrap();
        assert_eq!(bytes.to_hex(), "0xabcd");
    }

    #[test]
    fn test_bytes_from_octet_array() {
        let bytes = Bytes::from_value(&json!([1, 2, 255])).unwrap();
        assert_eq!(bytes.to_hex(), "0x0102ff");
    }

    #[test]
    fn test_non_binary_values_are_rejected() {
        assert!(Bytes::from_value(&json!("Root")).is_none());
        assert!(Bytes::from_value(&json!([1, 256])).is_none());
        assert!(Bytes::from_value(&json!([])).is_none());
        assert!(Bytes::from_value(&json!({"hash": "0x00"})).is_none());
        assert!(Bytes::from_value(&json!(7)).is_none());
    }

    #[test]
    fn test_event_matching_ignores_case() {
        let event = ChainEvent::new("Scheduler", "Dispatched", Value::Null);
        assert!(event.is("scheduler", "dispatched"));
        assert_eq!(event.name(), "Scheduler.Dispatched");
    }
}
