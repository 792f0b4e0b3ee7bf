//! Conversion from chain-client values to fork-engine storage values

use serde_json::{Map, Value};

use super::types::{tagged_parts, Origin, Proposal};
use crate::chain::Bytes;

/// Convert one `{type, value}` tagged value to `{lowercase(type): inner}`.
///
/// A nested tagged value without payload collapses to its discriminant, a
/// nested tagged value with payload keeps the payload under its lowercased
/// discriminant, binary payloads become lowercase `0x` hex. Anything that is
/// not a tagged object is returned unchanged.
pub fn convert_tagged(value: &Value) -> Value {
    let Some((kind, inner)) = tagged_parts(value) else {
        return value.clone();
    };
    let mut out = Map::new();
    out.insert(kind.to_lowercase(), convert_inner(inner));
    Value::Object(out)
}

fn convert_inner(inner: &Value) -> Value {
    if let Some((kind, payload)) = tagged_parts(inner) {
        if payload.is_null() {
            return Value::String(kind.to_string());
        }
        let mut nested = Map::new();
        nested.insert(kind.to_lowercase(), normalize_binary(payload));
        return Value::Object(nested);
    }

    match inner {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), normalize_binary(v)))
                .collect(),
        ),
        other => normalize_binary(other),
    }
}

fn normalize_binary(value: &Value) -> Value {
    match Bytes::from_value(value) {
        Some(bytes) => Value::String(bytes.to_hex()),
        None => value.clone(),
    }
}

pub fn convert_origin(value: &Value) -> Value {
    Origin::parse(value).to_storage()
}

pub fn convert_proposal(value: &Value) -> Value {
    Proposal::parse(value).to_storage()
}

/// Scheduler calls are bounded calls, encoded exactly like proposals.
pub fn convert_call(value: &Value) -> Value {
    convert_proposal(value)
}

/// Convert a whole agenda slot. Item count and `null` holes are preserved.
pub fn convert_agenda(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(fields) => convert_agenda_item(fields),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn convert_agenda_item(fields: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for (key, value) in fields {
        let key = camel_case(key);
        let converted = match key.as_str() {
            "call" => convert_call(value),
            "origin" => convert_origin(value),
            "maybeId" => normalize_binary(value),
            _ => value.clone(),
        };
        out.insert(key, converted);
    }
    Value::Object(out)
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_origin_is_idempotent() {
        let raw = json!({"type": "system", "value": {"type": "Root"}});
        let once = convert_origin(&raw);
        assert_eq!(once, json!({"system": "Root"}));
        assert_eq!(convert_origin(&once), once);
    }

    #[test]
    fn test_convert_proposal_is_idempotent() {
        let raw = json!({"type": "Inline", "value": "0xDEADBEEF"});
        let once = convert_proposal(&raw);
        assert_eq!(once, json!({"inline": "0xdeadbeef"}));
        assert_eq!(convert_proposal(&once), once);
    }

    #[test]
    fn test_convert_call_is_idempotent_for_lookup() {
        let raw = json!({"type": "Lookup", "value": {"hash": [171, 205], "len": 2}});
        let once = convert_call(&raw);
        assert_eq!(once, json!({"lookup": {"hash": "0xabcd", "len": 2}}));
        assert_eq!(convert_call(&once), once);
    }

    #[test]
    fn test_non_objects_pass_through() {
        for value in [json!(null), json!(5), json!("Root"), json!([1, 2]), json!(true)] {
            assert_eq!(convert_origin(&value), value);
            assert_eq!(convert_proposal(&value), value);
            assert_eq!(convert_call(&value), value);
        }
    }

    #[test]
    fn test_unknown_tag_lowercases_and_keeps_inner() {
        let raw = json!({"type": "Custom", "value": {"depth": {"type": "A", "value": {"type": "B"}}}});
        assert_eq!(
            convert_tagged(&raw),
            json!({"custom": {"depth": {"type": "A", "value": {"type": "B"}}}})
        );
    }

    #[test]
    fn test_nested_tag_with_payload_keeps_payload() {
        let raw = json!({"type": "system", "value": {"type": "Signed", "value": "0xAA"}});
        assert_eq!(convert_origin(&raw), json!({"system": {"signed": "0xaa"}}));
    }

    #[test]
    fn test_convert_agenda_preserves_count_and_nulls() {
        let agenda = json!([
            {
                "call": {"type": "Inline", "value": "0x0001"},
                "maybe_id": [1, 2, 3],
                "priority": 63,
                "origin": {"type": "system", "value": {"type": "Root"}},
                "maybe_periodic": null
            },
            null,
            {
                "call": {"type": "Lookup", "value": {"hash": "0xFF", "len": 1}},
                "maybeId": null,
                "priority": 0,
                "origin": {"type": "Origins", "value": {"type": "Treasurer"}},
                "maybePeriodic": null
            }
        ]);

        let converted = convert_agenda(&agenda);
        let items = converted.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1], Value::Null);
        assert_eq!(items[0]["call"], json!({"inline": "0x0001"}));
        assert_eq!(items[0]["maybeId"], json!("0x010203"));
        assert_eq!(items[0]["origin"], json!({"system": "Root"}));
        assert_eq!(items[0]["priority"], json!(63));
        assert!(items[0].get("maybePeriodic").is_some());
        assert_eq!(items[2]["call"], json!({"lookup": {"hash": "0xff", "len": 1}}));
        assert_eq!(items[2]["origin"], json!({"origins": "Treasurer"}));
    }

    #[test]
    fn test_convert_agenda_passes_non_arrays_through() {
        assert_eq!(convert_agenda(&json!(null)), json!(null));
        assert_eq!(convert_agenda(&json!({"a": 1})), json!({"a": 1}));
    }
}
