//! Field decoders that never fail.
//!
//! State files are written by external workers with no schema enforcement.
//! Each decoder reads an arbitrary JSON value and coerces it, so one odd
//! field degrades to a default instead of discarding the whole record.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerce a scalar to a string; `null` becomes `None`.
pub fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(v.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn opt_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(value_to_string(&v))
}

pub fn u64_or_zero<'de, D>(d: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

pub fn bool_or_false<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.as_str(), "true" | "yes" | "1"),
        _ => false,
    })
}

/// Keep the string-like members of an array; anything else yields empty.
pub fn string_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Array(items) => items.iter().filter_map(value_to_string).collect(),
        _ => Vec::new(),
    })
}

/// A JSON object, or an empty map for any other value.
pub fn object_or_empty<'de, D>(d: D) -> Result<serde_json::Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    })
}
