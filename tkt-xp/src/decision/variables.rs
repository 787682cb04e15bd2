//! Typed experiment variables
//!
//! Datafile variables arrive as arbitrary JSON. They are decoded once, by a
//! total function, into a closed set of value kinds.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Variable value kinds exposed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

/// Decoded variable map (sorted for stable output)
pub type Variables = BTreeMap<String, VariableValue>;

impl VariableValue {
    /// Decode one raw JSON value
    ///
    /// Objects and arrays become their compact JSON text so structured
    /// payloads (such as module lists) survive as strings. `null` has no
    /// representation and yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(VariableValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(VariableValue::Int(i)),
                None => n.as_f64().map(VariableValue::Double),
            },
            Value::String(s) => Some(VariableValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(VariableValue::String(value.to_string())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VariableValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariableValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Decode a raw variable map, dropping entries with no representation
pub fn decode_variables(raw: &BTreeMap<String, Value>) -> Variables {
    raw.iter()
        .filter_map(|(name, value)| match VariableValue::from_json(value) {
            Some(decoded) => Some((name.clone(), decoded)),
            None => {
                warn!(variable = %name, "Dropping null experiment variable");
                None
            }
        })
        .collect()
}
