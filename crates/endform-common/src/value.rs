//! Tag value model and the narrow coercions applied at the gateway edge.
//!
//! Controller tags decode to booleans, integers, reals, strings, arrays, or
//! structures. Inputs arriving over HTTP are heterogeneous (JSON booleans,
//! form strings, numeric flags), so two coercions are defined here with an
//! explicitly enumerated set of accepted shapes:
//!
//! - [`coerce_bool`]: `true`, `"true"` and `1` are true; everything else,
//!   including a missing value, is false.
//! - [`coerce_numeric`]: a plain number, or a structure carrying a numeric
//!   `value` or `low` member; everything else is `0.0`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A decoded controller value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// BOOL.
    Bool(bool),
    /// Any integer type (INT, DINT, UDINT, TIME in ms).
    Int(i64),
    /// REAL / LREAL.
    Real(f64),
    /// STRING.
    Text(String),
    /// ARRAY OF ...
    Array(Vec<TagValue>),
    /// STRUCT, keyed by member name.
    Struct(BTreeMap<String, TagValue>),
}

impl TagValue {
    /// Plain numeric value, without unwrapping structures.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean value, if this is a BOOL.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, if this is a STRING.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Overlay `partial` on top of `self`, keeping members `partial` omits.
    ///
    /// Structures merge member by member (recursively); arrays replace the
    /// leading elements `partial` supplies. Any other combination yields
    /// `partial` unchanged.
    #[must_use]
    pub fn auto_fill(&self, partial: TagValue) -> TagValue {
        match (self, partial) {
            (Self::Struct(current), Self::Struct(overlay)) => {
                let mut merged = current.clone();
                for (member, value) in overlay {
                    let filled = match merged.get(&member) {
                        Some(existing) => existing.auto_fill(value),
                        None => value,
                    };
                    merged.insert(member, filled);
                }
                Self::Struct(merged)
            }
            (Self::Array(current), Self::Array(overlay)) => {
                let mut merged = current.clone();
                for (i, value) in overlay.into_iter().enumerate() {
                    if let Some(slot) = merged.get_mut(i) {
                        *slot = slot.auto_fill(value);
                    } else {
                        merged.push(value);
                    }
                }
                Self::Array(merged)
            }
            (_, partial) => partial,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => f.write_str("<unprintable>"),
            },
        }
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for TagValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Boolean coercion for write requests.
///
/// Only `true`, the string `"true"`, and the number `1` coerce to `true`.
#[must_use]
pub fn coerce_bool(raw: Option<&serde_json::Value>) -> bool {
    match raw {
        Some(serde_json::Value::Bool(v)) => *v,
        Some(serde_json::Value::String(s)) => s == "true",
        #[allow(clippy::float_cmp)]
        Some(serde_json::Value::Number(n)) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// Numeric coercion for polled values.
///
/// Accepts a plain number or a structure with a numeric `value` member
/// (checked first) or `low` member. Returns `0.0` otherwise.
#[must_use]
pub fn coerce_numeric(value: &TagValue) -> f64 {
    match value {
        TagValue::Struct(members) => members
            .get("value")
            .and_then(TagValue::as_f64)
            .or_else(|| members.get("low").and_then(TagValue::as_f64))
            .unwrap_or(0.0),
        other => other.as_f64().unwrap_or(0.0),
    }
}

/// Convert a JSON request body value into a [`TagValue`].
///
/// `null` has no controller representation and yields `None`.
#[must_use]
pub fn from_json(raw: &serde_json::Value) -> Option<TagValue> {
    serde_json::from_value(raw.clone()).ok()
}
