//! Statically extracted option values.

use serde::{Serialize, Serializer};

/// Sentinel for values whose source expression cannot be evaluated statically.
pub const DYNAMIC: &str = "<dynamic>";

/// A numeric option: either a literal number or [`DYNAMIC`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Literal(f64),
    Dynamic,
}

impl NumericValue {
    pub fn as_literal(&self) -> Option<f64> {
        match self {
            NumericValue::Literal(n) => Some(*n),
            NumericValue::Dynamic => None,
        }
    }
}

impl Serialize for NumericValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Integral values serialize as integers so `5` stays `5`, not `5.0`.
            NumericValue::Literal(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*n as i64)
            }
            NumericValue::Literal(n) => serializer.serialize_f64(*n),
            NumericValue::Dynamic => serializer.serialize_str(DYNAMIC),
        }
    }
}
