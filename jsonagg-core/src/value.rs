//! Scalar projection of JSON values
//!
//! Every comparison site ($match numbers, $group keys, $sort keys) works on
//! [`DynamicValue`] instead of raw `serde_json::Value`, so kind handling is a
//! compiler-checked `match` rather than a chain of `as_*` probes.

use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Largest integer an f64 holds exactly (2^53)
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Uniform scalar view of a JSON value.
///
/// Objects, arrays and null have no scalar meaning and collapse to `Absent`,
/// as does a field that is missing altogether.
#[derive(Debug, Clone)]
pub enum DynamicValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Absent,
}

impl DynamicValue {
    /// Project a JSON value
    ///
    /// ```
    /// use serde_json::json;
    /// use jsonagg_core::value::DynamicValue;
    ///
    /// assert_eq!(DynamicValue::from_json(&json!(30)), DynamicValue::Number(30.0));
    /// assert_eq!(DynamicValue::from_json(&json!({"a": 1})), DynamicValue::Absent);
    /// ```
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => DynamicValue::Text(s.clone()),
            Value::Number(n) => n.as_f64().map_or(DynamicValue::Absent, DynamicValue::Number),
            Value::Bool(b) => DynamicValue::Boolean(*b),
            Value::Null | Value::Array(_) | Value::Object(_) => DynamicValue::Absent,
        }
    }

    /// Project a possibly missing value; missing is `Absent`
    pub fn from_optional(value: Option<&Value>) -> Self {
        value.map_or(DynamicValue::Absent, DynamicValue::from_json)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, DynamicValue::Absent)
    }

    /// Render back to JSON.
    ///
    /// Integral numbers come out as JSON integers (`25`, not `25.0`); `Absent`
    /// becomes `null`.
    pub fn to_json(&self) -> Value {
        match self {
            DynamicValue::Text(s) => Value::String(s.clone()),
            DynamicValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
                    Value::from(*n as i64)
                } else {
                    Number::from_f64(*n).map_or(Value::Null, Value::Number)
                }
            }
            DynamicValue::Boolean(b) => Value::Bool(*b),
            DynamicValue::Absent => Value::Null,
        }
    }

    // Cross-kind order: Absent < Boolean < Number < Text
    fn kind_rank(&self) -> u8 {
        match self {
            DynamicValue::Absent => 0,
            DynamicValue::Boolean(_) => 1,
            DynamicValue::Number(_) => 2,
            DynamicValue::Text(_) => 3,
        }
    }
}

impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DynamicValue {}

impl Hash for DynamicValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_rank().hash(state);
        match self {
            DynamicValue::Text(s) => s.hash(state),
            // 0.0 and -0.0 compare equal, so they must hash alike
            DynamicValue::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state)
            }
            DynamicValue::Boolean(b) => b.hash(state),
            DynamicValue::Absent => {}
        }
    }
}

impl PartialOrd for DynamicValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DynamicValue {
    /// Natural order within a kind (numeric, lexicographic, `false < true`),
    /// kind rank across kinds
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DynamicValue::Text(a), DynamicValue::Text(b)) => a.cmp(b),
            // JSON numbers are never NaN
            (DynamicValue::Number(a), DynamicValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (DynamicValue::Boolean(a), DynamicValue::Boolean(b)) => a.cmp(b),
            (DynamicValue::Absent, DynamicValue::Absent) => Ordering::Equal,
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}
