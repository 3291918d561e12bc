//! Runtime values for sandboxed code.

use std::collections::BTreeMap;
use std::fmt;

/// Host objects reachable from sandboxed code. These never leave the
/// interpreter: they are not serializable and are excluded from the
/// variable snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    /// The context query object (`ctx` / `context`).
    Ctx,
    /// `JSON` namespace.
    Json,
    /// `Math` namespace.
    Math,
    /// `Array` namespace (`Array.isArray`).
    ArrayNs,
    /// The recursion capability (`rae`), present only when injected.
    Rae,
}

/// A sandbox value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `null` (and the result of void-ish operations).
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (f64, rendered integer-style when whole).
    Num(f64),
    /// String.
    Str(String),
    /// Array.
    Array(Vec<Value>),
    /// Object with ordered keys.
    Object(BTreeMap<String, Value>),
    /// Host object reference.
    Host(Host),
}

impl Value {
    /// JS-style truthiness.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) | Self::Host(_) => true,
        }
    }

    /// Type name for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Num(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Host(_) => "host",
        }
    }

    /// Loose equality used by `==` in the sandbox (strict by type,
    /// except numbers compare by value).
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        self == other
    }

    /// Converts to a `serde_json::Value`. Host references become null.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null | Self::Host(_) => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Num(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Converts from a `serde_json::Value`.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect(),
            ),
        }
    }

    /// Coerces to a number where JS would.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Null => Some(0.0),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Str(s) => f.write_str(s),
            Self::Array(_) | Self::Object(_) => {
                f.write_str(&serde_json::to_string(&self.to_json()).unwrap_or_default())
            }
            Self::Host(_) => f.write_str("[host object]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Num(0.0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Num(2.0).truthy());
        assert!(Value::Str("x".to_string()).truthy());
        assert!(Value::Array(Vec::new()).truthy());
    }

    #[test]
    fn test_display_numbers() {
        assert_eq!(Value::Num(11.0).to_string(), "11");
        assert_eq!(Value::Num(1.5).to_string(), "1.5");
        assert_eq!(Value::Num(-3.0).to_string(), "-3");
    }

    #[test]
    fn test_display_array_as_json() {
        let v = Value::Array(vec![Value::Num(1.0), Value::Str("a".to_string())]);
        assert_eq!(v.to_string(), r#"[1.0,"a"]"#);
    }

    #[test]
    fn test_json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a": [1, "two", null], "b": true}"#).unwrap_or_default();
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_as_number_coercions() {
        assert_eq!(Value::Str(" 42 ".to_string()).as_number(), Some(42.0));
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
        assert_eq!(Value::Null.as_number(), Some(0.0));
        assert!(Value::Array(Vec::new()).as_number().is_none());
    }
}
