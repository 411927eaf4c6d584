/// Value Coercer - Typed Recovery of Stringified Literals
///
/// **Core Responsibility:**
/// Expected outputs are stored as text. Before comparison they are parsed back
/// into a typed value, and actual outputs coming from a runner are compared
/// against them with type-aware equality.
///
/// **Coercion Grammar (ordered, first match wins):**
/// 1. `true` / `false` → Bool
/// 2. `null` → Null, `undefined` → Undefined (distinct sentinels)
/// 3. numeric literal (decimal, exponent, `0x`/`0o`/`0b`, `Infinity`) → Number
/// 4. `"..."` → String with exactly one layer of quotes removed
/// 5. `[...]` / `{...}` → Json (structured), if it parses as JSON
/// 6. anything else → the raw String
///
/// **Equality Rules:**
/// - Structured vs structured: deep comparison, numbers compared numerically
/// - Everything else: same variant AND same value (`"5"` never equals `5`)
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

/// A value recovered from a literal, or produced by a runner
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Bool(bool),
    Null,
    Undefined,
    Number(f64),
    String(String),
    /// Arrays and objects only; scalars are always normalized to the other variants
    Json(serde_json::Value),
}

impl CoercedValue {
    /// Normalize a parsed JSON value: scalars become primitive variants
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CoercedValue::Null,
            serde_json::Value::Bool(b) => CoercedValue::Bool(b),
            serde_json::Value::Number(n) => CoercedValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => CoercedValue::String(s),
            structured => CoercedValue::Json(structured),
        }
    }

    /// Decode a literal emitted by a harness running in another language.
    ///
    /// Harnesses print values as text, so the same grammar as [`coerce`] applies,
    /// plus the spellings a foreign runtime may leak (`True`, `False`, `None`)
    /// and the `NaN` a harness prints for a not-a-number result.
    /// Quoted strings are JSON-unescaped rather than merely stripped.
    pub fn from_foreign_literal(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "True" => return CoercedValue::Bool(true),
            "False" => return CoercedValue::Bool(false),
            "None" => return CoercedValue::Null,
            "NaN" => return CoercedValue::Number(f64::NAN),
            _ => {}
        }

        if is_quoted(trimmed) {
            if let Ok(s) = serde_json::from_str::<String>(trimmed) {
                return CoercedValue::String(s);
            }
        }

        coerce(trimmed)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CoercedValue::Bool(_) => "bool",
            CoercedValue::Null => "null",
            CoercedValue::Undefined => "undefined",
            CoercedValue::Number(_) => "number",
            CoercedValue::String(_) => "string",
            CoercedValue::Json(serde_json::Value::Array(_)) => "array",
            CoercedValue::Json(_) => "object",
        }
    }
}

/// Recover a typed value from a stored expected-output literal
pub fn coerce(raw: &str) -> CoercedValue {
    match raw {
        "true" => return CoercedValue::Bool(true),
        "false" => return CoercedValue::Bool(false),
        "null" => return CoercedValue::Null,
        "undefined" => return CoercedValue::Undefined,
        _ => {}
    }

    if let Some(n) = parse_number(raw) {
        return CoercedValue::Number(n);
    }

    if is_quoted(raw) {
        return CoercedValue::String(raw[1..raw.len() - 1].to_string());
    }

    if is_bracketed(raw) {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => return CoercedValue::from_json(value),
            Err(e) => {
                debug!(literal = raw, error = %e, "Structured literal is not valid JSON; keeping raw string");
            }
        }
    }

    CoercedValue::String(raw.to_string())
}

/// Type-aware equality between an actual and an expected value
pub fn equals(actual: &CoercedValue, expected: &CoercedValue) -> bool {
    match (actual, expected) {
        (CoercedValue::Json(a), CoercedValue::Json(b)) => json_deep_eq(a, b),
        (CoercedValue::Bool(a), CoercedValue::Bool(b)) => a == b,
        (CoercedValue::Null, CoercedValue::Null) => true,
        (CoercedValue::Undefined, CoercedValue::Undefined) => true,
        // IEEE semantics: NaN is never equal to anything
        (CoercedValue::Number(a), CoercedValue::Number(b)) => a == b,
        (CoercedValue::String(a), CoercedValue::String(b)) => a == b,
        _ => false,
    }
}

fn json_deep_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    use serde_json::Value;

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_deep_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| json_deep_eq(x, y)))
        }
        _ => a == b,
    }
}

fn is_quoted(raw: &str) -> bool {
    raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"')
}

fn is_bracketed(raw: &str) -> bool {
    (raw.starts_with('[') && raw.ends_with(']')) || (raw.starts_with('{') && raw.ends_with('}'))
}

/// Numeric literal recognition, deliberately narrower than `f64::from_str`:
/// `nan`, `inf` and friends are not numbers here, `Infinity` is.
fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let (sign, unsigned) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };

    if unsigned == "Infinity" {
        return Some(sign * f64::INFINITY);
    }

    let radix = match unsigned.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        // Signed radix literals are not numbers in JavaScript either
        if sign < 0.0 || s.starts_with('+') {
            return None;
        }
        return u64::from_str_radix(&unsigned[2..], radix).ok().map(|n| n as f64);
    }

    let looks_decimal = unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        && unsigned.bytes().any(|b| b.is_ascii_digit());
    if !looks_decimal {
        return None;
    }

    s.parse::<f64>().ok()
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for CoercedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercedValue::Bool(b) => write!(f, "{}", b),
            CoercedValue::Null => f.write_str("null"),
            CoercedValue::Undefined => f.write_str("undefined"),
            CoercedValue::Number(n) => f.write_str(&format_number(*n)),
            CoercedValue::String(s) => f.write_str(s),
            CoercedValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Serialized as plain JSON. `Undefined` has no JSON form and is written as
/// `null`; non-finite numbers are written as their JavaScript spelling.
impl Serialize for CoercedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CoercedValue::Bool(b) => serializer.serialize_bool(*b),
            CoercedValue::Null | CoercedValue::Undefined => serializer.serialize_unit(),
            CoercedValue::Number(n) if !n.is_finite() => serializer.serialize_str(&format_number(*n)),
            CoercedValue::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*n as i64)
            }
            CoercedValue::Number(n) => serializer.serialize_f64(*n),
            CoercedValue::String(s) => serializer.serialize_str(s),
            CoercedValue::Json(v) => v.serialize(serializer),
        }
    }
}

/// Inverse of `Serialize`, except that `Undefined` reads back as `Null`. The
/// strings `"NaN"`, `"Infinity"` and `"-Infinity"` read back as numbers, so a
/// string value with one of those exact spellings comes back as a number.
impl<'de> Deserialize<'de> for CoercedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value.as_str() {
            Some("NaN") => CoercedValue::Number(f64::NAN),
            Some("Infinity") => CoercedValue::Number(f64::INFINITY),
            Some("-Infinity") => CoercedValue::Number(f64::NEG_INFINITY),
            _ => CoercedValue::from_json(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_literals_become_booleans() {
        assert_eq!(coerce("true"), CoercedValue::Bool(true));
        assert_eq!(coerce("false"), CoercedValue::Bool(false));
        // Only the exact lowercase spelling is a boolean
        assert_eq!(coerce("True"), CoercedValue::String("True".to_string()));
    }

    #[test]
    fn test_null_and_undefined_are_distinct() {
        let null = coerce("null");
        let undefined = coerce("undefined");

        assert_eq!(null, CoercedValue::Null);
        assert_eq!(undefined, CoercedValue::Undefined);
        assert!(!equals(&null, &undefined));
        assert!(!equals(&undefined, &null));
        assert!(equals(&null, &CoercedValue::Null));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(coerce("5"), CoercedValue::Number(5.0));
        assert_eq!(coerce("-2.5"), CoercedValue::Number(-2.5));
        assert_eq!(coerce("1e3"), CoercedValue::Number(1000.0));
        assert_eq!(coerce("0x1F"), CoercedValue::Number(31.0));
        assert_eq!(coerce("-Infinity"), CoercedValue::Number(f64::NEG_INFINITY));
    }

    #[test]
    fn test_non_numbers_stay_strings() {
        assert_eq!(coerce("NaN"), CoercedValue::String("NaN".to_string()));
        assert_eq!(coerce("inf"), CoercedValue::String("inf".to_string()));
        assert_eq!(coerce(""), CoercedValue::String(String::new()));
        assert_eq!(coerce("12abc"), CoercedValue::String("12abc".to_string()));
        assert_eq!(coerce("-0x10"), CoercedValue::String("-0x10".to_string()));
    }

    #[test]
    fn test_quoted_numeral_is_not_a_number() {
        let quoted = coerce("\"5\"");
        assert_eq!(quoted, CoercedValue::String("5".to_string()));
        assert!(!equals(&quoted, &CoercedValue::Number(5.0)));
        assert!(equals(&coerce("5"), &CoercedValue::Number(5.0)));
    }

    #[test]
    fn test_quotes_stripped_exactly_once() {
        assert_eq!(coerce("\"\"hi\"\""), CoercedValue::String("\"hi\"".to_string()));
        assert_eq!(coerce("\""), CoercedValue::String("\"".to_string()));
    }

    #[test]
    fn test_structured_literals() {
        assert_eq!(coerce("[1, 2, 3]"), CoercedValue::Json(json!([1, 2, 3])));
        assert_eq!(coerce("{\"a\": 1}"), CoercedValue::Json(json!({"a": 1})));
        // Not JSON: kept as raw text
        assert_eq!(coerce("{a: 1}"), CoercedValue::String("{a: 1}".to_string()));
    }

    #[test]
    fn test_structured_equality_is_deep() {
        let expected = coerce("{\"b\": [1, 2.0], \"a\": \"x\"}");
        let actual = CoercedValue::Json(json!({"a": "x", "b": [1.0, 2]}));
        assert!(equals(&actual, &expected));

        let different = CoercedValue::Json(json!({"a": "x", "b": [1, 3]}));
        assert!(!equals(&different, &expected));
    }

    #[test]
    fn test_structured_never_equals_primitive() {
        assert!(!equals(&coerce("[]"), &CoercedValue::String("[]".to_string())));
    }

    #[test]
    fn test_nan_never_equal() {
        let nan = CoercedValue::Number(f64::NAN);
        assert!(!equals(&nan, &nan));
    }

    #[test]
    fn test_foreign_literals() {
        assert_eq!(CoercedValue::from_foreign_literal("True"), CoercedValue::Bool(true));
        assert_eq!(CoercedValue::from_foreign_literal("None"), CoercedValue::Null);
        assert_eq!(
            CoercedValue::from_foreign_literal("\"a\\\"b\""),
            CoercedValue::String("a\"b".to_string())
        );
        assert_eq!(CoercedValue::from_foreign_literal("5.0"), CoercedValue::Number(5.0));
        assert_eq!(
            CoercedValue::from_foreign_literal("[1, [2]]"),
            CoercedValue::Json(json!([1, [2]]))
        );
    }

    #[test]
    fn test_serialization() {
        assert_eq!(serde_json::to_string(&CoercedValue::Number(5.0)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&CoercedValue::Number(2.5)).unwrap(), "2.5");
        assert_eq!(serde_json::to_string(&CoercedValue::Number(f64::NAN)).unwrap(), "\"NaN\"");
        assert_eq!(serde_json::to_string(&CoercedValue::Undefined).unwrap(), "null");
        assert_eq!(serde_json::to_string(&coerce("\"5\"")).unwrap(), "\"5\"");
    }

    #[test]
    fn test_non_finite_numbers_read_back_as_numbers() {
        let stored = serde_json::to_string(&vec![
            CoercedValue::Number(f64::NAN),
            CoercedValue::Number(f64::NEG_INFINITY),
            CoercedValue::String("hi".to_string()),
        ])
        .unwrap();
        let read: Vec<CoercedValue> = serde_json::from_str(&stored).unwrap();

        assert!(matches!(read[0], CoercedValue::Number(n) if n.is_nan()));
        assert_eq!(read[1], CoercedValue::Number(f64::NEG_INFINITY));
        assert_eq!(read[2], CoercedValue::String("hi".to_string()));
    }

    #[test]
    fn test_display() {
        assert_eq!(CoercedValue::Number(5.0).to_string(), "5");
        assert_eq!(CoercedValue::Undefined.to_string(), "undefined");
        assert_eq!(coerce("[1,2]").to_string(), "[1,2]");
    }
}
