//! Runtime values.
//!
//! A closed sum type over everything a script can hold. Arrays and objects
//! are shared and mutable; functions are immutable once created.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::object::{Function, PropertyKey, ScriptObject};

/// Handle of an externally supplied result the async processor can await.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PendingId(pub u64);

/// Host value carrying a type tag for operator dispatch.
#[derive(Debug, Clone)]
pub struct TaggedValue {
    /// Type tag looked up in the operator registry.
    pub tag: String,
    /// Underlying representation.
    pub payload: Value,
}

/// A script value.
#[derive(Clone, Default)]
pub enum Value {
    /// The undefined value.
    #[default]
    Undefined,
    /// The null value.
    Null,
    /// A boolean value.
    Boolean(bool),
    /// A numeric value.
    Number(f64),
    /// An arbitrary-precision integer.
    BigInt(BigInt),
    /// A string value.
    String(String),
    /// A shared array.
    Array(Rc<RefCell<Vec<Value>>>),
    /// A shared object.
    Object(Rc<RefCell<ScriptObject>>),
    /// A closure or native function.
    Function(Rc<Function>),
    /// A domain value with a type tag.
    Tagged(Rc<TaggedValue>),
    /// A result that is not available yet.
    Pending(PendingId),
}

impl Value {
    /// Create a string.
    pub fn string<S: Into<String>>(s: S) -> Self {
        Value::String(s.into())
    }

    /// Create an object.
    pub fn object(obj: ScriptObject) -> Self {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    /// Create an array.
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    /// Create a function value.
    pub fn function(function: Function) -> Self {
        Value::Function(Rc::new(function))
    }

    /// Create a tagged domain value.
    pub fn tagged<S: Into<String>>(tag: S, payload: Value) -> Self {
        Value::Tagged(Rc::new(TaggedValue {
            tag: tag.into(),
            payload,
        }))
    }

    /// Check if value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if value is nullish (undefined or null).
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Check if value is a function.
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// The function, if this value is one.
    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    /// The string, if this value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The type tag of a domain value.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Value::Tagged(tagged) => Some(&tagged.tag),
            _ => None,
        }
    }

    /// Get the type of value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Array(_) | Value::Object(_) | Value::Tagged(_) | Value::Pending(_) => "object",
        }
    }

    /// Convert to boolean (ToBoolean).
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::Tagged(tagged) => tagged.payload.to_boolean(),
            _ => true,
        }
    }

    /// Convert to number (ToNumber).
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::BigInt(n) => n.to_f64().unwrap_or(f64::NAN),
            Value::String(s) => parse_number(s),
            Value::Array(elements) => {
                let elements = elements.borrow();
                match elements.as_slice() {
                    [] => 0.0,
                    [single] => single.to_number(),
                    _ => f64::NAN,
                }
            }
            Value::Tagged(tagged) => tagged.payload.to_number(),
            _ => f64::NAN,
        }
    }

    /// Convert to signed 32-bit integer (ToInt32).
    pub fn to_i32(&self) -> i32 {
        to_int32(self.to_number())
    }

    /// Convert to unsigned 32-bit integer (ToUint32).
    pub fn to_u32(&self) -> u32 {
        to_int32(self.to_number()) as u32
    }

    /// Convert to string (ToString).
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::BigInt(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(elements) => elements
                .borrow()
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".into(),
            Value::Function(function) => format!("function {}() {{ [code] }}", function.name()),
            Value::Tagged(tagged) => tagged.payload.to_display_string(),
            Value::Pending(_) => "[object Promise]".into(),
        }
    }

    /// Property key for computed member access.
    pub fn to_property_key(&self) -> PropertyKey {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => {
                PropertyKey::Index(*n as usize)
            }
            other => PropertyKey::from(other.to_display_string()),
        }
    }

    /// Strict equality (===).
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Tagged(a), Value::Tagged(b)) => Rc::ptr_eq(a, b),
            (Value::Pending(a), Value::Pending(b)) => a == b,
            _ => false,
        }
    }

    /// Abstract equality (==).
    pub fn loose_equals(&self, other: &Value) -> bool {
        if std::mem::discriminant(self) == std::mem::discriminant(other) {
            return self.strict_equals(other);
        }

        match (self, other) {
            (Value::Null, Value::Undefined) | (Value::Undefined, Value::Null) => true,
            (Value::Null | Value::Undefined, _) | (_, Value::Null | Value::Undefined) => false,
            (Value::Number(a), Value::String(_)) => *a == other.to_number(),
            (Value::String(_), Value::Number(b)) => self.to_number() == *b,
            (Value::BigInt(a), Value::Number(b)) | (Value::Number(b), Value::BigInt(a)) => {
                a.to_f64().map(|a| a == *b).unwrap_or(false)
            }
            (Value::BigInt(a), Value::String(s)) | (Value::String(s), Value::BigInt(a)) => {
                s.trim().parse::<BigInt>().map(|b| &b == a).unwrap_or(false)
            }
            (Value::Boolean(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Boolean(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Array(_) | Value::Object(_), _) if !other.is_reference() => {
                Value::String(self.to_display_string()).loose_equals(other)
            }
            (_, Value::Array(_) | Value::Object(_)) if !self.is_reference() => {
                self.loose_equals(&Value::String(other.to_display_string()))
            }
            _ => false,
        }
    }

    fn is_reference(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Tagged(_)
        )
    }

    /// Convert from a parsed JSON document.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut obj = ScriptObject::new();
                for (key, value) in map {
                    obj.set(key.clone(), Value::from_json(value));
                }
                Value::object(obj)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::BigInt(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Value::array(elements)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::BigInt(n) => write!(f, "{}n", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(elements) => f.debug_list().entries(elements.borrow().iter()).finish(),
            Value::Object(obj) => {
                let obj = obj.borrow();
                f.debug_map().entries(obj.iter().map(|(k, v)| (k, v))).finish()
            }
            Value::Function(function) => write!(f, "[Function: {}]", function.name()),
            Value::Tagged(tagged) => write!(f, "{}({:?})", tagged.tag, tagged.payload),
            Value::Pending(id) => write!(f, "Pending({})", id.0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && libm::fabs(*n) < 9007199254740992.0 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(_) => serializer.serialize_unit(),
            Value::BigInt(n) => serializer.serialize_str(&n.to_string()),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(elements) => {
                let elements = elements.borrow();
                let mut seq = serializer.serialize_seq(Some(elements.len()))?;
                for element in elements.iter() {
                    seq.serialize_element(element)?;
                }
                seq.end()
            }
            Value::Object(obj) => {
                let obj = obj.borrow();
                let mut map = serializer.serialize_map(Some(obj.len()))?;
                for (key, value) in obj.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Function(function) => {
                serializer.serialize_str(&format!("[Function: {}]", function.name()))
            }
            Value::Tagged(tagged) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("tag", &tagged.tag)?;
                map.serialize_entry("value", &tagged.payload)?;
                map.end()
            }
            Value::Pending(id) => serializer.serialize_str(&format!("[Pending: {}]", id.0)),
        }
    }
}

// Helper functions

/// ToInt32 on a number.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulo = libm::fmod(libm::trunc(n), 4294967296.0);
    let unsigned = if modulo < 0.0 { modulo + 4294967296.0 } else { modulo };
    unsigned as u32 as i32
}

/// Parse a number from string (ToNumber on strings).
pub fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return BigInt::parse_bytes(s[2..].as_bytes(), radix)
            .and_then(|n| n.to_f64())
            .unwrap_or(f64::NAN);
    }

    let valid = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// Convert number to string.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if n == 0.0 {
        return "0".into();
    }

    let magnitude = libm::fabs(n);
    if magnitude >= 1e21 || magnitude < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                format!("{}e+{}", mantissa, exponent)
            }
            _ => formatted,
        };
    }

    format!("{}", n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(parse_number("  42 "), 42.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("0x1F"), 31.0);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert!(parse_number("inf").is_nan());
        assert!(parse_number("12px").is_nan());
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(to_int32(4294967297.0), 1);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_int32(2147483648.0), -2147483648);
    }

    #[test]
    fn test_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::from(1)));
        assert!(Value::from(true).loose_equals(&Value::from(1)));
        assert!(Value::BigInt(BigInt::from(2)).loose_equals(&Value::from(2)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));

        let array = Value::array(vec![]);
        assert!(array.strict_equals(&array.clone()));
        assert!(!array.strict_equals(&Value::array(vec![])));
    }

    #[test]
    fn test_type_of_and_truthiness() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::BigInt(BigInt::from(1)).type_of(), "bigint");
        assert!(!Value::from("").to_boolean());
        assert!(Value::array(vec![]).to_boolean());
        assert!(!Value::BigInt(BigInt::from(0)).to_boolean());
    }

    #[test]
    fn test_serialize() {
        let mut obj = ScriptObject::new();
        obj.set("a", Value::array(vec![Value::from(1), Value::Null]));
        obj.set("b", Value::BigInt(BigInt::from(7)));
        let json = serde_json::to_string(&Value::object(obj)).unwrap();
        assert_eq!(json, r#"{"a":[1,null],"b":"7"}"#);
    }
}
