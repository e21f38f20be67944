//! AMF value types
//!
//! Only the AMF0 subset that RTMP publishers put on the wire during
//! connect / createStream / publish and in `@setDataFrame` metadata.

use std::collections::HashMap;

/// AMF0 value
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// 0x05
    Null,

    /// 0x06 (also used for 0x0D "unsupported")
    Undefined,

    /// 0x01
    Boolean(bool),

    /// 0x00, IEEE 754 double
    Number(f64),

    /// 0x02 / 0x0C
    String(String),

    /// 0x03, anonymous object
    Object(HashMap<String, AmfValue>),

    /// 0x08, associative array
    EcmaArray(HashMap<String, AmfValue>),

    /// 0x0A, dense array
    Array(Vec<AmfValue>),

    /// 0x0B, milliseconds since the Unix epoch (timezone is ignored)
    Date(f64),
}

impl AmfValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Object or ECMA array properties
    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(map) | AmfValue::EcmaArray(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Look up a property of an object value
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object().and_then(|m| m.get(key))
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_number())
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

/// Build an AMF object from `(key, value)` pairs
pub fn object<K, V, I>(pairs: I) -> AmfValue
where
    K: Into<String>,
    V: Into<AmfValue>,
    I: IntoIterator<Item = (K, V)>,
{
    AmfValue::Object(
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let value = object([("app", AmfValue::from("live")), ("objectEncoding", 0u32.into())]);

        assert_eq!(value.get_string("app"), Some("live"));
        assert_eq!(value.get_number("objectEncoding"), Some(0.0));
        assert!(value.get("missing").is_none());
        assert!(AmfValue::Number(1.0).get("app").is_none());
    }

    #[test]
    fn test_null_or_undefined() {
        assert!(AmfValue::Null.is_null_or_undefined());
        assert!(AmfValue::Undefined.is_null_or_undefined());
        assert!(!AmfValue::Boolean(false).is_null_or_undefined());
    }

    #[test]
    fn test_ecma_array_is_object_like() {
        let mut map = HashMap::new();
        map.insert("width".to_string(), AmfValue::Number(1280.0));
        let value = AmfValue::EcmaArray(map);
        assert_eq!(value.get_number("width"), Some(1280.0));
    }
}
