//! Canonical form for structured values
//!
//! Signatures, hashes and ciphertexts are all computed over the UTF-8 JSON
//! serialization of a [`CanonicalValue`]. Map keys are always sorted, so two
//! values that only differ in key order produce identical bytes.
//!
//! When date parsing is enabled, strings of the exact form
//! `YYYY-MM-DDThh:mm:ss.sssZ` become [`CanonicalValue::Timestamp`]. A
//! timestamp serializes back to the same string, which keeps dates stable
//! across a round trip through the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};

/// Format of timestamps on the wire, millisecond precision, always UTC
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A structured value in canonical form
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

impl Default for CanonicalValue {
    fn default() -> Self {
        CanonicalValue::Null
    }
}

/// Canonicalize a JSON value.
///
/// Maps are rebuilt with sorted keys, arrays keep their order but every
/// element is canonicalized, and `null` stays the single null marker.
pub fn canonicalize(value: &Value, parse_dates: bool) -> CanonicalValue {
    match value {
        Value::Null => CanonicalValue::Null,
        Value::Bool(b) => CanonicalValue::Bool(*b),
        Value::Number(n) => CanonicalValue::Number(n.clone()),
        Value::String(s) => {
            if parse_dates {
                if let Some(timestamp) = parse_timestamp(s) {
                    return CanonicalValue::Timestamp(timestamp);
                }
            }
            CanonicalValue::String(s.clone())
        }
        Value::Array(items) => CanonicalValue::Array(
            items
                .iter()
                .map(|item| canonicalize(item, parse_dates))
                .collect(),
        ),
        Value::Object(map) => CanonicalValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), canonicalize(v, parse_dates)))
                .collect(),
        ),
    }
}

/// Canonicalize anything serde can serialize.
///
/// Values that cannot be represented as JSON collapse to
/// [`CanonicalValue::Null`] instead of failing.
pub fn canonicalize_serialize<T: Serialize + ?Sized>(value: &T, parse_dates: bool) -> CanonicalValue {
    match serde_json::to_value(value) {
        Ok(value) => canonicalize(&value, parse_dates),
        Err(e) => {
            tracing::debug!("value not representable, canonicalized as null: {}", e);
            CanonicalValue::Null
        }
    }
}

/// Parse a string of the exact form `YYYY-MM-DDThh:mm:ss.sssZ`
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let bytes = s.as_bytes();
    if bytes.len() != 24 {
        return None;
    }
    for (i, b) in bytes.iter().enumerate() {
        let ok = match i {
            4 | 7 => *b == b'-',
            10 => *b == b'T',
            13 | 16 => *b == b':',
            19 => *b == b'.',
            23 => *b == b'Z',
            _ => b.is_ascii_digit(),
        };
        if !ok {
            return None;
        }
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

impl CanonicalValue {
    /// Convert back into a plain JSON value. Timestamps become strings.
    pub fn to_value(&self) -> Value {
        match self {
            CanonicalValue::Null => Value::Null,
            CanonicalValue::Bool(b) => Value::Bool(*b),
            CanonicalValue::Number(n) => Value::Number(n.clone()),
            CanonicalValue::String(s) => Value::String(s.clone()),
            CanonicalValue::Timestamp(t) => Value::String(t.format(TIMESTAMP_FORMAT).to_string()),
            CanonicalValue::Array(items) => {
                Value::Array(items.iter().map(CanonicalValue::to_value).collect())
            }
            CanonicalValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }

    /// The UTF-8 JSON bytes that get signed, hashed or encrypted
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CanonicalValue::Null)
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, CanonicalValue>> {
        match self {
            CanonicalValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<BTreeMap<String, CanonicalValue>> {
        match self {
            CanonicalValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&Value> for CanonicalValue {
    fn from(value: &Value) -> Self {
        canonicalize(value, false)
    }
}

impl Serialize for CanonicalValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CanonicalValue::Null => serializer.serialize_unit(),
            CanonicalValue::Bool(b) => serializer.serialize_bool(*b),
            CanonicalValue::Number(n) => n.serialize(serializer),
            CanonicalValue::String(s) => serializer.serialize_str(s),
            CanonicalValue::Timestamp(t) => {
                serializer.serialize_str(&t.format(TIMESTAMP_FORMAT).to_string())
            }
            CanonicalValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            CanonicalValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": [1, {"d": 2, "c": 3}], "x": null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": null, "y": [1, {"c": 3, "d": 2}]}, "b": 1}"#).unwrap();

        let ca = canonicalize(&a, false);
        let cb = canonicalize(&b, false);
        assert_eq!(ca, cb);
        assert_eq!(ca.to_bytes(), cb.to_bytes());
        assert_eq!(
            String::from_utf8(ca.to_bytes()).unwrap(),
            r#"{"a":{"x":null,"y":[1,{"c":3,"d":2}]},"b":1}"#
        );
    }

    #[test]
    fn test_idempotent() {
        let value = json!({
            "when": "2021-03-04T05:06:07.089Z",
            "nested": {"z": [3, 2, 1], "a": "plain"},
            "missing": null
        });

        for parse_dates in [false, true] {
            let once = canonicalize(&value, parse_dates);
            let twice = canonicalize(&once.to_value(), parse_dates);
            assert_eq!(once, twice);
            assert_eq!(once.to_bytes(), twice.to_bytes());
        }
    }

    #[test]
    fn test_date_parsing() {
        let value = json!({"at": "2021-03-04T05:06:07.089Z", "not": "2021-03-04T05:06:07Z"});

        let parsed = canonicalize(&value, true);
        let map = parsed.as_map().unwrap();
        assert!(matches!(map["at"], CanonicalValue::Timestamp(_)));
        assert!(matches!(map["not"], CanonicalValue::String(_)));

        let unparsed = canonicalize(&value, false);
        assert!(matches!(unparsed.as_map().unwrap()["at"], CanonicalValue::String(_)));

        // timestamps serialize back to the same text
        assert_eq!(parsed.to_bytes(), unparsed.to_bytes());
    }

    #[test]
    fn test_invalid_dates_stay_strings() {
        assert!(parse_timestamp("2021-13-04T05:06:07.089Z").is_none());
        assert!(parse_timestamp("2021-03-04 05:06:07.089Z").is_none());
        assert!(parse_timestamp("x2021-03-04T05:06:07.089Z").is_none());
        assert!(parse_timestamp("2021-03-04T05:06:07.089Z").is_some());
    }

    #[test]
    fn test_unsupported_input_is_null() {
        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), 3u8);
        assert_eq!(canonicalize_serialize(&bad, false), CanonicalValue::Null);
    }
}
