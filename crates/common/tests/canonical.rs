//! Integration tests for the canonical form

use common::canonical::{canonicalize, CanonicalValue};
use serde_json::json;

fn samples() -> Vec<serde_json::Value> {
    vec![
        json!(null),
        json!(true),
        json!(-12.5),
        json!("plain"),
        json!("2024-02-29T23:59:59.999Z"),
        json!([3, {"b": 1, "a": [null, "2020-01-01T00:00:00.000Z"]}, "x"]),
        json!({"z": {"y": {"x": 1}}, "a": [], "m": {}}),
    ]
}

#[test]
fn test_canonicalize_is_idempotent() {
    for value in samples() {
        for parse_dates in [false, true] {
            let once = canonicalize(&value, parse_dates);
            let twice = canonicalize(&once.to_value(), parse_dates);
            assert_eq!(once, twice);
            assert_eq!(once.to_bytes(), twice.to_bytes());
        }
    }
}

#[test]
fn test_key_order_does_not_matter() {
    let a: serde_json::Value =
        serde_json::from_str(r#"{"name": "x", "tags": {"b": 2, "a": 1}, "when": "2024-01-01T00:00:00.000Z"}"#)
            .unwrap();
    let b: serde_json::Value =
        serde_json::from_str(r#"{"when": "2024-01-01T00:00:00.000Z", "tags": {"a": 1, "b": 2}, "name": "x"}"#)
            .unwrap();
    assert_eq!(canonicalize(&a, true), canonicalize(&b, true));
    assert_eq!(
        String::from_utf8(canonicalize(&a, true).to_bytes()).unwrap(),
        r#"{"name":"x","tags":{"a":1,"b":2},"when":"2024-01-01T00:00:00.000Z"}"#
    );
}

#[test]
fn test_only_exact_timestamps_are_dates() {
    let exact = canonicalize(&json!("2024-01-01T00:00:00.000Z"), true);
    assert!(matches!(exact, CanonicalValue::Timestamp(_)));
    for almost in [
        "2024-01-01T00:00:00Z",
        "2024-01-01T00:00:00.000+00:00",
        "2024-13-01T00:00:00.000Z",
        "2024-01-01 00:00:00.000Z",
    ] {
        assert!(matches!(
            canonicalize(&json!(almost), true),
            CanonicalValue::String(_)
        ));
    }
    assert!(matches!(
        canonicalize(&json!("2024-01-01T00:00:00.000Z"), false),
        CanonicalValue::String(_)
    ));
}
