//! Conversions between JSON values and the text that text-only backends store.
//!
//! Text backends (cookies, web storage, OPFS files) hold strings. On write, objects and arrays
//! are serialized to JSON while scalars are stored in their plain string form, so the string
//! `"world"` is stored as `world` rather than `"world"`. On read the stored text is
//! opportunistically decoded as JSON, falling back to the raw string.
//!
//! The asymmetry is inherited by callers: a stored string that happens to look like JSON (e.g.
//! `"42"` or `"true"`) comes back as the decoded number/bool.

use serde_json::Value;

/// Text form of `value` for a backend that only stores strings.
pub fn encode_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // `Value`'s `Display` is compact JSON, which also matches the plain string form of
        // numbers, booleans and null.
        other => other.to_string(),
    }
}

/// Decode stored text without failing.
///
/// Missing or empty text becomes `null`; text that is not valid JSON is returned as a string.
pub fn safe_json_parse(raw: Option<&str>) -> Value {
    match raw {
        None | Some("") => Value::Null,
        Some(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
        }
    }
}

/// [`safe_json_parse`] applied to a value that already went through a JSON channel.
///
/// Worker replies carry raw file text as JSON strings (or `null`); anything else is already
/// decoded and passes through.
pub fn decode_value(value: Value) -> Value {
    match value {
        Value::String(text) => safe_json_parse(Some(&text)),
        other => other,
    }
}

/// Objects and arrays are "structured"; everything else is a scalar.
pub fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_stored_unquoted() {
        assert_eq!(encode_text(&json!("world")), "world");
        assert_eq!(encode_text(&json!({ "ofLife": 42 })), r#"{"ofLife":42}"#);
        assert_eq!(encode_text(&json!([1, "a"])), r#"[1,"a"]"#);
    }

    #[test]
    fn scalars_use_their_string_form() {
        assert_eq!(encode_text(&json!(42)), "42");
        assert_eq!(encode_text(&json!(1.5)), "1.5");
        assert_eq!(encode_text(&json!(true)), "true");
        assert_eq!(encode_text(&Value::Null), "null");
    }

    #[test]
    fn safe_parse_tolerates_missing_empty_and_plain_text() {
        assert_eq!(safe_json_parse(None), Value::Null);
        assert_eq!(safe_json_parse(Some("")), Value::Null);
        assert_eq!(safe_json_parse(Some("world")), json!("world"));
        assert_eq!(safe_json_parse(Some("{not json")), json!("{not json"));
        assert_eq!(
            safe_json_parse(Some(r#"{"ofLife":42}"#)),
            json!({ "ofLife": 42 })
        );
    }

    #[test]
    fn numeric_looking_strings_decode_loosely() {
        // Stored scalars compare loosely: the string "42" comes back as the number 42.
        let stored = encode_text(&json!("42"));
        assert_eq!(safe_json_parse(Some(&stored)), json!(42));
    }

    #[test]
    fn decode_value_only_touches_strings() {
        assert_eq!(decode_value(json!(r#"{"a":1}"#)), json!({ "a": 1 }));
        assert_eq!(decode_value(json!("plain")), json!("plain"));
        assert_eq!(decode_value(json!("")), Value::Null);
        assert_eq!(decode_value(Value::Null), Value::Null);
        assert_eq!(decode_value(json!({ "a": 1 })), json!({ "a": 1 }));
    }
}
