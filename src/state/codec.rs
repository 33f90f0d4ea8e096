//! Persisted value encoding.
//!
//! The external store only holds text. Scalars are stored as-is, structures
//! are stored as JSON text and parsed back on load when the text looks like
//! an object or array.

use serde_json::Value;

/// Encode a state value for persistence.
///
/// Returns `None` for values that mean "delete this attribute" (null and the
/// empty string).
pub fn encode_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Decode persisted text back into a state value
pub fn decode_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    let structured = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));

    if structured {
        match serde_json::from_str(trimmed) {
            Ok(value) => return value,
            Err(e) => {
                tracing::warn!(error = %e, "state_value_parse_failed");
            }
        }
    }

    Value::String(raw.to_string())
}

/// Render a number the way the calling platform expects (`5`, not `5.0`)
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
