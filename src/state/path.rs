//! Dot-path resolution over session state.
//!
//! `Customer.PostCode` walks into objects, `Accounts.length` yields a count,
//! `Accounts.0.AccountNumber` indexes into arrays. A missing segment yields
//! `None`, never an error.

use super::{format_number, SessionState};
use serde_json::Value;

const LENGTH_SEGMENT: &str = "length";

/// Resolve a dot-separated path against session state
pub fn lookup_path(state: &SessionState, path: &str) -> Option<Value> {
    let mut segments = path.split('.').map(str::trim);
    let head = segments.next().filter(|s| !s.is_empty())?;
    let mut current = state.get(head)?.clone();

    for segment in segments {
        current = step(&current, segment)?;
    }

    Some(current)
}

fn step(value: &Value, segment: &str) -> Option<Value> {
    match value {
        Value::Object(map) => map.get(segment).cloned(),
        Value::Array(items) => {
            if segment == LENGTH_SEGMENT {
                Some(Value::from(items.len()))
            } else {
                segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| items.get(idx).cloned())
            }
        }
        Value::String(s) if segment == LENGTH_SEGMENT => Some(Value::from(s.chars().count())),
        _ => None,
    }
}

/// String form of a scalar value.
///
/// Null, arrays and objects have no scalar form.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() => format_number(f),
            _ => n.to_string(),
        }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
