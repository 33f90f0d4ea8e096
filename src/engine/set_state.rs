//! Ordered `keyN`/`valueN` state updates from the calling platform

use crate::rules::weight::parse_number;
use crate::state::{format_number, scalar_text, TrackedState};
use std::collections::BTreeMap;

/// Value that bumps a numeric attribute by one
pub const INCREMENT: &str = "increment";

/// One requested change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Set { key: String, value: String },
    Increment { key: String },
    Delete { key: String },
}

impl StateUpdate {
    pub fn key(&self) -> &str {
        match self {
            StateUpdate::Set { key, .. }
            | StateUpdate::Increment { key }
            | StateUpdate::Delete { key } => key,
        }
    }
}

/// Read `key1`/`value1`, `key2`/`value2`, ... until a `keyN` is missing.
///
/// Empty keys are skipped. A missing, empty or `null` value deletes.
pub fn parse_updates(parameters: &BTreeMap<String, String>) -> Vec<StateUpdate> {
    let mut updates = Vec::new();

    for index in 1.. {
        let Some(key) = parameters.get(&format!("key{index}")) else {
            break;
        };
        if key.is_empty() {
            tracing::warn!(index, "state_update_empty_key_skipped");
            continue;
        }

        let key = key.clone();
        let update = match parameters.get(&format!("value{index}")).map(String::as_str) {
            None | Some("") | Some("null") => StateUpdate::Delete { key },
            Some(INCREMENT) => StateUpdate::Increment { key },
            Some(value) => StateUpdate::Set {
                key,
                value: value.to_string(),
            },
        };
        updates.push(update);
    }

    updates
}

/// Apply updates in order
pub fn apply_updates(state: &mut TrackedState, updates: &[StateUpdate]) {
    for update in updates {
        match update {
            StateUpdate::Set { key, value } => state.set(key.as_str(), value.as_str()),
            StateUpdate::Delete { key } => state.clear(key),
            StateUpdate::Increment { key } => {
                let next = match state.get(key).and_then(scalar_text).as_deref().and_then(parse_number) {
                    Some(current) => format_number(current + 1.0),
                    None => "1".to_string(),
                };
                tracing::debug!(key = %key, value = %next, "state_value_incremented");
                state.set(key.as_str(), next);
            }
        }
    }
}
