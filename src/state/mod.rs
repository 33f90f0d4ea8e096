//! Session State
//!
//! A session is a flat map of attribute name → value. Values are either plain
//! strings or JSON structures (customer records, candidate lists, system
//! attributes).
//!
//! ## Layout
//!
//! ```text
//! SessionState (BTreeMap<String, Value>)
//! ├── persistent keys   CurrentRuleSet, Customer, Accounts, ...
//! └── scratch keys      CurrentRule_* (cleared every inference cycle)
//! ```
//!
//! Writes never rewrite the whole session. Callers mutate a [`TrackedState`]
//! and persist the resulting [`StateDiff`].

mod codec;
mod path;
mod tracked;

pub use codec::{decode_value, encode_value, format_number};
pub use path::{lookup_path, scalar_text};
pub use tracked::{StateDiff, TrackedState};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Opaque session identifier supplied by the calling platform
pub type SessionId = String;

/// Reserved attribute names shared with the calling platform
pub mod keys {
    /// Prefix of per-step scratch attributes
    pub const SCRATCH_PREFIX: &str = "CurrentRule_";

    pub const NEXT_RULE_SET: &str = "NextRuleSet";
    pub const CURRENT_RULE_SET: &str = "CurrentRuleSet";
    pub const CURRENT_RULE: &str = "CurrentRule";
    pub const NEXT_FLOW_LOCATOR: &str = "CurrentRule_nextFlowArn";

    pub const SYSTEM: &str = "System";
    pub const CUSTOMER_PHONE: &str = "CustomerPhoneNumber";
    pub const ORIGINAL_CUSTOMER_NUMBER: &str = "OriginalCustomerNumber";

    pub const ACCOUNTS: &str = "Accounts";
    pub const CUSTOMER: &str = "Customer";
    pub const NO_ACCOUNTS: &str = "NoAccounts";
    pub const ACCOUNT_DISAMBIGUATE: &str = "AccountDisambiguate";

    pub const ACTION_REF: &str = "CurrentRule_functionArn";
    pub const ACTION_TIMEOUT: &str = "CurrentRule_functionTimeout";
    pub const ACTION_OUTPUT_KEY: &str = "CurrentRule_functionOutputKey";
    pub const ACTION_STATUS: &str = "IntegrationStatus";
    pub const ACTION_START: &str = "IntegrationStart";
    pub const ACTION_END: &str = "IntegrationEnd";
    pub const ACTION_ERROR_CAUSE: &str = "IntegrationErrorCause";

    pub const DTMF_OPTION_PREFIX: &str = "CurrentRule_dtmf";
    pub const VALID_SELECTION: &str = "validSelection";
    pub const INPUT_OUTPUT_KEY: &str = "CurrentRule_outputStateKey";
    pub const INPUT_MIN_LENGTH: &str = "CurrentRule_minLength";
    pub const INPUT_MAX_LENGTH: &str = "CurrentRule_maxLength";
    pub const INPUT_DATA_TYPE: &str = "CurrentRule_dataType";
    pub const VALID_INPUT: &str = "CurrentRule_validInput";

    /// Is this a per-step scratch key?
    pub fn is_scratch(key: &str) -> bool {
        key.starts_with(SCRATCH_PREFIX)
    }
}

/// Attribute map for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState {
    attributes: BTreeMap<String, Value>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(attributes: BTreeMap<String, Value>) -> Self {
        Self { attributes }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Get a value only if it is a plain string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.attributes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Resolve a dot-separated path against this state
    pub fn lookup(&self, path: &str) -> Option<Value> {
        lookup_path(self, path)
    }

    /// Apply a diff: puts overwrite, deletes remove
    pub fn apply(&mut self, diff: &StateDiff) {
        for (key, change) in diff.iter() {
            match change {
                Some(value) => {
                    self.attributes.insert(key.clone(), value.clone());
                }
                None => {
                    self.attributes.remove(key);
                }
            }
        }
    }

    /// The string projection handed back to the calling platform.
    ///
    /// Only attributes whose value is a plain string are included; structures
    /// stay server side.
    pub fn string_projection(&self) -> BTreeMap<String, String> {
        self.attributes
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|s| (key.clone(), s.to_string())))
            .collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.attributes
    }
}

impl FromIterator<(String, Value)> for SessionState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}
