//! Change tracking for session state.
//!
//! A [`TrackedState`] remembers the state it was loaded with. After a turn
//! mutates it, [`TrackedState::diff`] yields only the keys whose value changed
//! or that disappeared.

use super::SessionState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Minimal set of changes to persist: `Some` puts a value, `None` deletes it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDiff {
    changes: BTreeMap<String, Option<Value>>,
}

impl StateDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the diff between two full states
    pub fn compute(prior: &SessionState, next: &SessionState) -> Self {
        let mut diff = Self::new();

        for (key, value) in next.iter() {
            if prior.get(key) != Some(value) {
                diff.put(key.clone(), value.clone());
            }
        }

        for key in prior.keys() {
            if !next.contains(key) {
                diff.delete(key.clone());
            }
        }

        diff
    }

    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.changes.insert(key.into(), Some(value));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.changes.insert(key.into(), None);
    }

    pub fn get(&self, key: &str) -> Option<&Option<Value>> {
        self.changes.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Option<Value>)> {
        self.changes.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.changes.keys()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Later changes win
    pub fn merge(&mut self, other: StateDiff) {
        self.changes.extend(other.changes);
    }
}

impl IntoIterator for StateDiff {
    type Item = (String, Option<Value>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Option<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// Session state plus the baseline it was loaded from
#[derive(Debug, Clone, Default)]
pub struct TrackedState {
    baseline: SessionState,
    current: SessionState,
}

impl TrackedState {
    pub fn new(state: SessionState) -> Self {
        Self {
            baseline: state.clone(),
            current: state,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.current
    }

    pub fn baseline(&self) -> &SessionState {
        &self.baseline
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.current.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.current.get_str(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.current.contains(key)
    }

    /// Set a value. Null and the empty string clear the key instead.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let clears = match &value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        };

        if clears {
            self.current.remove(&key);
        } else {
            self.current.insert(key, value);
        }
    }

    /// Remove a key. Clearing an absent key is a no-op and never shows up in
    /// the diff.
    pub fn clear(&mut self, key: &str) {
        self.current.remove(key);
    }

    /// Remove every key matching the predicate
    pub fn clear_where(&mut self, predicate: impl Fn(&str) -> bool) {
        let doomed: Vec<String> = self
            .current
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();
        for key in doomed {
            self.current.remove(&key);
        }
    }

    /// Changes since the baseline
    pub fn diff(&self) -> StateDiff {
        StateDiff::compute(&self.baseline, &self.current)
    }

    /// Mark the current state as persisted
    pub fn commit(&mut self) {
        self.baseline = self.current.clone();
    }

    pub fn into_state(self) -> SessionState {
        self.current
    }
}
