//! In-memory backend

use super::batch::{BatchBackend, StoredAttribute, WriteRequest};
use super::{StoreResult, WriteGuard};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

type Attributes = HashMap<String, StoredAttribute>;

/// Process-local backend, one map per session
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sessions: DashMap<String, Attributes>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Apply requests, then drop whatever has expired by `now`
pub(super) fn apply(attributes: &mut Attributes, requests: Vec<WriteRequest>, now: i64) {
    for request in requests {
        match request {
            WriteRequest::Put {
                key,
                value,
                expires_at,
            } => {
                attributes.insert(key, StoredAttribute { value, expires_at });
            }
            WriteRequest::Delete { key } => {
                attributes.remove(&key);
            }
        }
    }
    purge(attributes, now);
}

/// Remove expired attributes, returning how many went
pub(super) fn purge(attributes: &mut Attributes, now: i64) -> usize {
    let before = attributes.len();
    attributes.retain(|_, a| a.is_live(now));
    before - attributes.len()
}

pub(super) fn live_text<'a>(attributes: &'a Attributes, key: &str, now: i64) -> Option<&'a str> {
    attributes
        .get(key)
        .filter(|a| a.is_live(now))
        .map(|a| a.value.as_str())
}

#[async_trait]
impl BatchBackend for MemoryBackend {
    fn max_batch_size(&self) -> usize {
        25
    }

    async fn query(&self, session_id: &str, now: i64) -> StoreResult<Vec<(String, String)>> {
        Ok(self
            .sessions
            .get(session_id)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter(|(_, a)| a.is_live(now))
                    .map(|(k, a)| (k.clone(), a.value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn batch_write(
        &self,
        session_id: &str,
        now: i64,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<Vec<WriteRequest>> {
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        apply(entry.value_mut(), requests, now);
        let empty = entry.value().is_empty();
        drop(entry);
        if empty {
            self.sessions.remove_if(session_id, |_, attrs| attrs.is_empty());
        }
        Ok(Vec::new())
    }

    async fn conditional_write(
        &self,
        session_id: &str,
        guard: &WriteGuard,
        now: i64,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<bool> {
        // The entry guard holds the shard lock across check and apply
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        if !guard.permits(live_text(entry.value(), &guard.key, now)) {
            return Ok(false);
        }
        apply(entry.value_mut(), requests, now);
        Ok(true)
    }

    async fn purge_expired(&self, now: i64) -> StoreResult<usize> {
        let mut removed = 0;
        self.sessions.retain(|_, attrs| {
            removed += purge(attrs, now);
            !attrs.is_empty()
        });
        Ok(removed)
    }
}
