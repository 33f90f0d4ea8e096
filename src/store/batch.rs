//! Batched writes over a text key/value backend

use super::{validate_session_id, StateStore, StoreResult, WriteGuard};
use crate::config::StoreConfig;
use crate::state::{decode_value, encode_value, SessionState, StateDiff};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One persisted attribute: encoded text plus its expiry (unix seconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAttribute {
    pub value: String,
    pub expires_at: i64,
}

impl StoredAttribute {
    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// A single put or delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    Put {
        key: String,
        value: String,
        expires_at: i64,
    },
    Delete {
        key: String,
    },
}

impl WriteRequest {
    pub fn key(&self) -> &str {
        match self {
            WriteRequest::Put { key, .. } | WriteRequest::Delete { key } => key,
        }
    }
}

/// Raw storage used by [`BatchedStateStore`].
///
/// A batch write may commit only part of its requests; the rest come back as
/// the unprocessed remainder and are resubmitted by the caller.
#[async_trait]
pub trait BatchBackend: Send + Sync {
    /// Largest batch the backend accepts
    fn max_batch_size(&self) -> usize;

    /// All attributes of a session that are live at `now`
    async fn query(&self, session_id: &str, now: i64) -> StoreResult<Vec<(String, String)>>;

    /// Apply requests, returning the ones that were not processed.
    /// Attributes already expired at `now` are dropped on the way.
    async fn batch_write(
        &self,
        session_id: &str,
        now: i64,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<Vec<WriteRequest>>;

    /// Apply every request atomically if the guard holds at `now`
    async fn conditional_write(
        &self,
        session_id: &str,
        guard: &WriteGuard,
        now: i64,
        requests: Vec<WriteRequest>,
    ) -> StoreResult<bool>;

    /// Physically remove every attribute expired at `now`, across sessions.
    /// Returns the number removed.
    async fn purge_expired(&self, now: i64) -> StoreResult<usize>;
}

/// [`StateStore`] over any [`BatchBackend`]
pub struct BatchedStateStore<B> {
    backend: B,
    retention_secs: i64,
    max_batch_size: usize,
}

impl<B: BatchBackend> BatchedStateStore<B> {
    pub fn new(backend: B, config: &StoreConfig) -> Self {
        Self::with_limits(backend, config.retention_secs, config.max_batch_size)
    }

    pub fn with_limits(backend: B, retention_secs: u64, max_batch_size: usize) -> Self {
        Self {
            backend,
            retention_secs: i64::try_from(retention_secs).unwrap_or(i64::MAX),
            max_batch_size,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn batch_limit(&self) -> usize {
        self.max_batch_size.min(self.backend.max_batch_size()).max(1)
    }

    fn requests(&self, diff: &StateDiff, now: i64) -> Vec<WriteRequest> {
        let expires_at = now.saturating_add(self.retention_secs);
        diff.iter()
            .map(|(key, change)| match change.as_ref().and_then(encode_value) {
                Some(value) => WriteRequest::Put {
                    key: key.clone(),
                    value,
                    expires_at,
                },
                None => WriteRequest::Delete { key: key.clone() },
            })
            .collect()
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl<B: BatchBackend> StateStore for BatchedStateStore<B> {
    async fn load(&self, session_id: &str) -> StoreResult<SessionState> {
        validate_session_id(session_id)?;
        let rows = self.backend.query(session_id, now_secs()).await?;

        let state: SessionState = rows
            .into_iter()
            .map(|(key, raw)| {
                let value = decode_value(&raw);
                (key, value)
            })
            .collect();

        tracing::debug!(session_id, attributes = state.len(), "state_loaded");
        Ok(state)
    }

    async fn save_diff(&self, session_id: &str, diff: &StateDiff) -> StoreResult<()> {
        validate_session_id(session_id)?;
        if diff.is_empty() {
            return Ok(());
        }

        let now = now_secs();
        let requests = self.requests(diff, now);
        let limit = self.batch_limit();

        for chunk in requests.chunks(limit) {
            let mut pending = chunk.to_vec();
            let mut resubmits = 0u32;
            loop {
                let unprocessed = self.backend.batch_write(session_id, now, pending).await?;
                if unprocessed.is_empty() {
                    break;
                }
                resubmits += 1;
                tracing::debug!(
                    session_id,
                    remaining = unprocessed.len(),
                    resubmits,
                    "state_batch_resubmit"
                );
                pending = unprocessed;
                tokio::task::yield_now().await;
            }
        }

        tracing::debug!(session_id, changes = diff.len(), "state_diff_persisted");
        Ok(())
    }

    async fn save_diff_if(
        &self,
        session_id: &str,
        guard: &WriteGuard,
        diff: &StateDiff,
    ) -> StoreResult<bool> {
        validate_session_id(session_id)?;
        let now = now_secs();
        let requests = self.requests(diff, now);
        let applied = self
            .backend
            .conditional_write(session_id, guard, now, requests)
            .await?;

        if applied {
            tracing::debug!(session_id, changes = diff.len(), guard = %guard.key, "state_diff_persisted");
        } else {
            tracing::debug!(session_id, guard = %guard.key, "state_guard_rejected");
        }
        Ok(applied)
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let removed = self.backend.purge_expired(now_secs()).await?;
        if removed > 0 {
            tracing::info!(removed, "expired_attributes_purged");
        }
        Ok(removed)
    }
}
