//! Conditional writes of action status

use super::{timestamp, ActionStatus, TIMEOUT_CAUSE};
use crate::error::EngineResult;
use crate::state::{keys, TrackedState};
use crate::store::{StateStore, WriteGuard};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Writes action lifecycle transitions into session state
#[derive(Clone)]
pub struct ActionLedger {
    store: Arc<dyn StateStore>,
}

fn guard(allowed: &[ActionStatus]) -> WriteGuard {
    WriteGuard::new(
        keys::ACTION_STATUS,
        allowed.iter().map(|s| Some(s.as_str().to_string())).collect(),
    )
}

impl ActionLedger {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// `START` with a fresh start time. Unconditional: a start opens a new lifecycle.
    pub async fn begin(&self, session_id: &str, now: DateTime<Utc>) -> EngineResult<()> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);
        state.set(keys::ACTION_STATUS, ActionStatus::Start.as_str());
        state.set(keys::ACTION_START, timestamp(now));
        state.clear(keys::ACTION_END);
        self.store.save_diff(session_id, &state.diff()).await?;
        Ok(())
    }

    /// `ERROR` and end time after a failed start
    pub async fn abort(&self, session_id: &str, now: DateTime<Utc>) -> EngineResult<()> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);
        state.set(keys::ACTION_STATUS, ActionStatus::Error.as_str());
        state.set(keys::ACTION_END, timestamp(now));
        self.store.save_diff(session_id, &state.diff()).await?;
        Ok(())
    }

    /// `RUN`, only while the status is still `START`
    pub async fn mark_running(&self, session_id: &str) -> EngineResult<bool> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);
        state.set(keys::ACTION_STATUS, ActionStatus::Run.as_str());
        self.write_if(session_id, &guard(&[ActionStatus::Start]), state, ActionStatus::Run)
            .await
    }

    /// `DONE` with the output stored under `output_key`
    pub async fn complete(
        &self,
        session_id: &str,
        output_key: &str,
        output: Value,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);
        state.set(output_key, output);
        state.set(keys::ACTION_STATUS, ActionStatus::Done.as_str());
        state.clear(keys::ACTION_ERROR_CAUSE);
        state.set(keys::ACTION_END, timestamp(now));
        self.write_if(session_id, &Self::running(), state, ActionStatus::Done)
            .await
    }

    /// `ERROR` with a cause; any previous output is cleared
    pub async fn fail(
        &self,
        session_id: &str,
        output_key: Option<&str>,
        cause: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);
        if let Some(key) = output_key {
            state.clear(key);
        }
        state.set(keys::ACTION_STATUS, ActionStatus::Error.as_str());
        state.set(keys::ACTION_ERROR_CAUSE, cause);
        state.set(keys::ACTION_END, timestamp(now));
        self.write_if(session_id, &Self::running(), state, ActionStatus::Error)
            .await
    }

    /// `TIMEOUT` with the standard cause
    pub async fn expire(&self, session_id: &str, now: DateTime<Utc>) -> EngineResult<bool> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);
        state.set(keys::ACTION_STATUS, ActionStatus::Timeout.as_str());
        state.set(keys::ACTION_ERROR_CAUSE, TIMEOUT_CAUSE);
        state.set(keys::ACTION_END, timestamp(now));
        self.write_if(session_id, &Self::running(), state, ActionStatus::Timeout)
            .await
    }

    fn running() -> WriteGuard {
        guard(&[ActionStatus::Start, ActionStatus::Run])
    }

    async fn write_if(
        &self,
        session_id: &str,
        guard: &WriteGuard,
        state: TrackedState,
        status: ActionStatus,
    ) -> EngineResult<bool> {
        let applied = self
            .store
            .save_diff_if(session_id, guard, &state.diff())
            .await?;

        if applied {
            tracing::info!(session_id, status = %status, "action_status_written");
        } else {
            tracing::warn!(
                session_id,
                status = %status,
                current = ?state.baseline().get_str(keys::ACTION_STATUS),
                "action_terminal_write_rejected"
            );
        }
        Ok(applied)
    }
}
