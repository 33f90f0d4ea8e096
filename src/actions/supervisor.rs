//! Action start and timeout detection

use super::{ActionLedger, ActionRecord, ActionRunner, ActionStatus};
use crate::error::{EngineError, EngineResult};
use crate::rules::weight::parse_number;
use crate::state::keys;
use crate::store::StateStore;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Starts actions and detects ones that missed their deadline
#[derive(Clone)]
pub struct ActionSupervisor {
    store: Arc<dyn StateStore>,
    ledger: ActionLedger,
    runner: Arc<dyn ActionRunner>,
}

impl ActionSupervisor {
    pub fn new(store: Arc<dyn StateStore>, runner: Arc<dyn ActionRunner>) -> Self {
        Self {
            ledger: ActionLedger::new(Arc::clone(&store)),
            store,
            runner,
        }
    }

    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    pub async fn start(&self, session_id: &str) -> ActionStatus {
        self.start_at(session_id, Utc::now()).await
    }

    /// Record `START` and dispatch the action. Failures are recorded as
    /// `ERROR` and reported in the returned status, never as an error.
    pub async fn start_at(&self, session_id: &str, now: DateTime<Utc>) -> ActionStatus {
        match self.try_start(session_id, now).await {
            Ok(()) => ActionStatus::Start,
            Err(e) => {
                tracing::error!(session_id, error = %e, "action_start_failed");
                if let Err(record) = self.ledger.abort(session_id, now).await {
                    tracing::error!(session_id, error = %record, "action_failure_not_recorded");
                }
                ActionStatus::Error
            }
        }
    }

    async fn try_start(&self, session_id: &str, now: DateTime<Utc>) -> EngineResult<()> {
        let state = self.store.load(session_id).await?;
        let action_ref = state
            .get_str(keys::ACTION_REF)
            .ok_or_else(|| EngineError::MissingParameter(keys::ACTION_REF.to_string()))?
            .to_string();
        if !state.contains(keys::ACTION_TIMEOUT) {
            return Err(EngineError::MissingParameter(keys::ACTION_TIMEOUT.to_string()));
        }

        self.ledger.begin(session_id, now).await?;
        self.runner
            .dispatch(&action_ref, json!({ "ContactId": session_id }))
            .await?;

        tracing::info!(session_id, action = %action_ref, "action_started");
        Ok(())
    }

    pub async fn check_timeout(&self, session_id: &str) -> EngineResult<BTreeMap<String, String>> {
        self.check_timeout_at(session_id, Utc::now()).await
    }

    /// Mark the action `TIMEOUT` once `now` is past start + timeout.
    /// Returns the string projection of the session afterwards.
    pub async fn check_timeout_at(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<BTreeMap<String, String>> {
        let state = self.store.load(session_id).await?;
        let deadline = deadline(
            state.get_str(keys::ACTION_START),
            state.get_str(keys::ACTION_TIMEOUT),
        )?;

        if now <= deadline {
            tracing::debug!(session_id, remaining_ms = (deadline - now).num_milliseconds(), "action_within_deadline");
            return Ok(state.string_projection());
        }

        let record = ActionRecord::from_state(&state);
        if record.is_terminal() {
            return Ok(state.string_projection());
        }

        tracing::warn!(
            session_id,
            overdue_secs = (now - deadline).num_seconds(),
            "action_timeout_detected"
        );
        self.ledger.expire(session_id, now).await?;
        Ok(self.store.load(session_id).await?.string_projection())
    }
}

/// Start time plus timeout seconds
fn deadline(started_at: Option<&str>, timeout: Option<&str>) -> EngineResult<DateTime<Utc>> {
    let started_at =
        started_at.ok_or_else(|| EngineError::MissingParameter(keys::ACTION_START.to_string()))?;
    let timeout =
        timeout.ok_or_else(|| EngineError::MissingParameter(keys::ACTION_TIMEOUT.to_string()))?;

    let start = DateTime::parse_from_rfc3339(started_at)
        .map_err(|e| {
            EngineError::Configuration(format!("invalid {}: {started_at}: {e}", keys::ACTION_START))
        })?
        .with_timezone(&Utc);
    let invalid_timeout =
        || EngineError::Configuration(format!("invalid {}: {timeout}", keys::ACTION_TIMEOUT));

    let millis = parse_number(timeout)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s * 1000.0)
        .filter(|ms| *ms < i64::MAX as f64)
        .ok_or_else(invalid_timeout)?;

    Duration::try_milliseconds(millis as i64)
        .and_then(|delta| start.checked_add_signed(delta))
        .ok_or_else(invalid_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline() {
        let d = deadline(Some("2024-01-01T00:00:00Z"), Some("30")).unwrap();
        assert_eq!(d.to_rfc3339(), "2024-01-01T00:00:30+00:00");
    }

    #[test]
    fn test_deadline_requires_both() {
        assert!(matches!(
            deadline(None, Some("30")),
            Err(EngineError::MissingParameter(_))
        ));
        assert!(matches!(
            deadline(Some("2024-01-01T00:00:00Z"), None),
            Err(EngineError::MissingParameter(_))
        ));
        assert!(matches!(
            deadline(Some("2024-01-01T00:00:00Z"), Some("soon")),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_deadline_rejects_out_of_range_timeouts() {
        for timeout in ["inf", "-inf", "1e14", "1e300", "-5"] {
            assert!(
                matches!(
                    deadline(Some("2024-01-01T00:00:00Z"), Some(timeout)),
                    Err(EngineError::Configuration(_))
                ),
                "{timeout}"
            );
        }
        let d = deadline(Some("2024-01-01T00:00:00Z"), Some("1.5")).unwrap();
        assert_eq!(d.to_rfc3339(), "2024-01-01T00:00:01.500+00:00");
    }
}
