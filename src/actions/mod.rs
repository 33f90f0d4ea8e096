//! Action Supervision
//!
//! Long-running external actions are started by one call, run out of band,
//! and report back through session state:
//!
//! ```text
//! START ──► RUN ──► DONE
//!   │        ├────► ERROR
//!   └────────┴────► TIMEOUT
//! ```
//!
//! Terminal statuses are written with a compare-and-set on
//! `IntegrationStatus`, so a late completion can never overwrite a timeout
//! and vice versa.

pub mod ledger;
pub mod registry;
pub mod supervisor;

pub use ledger::ActionLedger;
pub use registry::{ActionHandler, ActionRegistry, ActionRunner, MockHandler};
pub use supervisor::ActionSupervisor;

use crate::state::{keys, SessionState};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cause recorded when the deadline passes first
pub const TIMEOUT_CAUSE: &str = "The request timed out";

/// Lifecycle status stored in `IntegrationStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Start,
    Run,
    Done,
    Error,
    Timeout,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Start => "START",
            ActionStatus::Run => "RUN",
            ActionStatus::Done => "DONE",
            ActionStatus::Error => "ERROR",
            ActionStatus::Timeout => "TIMEOUT",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "START" => Some(ActionStatus::Start),
            "RUN" => Some(ActionStatus::Run),
            "DONE" => Some(ActionStatus::Done),
            "ERROR" => Some(ActionStatus::Error),
            "TIMEOUT" => Some(ActionStatus::Timeout),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Done | ActionStatus::Error | ActionStatus::Timeout
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action attributes of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub status: Option<ActionStatus>,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub error_cause: Option<String>,
    pub output_key: Option<String>,
    pub output: Option<serde_json::Value>,
}

impl ActionRecord {
    pub fn from_state(state: &SessionState) -> Self {
        let text = |key: &str| state.get_str(key).map(str::to_string);
        let output_key = text(keys::ACTION_OUTPUT_KEY);
        let output = output_key.as_deref().and_then(|k| state.get(k).cloned());

        Self {
            status: state.get_str(keys::ACTION_STATUS).and_then(ActionStatus::parse),
            started_at: text(keys::ACTION_START),
            ended_at: text(keys::ACTION_END),
            error_cause: text(keys::ACTION_ERROR_CAUSE),
            output_key,
            output,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(ActionStatus::is_terminal)
    }
}

/// RFC 3339 UTC timestamp as stored in state
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_text() {
        for status in [
            ActionStatus::Start,
            ActionStatus::Run,
            ActionStatus::Done,
            ActionStatus::Error,
            ActionStatus::Timeout,
        ] {
            assert_eq!(ActionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ActionStatus::parse("start"), None);
        assert!(!ActionStatus::Run.is_terminal());
        assert!(ActionStatus::Timeout.is_terminal());
    }

    #[test]
    fn test_record_from_state() {
        let mut state = SessionState::new();
        state.insert("IntegrationStatus", "DONE");
        state.insert("IntegrationStart", "2024-01-01T00:00:00Z");
        state.insert("CurrentRule_functionOutputKey", "Balance");
        state.insert("Balance", json!({"Amount": "12"}));

        let record = ActionRecord::from_state(&state);
        assert_eq!(record.status, Some(ActionStatus::Done));
        assert!(record.is_terminal());
        assert_eq!(record.output, Some(json!({"Amount": "12"})));
        assert!(record.ended_at.is_none());
    }
}
