//! Named action handlers run on the tokio runtime

use super::ActionLedger;
use crate::config::{ActionsConfig, MockActionConfig};
use crate::error::{EngineError, EngineResult};
use crate::state::{keys, SessionState};
use crate::store::StateStore;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Fire-and-forget invocation of an external action
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Hand the action off. Returns once accepted, not once finished.
    async fn dispatch(&self, action_ref: &str, payload: Value) -> EngineResult<()>;
}

/// Body of an action. `Ok` is stored under the rule's output key, `Err`
/// becomes the recorded error cause.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, session_id: &str, state: &SessionState) -> Result<Value, String>;
}

/// Handler that waits, then returns canned output or a canned error
#[derive(Debug, Clone, Default)]
pub struct MockHandler {
    delay: Duration,
    output: Option<Value>,
    error: Option<String>,
}

impl MockHandler {
    pub fn succeeding(output: Value) -> Self {
        Self {
            output: Some(output),
            ..Self::default()
        }
    }

    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl From<&MockActionConfig> for MockHandler {
    fn from(config: &MockActionConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            output: config.output.clone(),
            error: config.error.clone(),
        }
    }
}

#[async_trait]
impl ActionHandler for MockHandler {
    async fn run(&self, _session_id: &str, _state: &SessionState) -> Result<Value, String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(self
                .output
                .clone()
                .unwrap_or_else(|| json!({ "Success": "true" }))),
        }
    }
}

/// Runner backed by in-process handlers.
///
/// An action reference matches a handler registered under the same name, or
/// under its last `:`/`/` separated segment (`arn:...:function:<name>`).
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    ledger: ActionLedger,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ActionRegistry {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            handlers: HashMap::new(),
            ledger: ActionLedger::new(store),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Registry holding one [`MockHandler`] per configured mock
    pub fn from_config(config: &ActionsConfig, store: Arc<dyn StateStore>) -> Self {
        let mut registry = Self::new(store);
        for (name, mock) in &config.mocks {
            registry.register(name.clone(), Arc::new(MockHandler::from(mock)));
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(name, handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatched actions that have not finished yet
    pub fn in_flight(&self) -> usize {
        self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
    }

    fn handler_for(&self, action_ref: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .get(action_ref)
            .or_else(|| {
                action_ref
                    .rsplit([':', '/'])
                    .next()
                    .and_then(|name| self.handlers.get(name))
            })
            .cloned()
    }

    /// Wait for every dispatched action to finish
    pub async fn drain(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "action_task_panicked");
            }
        }
    }
}

#[async_trait]
impl ActionRunner for ActionRegistry {
    async fn dispatch(&self, action_ref: &str, payload: Value) -> EngineResult<()> {
        let session_id = payload
            .get("ContactId")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::MissingParameter("ContactId".to_string()))?
            .to_string();
        let handler = self
            .handler_for(action_ref)
            .ok_or_else(|| EngineError::Dispatch(format!("no action registered for {action_ref}")))?;

        let ledger = self.ledger.clone();
        let action = action_ref.to_string();
        let task = tokio::spawn(async move {
            if let Err(e) = run_action(&ledger, handler.as_ref(), &session_id).await {
                tracing::error!(session_id = %session_id, action = %action, error = %e, "action_run_failed");
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
        Ok(())
    }
}

/// Completion path: `RUN`, then `DONE` or `ERROR`
async fn run_action(
    ledger: &ActionLedger,
    handler: &dyn ActionHandler,
    session_id: &str,
) -> EngineResult<()> {
    let state = ledger.store().load(session_id).await?;

    let Some(output_key) = state.get_str(keys::ACTION_OUTPUT_KEY).map(str::to_string) else {
        let missing = EngineError::MissingParameter(keys::ACTION_OUTPUT_KEY.to_string());
        ledger
            .fail(session_id, None, &missing.to_string(), Utc::now())
            .await?;
        return Err(missing);
    };

    if !ledger.mark_running(session_id).await? {
        return Ok(());
    }

    match handler.run(session_id, &state).await {
        Ok(output) => {
            ledger
                .complete(session_id, &output_key, output, Utc::now())
                .await?;
        }
        Err(cause) => {
            tracing::warn!(session_id, cause = %cause, "action_handler_failed");
            ledger
                .fail(session_id, Some(&output_key), &cause, Utc::now())
                .await?;
        }
    }
    Ok(())
}
