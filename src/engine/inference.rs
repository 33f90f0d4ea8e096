//! Inference Orchestrator
//!
//! One call per conversational turn:
//!
//! 1. Load the session and remember its baseline
//! 2. Compute `System` on the first turn and capture the caller address
//! 3. Run customer disambiguation
//! 4. Select the rule set, prune `CurrentRule_*`, find the start index
//! 5. Score rules from the start index until one activates
//! 6. Resolve the rule's params and export them into state
//! 7. Persist only the keys that changed

use super::disambiguation::{Disambiguator, EntityDirectory};
use super::dtmf::{input_response, menu_target, InputRules};
use super::lookup::{EntityLookup, ParamResolver};
use super::resolver::{next_activated, prune_scratch, select_rule_set, start_index};
use super::set_state::{apply_updates, parse_updates};
use super::system::{capture_caller, ensure_system_attributes, local_offset};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::rules::{
    ActivationEngine, EntityKind, HandlebarsTemplates, RuleSetCache, RuleSource, TemplateResolver,
    WeightEvaluator,
};
use crate::state::{keys, TrackedState};
use crate::store::StateStore;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Prefix of the flow that runs each action type
pub const FLOW_PREFIX: &str = "RulesEngine";

/// One platform event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInput {
    pub session_id: String,

    /// Dialled address
    #[serde(default, alias = "triggerInput")]
    pub trigger: Option<String>,

    /// Caller's address
    #[serde(default, alias = "callerAddress")]
    pub caller: Option<String>,

    #[serde(default, alias = "rawParameters")]
    pub parameters: BTreeMap<String, String>,
}

impl TurnInput {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// What a turn selected, plus the state handed back to the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub rule_set: String,
    pub rule: String,
    pub action_type: String,
    /// Number of keys written this turn
    pub changed: usize,
    pub attributes: BTreeMap<String, String>,
}

/// Top-level per-turn controller
#[derive(Clone)]
pub struct InferenceEngine {
    store: Arc<dyn StateStore>,
    source: Arc<dyn RuleSource>,
    cache: Arc<RuleSetCache>,
    activation: ActivationEngine,
    params: ParamResolver,
    disambiguator: Disambiguator,
    templates: Arc<dyn TemplateResolver>,
    offset: FixedOffset,
}

impl InferenceEngine {
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn StateStore>,
        source: Arc<dyn RuleSource>,
        cache: Arc<RuleSetCache>,
        lookup: Arc<dyn EntityLookup>,
        directory: Arc<dyn EntityDirectory>,
    ) -> Self {
        let offset = local_offset(config.utc_offset_minutes);
        let templates: Arc<dyn TemplateResolver> = Arc::new(HandlebarsTemplates::with_offset(offset));
        let evaluator = WeightEvaluator::new(config.mobile_prefixes.clone());

        Self {
            store,
            source,
            cache,
            activation: ActivationEngine::new(evaluator, Arc::clone(&templates)),
            params: ParamResolver::new(config, Arc::clone(&templates), lookup),
            disambiguator: Disambiguator::new(directory),
            templates,
            offset,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn source(&self) -> &Arc<dyn RuleSource> {
        &self.source
    }

    pub fn cache(&self) -> &Arc<RuleSetCache> {
        &self.cache
    }

    pub fn activation(&self) -> &ActivationEngine {
        &self.activation
    }

    pub async fn infer(&self, input: &TurnInput) -> EngineResult<TurnOutcome> {
        self.infer_at(input, Utc::now()).await
    }

    /// Run one turn as of `now`
    pub async fn infer_at(&self, input: &TurnInput, now: DateTime<Utc>) -> EngineResult<TurnOutcome> {
        let session_id = input.session_id.as_str();
        tracing::debug!(
            session_id,
            trigger = ?input.trigger,
            parameters = ?input.parameters,
            "inference_started"
        );

        let mut state = TrackedState::new(self.store.load(session_id).await?);

        ensure_system_attributes(&mut state, now, self.offset, input.trigger.as_deref());
        capture_caller(&mut state, input.caller.as_deref());
        let disambiguation = self.disambiguator.run(&mut state).await?;

        let rule_sets = self.cache.get_or_load(self.source.as_ref()).await?;
        let (rule_set, selection) = select_rule_set(&rule_sets, &mut state)?;
        prune_scratch(&mut state);

        let start = start_index(&rule_set, &state)?;
        let (index, score) = next_activated(&self.activation, &rule_set, start, state.state())?;
        let rule = &rule_set.rules[index];

        let params = self.params.resolve(rule, state.state())?;
        let flow = self
            .params
            .require(EntityKind::Flow, &format!("{FLOW_PREFIX}{}", rule.action_type))?;

        state.set(keys::NEXT_FLOW_LOCATOR, flow.locator);
        state.set(keys::CURRENT_RULE, rule.name.clone());
        for (key, value) in params {
            state.set(format!("{}{key}", keys::SCRATCH_PREFIX), value);
        }

        let diff = state.diff();
        self.store.save_diff(session_id, &diff).await?;

        tracing::info!(
            session_id,
            rule_set = %rule_set.name,
            rule = %rule.name,
            action_type = %rule.action_type,
            weight = score.weight,
            start,
            selection = ?selection,
            disambiguation = ?disambiguation,
            changed = diff.len(),
            "rule_activated"
        );

        Ok(TurnOutcome {
            rule_set: rule_set.name.clone(),
            rule: rule.name.clone(),
            action_type: rule.action_type.clone(),
            changed: diff.len(),
            attributes: state.state().string_projection(),
        })
    }

    /// String projection of a session
    pub async fn load_state(&self, session_id: &str) -> EngineResult<BTreeMap<String, String>> {
        let state = self.store.load(session_id).await?;
        tracing::debug!(session_id, attributes = state.len(), "state_projected");
        Ok(state.string_projection())
    }

    /// Apply `keyN`/`valueN` updates and return the string projection
    pub async fn set_state(
        &self,
        session_id: &str,
        parameters: &BTreeMap<String, String>,
    ) -> EngineResult<BTreeMap<String, String>> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);
        let updates = parse_updates(parameters);
        apply_updates(&mut state, &updates);

        let diff = state.diff();
        self.store.save_diff(session_id, &diff).await?;
        tracing::info!(
            session_id,
            updates = updates.len(),
            changed = diff.len(),
            "state_updated"
        );
        Ok(state.state().string_projection())
    }

    /// Route a keypad menu selection to its configured rule set.
    ///
    /// A configured key persists `NextRuleSet`. Either way the reply is the
    /// string projection plus `validSelection`.
    pub async fn dtmf_menu(
        &self,
        session_id: &str,
        selected: &str,
    ) -> EngineResult<BTreeMap<String, String>> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);

        let valid = match menu_target(state.state(), selected) {
            Some(rule_set) => {
                tracing::info!(session_id, selected, rule_set = %rule_set, "dtmf_menu_selected");
                state.set(keys::NEXT_RULE_SET, rule_set);
                self.store.save_diff(session_id, &state.diff()).await?;
                true
            }
            None => {
                tracing::warn!(session_id, selected, "dtmf_menu_invalid_selection");
                false
            }
        };

        let mut projection = state.state().string_projection();
        projection.insert(keys::VALID_SELECTION.to_string(), valid.to_string());
        Ok(projection)
    }

    /// Validate keypad input against the current rule's constraints.
    ///
    /// Valid input is persisted under the rule's output key. The reply is
    /// the rule's `CurrentRule_*` attributes rendered against state, plus
    /// `CurrentRule_validInput`.
    pub async fn dtmf_input(
        &self,
        session_id: &str,
        input: Option<&str>,
    ) -> EngineResult<BTreeMap<String, String>> {
        let mut state = TrackedState::new(self.store.load(session_id).await?);
        let rules = InputRules::from_state(state.state());
        let valid = rules.accepts(input);

        if let (Some(key), Some(value)) = (rules.output_key.as_deref(), input) {
            state.set(key, value);
        }
        let response = input_response(self.templates.as_ref(), state.state(), valid)?;

        if valid {
            let diff = state.diff();
            self.store.save_diff(session_id, &diff).await?;
            tracing::info!(session_id, output_key = ?rules.output_key, changed = diff.len(), "dtmf_input_accepted");
        } else {
            tracing::warn!(session_id, kind = ?rules.kind, "dtmf_input_rejected");
        }
        Ok(response)
    }
}
