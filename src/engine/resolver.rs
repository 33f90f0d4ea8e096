//! Rule set selection and next-rule search

use crate::error::{EngineError, EngineResult};
use crate::rules::{ActivationEngine, RuleScore, RuleSet};
use crate::state::{keys, SessionState, TrackedState};

/// How the current rule set was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// `NextRuleSet` directive, consumed
    Directive,
    /// Continuing in `CurrentRuleSet`
    Current,
    /// First match on the dialled address
    Trigger,
}

/// Pick this turn's rule set and record the choice in state
pub fn select_rule_set(
    rule_sets: &[RuleSet],
    state: &mut TrackedState,
) -> EngineResult<(RuleSet, Selection)> {
    if let Some(name) = state.get_str(keys::NEXT_RULE_SET).map(str::to_string) {
        let rule_set = find_by_name(rule_sets, &name)?;
        state.clear(keys::NEXT_RULE_SET);
        state.clear(keys::CURRENT_RULE);
        state.set(keys::CURRENT_RULE_SET, rule_set.name.clone());
        tracing::info!(rule_set = %rule_set.name, "rule_set_switched");
        return Ok((rule_set, Selection::Directive));
    }

    if let Some(name) = state.get_str(keys::CURRENT_RULE_SET).map(str::to_string) {
        return Ok((find_by_name(rule_sets, &name)?, Selection::Current));
    }

    let dialled = state
        .state()
        .lookup("System.DialledNumber")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let rule_set = rule_sets
        .iter()
        .find(|rs| rs.accepts_trigger(&dialled))
        .cloned()
        .ok_or_else(|| EngineError::RuleSetNotFound(format!("dialled number {dialled}")))?;

    state.set(keys::CURRENT_RULE_SET, rule_set.name.clone());
    state.clear(keys::CURRENT_RULE);
    tracing::info!(rule_set = %rule_set.name, dialled = %dialled, "rule_set_selected_by_trigger");
    Ok((rule_set, Selection::Trigger))
}

fn find_by_name(rule_sets: &[RuleSet], name: &str) -> EngineResult<RuleSet> {
    rule_sets
        .iter()
        .find(|rs| rs.name == name)
        .cloned()
        .ok_or_else(|| EngineError::RuleSetNotFound(format!("name {name}")))
}

/// Drop every `CurrentRule_*` scratch key
pub fn prune_scratch(state: &mut TrackedState) {
    state.clear_where(keys::is_scratch);
}

/// Index of the first rule to consider: after `CurrentRule`, or 0
pub fn start_index(rule_set: &RuleSet, state: &TrackedState) -> EngineResult<usize> {
    let current = state.get_str(keys::CURRENT_RULE);

    let start = match current {
        Some(rule) => {
            rule_set
                .rule_index(rule)
                .ok_or_else(|| EngineError::RuleNotFound {
                    rule_set: rule_set.name.clone(),
                    rule: rule.to_string(),
                })?
                + 1
        }
        None => 0,
    };

    if start >= rule_set.rules.len() {
        return Err(EngineError::Exhausted {
            rule_set: rule_set.name.clone(),
            rule: current.unwrap_or_default().to_string(),
        });
    }
    Ok(start)
}

/// First rule at or after `start` that activates, in list order
pub fn next_activated(
    engine: &ActivationEngine,
    rule_set: &RuleSet,
    start: usize,
    state: &SessionState,
) -> EngineResult<(usize, RuleScore)> {
    rule_set
        .rules
        .iter()
        .enumerate()
        .skip(start)
        .map(|(index, rule)| (index, engine.score(rule, state)))
        .find(|(_, score)| score.activated)
        .ok_or_else(|| EngineError::NoRuleActivated(rule_set.name.clone()))
}
