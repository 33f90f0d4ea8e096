//! Rule activation scoring.
//!
//! Rule definitions are shared and immutable; every evaluation produces a
//! fresh [`RuleScore`].

use super::{Rule, TemplateResolver, WeightEvaluator};
use crate::state::SessionState;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionScore {
    pub field: String,
    pub activated: bool,
    pub weight: f64,
}

/// Outcome of scoring one rule against one state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleScore {
    pub rule: String,
    pub activated: bool,
    pub weight: f64,
    pub threshold: f64,
    pub conditions: Vec<ConditionScore>,
}

/// Applies the weight evaluator across a rule's conditions
#[derive(Clone)]
pub struct ActivationEngine {
    evaluator: WeightEvaluator,
    templates: Arc<dyn TemplateResolver>,
}

impl ActivationEngine {
    pub fn new(evaluator: WeightEvaluator, templates: Arc<dyn TemplateResolver>) -> Self {
        Self {
            evaluator,
            templates,
        }
    }

    pub fn evaluator(&self) -> &WeightEvaluator {
        &self.evaluator
    }

    /// Score a rule. Activated iff the summed weight reaches the threshold.
    pub fn score(&self, rule: &Rule, state: &SessionState) -> RuleScore {
        let mut total = 0.0;
        let mut conditions = Vec::with_capacity(rule.conditions.len());

        for condition in &rule.conditions {
            let field = condition.field.trim();
            let raw = state.lookup(field);
            let expected = condition
                .value
                .as_deref()
                .map(|v| self.resolve_value(v.trim(), state));

            let activated = self
                .evaluator
                .holds(condition.operation, expected.as_deref(), raw.as_ref());
            let earned = if activated { condition.weight } else { 0.0 };
            total += earned;

            conditions.push(ConditionScore {
                field: field.to_string(),
                activated,
                weight: earned,
            });
        }

        let activated = total >= rule.activation_threshold;
        tracing::trace!(
            rule = %rule.name,
            weight = total,
            threshold = rule.activation_threshold,
            activated,
            "rule_scored"
        );

        RuleScore {
            rule: rule.name.clone(),
            activated,
            weight: total,
            threshold: rule.activation_threshold,
            conditions,
        }
    }

    /// Render a templated condition value; on failure keep it unrendered
    fn resolve_value(&self, value: &str, state: &SessionState) -> String {
        if !self.templates.is_template(value) {
            return value.to_string();
        }
        match self.templates.render(value, state) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(value, error = %e, "condition_value_render_failed");
                value.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{HandlebarsTemplates, Operation, WeightCondition};
    use serde_json::json;

    fn engine() -> ActivationEngine {
        ActivationEngine::new(WeightEvaluator::default(), Arc::new(HandlebarsTemplates::new()))
    }

    fn rule(threshold: f64) -> Rule {
        Rule::new("R", "Message")
            .with_threshold(threshold)
            .with_condition(WeightCondition::new("A", Operation::IsNotNull, 3.0))
            .with_condition(WeightCondition::new("B", Operation::IsNotNull, 4.0))
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut state = SessionState::new();
        state.insert("A", "x");
        state.insert("B", "y");

        assert!(engine().score(&rule(7.0), &state).activated);
        assert!(!engine().score(&rule(7.5), &state).activated);
    }

    #[test]
    fn test_zero_threshold_without_conditions_activates() {
        let rule = Rule::new("Always", "Message");
        let score = engine().score(&rule, &SessionState::new());
        assert!(score.activated);
        assert_eq!(score.weight, 0.0);
    }

    #[test]
    fn test_negative_weights_subtract() {
        let rule = Rule::new("R", "Message")
            .with_threshold(1.0)
            .with_condition(WeightCondition::new("A", Operation::IsNotNull, 5.0))
            .with_condition(WeightCondition::new("B", Operation::IsNotNull, -5.0));
        let mut state = SessionState::new();
        state.insert("A", "x");
        state.insert("B", "y");

        let score = engine().score(&rule, &state);
        assert_eq!(score.weight, 0.0);
        assert!(!score.activated);
        assert!(score.conditions.iter().all(|c| c.activated));
    }

    #[test]
    fn test_zero_weight_condition_still_reported() {
        let rule = Rule::new("R", "Message")
            .with_condition(WeightCondition::new("A", Operation::IsNotNull, 0.0))
            .with_condition(WeightCondition::new("B", Operation::IsNotNull, 0.0));
        let mut state = SessionState::new();
        state.insert("A", "x");

        let score = engine().score(&rule, &state);
        assert!(score.activated);
        assert!(score.conditions[0].activated);
        assert_eq!(score.conditions[0].weight, 0.0);
        assert!(!score.conditions[1].activated);
    }

    #[test]
    fn test_templated_value_and_trimming() {
        let rule = Rule::new("R", "Message").with_threshold(1.0).with_condition(
            WeightCondition::new(" Customer.PostCode ", Operation::Equals, 1.0)
                .with_value(" {{PostCode}} "),
        );
        let mut state = SessionState::new();
        state.insert("Customer", json!({"PostCode": "3000"}));
        state.insert("PostCode", "3000");

        assert!(engine().score(&rule, &state).activated);
    }

    #[test]
    fn test_broken_template_left_unrendered() {
        let rule = Rule::new("R", "Message").with_threshold(1.0).with_condition(
            WeightCondition::new("A", Operation::Equals, 1.0).with_value("{{nope A}}"),
        );
        let mut state = SessionState::new();
        state.insert("A", "{{nope A}}");

        assert!(engine().score(&rule, &state).activated);
    }

    #[test]
    fn test_rule_definition_untouched() {
        let rule = rule(1.0);
        let before = rule.clone();
        let _ = engine().score(&rule, &SessionState::new());
        assert_eq!(rule, before);
    }
}
