//! Rule Model
//!
//! Declarative rule sets evaluated against session state.
//!
//! ## Structure
//!
//! ```text
//! RuleSet
//! ├── inboundTriggers   dialled addresses that start this set
//! └── rules (descending priority)
//!     └── Rule
//!         ├── activationThreshold
//!         ├── params      key → ParamValue (text | template | number | reference)
//!         └── conditions  [WeightCondition { field, operation, value, weight }]
//! ```
//!
//! Rule documents are plain JSON. Numbers and booleans may be written as
//! strings, and the older field names (`ruleSetId`, `activation`, `type`,
//! `weights`, `inboundNumbers`) are accepted as aliases.

pub mod activation;
pub mod cache;
pub mod source;
pub mod template;
pub mod validate;
pub mod weight;

pub use activation::{ActivationEngine, ConditionScore, RuleScore};
pub use cache::{CacheStats, RuleSetCache};
pub use source::{JsonFileRuleSource, RuleSource, StaticRuleSource};
pub use template::{HandlebarsTemplates, TemplateError, TemplateResolver};
pub use validate::validate_rule_sets;
pub use weight::WeightEvaluator;

use crate::state::format_number;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A named, ordered collection of rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    #[serde(default, alias = "ruleSetId")]
    pub id: String,

    pub name: String,

    #[serde(default = "default_true", deserialize_with = "de_bool")]
    pub enabled: bool,

    #[serde(default)]
    pub description: String,

    #[serde(default, alias = "inboundNumbers")]
    pub inbound_triggers: Vec<String>,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            enabled: true,
            description: String::new(),
            inbound_triggers: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.inbound_triggers.push(trigger.into());
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Index of a rule by name
    pub fn rule_index(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.name == name)
    }

    pub fn accepts_trigger(&self, trigger: &str) -> bool {
        self.inbound_triggers.iter().any(|t| t == trigger)
    }

    /// Order rules by descending priority, keeping document order for ties
    pub fn sort_rules(&mut self) {
        self.rules
            .sort_by(|a, b| b.priority.total_cmp(&a.priority));
    }
}

/// One candidate step in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default, alias = "ruleId")]
    pub id: String,

    #[serde(default)]
    pub rule_set_id: String,

    pub name: String,

    #[serde(default = "default_true", deserialize_with = "de_bool")]
    pub enabled: bool,

    #[serde(default)]
    pub description: String,

    #[serde(default, deserialize_with = "de_number")]
    pub priority: f64,

    #[serde(default, alias = "activation", deserialize_with = "de_number")]
    pub activation_threshold: f64,

    #[serde(alias = "type")]
    pub action_type: String,

    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,

    #[serde(default, alias = "weights")]
    pub conditions: Vec<WeightCondition>,
}

impl Rule {
    pub fn new(name: impl Into<String>, action_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            rule_set_id: String::new(),
            name,
            enabled: true,
            description: String::new(),
            priority: 0.0,
            activation_threshold: 0.0,
            action_type: action_type.into(),
            params: BTreeMap::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.activation_threshold = threshold;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_condition(mut self, condition: WeightCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// A weighted test of one state attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightCondition {
    #[serde(default, alias = "weightId")]
    pub id: String,

    /// Dot path into session state
    pub field: String,

    pub operation: Operation,

    /// Literal or template compared against the field
    #[serde(default, deserialize_with = "de_opt_text", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(deserialize_with = "de_number")]
    pub weight: f64,
}

impl WeightCondition {
    pub fn new(field: impl Into<String>, operation: Operation, weight: f64) -> Self {
        Self {
            id: String::new(),
            field: field.into(),
            operation,
            value: None,
            weight,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Comparison applied by a [`WeightCondition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Operation {
    Equals,
    NotEquals,
    IsEmpty,
    IsNotEmpty,
    IsNull,
    IsNotNull,
    IsMobile,
    IsNotMobile,
    LessThan,
    GreaterThan,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Equals => "equals",
            Operation::NotEquals => "notequals",
            Operation::IsEmpty => "isempty",
            Operation::IsNotEmpty => "isnotempty",
            Operation::IsNull => "isnull",
            Operation::IsNotNull => "isnotnull",
            Operation::IsMobile => "ismobile",
            Operation::IsNotMobile => "isnotmobile",
            Operation::LessThan => "lessthan",
            Operation::GreaterThan => "greaterthan",
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "equals" => Operation::Equals,
            "notequals" => Operation::NotEquals,
            "isempty" => Operation::IsEmpty,
            "isnotempty" => Operation::IsNotEmpty,
            "isnull" => Operation::IsNull,
            "isnotnull" => Operation::IsNotNull,
            "ismobile" => Operation::IsMobile,
            "isnotmobile" => Operation::IsNotMobile,
            "lessthan" => Operation::LessThan,
            "greaterthan" => Operation::GreaterThan,
            other => return Err(format!("Unhandled weight operation: {other}")),
        })
    }
}

impl TryFrom<String> for Operation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operation> for &'static str {
    fn from(op: Operation) -> Self {
        op.as_str()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of named platform entity a parameter can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Queue,
    Flow,
    Function,
    Prompt,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Queue => "queue",
            EntityKind::Flow => "flow",
            EntityKind::Function => "function",
            EntityKind::Prompt => "prompt",
        })
    }
}

/// A rule parameter.
///
/// Documents may give a bare string (classified as a template when it holds
/// `{{` and `}}`), a bare number, or the tagged form
/// `{"kind": "reference", "entity": "queue", "name": "Sales"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", from = "RawParam")]
pub enum ParamValue {
    Text { value: String },
    Template { value: String },
    Number { value: f64 },
    Reference { entity: EntityKind, name: String },
}

impl ParamValue {
    /// Classify a plain string
    pub fn classify(value: impl Into<String>) -> Self {
        let value = value.into();
        if is_template_text(&value) {
            ParamValue::Template { value }
        } else {
            ParamValue::Text { value }
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        ParamValue::Text {
            value: value.into(),
        }
    }

    pub fn reference(entity: EntityKind, name: impl Into<String>) -> Self {
        ParamValue::Reference {
            entity,
            name: name.into(),
        }
    }

    /// The literal text, before templating or lookup
    pub fn raw_text(&self) -> String {
        match self {
            ParamValue::Text { value } | ParamValue::Template { value } => value.clone(),
            ParamValue::Number { value } => format_number(*value),
            ParamValue::Reference { name, .. } => name.clone(),
        }
    }
}

/// Does this string contain template tags?
pub fn is_template_text(text: &str) -> bool {
    text.contains("{{") && text.contains("}}")
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum TaggedParam {
    Text { value: String },
    Template { value: String },
    Number {
        #[serde(deserialize_with = "de_number")]
        value: f64,
    },
    Reference { entity: EntityKind, name: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawParam {
    Tagged(TaggedParam),
    Number(f64),
    Bool(bool),
    Text(String),
}

impl From<RawParam> for ParamValue {
    fn from(raw: RawParam) -> Self {
        match raw {
            RawParam::Tagged(TaggedParam::Text { value }) => ParamValue::Text { value },
            RawParam::Tagged(TaggedParam::Template { value }) => ParamValue::Template { value },
            RawParam::Tagged(TaggedParam::Number { value }) => ParamValue::Number { value },
            RawParam::Tagged(TaggedParam::Reference { entity, name }) => {
                ParamValue::Reference { entity, name }
            }
            RawParam::Number(value) => ParamValue::Number { value },
            RawParam::Bool(b) => ParamValue::Text {
                value: b.to_string(),
            },
            RawParam::Text(value) => ParamValue::classify(value),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(f64),
    Bool(bool),
    Text(String),
}

fn de_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Scalar::deserialize(deserializer)? {
        Scalar::Number(n) => Ok(n),
        Scalar::Text(s) if s.trim().is_empty() => Ok(0.0),
        Scalar::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected a number, got '{s}'"))),
        Scalar::Bool(b) => Err(de::Error::custom(format!("expected a number, got {b}"))),
    }
}

fn de_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Scalar::deserialize(deserializer)? {
        Scalar::Bool(b) => Ok(b),
        Scalar::Text(s) => Ok(s.trim() == "true"),
        Scalar::Number(n) => Err(de::Error::custom(format!("expected a boolean, got {n}"))),
    }
}

fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => None,
        Some(Scalar::Text(s)) => Some(s),
        Some(Scalar::Number(n)) => Some(format_number(n)),
        Some(Scalar::Bool(b)) => Some(b.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_legacy_rule_document() {
        let rule: Rule = serde_json::from_value(json!({
            "ruleId": "r-1",
            "ruleSetId": "rs-1",
            "name": "Greeting",
            "enabled": "true",
            "priority": "10",
            "activation": "5",
            "type": "Message",
            "params": {
                "message": "Hello {{Customer.FirstName}}",
                "queueName": "Sales",
                "retries": 3
            },
            "weights": [
                {"weightId": "w-1", "field": "Customer", "operation": "isnotnull", "weight": "5"}
            ]
        }))
        .unwrap();

        assert_eq!(rule.id, "r-1");
        assert_eq!(rule.priority, 10.0);
        assert_eq!(rule.activation_threshold, 5.0);
        assert_eq!(rule.action_type, "Message");
        assert!(matches!(rule.params["message"], ParamValue::Template { .. }));
        assert_eq!(rule.params["queueName"], ParamValue::text("Sales"));
        assert_eq!(rule.params["retries"], ParamValue::Number { value: 3.0 });
        assert_eq!(rule.conditions[0].operation, Operation::IsNotNull);
        assert_eq!(rule.conditions[0].weight, 5.0);
    }

    #[test]
    fn test_unknown_operation_rejected_at_parse() {
        let err = serde_json::from_value::<WeightCondition>(json!({
            "field": "A", "operation": "contains", "weight": 1
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Unhandled weight operation: contains"));
    }

    #[test]
    fn test_tagged_reference_param() {
        let param: ParamValue = serde_json::from_value(json!({
            "kind": "reference", "entity": "queue", "name": "Sales"
        }))
        .unwrap();
        assert_eq!(param, ParamValue::reference(EntityKind::Queue, "Sales"));

        let back = serde_json::to_value(&param).unwrap();
        assert_eq!(back, json!({"kind": "reference", "entity": "queue", "name": "Sales"}));
    }

    #[test]
    fn test_condition_value_accepts_numbers() {
        let cond: WeightCondition = serde_json::from_value(json!({
            "field": "Accounts.length", "operation": "greaterthan", "value": 1, "weight": 2
        }))
        .unwrap();
        assert_eq!(cond.value.as_deref(), Some("1"));
    }

    #[test]
    fn test_sort_rules_by_descending_priority() {
        let mut set = RuleSet::new("Main")
            .with_rule(Rule::new("low", "Message").with_priority(1.0))
            .with_rule(Rule::new("high", "Message").with_priority(9.0))
            .with_rule(Rule::new("mid-a", "Message").with_priority(5.0))
            .with_rule(Rule::new("mid-b", "Message").with_priority(5.0));
        set.sort_rules();

        let names: Vec<_> = set.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid-a", "mid-b", "low"]);
    }

    #[test]
    fn test_operation_round_trips_as_lowercase() {
        let json = serde_json::to_string(&Operation::GreaterThan).unwrap();
        assert_eq!(json, "\"greaterthan\"");
    }
}
