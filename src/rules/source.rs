//! Rule sources: where rule sets come from

use super::cache::filter_enabled;
use super::{validate_rule_sets, Rule, RuleSet};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Source of truth for rule sets
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Every rule set, enabled or not
    async fn load_rule_sets(&self) -> EngineResult<Vec<RuleSet>>;

    /// Human readable origin for logs
    fn describe(&self) -> String;

    /// Enabled rule sets holding only enabled rules, rules in priority order
    async fn load_enabled_rule_sets(&self) -> EngineResult<Vec<RuleSet>> {
        let rule_sets = self.load_rule_sets().await?;
        validate_rule_sets(&rule_sets)?;
        Ok(filter_enabled(rule_sets))
    }
}

/// Rule sets held in memory
pub struct StaticRuleSource {
    rule_sets: RwLock<Vec<RuleSet>>,
}

impl StaticRuleSource {
    pub fn new(rule_sets: Vec<RuleSet>) -> Self {
        Self {
            rule_sets: RwLock::new(rule_sets),
        }
    }

    /// Swap in new definitions; callers invalidate their cache afterwards
    pub fn replace(&self, rule_sets: Vec<RuleSet>) {
        *self.rule_sets.write() = rule_sets;
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn load_rule_sets(&self) -> EngineResult<Vec<RuleSet>> {
        Ok(self.rule_sets.read().clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Rule sets read from a JSON document.
///
/// Accepted layouts:
///
/// ```json
/// [ { "name": "Main", "rules": [ ... ] } ]
/// { "ruleSets": [ { "ruleSetId": "rs-1", "name": "Main" } ],
///   "rules":    [ { "ruleSetId": "rs-1", "name": "Greeting", ... } ] }
/// ```
///
/// In the second layout flat rules are attached to the rule set with the
/// matching id.
pub struct JsonFileRuleSource {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleDocument {
    List(Vec<RuleSet>),
    Tables {
        #[serde(rename = "ruleSets")]
        rule_sets: Vec<RuleSet>,
        #[serde(default)]
        rules: Vec<Rule>,
    },
}

impl JsonFileRuleSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a rule document
    pub fn parse(text: &str) -> EngineResult<Vec<RuleSet>> {
        let document: RuleDocument = serde_json::from_str(text)
            .map_err(|e| EngineError::Configuration(format!("invalid rule document: {e}")))?;

        match document {
            RuleDocument::List(rule_sets) => Ok(rule_sets),
            RuleDocument::Tables {
                mut rule_sets,
                rules,
            } => {
                for rule in rules {
                    let owner = rule_sets
                        .iter_mut()
                        .find(|rs| rs.id == rule.rule_set_id)
                        .ok_or_else(|| {
                            EngineError::Configuration(format!(
                                "rule '{}' refers to unknown rule set id '{}'",
                                rule.name, rule.rule_set_id
                            ))
                        })?;
                    owner.rules.push(rule);
                }
                Ok(rule_sets)
            }
        }
    }
}

#[async_trait]
impl RuleSource for JsonFileRuleSource {
    async fn load_rule_sets(&self) -> EngineResult<Vec<RuleSet>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::Source(format!("failed to read {}: {e}", self.path.display()))
        })?;
        Self::parse(&text)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
