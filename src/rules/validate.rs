//! Rule set validation

use super::RuleSet;
use crate::error::{EngineError, EngineResult};
use std::collections::{HashMap, HashSet};

/// Reject duplicate rule set names, duplicate rule names within a set and
/// inbound triggers claimed by more than one enabled rule set
pub fn validate_rule_sets(rule_sets: &[RuleSet]) -> EngineResult<()> {
    let mut names = HashSet::new();
    let mut triggers: HashMap<&str, &str> = HashMap::new();

    for rule_set in rule_sets {
        if rule_set.name.trim().is_empty() {
            return Err(EngineError::Configuration(
                "rule set with empty name".to_string(),
            ));
        }
        if !names.insert(rule_set.name.as_str()) {
            return Err(EngineError::Configuration(format!(
                "duplicate rule set name: {}",
                rule_set.name
            )));
        }

        let mut rule_names = HashSet::new();
        for rule in &rule_set.rules {
            if !rule_names.insert(rule.name.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "duplicate rule name '{}' in rule set '{}'",
                    rule.name, rule_set.name
                )));
            }
        }

        if !rule_set.enabled {
            continue;
        }
        for trigger in &rule_set.inbound_triggers {
            if let Some(other) = triggers.insert(trigger.as_str(), rule_set.name.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "inbound trigger '{trigger}' claimed by rule sets '{other}' and '{}'",
                    rule_set.name
                )));
            }
        }
    }

    Ok(())
}
