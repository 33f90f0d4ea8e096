//! Engine Error Types

use crate::rules::TemplateError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that terminate a turn
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid rule document, unknown operation, duplicate names
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No rule set matched the directive, current name or inbound trigger
    #[error("Failed to find rule set for: {0}")]
    RuleSetNotFound(String),

    /// `CurrentRule` names a rule the current rule set does not contain
    #[error("Failed to find current rule '{rule}' in rule set '{rule_set}'")]
    RuleNotFound { rule_set: String, rule: String },

    /// Entity name lookup failed
    #[error("Failed to find {kind} named: {name}")]
    LookupFailed { kind: String, name: String },

    /// The previous rule was the last one in its set
    #[error("Reached the end of rule set '{rule_set}' after rule '{rule}'")]
    Exhausted { rule_set: String, rule: String },

    /// Every remaining rule scored below its threshold
    #[error("Failed to find the next rule in rule set '{0}'")]
    NoRuleActivated(String),

    /// A required input or state attribute is missing
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Rule source could not be read or parsed
    #[error("Rule source error: {0}")]
    Source(String),

    /// Entity directory lookup failed
    #[error("Directory error: {0}")]
    Directory(String),

    /// An action could not be handed to its runner
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl EngineError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "CONFIGURATION",
            EngineError::RuleSetNotFound(_) => "RULE_SET_NOT_FOUND",
            EngineError::RuleNotFound { .. } => "RULE_NOT_FOUND",
            EngineError::LookupFailed { .. } => "LOOKUP_FAILED",
            EngineError::Exhausted { .. } => "RULE_SET_EXHAUSTED",
            EngineError::NoRuleActivated(_) => "NO_RULE_ACTIVATED",
            EngineError::MissingParameter(_) => "MISSING_PARAMETER",
            EngineError::Template(_) => "TEMPLATE",
            EngineError::Store(_) => "STORE",
            EngineError::Source(_) => "RULE_SOURCE",
            EngineError::Directory(_) => "DIRECTORY",
            EngineError::Dispatch(_) => "DISPATCH",
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
