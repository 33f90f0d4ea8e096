//! Keypad (DTMF) menu selections and captured input
//!
//! The current rule configures both through its scratch attributes:
//!
//! ```text
//! menu    CurrentRule_dtmf<Option> = <rule set>   (Option: 0-9, Star, Pound, Plus)
//! input   CurrentRule_outputStateKey, CurrentRule_minLength,
//!         CurrentRule_maxLength, CurrentRule_dataType
//! ```

use crate::rules::weight::parse_number;
use crate::rules::{TemplateError, TemplateResolver};
use crate::state::{keys, scalar_text, SessionState};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static NUMBER_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[0-9]*$"));

/// Ten digit local number with a leading zero
static PHONE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^0[0-9]{9}$"));

/// DDMMYYYY, shape only
static DATE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[0-3][0-9][0-1][0-9][1-2][0-9]{3}$"));

/// Input value sent when the caller entered nothing
pub const TIMEOUT_INPUT: &str = "Timeout";

fn matches(pattern: &LazyLock<Result<Regex, regex::Error>>, input: &str) -> bool {
    match LazyLock::force(pattern) {
        Ok(re) => re.is_match(input),
        Err(_) => false,
    }
}

/// Scratch key holding the rule set for a pressed key
pub fn option_key(selected: &str) -> String {
    let option = match selected {
        "*" => "Star",
        "#" => "Pound",
        "+" => "Plus",
        other => other,
    };
    format!("{}{option}", keys::DTMF_OPTION_PREFIX)
}

/// Rule set configured for the pressed key, if any
pub fn menu_target(state: &SessionState, selected: &str) -> Option<String> {
    state.get(&option_key(selected)).and_then(scalar_text)
}

/// Shape a captured input must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Number,
    Phone,
    Date,
    /// Unknown or absent data type; only the length is checked
    Any,
}

impl InputKind {
    pub fn parse(data_type: Option<&str>) -> Self {
        match data_type {
            Some("Number") => InputKind::Number,
            Some("Phone") => InputKind::Phone,
            Some("Date") => InputKind::Date,
            _ => InputKind::Any,
        }
    }

    fn accepts(self, input: &str) -> bool {
        match self {
            InputKind::Number => matches(&NUMBER_RE, input),
            InputKind::Phone => matches(&PHONE_RE, input),
            InputKind::Date => {
                matches(&DATE_RE, input) && NaiveDate::parse_from_str(input, "%d%m%Y").is_ok()
            }
            InputKind::Any => true,
        }
    }
}

/// Validation rules read from the current rule's scratch attributes
#[derive(Debug, Clone, PartialEq)]
pub struct InputRules {
    pub output_key: Option<String>,
    /// Bounds that are absent or not numeric are not enforced
    pub min_length: Option<f64>,
    pub max_length: Option<f64>,
    pub kind: InputKind,
}

impl InputRules {
    pub fn from_state(state: &SessionState) -> Self {
        let text = |key: &str| state.get(key).and_then(scalar_text);
        let bound = |key: &str| text(key).as_deref().and_then(parse_number);

        Self {
            output_key: text(keys::INPUT_OUTPUT_KEY).filter(|k| !k.is_empty()),
            min_length: bound(keys::INPUT_MIN_LENGTH),
            max_length: bound(keys::INPUT_MAX_LENGTH),
            kind: InputKind::parse(text(keys::INPUT_DATA_TYPE).as_deref()),
        }
    }

    /// Is this a usable caller entry?
    pub fn accepts(&self, input: Option<&str>) -> bool {
        let Some(input) = input.filter(|i| *i != TIMEOUT_INPUT) else {
            tracing::debug!("dtmf_input_missing");
            return false;
        };

        let length = input.chars().count() as f64;
        if self.min_length.is_some_and(|min| length < min)
            || self.max_length.is_some_and(|max| length > max)
        {
            tracing::debug!(
                length,
                min = ?self.min_length,
                max = ?self.max_length,
                "dtmf_input_length_rejected"
            );
            return false;
        }

        let accepted = self.kind.accepts(input);
        if !accepted {
            tracing::debug!(kind = ?self.kind, "dtmf_input_shape_rejected");
        }
        accepted
    }
}

/// Current rule attributes rendered against state, plus the validation flag
pub fn input_response(
    templates: &dyn TemplateResolver,
    state: &SessionState,
    valid: bool,
) -> Result<BTreeMap<String, String>, TemplateError> {
    let mut response = BTreeMap::new();
    for (key, value) in state.iter().filter(|(k, _)| keys::is_scratch(k)) {
        let Some(text) = scalar_text(value) else {
            continue;
        };
        let rendered = if templates.is_template(&text) {
            templates.render(&text, state)?
        } else {
            text
        };
        response.insert(key.clone(), rendered);
    }
    response.insert(keys::VALID_INPUT.to_string(), valid.to_string());
    Ok(response)
}
