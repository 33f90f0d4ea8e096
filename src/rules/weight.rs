//! Weight evaluation: one condition against one raw value.
//!
//! Pure and side-effect free. The raw value is whatever the condition's
//! field path resolved to (`None` when any segment was missing).

use super::{Operation, WeightCondition};
use crate::state::scalar_text;
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluates weight conditions
#[derive(Debug, Clone)]
pub struct WeightEvaluator {
    mobile_prefixes: Vec<String>,
}

impl Default for WeightEvaluator {
    fn default() -> Self {
        Self::new(vec!["+614".to_string()])
    }
}

impl WeightEvaluator {
    pub fn new(mobile_prefixes: Vec<String>) -> Self {
        Self { mobile_prefixes }
    }

    /// The condition's weight if it holds, else zero.
    ///
    /// `expected` is the condition value after trimming and templating.
    pub fn evaluate(
        &self,
        condition: &WeightCondition,
        expected: Option<&str>,
        raw: Option<&Value>,
    ) -> f64 {
        if self.holds(condition.operation, expected, raw) {
            condition.weight
        } else {
            0.0
        }
    }

    /// Does the operation hold for this raw value?
    pub fn holds(&self, operation: Operation, expected: Option<&str>, raw: Option<&Value>) -> bool {
        // null is indistinguishable from a missing attribute
        let raw = raw.filter(|v| !v.is_null());

        match operation {
            Operation::Equals => equals(expected, raw),
            Operation::NotEquals => !equals(expected, raw),
            Operation::IsEmpty => is_empty(raw),
            Operation::IsNotEmpty => !is_empty(raw),
            Operation::IsNull => raw.is_none(),
            Operation::IsNotNull => raw.is_some(),
            Operation::IsMobile => self.is_mobile(raw),
            Operation::IsNotMobile => !self.is_mobile(raw),
            Operation::LessThan => compare(raw, expected) == Some(Ordering::Less),
            Operation::GreaterThan => compare(raw, expected) == Some(Ordering::Greater),
        }
    }

    fn is_mobile(&self, raw: Option<&Value>) -> bool {
        raw.and_then(scalar_text).is_some_and(|text| {
            self.mobile_prefixes
                .iter()
                .any(|prefix| text.starts_with(prefix.as_str()))
        })
    }
}

/// Scalars compare by string form. Structures never equal a literal.
fn equals(expected: Option<&str>, raw: Option<&Value>) -> bool {
    match raw {
        None => expected.is_none(),
        Some(value) => match scalar_text(value) {
            Some(text) => expected == Some(text.as_str()),
            None => false,
        },
    }
}

fn is_empty(raw: Option<&Value>) -> bool {
    match raw {
        None => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Numeric when both sides parse as numbers, lexicographic otherwise.
/// An absent raw value or expected value never compares.
fn compare(raw: Option<&Value>, expected: Option<&str>) -> Option<Ordering> {
    let raw_text = scalar_text(raw?)?;
    let expected = expected?;

    match (parse_number(&raw_text), parse_number(expected)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(raw_text.as_str().cmp(expected)),
    }
}

/// Numeric parse-ability: rejects empty text, booleans and NaN
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "true" || trimmed == "false" {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
}

pub fn is_number(text: &str) -> bool {
    parse_number(text).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(op: Operation) -> WeightCondition {
        WeightCondition::new("Field", op, 10.0)
    }

    fn eval(op: Operation, expected: Option<&str>, raw: Option<Value>) -> f64 {
        WeightEvaluator::default().evaluate(&cond(op), expected, raw.as_ref())
    }

    #[test]
    fn test_equals_uses_string_form() {
        assert_eq!(eval(Operation::Equals, Some("3"), Some(json!("3"))), 10.0);
        assert_eq!(eval(Operation::Equals, Some("3"), Some(json!(3))), 10.0);
        assert_eq!(eval(Operation::Equals, Some("true"), Some(json!(true))), 10.0);
        assert_eq!(eval(Operation::Equals, Some("3"), Some(json!("4"))), 0.0);
        assert_eq!(eval(Operation::Equals, Some("[]"), Some(json!([]))), 0.0);
        assert_eq!(eval(Operation::NotEquals, Some("3"), None), 10.0);
    }

    #[test]
    fn test_empty_and_null() {
        assert_eq!(eval(Operation::IsEmpty, None, None), 10.0);
        assert_eq!(eval(Operation::IsEmpty, None, Some(json!(null))), 10.0);
        assert_eq!(eval(Operation::IsEmpty, None, Some(json!([]))), 10.0);
        assert_eq!(eval(Operation::IsEmpty, None, Some(json!(""))), 10.0);
        assert_eq!(eval(Operation::IsEmpty, None, Some(json!({}))), 0.0);
        assert_eq!(eval(Operation::IsNotEmpty, None, Some(json!(["x"]))), 10.0);

        assert_eq!(eval(Operation::IsNull, None, None), 10.0);
        assert_eq!(eval(Operation::IsNull, None, Some(json!(""))), 0.0);
        assert_eq!(eval(Operation::IsNotNull, None, Some(json!(""))), 10.0);
    }

    #[test]
    fn test_mobile() {
        assert_eq!(eval(Operation::IsMobile, None, Some(json!("+61412345678"))), 10.0);
        assert_eq!(eval(Operation::IsMobile, None, Some(json!("+61298765432"))), 0.0);
        assert_eq!(eval(Operation::IsMobile, None, None), 0.0);
        assert_eq!(eval(Operation::IsNotMobile, None, None), 10.0);
        assert_eq!(eval(Operation::IsNotMobile, None, Some(json!("+61298765432"))), 10.0);
    }

    #[test]
    fn test_configured_mobile_prefixes() {
        let evaluator = WeightEvaluator::new(vec!["07".to_string(), "+447".to_string()]);
        assert!(evaluator.holds(Operation::IsMobile, None, Some(&json!("+447700900123"))));
        assert!(!evaluator.holds(Operation::IsMobile, None, Some(&json!("+61412345678"))));
    }

    #[test]
    fn test_numeric_versus_lexicographic() {
        // numeric: 10 > 9
        assert_eq!(eval(Operation::GreaterThan, Some("9"), Some(json!("10"))), 10.0);
        // lexicographic: "10" < "9"
        assert_eq!(eval(Operation::GreaterThan, Some("b9"), Some(json!("a10"))), 0.0);
        assert_eq!(eval(Operation::LessThan, Some("b"), Some(json!("a"))), 10.0);
        // booleans are not numbers, so this compares as text
        assert_eq!(eval(Operation::LessThan, Some("true"), Some(json!("1"))), 10.0);
    }

    #[test]
    fn test_absent_never_compares() {
        assert_eq!(eval(Operation::LessThan, Some("5"), None), 0.0);
        assert_eq!(eval(Operation::GreaterThan, Some("5"), None), 0.0);
        assert_eq!(eval(Operation::GreaterThan, None, Some(json!("5"))), 0.0);
    }

    #[test]
    fn test_is_number() {
        assert!(is_number("3"));
        assert!(is_number(" -2.5 "));
        assert!(!is_number(""));
        assert!(!is_number("true"));
        assert!(!is_number("false"));
        assert!(!is_number("abc"));
        assert!(!is_number("NaN"));
    }
}
