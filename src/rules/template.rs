//! Template rendering against session state.
//!
//! Templates are Handlebars with escaping disabled. On top of the
//! built-in block helpers (`#each`, `#if`, `#unless`, `#with`) these are
//! registered:
//!
//! | helper | output |
//! |---|---|
//! | `json x` | `x` as JSON text |
//! | `inc x` | integer `x` plus one |
//! | `#ifeq a b` | block when `a` equals `b`, `else` otherwise |
//! | `characterSpeechSlow x` | characters of `x` joined by `", "` |
//! | `characterSpeechFast x` | characters of `x` joined by `" "` |
//! | `formatCentsAsDollars x` | `$12.34` for `1234`, `unknown dollars` when absent |
//! | `dateOfBirthHuman x` | `1st of February 1980` for `01021980` |
//! | `dateLocalHuman x tz` | local date of a UTC timestamp, `3rd of June 2024` |
//! | `dayLocalHuman x tz` | `Monday, 3rd of June` |
//! | `timeLocalHuman x tz` | `6:15pm` |
//!
//! The `tz` argument of the local-time helpers is an offset (`+10:00`,
//! `-0530` or minutes east of UTC). Anything else falls back to the
//! configured local offset.

use super::is_template_text;
use crate::state::{scalar_text, SessionState};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
    RenderErrorReason, Renderable,
};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Template render failed: {0}")]
    Render(String),
}

/// Renders templated text against session state
pub trait TemplateResolver: Send + Sync {
    fn is_template(&self, text: &str) -> bool;

    fn render(&self, template: &str, state: &SessionState) -> Result<String, TemplateError>;
}

/// Handlebars registry with the rule-parameter helper set
pub struct HandlebarsTemplates {
    handlebars: Handlebars<'static>,
}

impl HandlebarsTemplates {
    /// Local-time helpers default to UTC
    pub fn new() -> Self {
        Self::with_offset(Utc.fix())
    }

    pub fn with_offset(offset: FixedOffset) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(no_escape);

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("inc", Box::new(inc_helper));
        handlebars.register_helper("ifeq", Box::new(ifeq_helper));
        handlebars.register_helper("characterSpeechSlow", Box::new(speech_slow_helper));
        handlebars.register_helper("characterSpeechFast", Box::new(speech_fast_helper));
        handlebars.register_helper("formatCentsAsDollars", Box::new(cents_helper));
        handlebars.register_helper("dateOfBirthHuman", Box::new(date_of_birth_helper));
        handlebars.register_helper("dateLocalHuman", Box::new(LocalTime::new(offset, LocalFormat::Date)));
        handlebars.register_helper("dayLocalHuman", Box::new(LocalTime::new(offset, LocalFormat::Day)));
        handlebars.register_helper("timeLocalHuman", Box::new(LocalTime::new(offset, LocalFormat::Time)));

        Self { handlebars }
    }
}

impl Default for HandlebarsTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlebarsTemplates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlebarsTemplates").finish_non_exhaustive()
    }
}

impl TemplateResolver for HandlebarsTemplates {
    fn is_template(&self, text: &str) -> bool {
        is_template_text(text)
    }

    fn render(&self, template: &str, state: &SessionState) -> Result<String, TemplateError> {
        self.handlebars
            .render_template(template, state)
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}

// Helpers

/// First argument, with missing paths and `null` treated as absent
fn arg<'a>(h: &'a Helper, index: usize) -> Option<&'a Value> {
    h.param(index).map(|p| p.value()).filter(|v| !v.is_null())
}

fn text(value: &Value) -> String {
    scalar_text(value).unwrap_or_else(|| value.to_string())
}

fn helper_error(helper: &str, message: String) -> RenderErrorReason {
    RenderErrorReason::Other(format!("{helper}: {message}"))
}

fn json_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    if let Some(v) = arg(h, 0) {
        let json = serde_json::to_string(v).map_err(|e| helper_error("json", e.to_string()))?;
        out.write(&json)?;
    }
    Ok(())
}

fn inc_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = arg(h, 0).map(text).unwrap_or_default();
    let n = leading_integer(&value)
        .ok_or_else(|| helper_error("inc", format!("'{value}' is not an integer")))?;
    out.write(&(n + 1).to_string())?;
    Ok(())
}

/// `{{#ifeq a b}}...{{else}}...{{/ifeq}}` with scalars compared by text
fn ifeq_helper<'reg, 'rc>(
    h: &Helper<'rc>,
    r: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    let equal = match (arg(h, 0), arg(h, 1)) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b || text(a) == text(b),
        _ => false,
    };

    let branch = if equal { h.template() } else { h.inverse() };
    match branch {
        Some(t) => t.render(r, ctx, rc, out),
        None => Ok(()),
    }
}

fn speech_slow_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&spell(arg(h, 0), ", "))?;
    Ok(())
}

fn speech_fast_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&spell(arg(h, 0), " "))?;
    Ok(())
}

fn cents_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let Some(value) = arg(h, 0) else {
        out.write("unknown dollars")?;
        return Ok(());
    };
    let value = text(value);
    let cents: f64 = value
        .trim()
        .parse()
        .map_err(|_| helper_error("formatCentsAsDollars", format!("'{value}' is not a number")))?;
    out.write(&format!("${:.2}", cents * 0.01))?;
    Ok(())
}

/// `DDMMYYYY`, separators ignored
fn date_of_birth_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let Some(value) = arg(h, 0) else {
        return Ok(());
    };
    let value = text(value);
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    match NaiveDate::parse_from_str(&digits, "%d%m%Y") {
        Ok(date) => out.write(&format!(
            "{} of {}",
            ordinal(date.day()),
            date.format("%B %Y")
        ))?,
        Err(_) => out.write(&value)?,
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum LocalFormat {
    Date,
    Day,
    Time,
}

/// Formats a UTC timestamp in a local offset
struct LocalTime {
    offset: FixedOffset,
    format: LocalFormat,
}

impl LocalTime {
    fn new(offset: FixedOffset, format: LocalFormat) -> Self {
        Self { offset, format }
    }

    fn format(&self, timestamp: &str, zone: Option<&Value>) -> Option<String> {
        let offset = zone.map(text).as_deref().and_then(parse_offset).unwrap_or(self.offset);
        let local = DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&offset);
        Some(match self.format {
            LocalFormat::Date => format!("{} of {}", ordinal(local.day()), local.format("%B %Y")),
            LocalFormat::Day => format!(
                "{}, {} of {}",
                local.format("%A"),
                ordinal(local.day()),
                local.format("%B")
            ),
            LocalFormat::Time => local.format("%-I:%M%P").to_string(),
        })
    }
}

impl HelperDef for LocalTime {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let Some(value) = arg(h, 0) else {
            return Ok(());
        };
        let timestamp = text(value);
        match self.format(&timestamp, arg(h, 1)) {
            Some(formatted) => out.write(&formatted)?,
            None => out.write(&timestamp)?,
        }
        Ok(())
    }
}

/// `+10:00`, `-0530` or whole minutes east of UTC
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let zone = zone.trim();
    if let Ok(minutes) = zone.parse::<i32>() {
        return FixedOffset::east_opt(minutes.checked_mul(60)?);
    }

    let (sign, rest) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{day}{suffix}")
}

fn spell(value: Option<&Value>, separator: &str) -> String {
    value
        .map(|v| {
            text(v)
                .chars()
                .map(String::from)
                .collect::<Vec<_>>()
                .join(separator)
        })
        .unwrap_or_default()
}

/// Integer prefix of the text, the way `parseInt` reads it
fn leading_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> SessionState {
        let mut state = SessionState::new();
        state.insert("Customer", json!({"FirstName": "Ann", "Balance": "12345"}));
        state.insert(
            "Accounts",
            json!([{"AccountNumber": "A1"}, {"AccountNumber": "A2"}]),
        );
        state.insert("Index", "2");
        state.insert("Pin", "1234");
        state.insert("DateOfBirth", "01021980");
        state.insert("Start", "2024-06-03T08:15:00Z");
        state
    }

    fn render(template: &str) -> Result<String, TemplateError> {
        HandlebarsTemplates::new().render(template, &state())
    }

    #[test]
    fn test_substitution() {
        assert_eq!(render("Hi {{Customer.FirstName}}!").unwrap(), "Hi Ann!");
        assert_eq!(render("{{ Customer.FirstName }}").unwrap(), "Ann");
        assert_eq!(render("[{{Missing.Path}}]").unwrap(), "[]");
        assert_eq!(render("no tags").unwrap(), "no tags");
    }

    #[test]
    fn test_no_html_escaping() {
        let mut state = SessionState::new();
        state.insert("Ssml", "<speak>a & b</speak>");
        let out = HandlebarsTemplates::new().render("{{Ssml}}", &state).unwrap();
        assert_eq!(out, "<speak>a & b</speak>");
    }

    #[test]
    fn test_each_block() {
        assert_eq!(
            render("{{#each Accounts}}{{AccountNumber}} {{/each}}").unwrap(),
            "A1 A2 "
        );
        assert_eq!(
            render("{{#each Accounts}}Press {{inc @index}} for {{AccountNumber}}. {{/each}}")
                .unwrap(),
            "Press 1 for A1. Press 2 for A2. "
        );
    }

    #[test]
    fn test_ifeq_block() {
        assert_eq!(
            render(r#"{{#ifeq Customer.FirstName "Ann"}}yes{{else}}no{{/ifeq}}"#).unwrap(),
            "yes"
        );
        assert_eq!(
            render(r#"{{#ifeq Index "3"}}yes{{else}}no{{/ifeq}}"#).unwrap(),
            "no"
        );
        assert_eq!(render("{{#ifeq Index 2}}two{{/ifeq}}").unwrap(), "two");
    }

    #[test]
    fn test_helpers() {
        assert_eq!(
            render("{{json Accounts}}").unwrap(),
            r#"[{"AccountNumber":"A1"},{"AccountNumber":"A2"}]"#
        );
        assert_eq!(render("{{inc Index}}").unwrap(), "3");
        assert_eq!(render("{{characterSpeechSlow Pin}}").unwrap(), "1, 2, 3, 4");
        assert_eq!(render("{{characterSpeechFast Pin}}").unwrap(), "1 2 3 4");
        assert_eq!(render(r#"{{characterSpeechFast "AB"}}"#).unwrap(), "A B");
        assert_eq!(
            render("{{formatCentsAsDollars Customer.Balance}}").unwrap(),
            "$123.45"
        );
        assert_eq!(
            render("{{formatCentsAsDollars Customer.Missing}}").unwrap(),
            "unknown dollars"
        );
    }

    #[test]
    fn test_date_helpers() {
        assert_eq!(
            render("{{dateOfBirthHuman DateOfBirth}}").unwrap(),
            "1st of February 1980"
        );
        assert_eq!(
            render(r#"{{dateLocalHuman Start "+10:00"}}"#).unwrap(),
            "3rd of June 2024"
        );
        assert_eq!(
            render(r#"{{dayLocalHuman Start "+10:00"}}"#).unwrap(),
            "Monday, 3rd of June"
        );
        assert_eq!(
            render(r#"{{timeLocalHuman Start "+10:00"}}"#).unwrap(),
            "6:15pm"
        );
        assert_eq!(render("{{dateOfBirthHuman Missing}}").unwrap(), "");
    }

    #[test]
    fn test_local_helpers_use_configured_offset() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let templates = HandlebarsTemplates::with_offset(offset);
        let out = templates
            .render(r#"{{timeLocalHuman Start "Australia/Sydney"}}"#, &state())
            .unwrap();
        assert_eq!(out, "3:15am");
    }

    #[test]
    fn test_errors() {
        assert!(render("{{shout Pin}}").is_err());
        assert!(render("{{inc Customer.FirstName}}").is_err());
        assert!(render("{{#each Accounts}}unclosed").is_err());
    }

    #[test]
    fn test_ordinals() {
        let got: Vec<String> = [1, 2, 3, 4, 11, 12, 13, 21, 22, 23, 31].map(ordinal).to_vec();
        assert_eq!(
            got,
            ["1st", "2nd", "3rd", "4th", "11th", "12th", "13th", "21st", "22nd", "23rd", "31st"]
        );
    }

    #[test]
    fn test_is_template() {
        let t = HandlebarsTemplates::new();
        assert!(t.is_template("a {{b}}"));
        assert!(!t.is_template("a {b}"));
        assert!(!t.is_template("{{ only open"));
    }
}
