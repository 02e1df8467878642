//! Built-in declarative field rules.
//!
//! A [`FieldRules`] set is a list of checks applied with AND logic; the
//! first failing check's message is the field's error. A field that is not
//! marked required and holds a blank value (null, empty string, empty
//! array) passes without running the remaining checks.

use crate::value::Value;
use regex::Regex;

#[derive(Clone, Debug)]
enum Rule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Pattern(Regex),
    OneOf(Vec<Value>),
}

#[derive(Clone, Debug, Default)]
pub struct FieldRules {
    checks: Vec<(Rule, String)>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.checks.push((Rule::Required, message.into()));
        self
    }

    /// Minimum length in characters (strings) or items (arrays).
    pub fn min_length(mut self, min: usize, message: impl Into<String>) -> Self {
        self.checks.push((Rule::MinLength(min), message.into()));
        self
    }

    pub fn max_length(mut self, max: usize, message: impl Into<String>) -> Self {
        self.checks.push((Rule::MaxLength(max), message.into()));
        self
    }

    pub fn min(mut self, min: f64, message: impl Into<String>) -> Self {
        self.checks.push((Rule::Min(min), message.into()));
        self
    }

    pub fn max(mut self, max: f64, message: impl Into<String>) -> Self {
        self.checks.push((Rule::Max(max), message.into()));
        self
    }

    /// The string value must match `pattern` somewhere; anchor it for a
    /// full match.
    pub fn pattern(mut self, pattern: Regex, message: impl Into<String>) -> Self {
        self.checks.push((Rule::Pattern(pattern), message.into()));
        self
    }

    pub fn one_of(mut self, allowed: Vec<Value>, message: impl Into<String>) -> Self {
        self.checks.push((Rule::OneOf(allowed), message.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// The message of the first failing rule, if any.
    pub fn check(&self, value: &Value) -> Option<&str> {
        let required = self.checks.iter().any(|(r, _)| matches!(r, Rule::Required));
        if value.is_blank() && !required {
            return None;
        }
        self.checks
            .iter()
            .find(|(rule, _)| !passes(rule, value))
            .map(|(_, message)| message.as_str())
    }
}

fn passes(rule: &Rule, value: &Value) -> bool {
    match rule {
        Rule::Required => !value.is_blank() && value.as_bool() != Some(false),
        Rule::MinLength(min) => length(value).is_some_and(|len| len >= *min),
        Rule::MaxLength(max) => length(value).is_some_and(|len| len <= *max),
        Rule::Min(min) => value.as_f64().is_some_and(|v| v >= *min),
        Rule::Max(max) => value.as_f64().is_some_and(|v| v <= *max),
        Rule::Pattern(re) => value.as_str().is_some_and(|s| re.is_match(s)),
        Rule::OneOf(allowed) => allowed.iter().any(|a| a == value),
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}
