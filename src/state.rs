//! The canonical form state and per-field views of it.

use crate::path;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Authoritative state of one form.
///
/// Derived flags are kept consistent by the store after every operation:
/// `is_dirty` iff some `dirty_fields` entry is true, `is_valid` iff
/// `errors` is empty, `is_validating` iff `validating_fields` is non-empty.
#[derive(Clone, Debug, PartialEq)]
pub struct FormState {
    pub values: Value,
    pub errors: BTreeMap<String, String>,
    pub touched: BTreeMap<String, bool>,
    pub dirty_fields: BTreeMap<String, bool>,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub is_validating: bool,
    pub validating_fields: BTreeSet<String>,
    pub is_submitting: bool,
    pub is_submitted: bool,
    pub is_submit_successful: bool,
    pub submit_count: u32,
    pub default_values: Value,
}

impl FormState {
    pub fn new(default_values: Value) -> Self {
        Self {
            values: default_values.clone(),
            errors: BTreeMap::new(),
            touched: BTreeMap::new(),
            dirty_fields: BTreeMap::new(),
            is_dirty: false,
            is_valid: true,
            is_validating: false,
            validating_fields: BTreeSet::new(),
            is_submitting: false,
            is_submitted: false,
            is_submit_successful: false,
            submit_count: 0,
            default_values,
        }
    }

    pub fn value(&self, path: &str) -> Option<&Value> {
        path::get(&self.values, path)
    }

    pub fn error(&self, path: &str) -> Option<&str> {
        self.errors.get(path).map(String::as_str)
    }

    pub fn is_touched(&self, path: &str) -> bool {
        self.touched.get(path).copied().unwrap_or(false)
    }

    pub fn is_field_dirty(&self, path: &str) -> bool {
        self.dirty_fields.get(path).copied().unwrap_or(false)
    }

    pub fn is_field_validating(&self, path: &str) -> bool {
        self.validating_fields.contains(path)
    }

    /// Everything a single input needs to render itself.
    pub fn field(&self, path: &str) -> FieldState {
        let error = self.error(path).map(str::to_string);
        let is_touched = self.is_touched(path);
        let is_validating = self.is_field_validating(path);
        FieldState {
            value: self.value(path).cloned(),
            visible_error: error
                .clone()
                .filter(|_| is_touched && !is_validating),
            invalid: error.is_some(),
            error,
            is_touched,
            is_dirty: self.is_field_dirty(path),
            is_validating,
        }
    }

    pub(crate) fn recompute_flags(&mut self) {
        self.is_dirty = self.dirty_fields.values().any(|d| *d);
        self.is_valid = self.errors.is_empty();
        self.is_validating = !self.validating_fields.is_empty();
    }
}

/// Per-field view derived from [`FormState`].
#[derive(Clone, Debug, PartialEq)]
pub struct FieldState {
    pub value: Option<Value>,
    pub error: Option<String>,
    /// The error to display: only once the field is touched, and never
    /// while a fresh asynchronous check is in flight.
    pub visible_error: Option<String>,
    pub invalid: bool,
    pub is_touched: bool,
    pub is_dirty: bool,
    pub is_validating: bool,
}
