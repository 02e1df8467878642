//! Input bindings.
//!
//! A binding is a small descriptor for one input: the current value, the
//! error to display and the event handlers that feed changes back into the
//! engine. Bindings read state once when created; take a fresh one after
//! the state changes.

use crate::engine::{FormEngine, SetValueOptions};
use crate::file::{FileData, FileFieldConfig};
use crate::value::Value;
use std::sync::Arc;

/// Binding for a plain value input.
#[derive(Clone, Debug)]
pub struct FieldBinding {
    engine: FormEngine,
    pub name: String,
    pub value: Value,
    /// The error to display, if any.
    pub error: Option<String>,
    pub invalid: bool,
}

impl FieldBinding {
    pub fn on_change(&self, value: impl Into<Value>) {
        self.engine.set_value_with(
            &self.name,
            value,
            SetValueOptions::default().validate(true),
        );
    }

    pub fn on_blur(&self) {
        self.engine.blur(&self.name);
    }
}

/// Binding for a checkbox.
///
/// Without an option value the field holds a boolean. With one, the field
/// holds an array and the checkbox toggles membership of that value.
#[derive(Clone, Debug)]
pub struct CheckboxBinding {
    engine: FormEngine,
    pub name: String,
    pub option: Option<Value>,
    pub checked: bool,
    pub error: Option<String>,
}

impl CheckboxBinding {
    pub fn on_change(&self, checked: bool) {
        let next = match &self.option {
            None => Value::Bool(checked),
            Some(option) => {
                let mut items: Vec<Value> = self
                    .engine
                    .get_value(&self.name)
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default();
                items.retain(|item| item != option);
                if checked {
                    items.push(option.clone());
                }
                Value::from_items(items)
            }
        };
        self.engine
            .set_value_with(&self.name, next, SetValueOptions::default().validate(true));
    }

    pub fn on_blur(&self) {
        self.engine.blur(&self.name);
    }
}

/// Binding for a file input.
#[derive(Clone, Debug)]
pub struct FileBinding {
    engine: FormEngine,
    pub name: String,
    pub files: Vec<Arc<FileData>>,
    pub multiple: bool,
    /// The `accept` patterns joined with commas.
    pub accept: String,
    pub error: Option<String>,
}

impl FileBinding {
    /// Adds the selected files. In single mode only the last one is kept.
    /// Returns how many were accepted.
    pub fn on_select(&self, files: Vec<FileData>) -> usize {
        let files = if self.multiple {
            files
        } else {
            files.into_iter().last().into_iter().collect()
        };
        files
            .into_iter()
            .filter(|file| self.engine.add_file(&self.name, file.clone()))
            .count()
    }

    pub fn on_remove(&self, index: usize) {
        self.engine.remove_file(&self.name, Some(index));
    }

    pub fn on_clear(&self) {
        self.engine.clear_files(&self.name);
    }

    pub fn on_blur(&self) {
        self.engine.blur(&self.name);
    }
}

impl FormEngine {
    pub fn bind(&self, path: &str) -> FieldBinding {
        let field = self.field_state(path);
        FieldBinding {
            engine: self.clone(),
            name: path.to_string(),
            value: field.value.unwrap_or_default(),
            error: field.visible_error,
            invalid: field.invalid,
        }
    }

    pub fn bind_checkbox(&self, path: &str, option: Option<Value>) -> CheckboxBinding {
        let field = self.field_state(path);
        let checked = match (&option, &field.value) {
            (None, Some(value)) => value.as_bool().unwrap_or(false),
            (Some(option), Some(Value::Array(items))) => items.iter().any(|i| i == option),
            _ => false,
        };
        CheckboxBinding {
            engine: self.clone(),
            name: path.to_string(),
            option,
            checked,
            error: field.visible_error,
        }
    }

    pub fn bind_file(&self, path: &str) -> FileBinding {
        let field = self.field_state(path);
        let FileFieldConfig {
            multiple, accept, ..
        } = self.file_config(path);
        FileBinding {
            engine: self.clone(),
            name: path.to_string(),
            files: self.files(path),
            multiple,
            accept: accept.join(","),
            error: field.visible_error,
        }
    }
}
