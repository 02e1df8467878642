//! Engine options.
//!
//! Options are plain serde data so they can be loaded from YAML or JSON
//! configuration as well as built in code.

use crate::error::{FormError, Result};
use crate::validate::Trigger;
use serde::{Deserialize, Serialize};

/// Which triggers run validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
    /// Blur, then every change once the field has been touched.
    OnTouched,
    #[default]
    All,
}

impl ValidationMode {
    /// Whether `trigger` runs under this mode. Submit and manual triggers
    /// always run.
    pub fn allows(self, trigger: Trigger, touched: bool) -> bool {
        match trigger {
            Trigger::Submit | Trigger::Manual => true,
            Trigger::Change => match self {
                ValidationMode::OnChange | ValidationMode::All => true,
                ValidationMode::OnTouched => touched,
                ValidationMode::OnBlur | ValidationMode::OnSubmit => false,
            },
            Trigger::Blur => matches!(
                self,
                ValidationMode::OnBlur | ValidationMode::OnTouched | ValidationMode::All
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct FormOptions {
    /// Validation mode before the first submission.
    pub mode: ValidationMode,
    /// Validation mode after the first submission.
    pub revalidate_mode: ValidationMode,
    /// Whether `set_value` runs change validation when no explicit
    /// `SetValueOptions` are given.
    pub validate_on_set_value: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            mode: ValidationMode::All,
            revalidate_mode: ValidationMode::All,
            validate_on_set_value: true,
        }
    }
}

impl FormOptions {
    pub fn mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn revalidate_mode(mut self, mode: ValidationMode) -> Self {
        self.revalidate_mode = mode;
        self
    }

    pub fn validate_on_set_value(mut self, enabled: bool) -> Self {
        self.validate_on_set_value = enabled;
        self
    }

    /// The mode in force given the submission state.
    pub fn active_mode(&self, submitted: bool) -> ValidationMode {
        if submitted {
            self.revalidate_mode
        } else {
            self.mode
        }
    }

    /// Parses options from a YAML document. Missing keys take defaults.
    pub fn from_yaml(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(FormError::Options("empty input".to_string()));
        }
        let value: serde_json::Value = serde_saphyr::from_str(input)
            .map_err(|e| FormError::Options(e.to_string()))?;
        if !value.is_object() {
            return Err(FormError::Options(
                "options root must be a mapping".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| FormError::Options(e.to_string()))
    }

    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| FormError::Options(e.to_string()))
    }
}
