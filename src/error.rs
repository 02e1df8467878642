use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where an entry of the errors map came from.
///
/// Validation problems are never returned as `Err`; they are recorded in
/// the errors map under one of these sources and merged by precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Produced by a schema-driven validator.
    Schema,
    /// Produced by a caller-supplied synchronous function, rule set or CEL rule.
    Custom,
    /// Produced by an asynchronous validator, including rejected ones.
    Async,
    /// Set explicitly through `set_error`.
    Manual,
    /// A file size, type or count violation.
    FileConstraint,
    /// Carried over from a restored snapshot until revalidated.
    Restored,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorSource::Schema => "schema",
            ErrorSource::Custom => "custom",
            ErrorSource::Async => "async",
            ErrorSource::Manual => "manual",
            ErrorSource::FileConstraint => "file_constraint",
            ErrorSource::Restored => "restored",
        };
        f.write_str(name)
    }
}

/// A single recorded field error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub source: ErrorSource,
    pub message: String,
}

impl FieldError {
    pub fn new(source: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.source)
    }
}

/// Failure reported by an asynchronous validator instead of a result.
///
/// The engine converts it into an [`ErrorSource::Async`] entry carrying the
/// validator's message, or [`ValidatorFailure::GENERIC_MESSAGE`] when none
/// was supplied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Error)]
#[error("{}", self.message.as_deref().unwrap_or(Self::GENERIC_MESSAGE))]
pub struct ValidatorFailure {
    pub message: Option<String>,
}

impl ValidatorFailure {
    pub const GENERIC_MESSAGE: &'static str = "Validation failed";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// A failure without a caller-facing message.
    pub fn generic() -> Self {
        Self { message: None }
    }

    pub fn display_message(&self) -> String {
        self.to_string()
    }
}

/// Programmer errors: invalid configuration or undecodable input.
///
/// Raised synchronously at construction or decode time. Validation
/// outcomes never surface through this type.
#[derive(Debug, Error)]
pub enum FormError {
    /// A field path that cannot address anything (`a..b`, `.a`, `a.`).
    #[error("invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Engine configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `FormOptions` could not be decoded.
    #[error("invalid options: {0}")]
    Options(String),

    /// A value could not be converted to or from a caller type.
    #[error("value conversion failed: {0}")]
    Conversion(#[from] serde_json::Error),

    /// A persisted snapshot could not be decoded.
    #[error("invalid snapshot: {0}")]
    Snapshot(String),
}

impl FormError {
    pub(crate) fn invalid_path(path: &str, reason: &str) -> Self {
        FormError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias for results carrying [`FormError`].
pub type Result<T> = std::result::Result<T, FormError>;
