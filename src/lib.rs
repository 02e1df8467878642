//! Reactive form state and validation over nested value trees.
//!
//! A [`FormEngine`] owns one form: its values, errors, touched and dirty
//! flags and submission status. Values are addressed by dotted paths
//! (`users.0.email`); writes are copy-on-write, so untouched branches keep
//! their identity between versions. Validators (sync functions, schemas,
//! declarative rules, CEL expressions and debounced async functions) run
//! per trigger and their errors are merged by precedence.
//!
//! ```text
//! set_value(path) → store → validators(trigger) → merged errors → subscribers
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use formstate::{FormEngine, ValidationResult, ValidatorConfig, Value};
//! use serde_json::json;
//!
//! let form = FormEngine::builder(json!({ "email": "", "tags": ["a"] }))
//!     .validator(
//!         ValidatorConfig::sync(|value: &Value| {
//!             if value.as_str().is_some_and(|s| s.contains('@')) {
//!                 ValidationResult::Valid
//!             } else {
//!                 ValidationResult::error("Invalid email")
//!             }
//!         })
//!         .for_field("email"),
//!     )
//!     .build()
//!     .expect("valid configuration");
//!
//! form.set_value("email", "bad");
//! assert_eq!(form.state().error("email"), Some("Invalid email"));
//!
//! form.add_array_item("tags", "b");
//! assert!(form.state().is_field_dirty("tags.1"));
//! ```
//!
//! # Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cel-eval` | yes     | CEL field rules via the [`cel`] crate. Enables [`CelRule`]. |

pub mod array;
pub mod binding;
#[cfg(feature = "cel-eval")]
pub mod cel_rule;
pub mod engine;
pub mod error;
pub mod file;
pub mod options;
pub mod path;
pub mod rules;
pub mod schema;
pub mod snapshot;
pub mod state;
pub mod validate;
pub mod value;

pub(crate) mod store;

pub use binding::{CheckboxBinding, FieldBinding, FileBinding};
pub use engine::{FormConfig, FormEngine, SetValueOptions, SubmitHandler, SubmitOutcome, Subscription};
pub use error::*;
pub use file::{FileData, FileDescriptor, FileFieldConfig, ObjectUrlProvider, PreviewProvider};
pub use options::{FormOptions, ValidationMode};
pub use rules::FieldRules;
pub use schema::{FieldMeta, FieldType, Schema, SchemaHandle, SchemaIssue, UnionInfo};
pub use snapshot::{History, Snapshot};
pub use state::{FieldState, FormState};
pub use validate::{Trigger, TriggerSet, ValidationResult, ValidatorConfig};
pub use value::{Map, Value};

#[cfg(feature = "cel-eval")]
pub use cel_rule::CelRule;
