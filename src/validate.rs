//! Validator registry and orchestration.
//!
//! Every registered validator owns one error layer. Synchronous validators
//! overwrite their layer each time they run; asynchronous ones go through a
//! per-validator task descriptor `{generation, timer, active}` and only
//! write their layer when the completing run still carries the current
//! generation. [`Orchestrator::merged`] folds the layers together by
//! precedence:
//!
//! manual > file constraint > field-level sync > global sync > async > restored
//!
//! Within one tier, earlier-registered validators win.

use crate::error::{ErrorSource, FieldError, FormError, Result, ValidatorFailure};
use crate::path;
use crate::rules::FieldRules;
use crate::schema::SchemaHandle;
use crate::value::Value;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

#[cfg(feature = "cel-eval")]
use crate::cel_rule::CelRule;

// ─── Triggers ───────────────────────────────────────────────────────────────

/// The event that causes validation to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Change,
    Blur,
    Submit,
    /// An explicit `trigger()` call. Selects every validator.
    Manual,
}

/// The triggers a validator listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerSet {
    change: bool,
    blur: bool,
    submit: bool,
}

impl TriggerSet {
    pub const ALL: TriggerSet = TriggerSet {
        change: true,
        blur: true,
        submit: true,
    };

    pub fn only(triggers: &[Trigger]) -> Self {
        Self {
            change: triggers.contains(&Trigger::Change),
            blur: triggers.contains(&Trigger::Blur),
            submit: triggers.contains(&Trigger::Submit),
        }
    }

    pub fn contains(self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::Change => self.change,
            Trigger::Blur => self.blur,
            Trigger::Submit => self.submit,
            Trigger::Manual => true,
        }
    }
}

impl Default for TriggerSet {
    fn default() -> Self {
        Self::ALL
    }
}

// ─── Results ────────────────────────────────────────────────────────────────

/// Outcome of one validator run.
///
/// Field-scoped validators report paths relative to their field (`""` is
/// the field itself); global validators report absolute paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ValidationResult {
    #[default]
    Valid,
    Invalid(BTreeMap<String, String>),
}

impl ValidationResult {
    /// `Valid` for an empty map, `Invalid` otherwise.
    pub fn from_errors(errors: BTreeMap<String, String>) -> Self {
        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(errors)
        }
    }

    /// An error on the validated value itself.
    pub fn error(message: impl Into<String>) -> Self {
        Self::at("", message)
    }

    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Valid.with(path, message)
    }

    /// Adds an error, keeping an existing message for the same path.
    pub fn with(self, path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = self.into_errors();
        errors.entry(path.into()).or_insert_with(|| message.into());
        ValidationResult::Invalid(errors)
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(errors) => Some(errors),
        }
    }

    pub fn into_errors(self) -> BTreeMap<String, String> {
        match self {
            ValidationResult::Valid => BTreeMap::new(),
            ValidationResult::Invalid(errors) => errors,
        }
    }
}

impl From<std::result::Result<(), String>> for ValidationResult {
    fn from(result: std::result::Result<(), String>) -> Self {
        match result {
            Ok(()) => ValidationResult::Valid,
            Err(message) => ValidationResult::error(message),
        }
    }
}

// ─── Validator configuration ────────────────────────────────────────────────

pub type SyncFn = Arc<dyn Fn(&Value) -> ValidationResult + Send + Sync>;

pub type AsyncOutcome = std::result::Result<ValidationResult, ValidatorFailure>;

pub type AsyncFn = Arc<dyn Fn(Value) -> BoxFuture<'static, AsyncOutcome> + Send + Sync>;

#[derive(Clone)]
pub enum ValidatorKind {
    Sync(SyncFn),
    Schema(SchemaHandle),
    Rules(FieldRules),
    #[cfg(feature = "cel-eval")]
    Cel(CelRule),
    Async { run: AsyncFn, debounce: Duration },
}

/// One registered validator: what runs, on which triggers, for which field.
#[derive(Clone)]
pub struct ValidatorConfig {
    pub(crate) kind: ValidatorKind,
    pub(crate) triggers: TriggerSet,
    pub(crate) field: Option<String>,
}

impl ValidatorConfig {
    fn with_kind(kind: ValidatorKind) -> Self {
        Self {
            kind,
            triggers: TriggerSet::ALL,
            field: None,
        }
    }

    /// A synchronous function. Scoped to a field it receives the field's
    /// value (`Null` when absent); global, it receives the whole tree.
    pub fn sync<F>(validate: F) -> Self
    where
        F: Fn(&Value) -> ValidationResult + Send + Sync + 'static,
    {
        Self::with_kind(ValidatorKind::Sync(Arc::new(validate)))
    }

    /// An asynchronous function, debounced by `debounce`. Must be scoped to
    /// a field with [`ValidatorConfig::for_field`].
    pub fn asynchronous<F, Fut>(debounce: Duration, validate: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AsyncOutcome> + Send + 'static,
    {
        let run: AsyncFn = Arc::new(move |value| validate(value).boxed());
        Self::with_kind(ValidatorKind::Async { run, debounce })
    }

    pub fn schema(schema: SchemaHandle) -> Self {
        Self::with_kind(ValidatorKind::Schema(schema))
    }

    /// Built-in rules. Must be scoped to a field.
    pub fn rules(rules: FieldRules) -> Self {
        Self::with_kind(ValidatorKind::Rules(rules))
    }

    /// A CEL rule. Must be scoped to a field.
    #[cfg(feature = "cel-eval")]
    pub fn cel(rule: CelRule) -> Self {
        Self::with_kind(ValidatorKind::Cel(rule))
    }

    pub fn for_field(mut self, path: impl Into<String>) -> Self {
        self.field = Some(path.into());
        self
    }

    /// Restricts the validator to `triggers`.
    pub fn on(mut self, triggers: &[Trigger]) -> Self {
        self.triggers = TriggerSet::only(triggers);
        self
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn triggers(&self) -> TriggerSet {
        self.triggers
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, ValidatorKind::Async { .. })
    }

    fn source(&self) -> ErrorSource {
        match self.kind {
            ValidatorKind::Schema(_) => ErrorSource::Schema,
            ValidatorKind::Async { .. } => ErrorSource::Async,
            _ => ErrorSource::Custom,
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if let Some(field) = &self.field {
            path::validate(field)?;
        }
        let needs_field = match self.kind {
            ValidatorKind::Rules(_) | ValidatorKind::Async { .. } => true,
            #[cfg(feature = "cel-eval")]
            ValidatorKind::Cel(_) => true,
            _ => false,
        };
        if needs_field && self.field.is_none() {
            return Err(FormError::InvalidConfig(format!(
                "{} validator must be scoped to a field",
                self.kind_name()
            )));
        }
        Ok(())
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            ValidatorKind::Sync(_) => "sync",
            ValidatorKind::Schema(_) => "schema",
            ValidatorKind::Rules(_) => "rules",
            #[cfg(feature = "cel-eval")]
            ValidatorKind::Cel(_) => "cel",
            ValidatorKind::Async { .. } => "async",
        }
    }

    /// Runs a synchronous validator. Async validators yield `Valid` here.
    fn evaluate(&self, value: &Value, values: &Value) -> ValidationResult {
        match &self.kind {
            ValidatorKind::Sync(validate) => validate(value),
            ValidatorKind::Schema(schema) => schema.validate(value),
            ValidatorKind::Rules(rules) => rules
                .check(value)
                .map(ValidationResult::error)
                .unwrap_or_default(),
            #[cfg(feature = "cel-eval")]
            ValidatorKind::Cel(rule) => rule
                .check(value, values)
                .map(ValidationResult::error)
                .unwrap_or_default(),
            ValidatorKind::Async { .. } => {
                let _ = values;
                ValidationResult::Valid
            }
        }
    }
}

impl fmt::Debug for ValidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorConfig")
            .field("kind", &self.kind_name())
            .field("triggers", &self.triggers)
            .field("field", &self.field)
            .finish()
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AsyncTask {
    generation: u64,
    timer: Option<AbortHandle>,
    active: bool,
}

/// An async run to schedule: sleep `delay`, then fire if `generation` is
/// still current.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AsyncRequest {
    pub(crate) index: usize,
    pub(crate) generation: u64,
    pub(crate) delay: Duration,
}

type Layer = BTreeMap<String, String>;

pub(crate) struct Orchestrator {
    validators: Vec<ValidatorConfig>,
    layers: Vec<Layer>,
    tasks: Vec<AsyncTask>,
    manual: Layer,
    file: Layer,
    restored: Layer,
}

impl Orchestrator {
    pub(crate) fn new(validators: Vec<ValidatorConfig>) -> Self {
        let count = validators.len();
        Self {
            validators,
            layers: vec![Layer::new(); count],
            tasks: (0..count).map(|_| AsyncTask::default()).collect(),
            manual: Layer::new(),
            file: Layer::new(),
            restored: Layer::new(),
        }
    }

    pub(crate) fn has_async(&self) -> bool {
        self.validators.iter().any(ValidatorConfig::is_async)
    }

    /// Fields that have at least one field-scoped validator.
    pub(crate) fn validated_fields(&self) -> BTreeSet<String> {
        self.validators
            .iter()
            .filter_map(|v| v.field.clone())
            .collect()
    }

    fn applies(&self, index: usize, trigger: Trigger, scope: &str) -> bool {
        let validator = &self.validators[index];
        validator.triggers.contains(trigger)
            && validator
                .field
                .as_deref()
                .is_none_or(|field| path::is_related(field, scope))
    }

    /// Runs the validators selected by `trigger` for `scope` (`""` for the
    /// whole form). Synchronous ones run now; the returned requests are the
    /// async runs the caller must schedule. `immediate` drops the debounce.
    pub(crate) fn run(
        &mut self,
        trigger: Trigger,
        scope: &str,
        values: &Value,
        immediate: bool,
    ) -> Vec<AsyncRequest> {
        let selected: Vec<usize> = (0..self.validators.len())
            .filter(|&i| self.applies(i, trigger, scope))
            .collect();
        tracing::debug!(?trigger, scope, validators = selected.len(), "running validation");

        self.restored.retain(|k, _| !path::is_within(k, scope));

        for &index in &selected {
            if !self.validators[index].is_async() {
                self.run_sync(index, scope, values);
            }
        }

        let mut requests = Vec::new();
        for &index in &selected {
            let ValidatorKind::Async { debounce, .. } = self.validators[index].kind else {
                continue;
            };
            let field = self.validators[index].field.clone().unwrap_or_default();
            if self.sync_error_at(&field) {
                tracing::trace!(field = %field, "sync error present, async validation suppressed");
                self.cancel(index);
                continue;
            }
            let delay = if immediate { Duration::ZERO } else { debounce };
            requests.push(self.request(index, delay));
        }
        requests
    }

    fn run_sync(&mut self, index: usize, scope: &str, values: &Value) {
        let validator = &self.validators[index];
        match validator.field.as_deref() {
            Some(field) => {
                let value = path::get(values, field).cloned().unwrap_or_default();
                let errors = validator.evaluate(&value, values).into_errors();
                self.layers[index] = errors
                    .into_iter()
                    .map(|(rel, message)| (path::join(field, &rel), message))
                    .collect();
            }
            None => {
                let errors = validator.evaluate(values, values).into_errors();
                let layer = &mut self.layers[index];
                layer.retain(|k, _| !path::is_within(k, scope));
                layer.extend(
                    errors
                        .into_iter()
                        .filter(|(k, _)| path::is_within(k, scope)),
                );
            }
        }
    }

    /// True when a field-scoped synchronous validator reports an error at
    /// exactly `field`.
    fn sync_error_at(&self, field: &str) -> bool {
        self.validators
            .iter()
            .zip(&self.layers)
            .any(|(v, layer)| v.field.is_some() && !v.is_async() && layer.contains_key(field))
    }

    /// Supersedes any pending or in-flight run of validator `index` and
    /// returns a fresh request.
    fn request(&mut self, index: usize, delay: Duration) -> AsyncRequest {
        let task = &mut self.tasks[index];
        task.generation += 1;
        if let Some(timer) = task.timer.take() {
            timer.abort();
        }
        task.active = true;
        self.layers[index].clear();
        AsyncRequest {
            index,
            generation: task.generation,
            delay,
        }
    }

    /// Records the debounce timer of a scheduled request so a later request
    /// can cancel it.
    pub(crate) fn attach_timer(&mut self, request: &AsyncRequest, timer: AbortHandle) {
        match self.tasks.get_mut(request.index) {
            Some(task) if task.generation == request.generation && task.active => {
                task.timer = Some(timer);
            }
            _ => timer.abort(),
        }
    }

    /// Called when a debounce timer fires. Returns the validator and the
    /// field value current at fire time, or `None` for a superseded run.
    pub(crate) fn begin(
        &mut self,
        index: usize,
        generation: u64,
        values: &Value,
    ) -> Option<(AsyncFn, Value)> {
        let task = self.tasks.get_mut(index)?;
        if task.generation != generation || !task.active {
            tracing::trace!(validator = index, generation, "superseded before firing");
            return None;
        }
        // Past the debounce stage; in-flight runs are never aborted.
        task.timer = None;
        let validator = &self.validators[index];
        let ValidatorKind::Async { run, .. } = &validator.kind else {
            return None;
        };
        let field = validator.field.as_deref().unwrap_or("");
        let value = path::get(values, field).cloned().unwrap_or_default();
        Some((Arc::clone(run), value))
    }

    /// Applies a finished async run. Returns `false` when the run was
    /// superseded and its outcome discarded.
    pub(crate) fn complete(&mut self, index: usize, generation: u64, outcome: AsyncOutcome) -> bool {
        let Some(task) = self.tasks.get_mut(index) else {
            return false;
        };
        if task.generation != generation {
            tracing::trace!(
                validator = index,
                generation,
                current = task.generation,
                "discarding stale async result"
            );
            return false;
        }
        task.active = false;

        let field = self.validators[index].field.clone().unwrap_or_default();
        self.layers[index] = match outcome {
            Ok(result) => result
                .into_errors()
                .into_iter()
                .map(|(rel, message)| (path::join(&field, &rel), message))
                .collect(),
            Err(failure) => {
                tracing::debug!(field = %field, error = %failure, "async validator failed");
                Layer::from([(field, failure.display_message())])
            }
        };
        true
    }

    /// Cancels validator `index`: bumps its generation, stops the pending
    /// timer and clears its async error.
    pub(crate) fn cancel(&mut self, index: usize) {
        let Some(task) = self.tasks.get_mut(index) else {
            return;
        };
        if !self.validators[index].is_async() {
            return;
        }
        task.generation += 1;
        if let Some(timer) = task.timer.take() {
            timer.abort();
        }
        task.active = false;
        self.layers[index].clear();
    }

    pub(crate) fn cancel_all(&mut self) {
        for index in 0..self.validators.len() {
            self.cancel(index);
        }
    }

    /// Cancels async validators scoped at or below `scope`.
    pub(crate) fn cancel_within(&mut self, scope: &str) {
        for index in 0..self.validators.len() {
            let within = self.validators[index]
                .field
                .as_deref()
                .is_some_and(|f| path::is_within(f, scope));
            if within {
                self.cancel(index);
            }
        }
    }

    /// Re-requests every run still waiting on its debounce timer with no
    /// delay.
    pub(crate) fn flush(&mut self) -> Vec<AsyncRequest> {
        let pending: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.active && t.timer.is_some())
            .map(|(i, _)| i)
            .collect();
        pending
            .into_iter()
            .map(|index| self.request(index, Duration::ZERO))
            .collect()
    }

    pub(crate) fn pending(&self) -> usize {
        self.tasks.iter().filter(|t| t.active).count()
    }

    pub(crate) fn validating_fields(&self) -> BTreeSet<String> {
        self.tasks
            .iter()
            .zip(&self.validators)
            .filter(|(t, _)| t.active)
            .filter_map(|(_, v)| v.field.clone())
            .collect()
    }

    /// All layers folded by precedence.
    pub(crate) fn merged(&self) -> BTreeMap<String, FieldError> {
        let mut out = BTreeMap::new();
        absorb(&mut out, &self.manual, ErrorSource::Manual);
        absorb(&mut out, &self.file, ErrorSource::FileConstraint);
        for global in [false, true] {
            for (validator, layer) in self.validators.iter().zip(&self.layers) {
                if !validator.is_async() && validator.field.is_none() == global {
                    absorb(&mut out, layer, validator.source());
                }
            }
        }
        for ((validator, layer), task) in self.validators.iter().zip(&self.layers).zip(&self.tasks) {
            if validator.is_async() && !task.active {
                absorb(&mut out, layer, ErrorSource::Async);
            }
        }
        absorb(&mut out, &self.restored, ErrorSource::Restored);
        out
    }

    pub(crate) fn set_manual(&mut self, path: &str, message: String) {
        self.manual.insert(path.to_string(), message);
    }

    pub(crate) fn set_file_error(&mut self, path: &str, message: String) {
        self.file.insert(path.to_string(), message);
    }

    pub(crate) fn clear_file_error(&mut self, path: &str) {
        self.file.remove(path);
    }

    /// Removes entries at or below `scope` from every layer (all entries
    /// for `None`). Pending async runs keep going.
    pub(crate) fn clear(&mut self, scope: Option<&str>) {
        let scope = scope.unwrap_or("");
        for layer in self.all_layers() {
            layer.retain(|k, _| !path::is_within(k, scope));
        }
    }

    /// Cancels everything and drops every error.
    pub(crate) fn reset(&mut self) {
        self.cancel_all();
        self.clear(None);
    }

    /// Replaces all errors with `errors` as the restored layer.
    pub(crate) fn restore(&mut self, errors: BTreeMap<String, String>) {
        self.reset();
        self.restored = errors;
    }

    /// Renames entries of every layer with `rename`, dropping those it
    /// maps to `None`.
    pub(crate) fn rekey(&mut self, rename: &dyn Fn(&str) -> Option<String>) {
        for layer in self.all_layers() {
            *layer = std::mem::take(layer)
                .into_iter()
                .filter_map(|(k, v)| rename(&k).map(|k| (k, v)))
                .collect();
        }
    }

    fn all_layers(&mut self) -> impl Iterator<Item = &mut Layer> {
        self.layers
            .iter_mut()
            .chain([&mut self.manual, &mut self.file, &mut self.restored])
    }
}

fn absorb(out: &mut BTreeMap<String, FieldError>, layer: &Layer, source: ErrorSource) {
    for (path, message) in layer {
        out.entry(path.clone())
            .or_insert_with(|| FieldError::new(source, message.clone()));
    }
}
