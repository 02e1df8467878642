//! The engine facade.
//!
//! [`FormEngine`] is a cheap handle around shared state; clone it and pass
//! it to every consumer that needs the form. All state sits behind one
//! mutex and every public operation is a single critical section: mutate,
//! schedule async validation, fold errors and flags, collect subscriber
//! notifications. Notifications run after the lock is released, so
//! subscriber callbacks may call back into the engine.

use crate::array::ArrayEdit;
use crate::error::{FieldError, FormError, Result, ValidatorFailure};
use crate::file::{self, FileData, FileDescriptor, FileFieldConfig, FileManager, ObjectUrlProvider, PreviewProvider};
use crate::options::FormOptions;
use crate::path;
use crate::schema::{FieldMeta, SchemaHandle, UnionInfo};
use crate::snapshot::Snapshot;
use crate::state::{FieldState, FormState};
use crate::store::{Notification, Store};
use crate::validate::{AsyncRequest, Orchestrator, Trigger, ValidatorConfig};
use crate::value::{Map, Value};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Builder for a [`FormEngine`].
pub struct FormConfig {
    default_values: Value,
    validators: Vec<ValidatorConfig>,
    file_fields: HashMap<String, FileFieldConfig>,
    options: FormOptions,
    preview_provider: Arc<dyn PreviewProvider>,
    runtime: Option<Handle>,
}

impl FormConfig {
    pub fn new(default_values: impl Into<Value>) -> Self {
        Self {
            default_values: default_values.into(),
            validators: Vec::new(),
            file_fields: HashMap::new(),
            options: FormOptions::default(),
            preview_provider: Arc::new(ObjectUrlProvider),
            runtime: None,
        }
    }

    /// Defaults taken from any serializable value.
    pub fn from_serialize<T: Serialize>(default_values: &T) -> Result<Self> {
        let json = serde_json::to_value(default_values)?;
        Ok(Self::new(json))
    }

    pub fn validator(mut self, validator: ValidatorConfig) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn file_field(mut self, path: impl Into<String>, config: FileFieldConfig) -> Self {
        self.file_fields.insert(path.into(), config);
        self
    }

    pub fn options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    pub fn preview_provider(mut self, provider: impl PreviewProvider + 'static) -> Self {
        self.preview_provider = Arc::new(provider);
        self
    }

    /// Runtime used for debounce timers and async validators. Defaults to
    /// the runtime current at [`FormConfig::build`].
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<FormEngine> {
        for validator in &self.validators {
            validator.check()?;
        }
        for path in self.file_fields.keys() {
            path::validate(path)?;
        }

        let orchestrator = Orchestrator::new(self.validators);
        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        if orchestrator.has_async() && runtime.is_none() {
            return Err(FormError::InvalidConfig(
                "async validators require a tokio runtime".to_string(),
            ));
        }

        let inner = Inner {
            store: Store::new(self.default_values),
            orchestrator,
            files: FileManager::new(self.file_fields, self.preview_provider),
            options: self.options,
            requests: Vec::new(),
            disposed: false,
        };
        let (idle, _) = watch::channel(0);
        Ok(FormEngine {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                runtime,
                idle,
            }),
        })
    }
}

/// Per-call overrides for [`FormEngine::set_value_with`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetValueOptions {
    /// Run change validation. `None` follows
    /// [`FormOptions::validate_on_set_value`].
    pub validate: Option<bool>,
    /// Mark the field touched.
    pub touch: bool,
}

impl SetValueOptions {
    pub fn validate(mut self, enabled: bool) -> Self {
        self.validate = Some(enabled);
        self
    }

    pub fn touch(mut self, enabled: bool) -> Self {
        self.touch = enabled;
        self
    }
}

// ─── Engine state ───────────────────────────────────────────────────────────

struct Shared {
    inner: Mutex<Inner>,
    runtime: Option<Handle>,
    /// Number of async runs still pending.
    idle: watch::Sender<usize>,
}

struct Inner {
    store: Store,
    orchestrator: Orchestrator,
    files: FileManager,
    options: FormOptions,
    requests: Vec<AsyncRequest>,
    disposed: bool,
}

impl Inner {
    fn values(&self) -> &Value {
        &self.store.state.values
    }

    /// Runs validation for a trigger if the active mode allows it.
    fn validate(&mut self, trigger: Trigger, scope: &str) {
        let state = &self.store.state;
        let mode = self.options.active_mode(state.is_submitted);
        if !mode.allows(trigger, state.is_touched(scope)) {
            tracing::trace!(?trigger, scope, ?mode, "validation skipped by mode");
            return;
        }
        self.run(trigger, scope, false);
    }

    fn run(&mut self, trigger: Trigger, scope: &str, immediate: bool) {
        let requests = self
            .orchestrator
            .run(trigger, scope, &self.store.state.values, immediate);
        self.requests.extend(requests);
    }

    /// Folds error layers into the state and recomputes derived flags.
    fn settle(&mut self) {
        let state = &mut self.store.state;
        state.errors = self
            .orchestrator
            .merged()
            .into_iter()
            .map(|(path, error)| (path, error.message))
            .collect();
        state.validating_fields = self.orchestrator.validating_fields();
        state.recompute_flags();
    }

    fn touch_all(&mut self) {
        let mut paths: BTreeSet<String> = path::leaf_paths(self.values()).into_iter().collect();
        paths.extend(self.orchestrator.validated_fields());
        paths.extend(self.store.state.errors.keys().cloned());
        for path in paths {
            self.store.mark_touched(&path);
        }
    }

    fn sweep_files(&mut self) {
        let released = self.files.sweep(&self.store.state.values);
        if released > 0 {
            tracing::debug!(released, "preview handles revoked");
        }
    }

    fn set_value(&mut self, path: &str, value: Value, options: SetValueOptions) {
        self.store.apply_change(path, value);
        if options.touch {
            self.store.mark_touched(path);
        }
        self.sweep_files();
        if options.validate.unwrap_or(self.options.validate_on_set_value) {
            self.validate(Trigger::Change, path);
        }
    }

    fn edit_array(&mut self, array: &str, edit: ArrayEdit, inserted: Option<Value>) {
        let mut items: Vec<Value> = match path::get(self.values(), array) {
            Some(Value::Array(items)) => items.as_ref().clone(),
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                tracing::warn!(path = array, "array operation on a non-array value ignored");
                return;
            }
        };
        let Some(edit) = edit.resolve(items.len()) else {
            tracing::warn!(path = array, ?edit, len = items.len(), "array index out of range, ignored");
            return;
        };

        if let ArrayEdit::Remove { index } = edit {
            self.orchestrator
                .cancel_within(&path::join(array, &index.to_string()));
        }
        edit.apply(&mut items, inserted);
        self.store.write(array, Value::from_items(items));

        let rename = |key: &str| edit.rename(key, array);
        self.store.rekey(&rename);
        self.orchestrator.rekey(&rename);

        match edit {
            ArrayEdit::Insert { index } => {
                self.store.refresh_dirty(&path::join(array, &index.to_string()))
            }
            _ => self.store.refresh_dirty_spine(array),
        }
        self.sweep_files();
        self.validate(Trigger::Change, array);
    }

    fn replace_array(&mut self, array: &str, items: Vec<Value>) {
        let below = |k: &str| k != array && path::is_within(k, array);
        self.orchestrator.cancel_within(array);
        self.orchestrator
            .rekey(&|k: &str| (!below(k)).then(|| k.to_string()));
        self.store
            .rekey(&|k: &str| (!below(k)).then(|| k.to_string()));
        self.store.apply_change(array, Value::from_items(items));
        self.sweep_files();
        self.validate(Trigger::Change, array);
    }

    fn add_file(&mut self, field: &str, file: Arc<FileData>) -> bool {
        let config = self.files.config(field);
        let current = path::get(&self.store.state.values, field);
        let existing = file::files_in(current).len();
        if let Err(message) = config.check(&file, existing) {
            tracing::debug!(path = field, %message, "file rejected");
            self.orchestrator.set_file_error(field, message);
            self.store.mark_touched(field);
            return false;
        }
        let next = file::with_added(current, file, config.multiple);
        self.orchestrator.clear_file_error(field);
        self.store.apply_change(field, next);
        self.store.mark_touched(field);
        self.sweep_files();
        self.validate(Trigger::Change, field);
        true
    }

    fn remove_file(&mut self, field: &str, index: Option<usize>) {
        let config = self.files.config(field);
        let next = file::with_removed(path::get(self.values(), field), index, config.multiple);
        self.orchestrator.clear_file_error(field);
        self.store.apply_change(field, next);
        self.sweep_files();
        self.validate(Trigger::Change, field);
    }

    fn reset_field(&mut self, field: &str) {
        self.orchestrator.cancel_within(field);
        self.orchestrator.clear(Some(field));
        match path::get(&self.store.state.default_values, field).cloned() {
            Some(default) => self.store.write(field, default),
            None => self.store.state.values = path::remove(self.values(), field),
        }
        self.store.refresh_dirty(field);
        self.store.mark_untouched(field);
        self.sweep_files();
    }
}

// ─── FormEngine ─────────────────────────────────────────────────────────────

/// Handle to one form's state and validators.
#[derive(Clone)]
pub struct FormEngine {
    shared: Arc<Shared>,
}

impl fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("FormEngine")
            .field("values", &inner.store.state.values)
            .field("errors", &inner.store.state.errors)
            .field("disposed", &inner.disposed)
            .finish()
    }
}

/// Result of one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Validation passed and the success callback ran.
    Submitted,
    /// Validation failed; carries the full error map.
    Invalid(BTreeMap<String, String>),
    /// The engine was disposed.
    Disposed,
}

impl FormEngine {
    pub fn builder(default_values: impl Into<Value>) -> FormConfig {
        FormConfig::new(default_values)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read<R>(&self, f: impl FnOnce(&Inner) -> R) -> R {
        f(&self.lock())
    }

    /// Runs one mutation as a critical section, then notifies subscribers.
    /// Returns `None` once the engine is disposed.
    fn update<R>(&self, op: &'static str, f: impl FnOnce(&mut Inner) -> R) -> Option<R> {
        let (result, notifications) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.disposed {
                tracing::warn!(op, "operation on a disposed form ignored");
                return None;
            }
            tracing::debug!(op, "form operation");
            let result = f(inner);
            self.schedule(inner);
            inner.settle();
            self.shared.idle.send_replace(inner.orchestrator.pending());
            let notifications: Vec<Notification> = inner.store.notify();
            (result, notifications)
        };
        for notify in notifications {
            notify();
        }
        Some(result)
    }

    /// Like [`FormEngine::update`] for operations addressing one path.
    /// Malformed paths are ignored with a warning.
    fn update_at<R>(
        &self,
        op: &'static str,
        field: &str,
        f: impl FnOnce(&mut Inner) -> R,
    ) -> Option<R> {
        if let Err(e) = path::validate(field) {
            tracing::warn!(op, error = %e, "operation ignored");
            return None;
        }
        tracing::debug!(op, path = field, "field operation");
        self.update(op, f)
    }

    fn schedule(&self, inner: &mut Inner) {
        let requests = std::mem::take(&mut inner.requests);
        if requests.is_empty() {
            return;
        }
        let Some(runtime) = &self.shared.runtime else {
            return;
        };
        for request in requests {
            let task = runtime.spawn(run_validation(Arc::downgrade(&self.shared), request.clone()));
            inner.orchestrator.attach_timer(&request, task.abort_handle());
        }
    }

    /// Resolves once no async validation is pending.
    pub async fn settled(&self) {
        let mut idle = self.shared.idle.subscribe();
        let _ = idle.wait_for(|pending| *pending == 0).await;
    }

    // ─── Reading ──────────────────────────────────────────────────────────

    /// A copy of the current state. Values are shared, not deep-copied.
    pub fn state(&self) -> FormState {
        self.read(|inner| inner.store.state.clone())
    }

    pub fn field_state(&self, path: &str) -> FieldState {
        self.read(|inner| inner.store.state.field(path))
    }

    /// Every error with the source that produced it.
    pub fn field_errors(&self) -> BTreeMap<String, FieldError> {
        self.read(|inner| inner.orchestrator.merged())
    }

    pub fn options(&self) -> FormOptions {
        self.read(|inner| inner.options.clone())
    }

    pub fn is_disposed(&self) -> bool {
        self.read(|inner| inner.disposed)
    }

    /// The value tree, or the value at `path`. Missing paths yield `Null`.
    pub fn get_values(&self, path: Option<&str>) -> Value {
        self.read(|inner| {
            path::get(inner.values(), path.unwrap_or(""))
                .cloned()
                .unwrap_or_default()
        })
    }

    pub fn get_value(&self, path: &str) -> Option<Value> {
        self.read(|inner| path::get(inner.values(), path).cloned())
    }

    /// Values deserialized into a caller type.
    pub fn get_values_as<T: DeserializeOwned>(&self) -> Result<T> {
        let json = self.read(|inner| inner.store.snapshot_values()).to_json();
        Ok(serde_json::from_value(json)?)
    }

    // ─── Watching ─────────────────────────────────────────────────────────

    /// Current value at `path` (the whole tree for `None`).
    pub fn watch(&self, path: Option<&str>) -> Value {
        self.get_values(path)
    }

    pub fn watch_many(&self, paths: &[&str]) -> Vec<Option<Value>> {
        self.read(|inner| {
            paths
                .iter()
                .map(|p| path::get(inner.values(), p).cloned())
                .collect()
        })
    }

    /// Calls `callback` whenever any of `paths` changes value.
    pub fn on_watch<C>(&self, paths: &[&str], mut callback: C) -> Subscription
    where
        C: FnMut(&[Option<Value>]) + Send + 'static,
    {
        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        self.subscribe(
            move |state: &FormState| {
                paths
                    .iter()
                    .map(|p| state.value(p).cloned())
                    .collect::<Vec<_>>()
            },
            move |values: &Vec<Option<Value>>| callback(values),
        )
    }

    /// Registers a selector-scoped subscriber. `callback` runs after an
    /// operation only when the selected value changed.
    pub fn subscribe<S, F, C>(&self, selector: F, callback: C) -> Subscription
    where
        S: PartialEq + Clone + Send + 'static,
        F: Fn(&FormState) -> S + Send + 'static,
        C: FnMut(&S) + Send + 'static,
    {
        let id = self.lock().store.subscribe(selector, callback);
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    // ─── Writing ──────────────────────────────────────────────────────────

    pub fn set_value(&self, path: &str, value: impl Into<Value>) {
        self.set_value_with(path, value, SetValueOptions::default());
    }

    pub fn set_value_with(&self, path: &str, value: impl Into<Value>, options: SetValueOptions) {
        let value = value.into();
        self.update_at("set_value", path, |inner| {
            inner.set_value(path, value, options)
        });
    }

    /// Deep-merges `partial` into the values: objects merge key by key,
    /// anything else replaces.
    pub fn set_values(&self, partial: impl Into<Value>) {
        let partial = partial.into();
        self.update("set_values", |inner| {
            let merged = merge(inner.values(), &partial);
            inner.store.replace_values(merged);
            inner.sweep_files();
            match partial.as_object() {
                Some(map) => {
                    for key in map.keys() {
                        inner.validate(Trigger::Change, key);
                    }
                }
                None => inner.validate(Trigger::Change, ""),
            }
        });
    }

    /// Marks `path` touched without validating.
    pub fn touch(&self, path: &str) {
        self.update_at("touch", path, |inner| inner.store.mark_touched(path));
    }

    /// A blur event: marks `path` touched and runs blur validation.
    pub fn blur(&self, path: &str) {
        self.update_at("blur", path, |inner| {
            inner.store.mark_touched(path);
            inner.validate(Trigger::Blur, path);
        });
    }

    // ─── Errors and validation ────────────────────────────────────────────

    /// Sets a manual error. It outranks every validator and stays until
    /// cleared with [`FormEngine::clear_errors`].
    pub fn set_error(&self, path: &str, message: impl Into<String>) {
        let message = message.into();
        self.update_at("set_error", path, |inner| {
            inner.orchestrator.set_manual(path, message)
        });
    }

    /// Clears errors at and below `path` (every error for `None`).
    pub fn clear_errors(&self, path: Option<&str>) {
        self.update("clear_errors", |inner| inner.orchestrator.clear(path));
    }

    /// Runs every validator for `paths` (the whole form for `None`), waits
    /// for async results and reports whether the requested scope is valid.
    pub async fn trigger(&self, paths: Option<&[&str]>) -> bool {
        let scopes: Vec<String> = match paths {
            Some(paths) => paths
                .iter()
                .filter(|p| path::validate(p).is_ok())
                .map(|p| p.to_string())
                .collect(),
            None => vec![String::new()],
        };
        let started = self.update("trigger", |inner| {
            for scope in &scopes {
                inner.run(Trigger::Manual, scope, true);
            }
        });
        if started.is_none() {
            return false;
        }
        self.settled().await;
        self.read(|inner| {
            scopes.iter().all(|scope| {
                !inner
                    .store
                    .state
                    .errors
                    .keys()
                    .any(|k| path::is_within(k, scope))
            })
        })
    }

    // ─── Submission ───────────────────────────────────────────────────────

    /// Validates the whole form for submission and dispatches to
    /// `on_valid` (with the values) or `on_error` (with every error).
    ///
    /// Async validators run without debounce and are awaited. Every field
    /// is marked touched. `is_submitting` is set only while `on_valid`
    /// runs.
    pub async fn handle_submit<V, Fut, E>(&self, on_valid: V, on_error: E) -> SubmitOutcome
    where
        V: FnOnce(Value) -> Fut,
        Fut: Future<Output = ()>,
        E: FnOnce(BTreeMap<String, String>),
    {
        let started = self.update("submit", |inner| {
            let flushed = inner.orchestrator.flush();
            inner.requests.extend(flushed);
            inner.run(Trigger::Submit, "", true);
            inner.touch_all();
        });
        if started.is_none() {
            return SubmitOutcome::Disposed;
        }

        self.settled().await;

        let validated = self.update("submit validated", |inner| {
            inner.touch_all();
            let state = &mut inner.store.state;
            state.submit_count += 1;
            state.is_submitted = true;
            state.is_submit_successful = false;
            state.is_submitting = state.errors.is_empty();
            (state.values.clone(), state.errors.clone())
        });
        let Some((values, errors)) = validated else {
            return SubmitOutcome::Disposed;
        };

        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "submission rejected");
            on_error(errors.clone());
            return SubmitOutcome::Invalid(errors);
        }

        on_valid(values).await;
        self.update("submit complete", |inner| {
            inner.store.state.is_submitting = false;
            inner.store.state.is_submit_successful = true;
        });
        SubmitOutcome::Submitted
    }

    /// A reusable submit handler bound to `on_valid`.
    pub fn submit<F, Fut>(&self, on_valid: F) -> SubmitHandler
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        SubmitHandler {
            engine: self.clone(),
            on_valid: Arc::new(move |values| on_valid(values).boxed()),
            on_error: None,
        }
    }

    // ─── Arrays ───────────────────────────────────────────────────────────

    pub fn add_array_item(&self, path: &str, item: impl Into<Value>) {
        self.insert_array_item(path, usize::MAX, item);
    }

    pub fn prepend_array_item(&self, path: &str, item: impl Into<Value>) {
        self.insert_array_item(path, 0, item);
    }

    /// Inserts before `index`; an index past the end appends.
    pub fn insert_array_item(&self, path: &str, index: usize, item: impl Into<Value>) {
        let item = item.into();
        self.update_at("insert_array_item", path, |inner| {
            inner.edit_array(path, ArrayEdit::Insert { index }, Some(item))
        });
    }

    pub fn remove_array_item(&self, path: &str, index: usize) {
        self.update_at("remove_array_item", path, |inner| {
            inner.edit_array(path, ArrayEdit::Remove { index }, None)
        });
    }

    pub fn move_array_item(&self, path: &str, from: usize, to: usize) {
        self.update_at("move_array_item", path, |inner| {
            inner.edit_array(path, ArrayEdit::Move { from, to }, None)
        });
    }

    pub fn swap_array_items(&self, path: &str, a: usize, b: usize) {
        self.update_at("swap_array_items", path, |inner| {
            inner.edit_array(path, ArrayEdit::Swap { a, b }, None)
        });
    }

    /// Replaces every item. State below the array is dropped.
    pub fn replace_array(&self, path: &str, items: Vec<Value>) {
        self.update_at("replace_array", path, |inner| {
            inner.replace_array(path, items)
        });
    }

    // ─── Files ────────────────────────────────────────────────────────────

    /// Adds a file to a file field. A constraint violation records a
    /// file-constraint error at `path` and leaves the value unchanged.
    pub fn add_file(&self, path: &str, file: impl Into<Arc<FileData>>) -> bool {
        let file = file.into();
        self.update_at("add_file", path, |inner| inner.add_file(path, file))
            .unwrap_or(false)
    }

    /// Removes the file at `index`, or every file for `None`.
    pub fn remove_file(&self, path: &str, index: Option<usize>) {
        self.update_at("remove_file", path, |inner| inner.remove_file(path, index));
    }

    pub fn clear_files(&self, path: &str) {
        self.remove_file(path, None);
    }

    pub fn files(&self, path: &str) -> Vec<Arc<FileData>> {
        self.read(|inner| file::files_in(path::get(inner.values(), path)))
    }

    pub fn file_info(&self, file: &FileData) -> FileDescriptor {
        file.descriptor()
    }

    /// A preview handle for an image file, created on first request.
    pub fn file_preview(&self, file: &FileData) -> Option<String> {
        let mut inner = self.lock();
        if inner.disposed {
            return None;
        }
        inner.files.preview(file)
    }

    pub fn file_config(&self, path: &str) -> FileFieldConfig {
        self.read(|inner| inner.files.config(path))
    }

    // ─── Snapshots ────────────────────────────────────────────────────────

    pub fn get_snapshot(&self) -> Snapshot {
        self.read(|inner| Snapshot::capture(&inner.store.state))
    }

    /// Replaces values, errors and touched with the snapshot's. Pending
    /// async validation is cancelled; derived flags are recomputed.
    pub fn restore_snapshot(&self, snapshot: &Snapshot) {
        let snapshot = snapshot.clone();
        self.update("restore_snapshot", |inner| {
            inner.orchestrator.restore(snapshot.errors);
            inner.store.replace_values(snapshot.values);
            inner.store.state.touched = snapshot.touched;
            inner.sweep_files();
        });
    }

    pub fn has_changes(&self) -> bool {
        self.read(|inner| inner.store.state.is_dirty)
    }

    /// A partial tree holding only the changed values. Arrays are reported
    /// whole.
    pub fn get_changes(&self) -> Value {
        self.read(|inner| {
            let state = &inner.store.state;
            let dirty: Vec<&String> = state
                .dirty_fields
                .iter()
                .filter(|(_, d)| **d)
                .map(|(k, _)| k)
                .collect();
            let mut changes = Value::object();
            for key in &dirty {
                let deepest = !dirty
                    .iter()
                    .any(|other| other != key && path::is_within(other, key));
                if !deepest {
                    continue;
                }
                let target = array_root(&state.values, key);
                if let Some(value) = path::get(&state.values, &target) {
                    changes = path::set(&changes, &target, value.clone());
                }
            }
            changes
        })
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────

    /// Cancels async work, drops all errors and flags and starts over from
    /// `values` (which become the new defaults) or the current defaults.
    pub fn reset(&self, values: Option<Value>) {
        self.update("reset", |inner| {
            inner.orchestrator.reset();
            let defaults = values.unwrap_or_else(|| inner.store.state.default_values.clone());
            inner.store.state = FormState::new(defaults);
            inner.sweep_files();
        });
    }

    /// Restores one field to its default and clears its errors and touched
    /// flags.
    pub fn reset_field(&self, path: &str) {
        self.update_at("reset_field", path, |inner| inner.reset_field(path));
    }

    /// Tears the form down: cancels async validation, revokes previews and
    /// drops subscribers. Later mutations are ignored.
    pub fn dispose(&self) {
        self.update("dispose", |inner| {
            inner.orchestrator.cancel_all();
            inner.files.release_all();
            inner.store.clear_subscribers();
            inner.disposed = true;
        });
    }

    // ─── Schema metadata ──────────────────────────────────────────────────

    pub fn describe_schema(&self, schema: &SchemaHandle) -> Vec<FieldMeta> {
        schema.describe()
    }

    pub fn schema_union(&self, schema: &SchemaHandle) -> Option<UnionInfo> {
        schema.is_union()
    }
}

/// Sleeps for the debounce, fires the validator if still current and
/// applies its outcome. Holds only a weak reference while waiting.
async fn run_validation(shared: Weak<Shared>, request: AsyncRequest) {
    if !request.delay.is_zero() {
        tokio::time::sleep(request.delay).await;
    }

    let started = {
        let Some(engine) = shared.upgrade() else {
            return;
        };
        let mut guard = engine.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let inner = &mut *guard;
        if inner.disposed {
            return;
        }
        inner
            .orchestrator
            .begin(request.index, request.generation, &inner.store.state.values)
    };
    let Some((validate, value)) = started else {
        return;
    };

    let outcome = match tokio::spawn(validate(value)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::debug!(error = %e, "async validator panicked");
            Err(ValidatorFailure::generic())
        }
    };

    if let Some(shared) = shared.upgrade() {
        let engine = FormEngine { shared };
        engine.update("async result", |inner| {
            inner
                .orchestrator
                .complete(request.index, request.generation, outcome)
        });
    }
}

/// `key` truncated at its first array-valued ancestor (or itself).
fn array_root(values: &Value, key: &str) -> String {
    let mut prefix = String::new();
    for segment in path::segments(key) {
        prefix = path::join(&prefix, segment);
        if path::get(values, &prefix).is_some_and(Value::is_array) {
            return prefix;
        }
    }
    prefix
}

fn merge(base: &Value, partial: &Value) -> Value {
    match (base, partial) {
        (Value::Object(base), Value::Object(partial)) => {
            let mut out: Map = base.as_ref().clone();
            for (key, value) in partial.iter() {
                let merged = match base.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                out.insert(key.clone(), merged);
            }
            Value::from_map(out)
        }
        _ => partial.clone(),
    }
}

// ─── Subscriptions and handlers ─────────────────────────────────────────────

/// Registration returned by [`FormEngine::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops notifications. Returns `false` if already removed.
    pub fn unsubscribe(self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .store
                .unsubscribe(self.id),
            None => false,
        }
    }
}

type ValidFn = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;
type ErrorFn = Arc<dyn Fn(BTreeMap<String, String>) + Send + Sync>;

/// Reusable submission entry point returned by [`FormEngine::submit`].
#[derive(Clone)]
pub struct SubmitHandler {
    engine: FormEngine,
    on_valid: ValidFn,
    on_error: Option<ErrorFn>,
}

impl SubmitHandler {
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(BTreeMap<String, String>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    /// Runs one submission. Never fails; the outcome says which callback
    /// ran.
    pub async fn call(&self) -> SubmitOutcome {
        let on_valid = Arc::clone(&self.on_valid);
        let on_error = self.on_error.clone();
        self.engine
            .handle_submit(
                move |values| on_valid(values),
                move |errors| {
                    if let Some(on_error) = on_error {
                        on_error(errors);
                    }
                },
            )
            .await
    }
}

impl fmt::Debug for SubmitHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitHandler")
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
