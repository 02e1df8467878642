//! Owner of the canonical [`FormState`].
//!
//! All value writes go through [`Store::write`] / [`Store::apply_change`];
//! dirty flags are recomputed structurally against the defaults. Subscribers
//! register a selector; [`Store::notify`] re-evaluates every selector and
//! hands back the callbacks whose selected value changed, so the caller can
//! run them after releasing its lock. A callback is never re-entered;
//! changes raised while it runs are coalesced and delivered after it
//! returns.

use crate::path;
use crate::state::FormState;
use crate::value::{Value, walk};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// A deferred subscriber callback.
pub(crate) type Notification = Box<dyn FnOnce() + Send>;

type Slot = Box<dyn FnMut(&FormState) -> Option<Notification> + Send>;

pub(crate) struct Store {
    pub(crate) state: FormState,
    subscribers: BTreeMap<u64, Slot>,
    next_subscriber: u64,
}

impl Store {
    pub(crate) fn new(default_values: Value) -> Self {
        Self {
            state: FormState::new(default_values),
            subscribers: BTreeMap::new(),
            next_subscriber: 1,
        }
    }

    /// Writes `value` at `path` without touching dirty flags.
    pub(crate) fn write(&mut self, path: &str, value: Value) {
        self.state.values = path::set(&self.state.values, path, value);
    }

    /// Writes `value` at `path` and recomputes dirty flags around it.
    ///
    /// A write that creates intermediates or pads an array refreshes from
    /// the nearest node that existed before, so the new siblings are
    /// flagged too.
    pub(crate) fn apply_change(&mut self, path: &str, value: Value) {
        let root = self.existing_root(path).to_string();
        self.write(path, value);
        self.refresh_dirty(&root);
    }

    fn existing_root<'p>(&self, path: &'p str) -> &'p str {
        if path::get(&self.state.values, path).is_some() {
            return path;
        }
        path::ancestors(path)
            .into_iter()
            .find(|a| path::get(&self.state.values, a).is_some())
            .unwrap_or("")
    }

    /// Replaces the whole value tree and recomputes every dirty flag.
    pub(crate) fn replace_values(&mut self, values: Value) {
        self.state.values = values;
        self.state.dirty_fields.clear();
        self.refresh_dirty("");
    }

    pub(crate) fn mark_touched(&mut self, path: &str) {
        self.state.touched.insert(path.to_string(), true);
    }

    /// Clears the touched flag of `path` and everything below it.
    pub(crate) fn mark_untouched(&mut self, path: &str) {
        self.state.touched.retain(|k, _| !path::is_within(k, path));
    }

    /// Renames touched and dirty entries with `rename`, dropping those it
    /// maps to `None`.
    pub(crate) fn rekey(&mut self, rename: &dyn Fn(&str) -> Option<String>) {
        for map in [&mut self.state.touched, &mut self.state.dirty_fields] {
            *map = std::mem::take(map)
                .into_iter()
                .filter_map(|(k, v)| rename(&k).map(|k| (k, v)))
                .collect();
        }
        self.state.recompute_flags();
    }

    /// Recomputes dirty flags for `path`, its subtree and its ancestors.
    ///
    /// Only `true` entries are stored; a node is dirty when its current
    /// value differs structurally from the default at the same path.
    pub(crate) fn refresh_dirty(&mut self, path: &str) {
        self.state
            .dirty_fields
            .retain(|k, _| !path::is_within(k, path));

        let mut candidates = BTreeSet::new();
        collect_paths(path::get(&self.state.values, path), path, &mut candidates);
        collect_paths(
            path::get(&self.state.default_values, path),
            path,
            &mut candidates,
        );
        candidates.insert(path.to_string());

        for candidate in candidates {
            self.refresh_node(&candidate);
        }
        self.refresh_ancestors(path);
        self.state.recompute_flags();
    }

    /// Recomputes dirty flags for `path` itself and its ancestors only,
    /// leaving the subtree's entries as they are.
    pub(crate) fn refresh_dirty_spine(&mut self, path: &str) {
        self.refresh_node(path);
        self.refresh_ancestors(path);
        self.state.recompute_flags();
    }

    fn refresh_ancestors(&mut self, path: &str) {
        for ancestor in path::ancestors(path) {
            self.refresh_node(ancestor);
        }
    }

    fn refresh_node(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }
        let current = path::get(&self.state.values, path);
        let default = path::get(&self.state.default_values, path);
        if current != default {
            self.state.dirty_fields.insert(path.to_string(), true);
        } else {
            self.state.dirty_fields.remove(path);
        }
    }

    /// The current value tree. Shares structure with the store's copy.
    pub(crate) fn snapshot_values(&self) -> Value {
        self.state.values.clone()
    }

    pub(crate) fn subscribe<S, F, C>(&mut self, selector: F, callback: C) -> u64
    where
        S: PartialEq + Clone + Send + 'static,
        F: Fn(&FormState) -> S + Send + 'static,
        C: FnMut(&S) + Send + 'static,
    {
        let id = self.next_subscriber;
        self.next_subscriber += 1;

        let callback = Arc::new(Mutex::new(callback));
        let pending: Arc<Mutex<Option<S>>> = Arc::new(Mutex::new(None));
        let mut last = selector(&self.state);
        let slot: Slot = Box::new(move |state: &FormState| {
            let next = selector(state);
            if next == last {
                return None;
            }
            last = next.clone();
            let callback = Arc::clone(&callback);
            let pending = Arc::clone(&pending);
            Some(Box::new(move || {
                *lock(&pending) = Some(next);
                deliver(&pending, &callback);
            }) as Notification)
        });

        self.subscribers.insert(id, slot);
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: u64) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub(crate) fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    pub(crate) fn notify(&mut self) -> Vec<Notification> {
        let state = &self.state;
        self.subscribers
            .values_mut()
            .filter_map(|slot| slot(state))
            .collect()
    }
}

/// Runs `callback` with the newest pending selection until none is left.
///
/// A notification raised while the callback is running (a write-back from
/// inside it, or another thread) only replaces the pending value; the
/// running delivery picks it up once the callback returns.
fn deliver<S, C: FnMut(&S)>(pending: &Mutex<Option<S>>, callback: &Mutex<C>) {
    loop {
        let mut cb = match callback.try_lock() {
            Ok(cb) => cb,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::trace!("subscriber busy, notification queued");
                return;
            }
        };
        loop {
            let next = lock(pending).take();
            match next {
                Some(value) => (*cb)(&value),
                None => break,
            }
        }
        drop(cb);
        let idle = lock(pending).is_none();
        if idle {
            return;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn collect_paths(root: Option<&Value>, base: &str, out: &mut BTreeSet<String>) {
    if let Some(root) = root {
        walk(root, &mut |rel, _| {
            out.insert(path::join(base, rel));
        });
    }
}
