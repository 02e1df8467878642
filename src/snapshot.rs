//! Point-in-time copies of form state.
//!
//! A [`Snapshot`] owns plain data only (values, errors, touched, capture
//! time), so it can be kept, persisted as JSON and restored into any engine
//! with a compatible shape. [`History`] stacks snapshots for undo/redo.

use crate::error::{FormError, Result};
use crate::state::FormState;
use crate::value::Value;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Persisted shape: `{ values, errors, touched, timestamp }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub values: Value,
    pub errors: BTreeMap<String, String>,
    pub touched: BTreeMap<String, bool>,
    /// Capture time in epoch milliseconds.
    pub timestamp: i64,
}

impl Snapshot {
    pub fn capture(state: &FormState) -> Self {
        Self {
            values: state.values.clone(),
            errors: state.errors.clone(),
            touched: state.touched.clone(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| FormError::Snapshot(e.to_string()))
    }

    /// True when values, errors and touched match `other`, ignoring the
    /// capture time.
    pub fn same_state(&self, other: &Snapshot) -> bool {
        self.values == other.values && self.errors == other.errors && self.touched == other.touched
    }
}

/// Bounded undo/redo stacks of snapshots.
#[derive(Clone, Debug)]
pub struct History {
    past: VecDeque<Snapshot>,
    future: Vec<Snapshot>,
    limit: usize,
}

impl History {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn new(limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Pushes `snapshot` as the newest undo point and drops the redo stack.
    /// A snapshot equal to the newest one is not recorded twice.
    pub fn record(&mut self, snapshot: Snapshot) {
        if self.past.back().is_some_and(|last| last.same_state(&snapshot)) {
            return;
        }
        self.past.push_back(snapshot);
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
        self.future.clear();
    }

    /// Steps back: `current` moves to the redo stack and the previous
    /// snapshot is returned for restoring.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.past.pop_back()?;
        self.future.push(current);
        Some(previous)
    }

    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.future.pop()?;
        self.past.push_back(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn len(&self) -> usize {
        self.past.len()
    }

    pub fn is_empty(&self) -> bool {
        self.past.is_empty()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}
