//! Structural edits on array-valued fields.
//!
//! An [`ArrayEdit`] describes how item indices move. The engine applies it
//! to the items and then renames every path-keyed entry (errors, touched,
//! dirty) below the array with [`ArrayEdit::map_index`], so state follows
//! its item instead of staying at the old index.

use crate::path;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayEdit {
    Insert { index: usize },
    Remove { index: usize },
    Move { from: usize, to: usize },
    Swap { a: usize, b: usize },
}

impl ArrayEdit {
    /// Where the item previously at `old` ends up, or `None` if it was
    /// removed.
    pub fn map_index(self, old: usize) -> Option<usize> {
        match self {
            ArrayEdit::Insert { index } => Some(if old >= index { old + 1 } else { old }),
            ArrayEdit::Remove { index } => match old.cmp(&index) {
                std::cmp::Ordering::Less => Some(old),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(old - 1),
            },
            ArrayEdit::Move { from, to } => Some(if old == from {
                to
            } else if from < to && old > from && old <= to {
                old - 1
            } else if from > to && old >= to && old < from {
                old + 1
            } else {
                old
            }),
            ArrayEdit::Swap { a, b } => Some(if old == a {
                b
            } else if old == b {
                a
            } else {
                old
            }),
        }
    }

    /// Checks the edit against an array of `len` items. Inserting past the
    /// end appends; any other out-of-range index rejects the edit.
    pub fn resolve(self, len: usize) -> Option<ArrayEdit> {
        match self {
            ArrayEdit::Insert { index } => Some(ArrayEdit::Insert {
                index: index.min(len),
            }),
            ArrayEdit::Remove { index } if index < len => Some(self),
            ArrayEdit::Move { from, to } if from < len && to < len => Some(self),
            ArrayEdit::Swap { a, b } if a < len && b < len => Some(self),
            _ => None,
        }
    }

    /// Applies a resolved edit to `items`. `inserted` is only used by
    /// [`ArrayEdit::Insert`].
    pub fn apply(self, items: &mut Vec<Value>, inserted: Option<Value>) {
        match self {
            ArrayEdit::Insert { index } => items.insert(index, inserted.unwrap_or_default()),
            ArrayEdit::Remove { index } => {
                items.remove(index);
            }
            ArrayEdit::Move { from, to } => {
                let item = items.remove(from);
                items.insert(to, item);
            }
            ArrayEdit::Swap { a, b } => items.swap(a, b),
        }
    }

    /// The renamed form of `key` for an edit on the array at `array`, or
    /// `None` when `key` belonged to a removed item.
    pub fn rename(self, key: &str, array: &str) -> Option<String> {
        path::rebase_index(key, array, |i| self.map_index(i))
    }
}
