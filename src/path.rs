//! Path resolution over the value tree.
//!
//! A field path is a dot-separated list of segments; numeric segments index
//! arrays (`users.0.email`). The empty path addresses the root.
//!
//! [`get`] never fails. [`set`] and [`remove`] are pure: they return a new
//! tree that shares every branch off the root→target spine with the input.

use crate::error::{FormError, Result};
use crate::value::{Map, Value, walk};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^.]+(\.[^.]+)*$").unwrap());

/// Checks that `path` is addressable: the empty root path, or non-empty
/// segments joined by single dots.
pub fn validate(path: &str) -> Result<()> {
    if path.is_empty() || PATH_RE.is_match(path) {
        return Ok(());
    }
    let reason = if path.starts_with('.') {
        "leading dot"
    } else if path.ends_with('.') {
        "trailing dot"
    } else {
        "empty segment"
    };
    Err(FormError::invalid_path(path, reason))
}

/// Validates `path` and splits it into owned segments.
pub fn parse(path: &str) -> Result<Vec<String>> {
    validate(path)?;
    Ok(segments(path).into_iter().map(str::to_string).collect())
}

/// Splits a path into segments. The root path has no segments.
pub fn segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

pub fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Joins a prefix and a relative path, treating empty parts as the root.
pub fn join(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}.{}", prefix, rest),
    }
}

/// Parent path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('.').map(|pos| &path[..pos]).unwrap_or(""))
}

/// True when `path` equals `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    relative(path, ancestor).is_some()
}

/// True when one path contains the other.
pub fn is_related(a: &str, b: &str) -> bool {
    is_within(a, b) || is_within(b, a)
}

/// The part of `path` below `base`, or `None` if `path` is not within it.
pub fn relative<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(base)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('.')
    }
}

/// Renames the index segment that follows `array` in `path`.
///
/// `map` receives the old index and returns the new one, or `None` when the
/// entry should be dropped. Paths outside `array`, or whose next segment is
/// not an index, are returned unchanged.
pub fn rebase_index(
    path: &str,
    array: &str,
    map: impl FnOnce(usize) -> Option<usize>,
) -> Option<String> {
    let Some(rest) = relative(path, array) else {
        return Some(path.to_string());
    };
    if rest.is_empty() {
        return Some(path.to_string());
    }
    let (head, tail) = match rest.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (rest, None),
    };
    let Ok(index) = head.parse::<usize>() else {
        return Some(path.to_string());
    };
    let item = join(array, &map(index)?.to_string());
    Some(match tail {
        Some(tail) => join(&item, tail),
        None => item,
    })
}

/// Every ancestor of `path`, nearest first, excluding the root.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p.is_empty() {
            break;
        }
        out.push(p);
        current = parent(p);
    }
    out
}

/// Resolves `path` inside `tree`. Missing segments yield `None`.
pub fn get<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = tree;
    for segment in segments(path) {
        current = current.child(segment)?;
    }
    Some(current)
}

/// Most `Null` entries a single write may pad onto an array.
pub const MAX_PAD: usize = 10_000;

/// Writes `value` at `path`, returning the new tree.
///
/// Missing intermediate containers are created as arrays when the next
/// segment is numeric and as objects otherwise. Indices past the end of an
/// array pad it with `Null`, up to [`MAX_PAD`] entries; a write that would
/// pad further is dropped and the input tree is returned as is. Descending
/// through a scalar replaces it with a fresh container.
pub fn set(tree: &Value, path: &str, value: Value) -> Value {
    let segs = segments(path);
    set_at(tree, &segs, value, path).unwrap_or_else(|| tree.clone())
}

fn set_at(node: &Value, segs: &[&str], value: Value, path: &str) -> Option<Value> {
    let Some((head, rest)) = segs.split_first() else {
        return Some(value);
    };

    match node {
        Value::Object(map) => {
            let next = map.get(*head).cloned().unwrap_or(Value::Null);
            let child = set_at(&next, rest, value, path)?;
            let mut copy: Map = (**map).clone();
            copy.insert(head.to_string(), child);
            Some(Value::Object(Arc::new(copy)))
        }
        Value::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                let within_pad = index
                    .checked_sub(items.len())
                    .is_none_or(|pad| pad < MAX_PAD);
                if !within_pad {
                    tracing::warn!(
                        path,
                        segment = *head,
                        len = items.len(),
                        "path resolution: index too far past the end of the array, write dropped"
                    );
                    return None;
                }
                let next = items.get(index).cloned().unwrap_or(Value::Null);
                let child = set_at(&next, rest, value, path)?;
                let mut copy = (**items).clone();
                if index >= copy.len() {
                    copy.resize(index + 1, Value::Null);
                }
                copy[index] = child;
                Some(Value::Array(Arc::new(copy)))
            }
            Err(_) => {
                tracing::warn!(
                    path,
                    segment = *head,
                    "path resolution: key segment into an array, replacing with an object"
                );
                set_at(&Value::object(), segs, value, path)
            }
        },
        Value::Null => set_at(&fresh_container(head), segs, value, path),
        _ => {
            tracing::warn!(
                path,
                segment = *head,
                "path resolution: descending through a scalar, replacing with a container"
            );
            set_at(&fresh_container(head), segs, value, path)
        }
    }
}

fn fresh_container(segment: &str) -> Value {
    if is_index(segment) {
        Value::array()
    } else {
        Value::object()
    }
}

/// Removes the node at `path`, returning the new tree.
///
/// Array elements after a removed index shift down. A path that does not
/// resolve leaves the tree unchanged (the returned root shares identity
/// with the input). Removing the root yields `Null`.
pub fn remove(tree: &Value, path: &str) -> Value {
    let segs = segments(path);
    if segs.is_empty() {
        return Value::Null;
    }
    remove_at(tree, &segs).unwrap_or_else(|| tree.clone())
}

fn remove_at(node: &Value, segs: &[&str]) -> Option<Value> {
    let (head, rest) = segs.split_first()?;

    match node {
        Value::Object(map) => {
            if rest.is_empty() {
                if !map.contains_key(*head) {
                    return None;
                }
                let mut copy: Map = (**map).clone();
                copy.shift_remove(*head);
                return Some(Value::Object(Arc::new(copy)));
            }
            let child = remove_at(map.get(*head)?, rest)?;
            let mut copy: Map = (**map).clone();
            copy.insert(head.to_string(), child);
            Some(Value::Object(Arc::new(copy)))
        }
        Value::Array(items) => {
            let index = head.parse::<usize>().ok()?;
            if index >= items.len() {
                return None;
            }
            let mut copy = (**items).clone();
            if rest.is_empty() {
                copy.remove(index);
            } else {
                copy[index] = remove_at(&items[index], rest)?;
            }
            Some(Value::Array(Arc::new(copy)))
        }
        _ => None,
    }
}

/// Paths of every leaf below `root`.
///
/// Scalars, files and empty containers count as leaves. A scalar root
/// yields the single root path `""`.
pub fn leaf_paths(root: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk(root, &mut |path, node| {
        let is_leaf = match node {
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => true,
        };
        if is_leaf && !(path.is_empty() && node.is_container()) {
            out.push(path.to_string());
        }
    });
    out
}
