//! File-valued fields.
//!
//! Files live in the value tree as [`Value::File`] leaves (single mode) or
//! arrays of them (multiple mode). The [`FileManager`] owns per-field
//! constraints and the preview handles created for image files; every
//! handle it hands out is revoked once its file leaves the tree.

use crate::value::{Value, walk};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// A raw file-like value assigned to a field.
#[derive(Clone, Debug)]
pub struct FileData {
    pub(crate) id: u64,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Epoch milliseconds.
    pub last_modified: i64,
    pub bytes: Option<Arc<[u8]>>,
}

impl FileData {
    /// A file with content; size is derived from the bytes.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self {
            id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            last_modified: chrono::Utc::now().timestamp_millis(),
            bytes: Some(Arc::from(bytes)),
        }
    }

    /// A file known only by its metadata.
    pub fn from_metadata(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        last_modified: i64,
    ) -> Self {
        Self {
            id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            last_modified,
            bytes: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: i64) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Identity of this file within the process. Clones share it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn descriptor(&self) -> FileDescriptor {
        FileDescriptor {
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            last_modified: self.last_modified,
            is_image: self.is_image(),
        }
    }
}

/// Serializable metadata derived from a [`FileData`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub last_modified: i64,
    pub is_image: bool,
}

/// Constraints for one file field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileFieldConfig {
    pub multiple: bool,
    /// MIME types (`image/png`), wildcards (`image/*`) or extensions (`.pdf`).
    /// Empty accepts everything.
    pub accept: Vec<String>,
    pub max_size: Option<u64>,
    pub max_files: Option<usize>,
}

impl FileFieldConfig {
    pub fn single() -> Self {
        Self::default()
    }

    pub fn multiple() -> Self {
        Self {
            multiple: true,
            ..Self::default()
        }
    }

    pub fn accept(mut self, pattern: impl Into<String>) -> Self {
        self.accept.push(pattern.into());
        self
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = Some(count);
        self
    }

    /// Checks `file` against these constraints given how many files the
    /// field already holds. Returns the violation message on failure.
    pub fn check(&self, file: &FileData, existing: usize) -> Result<(), String> {
        if !self.accept.is_empty() && !self.accept.iter().any(|p| accepts(p, file)) {
            return Err(format!(
                "File type {} is not accepted",
                if file.mime_type.is_empty() {
                    "unknown"
                } else {
                    file.mime_type.as_str()
                }
            ));
        }
        if let Some(max) = self.max_size
            && file.size > max
        {
            return Err(format!("File exceeds the maximum size of {} bytes", max));
        }
        if self.multiple
            && let Some(max) = self.max_files
            && existing >= max
        {
            return Err(format!("At most {} files are allowed", max));
        }
        Ok(())
    }
}

fn accepts(pattern: &str, file: &FileData) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let mime = file.mime_type.to_ascii_lowercase();
    if let Some(ext) = pattern.strip_prefix('.') {
        return file
            .name
            .to_ascii_lowercase()
            .rsplit_once('.')
            .is_some_and(|(_, e)| e == ext);
    }
    if let Some(family) = pattern.strip_suffix("/*") {
        return mime
            .split_once('/')
            .is_some_and(|(top, _)| top == family);
    }
    pattern == mime
}

/// Creates and releases platform preview handles (object URLs or their
/// equivalent) for image files.
pub trait PreviewProvider: Send + Sync {
    fn create(&self, file: &FileData) -> String;
    fn revoke(&self, handle: &str);
}

/// Default provider producing opaque `blob:formstate/<uuid>` handles.
#[derive(Debug, Default)]
pub struct ObjectUrlProvider;

impl PreviewProvider for ObjectUrlProvider {
    fn create(&self, _file: &FileData) -> String {
        format!("blob:formstate/{}", uuid::Uuid::new_v4())
    }

    fn revoke(&self, handle: &str) {
        tracing::trace!(handle, "preview revoked");
    }
}

/// Per-field file constraints plus the preview-handle cache.
pub(crate) struct FileManager {
    configs: HashMap<String, FileFieldConfig>,
    previews: HashMap<u64, String>,
    provider: Arc<dyn PreviewProvider>,
}

impl FileManager {
    pub(crate) fn new(
        configs: HashMap<String, FileFieldConfig>,
        provider: Arc<dyn PreviewProvider>,
    ) -> Self {
        Self {
            configs,
            previews: HashMap::new(),
            provider,
        }
    }

    pub(crate) fn config(&self, path: &str) -> FileFieldConfig {
        self.configs.get(path).cloned().unwrap_or_default()
    }

    /// Lazily creates (and caches) a preview handle. Non-images get none.
    pub(crate) fn preview(&mut self, file: &FileData) -> Option<String> {
        if !file.is_image() {
            return None;
        }
        let provider = &self.provider;
        let handle = self
            .previews
            .entry(file.id)
            .or_insert_with(|| provider.create(file));
        Some(handle.clone())
    }

    pub(crate) fn release(&mut self, file_id: u64) {
        if let Some(handle) = self.previews.remove(&file_id) {
            self.provider.revoke(&handle);
        }
    }

    /// Revokes every cached preview whose file no longer appears in `values`.
    pub(crate) fn sweep(&mut self, values: &Value) -> usize {
        if self.previews.is_empty() {
            return 0;
        }
        let live = file_ids(values);
        let stale: Vec<u64> = self
            .previews
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for id in &stale {
            self.release(*id);
        }
        stale.len()
    }

    pub(crate) fn release_all(&mut self) {
        for (_, handle) in self.previews.drain() {
            self.provider.revoke(&handle);
        }
    }
}

fn file_ids(values: &Value) -> HashSet<u64> {
    let mut ids = HashSet::new();
    walk(values, &mut |_, node| {
        if let Value::File(file) = node {
            ids.insert(file.id);
        }
    });
    ids
}

/// Files held at a field value, in order.
pub(crate) fn files_in(value: Option<&Value>) -> Vec<Arc<FileData>> {
    match value {
        Some(Value::File(file)) => vec![file.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_file().cloned()).collect(),
        _ => Vec::new(),
    }
}

/// The field value after adding `file`.
pub(crate) fn with_added(current: Option<&Value>, file: Arc<FileData>, multiple: bool) -> Value {
    if !multiple {
        return Value::File(file);
    }
    let mut items: Vec<Value> = files_in(current).into_iter().map(Value::File).collect();
    items.push(Value::File(file));
    Value::from_items(items)
}

/// The field value after removing the file at `index` (or every file when
/// `index` is `None`).
pub(crate) fn with_removed(current: Option<&Value>, index: Option<usize>, multiple: bool) -> Value {
    let mut files = files_in(current);
    match index {
        Some(i) if i < files.len() => {
            files.remove(i);
        }
        Some(_) => {}
        None => files.clear(),
    }
    if multiple {
        Value::from_items(files.into_iter().map(Value::File).collect())
    } else {
        files.into_iter().next().map(Value::File).unwrap_or(Value::Null)
    }
}
