//! # Object Store
//!
//! Destination of exported documents and resource files. Objects are
//! addressed by slash-separated relative paths such as
//! `Publish/CVLs/Colors.json`.
//!
//! Writes overwrite. There is no retry inside the store; a failed `put`
//! is reported to the caller, which decides what the failure aborts.

use std::fs;
use std::path::{Component, Path, PathBuf};

use parking_lot::Mutex;

use crate::error::StoreError;

/// Write-only sink for exported objects.
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any previous object.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

// ─── Directory store ────────────────────────────────────────────────

/// Object store backed by a local directory.
///
/// The directory and any intermediate folders are created on first write.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of an object path, rejecting paths that would
    /// escape the root.
    pub fn object_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        if path.is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason: "empty path".to_string(),
            });
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(StoreError::InvalidPath {
                        path: path.to_string(),
                        reason: "must be relative and stay inside the store".to_string(),
                    })
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for DirectoryStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let target = self.object_path(path)?;
        let io = |source| StoreError::Io {
            path: path.to_string(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        fs::write(&target, bytes).map_err(io)?;
        tracing::debug!(path = %path, bytes = bytes.len(), "object stored");
        Ok(())
    }
}

// ─── Memory store ───────────────────────────────────────────────────

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl StoredObject {
    /// Parse the object as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.bytes)
    }
}

type FailurePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Append-only in-memory object store.
///
/// Every successful `put` is recorded in order, including repeated writes
/// of the same path. An optional predicate makes matching writes fail.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<Vec<StoredObject>>,
    fail_when: Option<FailurePredicate>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("objects", &self.len())
            .field("injects_failures", &self.fail_when.is_some())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write whose path satisfies `predicate`.
    pub fn failing_when(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            objects: Mutex::new(Vec::new()),
            fail_when: Some(Box::new(predicate)),
        }
    }

    /// All recorded writes, in write order.
    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().iter().map(|o| o.path.clone()).collect()
    }

    /// Recorded writes whose path starts with `prefix`.
    pub fn under(&self, prefix: &str) -> Vec<StoredObject> {
        self.objects
            .lock()
            .iter()
            .filter(|o| o.path.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// The latest write of `path`.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .iter()
            .rev()
            .find(|o| o.path == path)
            .map(|o| o.bytes.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.objects.lock().clear();
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if self.fail_when.as_ref().is_some_and(|fail| fail(path)) {
            return Err(StoreError::Rejected {
                path: path.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.objects.lock().push(StoredObject {
            path: path.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}
