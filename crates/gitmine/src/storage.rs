//! Flat-file persistence for harvested and filtered documents.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The file the failed operation touched.
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Json { path, .. } => path,
        }
    }
}

/// Where harvested documents are read from and written to.
pub trait DocumentStore: Send + Sync {
    fn read_document(&self, path: &Path) -> Result<Value, StorageError>;

    /// Write `value` to `dir/filename`, replacing any previous content, and
    /// return the written path.
    fn write_document(
        &self,
        value: &Value,
        dir: &Path,
        filename: &str,
    ) -> Result<PathBuf, StorageError>;
}

/// Pretty-printed JSON files on the local filesystem.
///
/// Writes go through a temporary file in the target directory followed by a
/// rename, so readers only ever see the last complete document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileStore;

impl JsonFileStore {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentStore for JsonFileStore {
    fn read_document(&self, path: &Path) -> Result<Value, StorageError> {
        let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_document(
        &self,
        value: &Value,
        dir: &Path,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        let mut content = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
            path: dir.join(filename),
            source,
        })?;
        content.push(b'\n');

        let target = atomic_write(dir, filename, &content)?;
        tracing::debug!(path = %target.display(), bytes = content.len(), "Wrote document");
        Ok(target)
    }
}

/// Write `lines` to `path`, one per line, each terminated by `\n`.
///
/// Lines are written verbatim: embedded newlines are not escaped.
pub fn write_lines<S: AsRef<str>>(lines: &[S], path: &Path) -> Result<PathBuf, StorageError> {
    let mut content = String::new();
    for line in lines {
        content.push_str(line.as_ref());
        content.push('\n');
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            StorageError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;

    atomic_write(dir, filename, content.as_bytes())
}

fn atomic_write(dir: &Path, filename: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

    let target = dir.join(filename);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(content)
        .and_then(|()| tmp.flush())
        .map_err(|e| StorageError::io(&target, e))?;
    tmp.persist(&target)
        .map_err(|e| StorageError::io(&target, e.error))?;

    Ok(target)
}

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryStore;

#[cfg(any(test, feature = "test-support"))]
mod memory {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// In-memory store that records every write.
    ///
    /// `fail_after(n)` makes every write after the first `n` fail with an
    /// I/O error.
    #[derive(Clone, Default)]
    pub struct MemoryStore {
        inner: Arc<Mutex<MemoryStoreInner>>,
    }

    #[derive(Default)]
    struct MemoryStoreInner {
        files: HashMap<PathBuf, Value>,
        writes: Vec<(PathBuf, Value)>,
        fail_after: Option<usize>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn fail_after(self, writes: usize) -> Self {
            self.lock().fail_after = Some(writes);
            self
        }

        pub fn insert(&self, path: impl Into<PathBuf>, value: Value) {
            self.lock().files.insert(path.into(), value);
        }

        /// Current content of `path`.
        pub fn get(&self, path: impl AsRef<Path>) -> Option<Value> {
            self.lock().files.get(path.as_ref()).cloned()
        }

        /// Every successful write, in order.
        pub fn writes(&self) -> Vec<(PathBuf, Value)> {
            self.lock().writes.clone()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
            self.inner
                .lock()
                .expect("memory store lock should not be poisoned")
        }
    }

    impl DocumentStore for MemoryStore {
        fn read_document(&self, path: &Path) -> Result<Value, StorageError> {
            self.get(path).ok_or_else(|| {
                StorageError::io(path, io::Error::new(io::ErrorKind::NotFound, "not stored"))
            })
        }

        fn write_document(
            &self,
            value: &Value,
            dir: &Path,
            filename: &str,
        ) -> Result<PathBuf, StorageError> {
            let path = dir.join(filename);
            let mut inner = self.lock();
            if let Some(limit) = inner.fail_after
                && inner.writes.len() >= limit
            {
                return Err(StorageError::io(
                    &path,
                    io::Error::other("simulated write failure"),
                ));
            }
            inner.files.insert(path.clone(), value.clone());
            inner.writes.push((path.clone(), value.clone()));
            Ok(path)
        }
    }
}
