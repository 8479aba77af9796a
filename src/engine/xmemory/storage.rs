// ── xmemory: Storage Backends ───────────────────────────────────────────────
//
// Whole-file persistence for the theme index, the centroid document and the
// hierarchy graph. Every write replaces the full file; there is no partial or
// incremental persistence and no cross-process locking (one writer per root).
//
// Backends:
//   - NativeFs: std::fs rooted at a storage directory
//   - MemoryFs: BTreeMap-backed, for tests and ephemeral engines
//
// Document helpers return `Ok(None)` for a missing file and `Err` for a file
// that exists but does not parse; `apply_load_policy` turns the latter into
// an empty result under `LoadPolicy::ResetOnCorrupt`.

use crate::atoms::error::MemoryResult;
use crate::atoms::traits::StorageBackend;
use crate::atoms::xmemory_types::LoadPolicy;
use log::warn;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

// ═════════════════════════════════════════════════════════════════════════════
// Native filesystem
// ═════════════════════════════════════════════════════════════════════════════

/// Filesystem backend rooted at a storage directory.
#[derive(Debug, Clone)]
pub struct NativeFs {
    root: PathBuf,
}

impl NativeFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl StorageBackend for NativeFs {
    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn read_to_string(&self, path: &Path) -> MemoryResult<String> {
        Ok(std::fs::read_to_string(self.resolve(path))?)
    }

    fn write(&self, path: &Path, contents: &str) -> MemoryResult<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(full, contents)?)
    }

    fn create_dir_all(&self, path: &Path) -> MemoryResult<()> {
        Ok(std::fs::create_dir_all(self.resolve(path))?)
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// In-memory filesystem
// ═════════════════════════════════════════════════════════════════════════════

/// In-memory backend. Writing a file registers all of its parent directories.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RwLock<BTreeMap<PathBuf, String>>,
    dirs: RwLock<BTreeSet<PathBuf>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file directly (used to plant corrupt documents in tests).
    pub fn insert_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let path = path.into();
        self.register_parents(&path);
        self.files.write().insert(path, contents.into());
    }

    /// Snapshot of every file written so far.
    pub fn files(&self) -> BTreeMap<PathBuf, String> {
        self.files.read().clone()
    }

    /// Drop all files and directories.
    pub fn reset(&self) {
        self.files.write().clear();
        self.dirs.write().clear();
    }

    fn register_parents(&self, path: &Path) {
        let mut dirs = self.dirs.write();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() || ancestor == Path::new("/") {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }
}

impl StorageBackend for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path) || self.dirs.read().contains(path)
    }

    fn read_to_string(&self, path: &Path) -> MemoryResult<String> {
        self.files.read().get(path).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
            .into()
        })
    }

    fn write(&self, path: &Path, contents: &str) -> MemoryResult<()> {
        self.insert_file(path, contents);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> MemoryResult<()> {
        self.register_parents(path);
        self.dirs.write().insert(path.to_path_buf());
        Ok(())
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Document helpers
// ═════════════════════════════════════════════════════════════════════════════

/// Create a directory if it does not exist yet.
pub fn ensure_dir(backend: &dyn StorageBackend, dir: &Path) -> MemoryResult<()> {
    if dir.as_os_str().is_empty() || backend.exists(dir) {
        return Ok(());
    }
    backend.create_dir_all(dir)
}

/// Read and parse a JSON document. Missing file → `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    path: &Path,
) -> MemoryResult<Option<T>> {
    if !backend.exists(path) {
        return Ok(None);
    }
    let content = backend.read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Read and parse a YAML document. Missing file → `Ok(None)`.
pub fn read_yaml<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    path: &Path,
) -> MemoryResult<Option<T>> {
    if !backend.exists(path) {
        return Ok(None);
    }
    let content = backend.read_to_string(path)?;
    Ok(Some(serde_yaml::from_str(&content)?))
}

/// Serialize as pretty JSON and replace the file, creating parent directories.
pub fn write_json<T: Serialize>(
    backend: &dyn StorageBackend,
    path: &Path,
    data: &T,
) -> MemoryResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(backend, parent)?;
    }
    backend.write(path, &serde_json::to_string_pretty(data)?)
}

/// Serialize as YAML and replace the file, creating parent directories.
pub fn write_yaml<T: Serialize>(
    backend: &dyn StorageBackend,
    path: &Path,
    data: &T,
) -> MemoryResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(backend, parent)?;
    }
    backend.write(path, &serde_yaml::to_string(data)?)
}

/// Apply a load policy to the outcome of a document read.
///
/// Under `ResetOnCorrupt` a read error is logged and reported as "no document".
pub fn apply_load_policy<T>(
    outcome: MemoryResult<Option<T>>,
    policy: LoadPolicy,
    path: &Path,
) -> MemoryResult<Option<T>> {
    match (outcome, policy) {
        (Ok(doc), _) => Ok(doc),
        (Err(e), LoadPolicy::ResetOnCorrupt) => {
            warn!(
                "[xmemory::storage] Unreadable document {}, starting empty: {}",
                path.display(),
                e
            );
            Ok(None)
        }
        (Err(e), LoadPolicy::Propagate) => Err(e),
    }
}
