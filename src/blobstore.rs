//! Blob store used to push finished output
//!
//! Keys are `/`-separated paths relative to the store root. The transform
//! engine itself never touches a store; only the batch push step does.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub trait BlobStore {
    /// Uploads `local` under `key`. Returns whether the object was written.
    fn put(&self, local: &Path, key: &str) -> io::Result<bool>;

    /// Every key starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> io::Result<Vec<String>>;

    /// Immediate "directories" below `prefix`, each ending in `/`.
    fn list_subdirectories(&self, prefix: &str) -> io::Result<Vec<String>>;

    /// Removes `key`. Returns false if it did not exist.
    fn delete(&self, key: &str) -> io::Result<bool>;
}

/// A blob store backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_of(&self, key: &str) -> io::Result<PathBuf> {
        if key.split('/').any(|part| part == "..") || key.starts_with('/') {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("invalid key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

fn key_of(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect();
    Some(parts.join("/"))
}

impl BlobStore for LocalBlobStore {
    fn put(&self, local: &Path, key: &str) -> io::Result<bool> {
        let dest = self.path_of(key)?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(local, &dest)?;
        Ok(true)
    }

    fn list(&self, prefix: &str) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(key) = key_of(&self.root, entry.path()) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn list_subdirectories(&self, prefix: &str) -> io::Result<Vec<String>> {
        let dir = self.path_of(prefix.trim_end_matches('/'))?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_dir() {
                if let Some(key) = key_of(&self.root, entry.path()) {
                    dirs.push(format!("{key}/"));
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn delete(&self, key: &str) -> io::Result<bool> {
        match std::fs::remove_file(self.path_of(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Puts every file below `dir`, keyed by its path relative to `local_root`.
/// Returns the number of files pushed.
pub fn push_tree(store: &dyn BlobStore, local_root: &Path, dir: &Path) -> io::Result<usize> {
    let mut pushed = 0;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(key) = key_of(local_root, entry.path()) else {
            continue;
        };
        if store.put(entry.path(), &key)? {
            tracing::debug!(%key, "pushed");
            pushed += 1;
        }
    }
    Ok(pushed)
}
