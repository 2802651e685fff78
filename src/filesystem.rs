//! Filesystem access used by the pipeline
//!
//! The orchestrator and the component locator never touch `std::fs` directly.
//! They go through the [`TileFilesystem`] trait, which is handed to them at
//! construction time. [`HostFilesystem`] is the real implementation and
//! [`MemoryFS`] is an in-memory implementation for tests and dry runs.

use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// A single entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name of the entry (no directory components)
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
        }
    }
}

/// Trait for the filesystem primitives the pipeline needs - allows an
/// in-memory filesystem in tests
pub trait TileFilesystem: Send + Sync {
    /// Reads a whole file.
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Lists a directory, sorted by entry name.
    ///
    /// Fails if `path` does not exist or is not a directory.
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Removes `path` and everything below it. Removing a path that does not
    /// exist succeeds.
    fn remove_all(&self, path: &Path) -> Result<()>;
}

/// The default implementation of `TileFilesystem`, backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFilesystem;

impl TileFilesystem for HostFilesystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| Error::file_access(path, e))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| Error::file_access(path, e))? {
            let entry = entry.map_err(|e| Error::file_access(path, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| Error::file_access(entry.path(), e))?;
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy().into_owned(),
                file_type.is_dir(),
            ));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_access(path, e)),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryTree {
    files: HashMap<PathBuf, Vec<u8>>,
    /// Directories added explicitly; parents of files exist implicitly
    dirs: BTreeSet<PathBuf>,
}

impl MemoryTree {
    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.iter().any(|d| d.starts_with(path))
            || self.files.keys().any(|f| f != path && f.starts_with(path))
    }
}

/// In-memory filesystem
///
/// Interior mutability lets it be shared behind an `Arc` with the pipeline
/// while a test keeps a handle to inspect what the pipeline did.
#[derive(Debug, Default)]
pub struct MemoryFS {
    tree: Mutex<MemoryTree>,
}

impl MemoryFS {
    /// Create a new empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryTree>> {
        self.tree.lock().map_err(|_| Error::LockPoisoned {
            context: "MemoryFS".to_string(),
        })
    }

    /// Add or update a file
    pub fn add_file<P: AsRef<Path>>(&self, path: P, content: impl Into<Vec<u8>>) -> Result<()> {
        self.lock()?
            .files
            .insert(path.as_ref().to_path_buf(), content.into());
        Ok(())
    }

    /// Add a file with string content
    pub fn add_file_string<P: AsRef<Path>>(&self, path: P, content: &str) -> Result<()> {
        self.add_file(path, content.as_bytes())
    }

    /// Add an (empty) directory
    pub fn add_dir<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.lock()?.dirs.insert(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Check if a file or directory exists
    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        match self.lock() {
            Ok(tree) => tree.files.contains_key(path) || tree.is_dir(path),
            Err(_) => false,
        }
    }

    /// Get the number of files
    pub fn len(&self) -> usize {
        self.lock().map(|tree| tree.files.len()).unwrap_or(0)
    }

    /// Check if filesystem is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(path: &Path) -> Error {
    Error::file_access(
        path,
        io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
    )
}

impl TileFilesystem for MemoryFS {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.lock()?
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let tree = self.lock()?;
        if !tree.is_dir(path) {
            return Err(not_found(path));
        }

        // name -> is_dir; a name seen as a parent of anything is a directory
        let mut children: BTreeMap<String, bool> = BTreeMap::new();
        let files = tree.files.keys().map(|p| (p, false));
        let dirs = tree.dirs.iter().map(|p| (p, true));
        for (candidate, explicit_dir) in files.chain(dirs) {
            let Ok(relative) = candidate.strip_prefix(path) else {
                continue;
            };
            let mut components = relative.components();
            let Some(first) = components.next() else {
                continue;
            };
            let is_dir = explicit_dir || components.next().is_some();
            let name = first.as_os_str().to_string_lossy().into_owned();
            let entry = children.entry(name).or_insert(false);
            *entry |= is_dir;
        }

        Ok(children
            .into_iter()
            .map(|(name, is_dir)| DirEntry::new(name, is_dir))
            .collect())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let mut tree = self.lock()?;
        tree.files.retain(|p, _| !p.starts_with(path));
        tree.dirs.retain(|p| !p.starts_with(path));
        Ok(())
    }
}
