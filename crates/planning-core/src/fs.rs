use crate::error::{PlanningError, Result};
use crate::io;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// DocumentFs
// ---------------------------------------------------------------------------

/// Storage the document store reads and writes through.
///
/// Paths are absolute (joined onto the project root by the store). Listing a
/// directory that does not exist yields an empty list.
pub trait DocumentFs {
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Replace the contents of `path`, creating parent directories.
    fn write(&self, path: &Path, contents: &str) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Move a file, refusing to overwrite an existing destination.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Files directly inside `dir`, sorted.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Every file below `dir`, recursively, sorted.
    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

fn already_exists(path: &Path) -> PlanningError {
    std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("destination already exists: {}", path.display()),
    )
    .into()
}

fn not_found(path: &Path) -> PlanningError {
    std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
    .into()
}

// ---------------------------------------------------------------------------
// LocalFs
// ---------------------------------------------------------------------------

/// The real filesystem, with atomic writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl DocumentFs for LocalFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        tracing::debug!(path = %path.display(), "write");
        io::atomic_write(path, contents.as_bytes())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tracing::debug!(from = %from.display(), to = %to.display(), "move");
        io::move_file(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        io::ensure_dir(path)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            if !current.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&current)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

// ---------------------------------------------------------------------------
// MemoryFs
// ---------------------------------------------------------------------------

/// In-memory filesystem for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: RefCell<BTreeMap<PathBuf, String>>,
    dirs: RefCell<BTreeSet<PathBuf>>,
    failing: RefCell<BTreeSet<PathBuf>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write to `path` fail with an I/O error.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing.borrow_mut().insert(path.into());
    }

    pub fn clear_failures(&self) {
        self.failing.borrow_mut().clear();
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }
}

impl DocumentFs for MemoryFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        if self.failing.borrow().contains(path) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("simulated write failure: {}", path.display()),
            )
            .into());
        }
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path) || self.dirs.borrow().contains(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if self.files.borrow().contains_key(to) {
            return Err(already_exists(to));
        }
        let contents = self
            .files
            .borrow_mut()
            .remove(from)
            .ok_or_else(|| not_found(from))?;
        if let Some(parent) = to.parent() {
            self.create_dir_all(parent)?;
        }
        self.files.borrow_mut().insert(to.to_path_buf(), contents);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut dirs = self.dirs.borrow_mut();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn walk_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
