//! Filesystem access seam.
//!
//! The engine deliberately keeps *no* in-memory cache of artifact validity:
//! the filesystem is the cache, and mtimes are the sole truth. That property
//! is what keeps multiple worker processes (and a separate deploy process
//! editing sources concurrently) correct without coordination. Everything
//! the engine reads or writes therefore goes through [`TemplateFs`], so
//! tests can substitute the in-memory [`MemFs`] double.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

pub trait TemplateFs: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write `contents` so that a concurrent reader never observes a
    /// truncated file: write to a sibling temporary file, then rename over
    /// the target.
    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn mtime(&self, path: &Path) -> io::Result<SystemTime>;

    /// Strict existence probe: the candidate counts only if it is a regular
    /// file *and* its basename matches the case-normalized real path's
    /// basename. Guards against false positives on case-insensitive
    /// filesystems.
    fn probe(&self, path: &Path) -> bool;

    /// All regular files under `root`, recursively, in a stable order.
    fn walk(&self, root: &Path) -> Vec<PathBuf>;
}

/// The real filesystem.
#[derive(Debug, Default)]
pub struct OsFs;

impl TemplateFs for OsFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn mtime(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn probe(&self, path: &Path) -> bool {
        let Ok(real) = path.canonicalize() else {
            return false;
        };
        path.is_file() && path.file_name() == real.file_name()
    }

    fn walk(&self, root: &Path) -> Vec<PathBuf> {
        walkdir::WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }
}

/// In-memory filesystem double for tests.
///
/// Paths are compared exactly as given; mtimes are explicit so staleness
/// scenarios are deterministic.
#[derive(Debug, Default)]
pub struct MemFs {
    files: Mutex<HashMap<PathBuf, (String, SystemTime)>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file with the current wall-clock mtime.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.insert_at(path, contents, SystemTime::now());
    }

    /// Insert a file with an explicit mtime.
    pub fn insert_at(&self, path: impl Into<PathBuf>, contents: impl Into<String>, mtime: SystemTime) {
        self.files.lock().unwrap().insert(path.into(), (contents.into(), mtime));
    }

    /// Bump a file's mtime without touching its contents.
    pub fn touch(&self, path: &Path, mtime: SystemTime) {
        if let Some(entry) = self.files.lock().unwrap().get_mut(path) {
            entry.1 = mtime;
        }
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).map(|(c, _)| c.clone())
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
}

impl TemplateFs for MemFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.contents(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.insert(path.to_path_buf(), contents);
        Ok(())
    }

    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn mtime(&self, path: &Path) -> io::Result<SystemTime> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, t)| *t)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }

    fn probe(&self, path: &Path) -> bool {
        self.exists(path)
    }

    fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}
