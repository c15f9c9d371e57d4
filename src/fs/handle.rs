//! Open file and directory handles

use dashmap::DashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::passthrough::PassthroughDirectory;
use crate::error::{Error, Result};
use crate::trie::NodeId;

/// Open directory
#[derive(Debug)]
pub enum DirectoryHandle {
    /// Listing comes from the trie; nothing to tear down
    Synthetic { path: PathBuf, node: NodeId },
    /// Listing comes from a real directory stream
    Passthrough {
        path: PathBuf,
        dir: PassthroughDirectory,
    },
}

impl DirectoryHandle {
    /// Virtual path the handle was opened on
    pub fn path(&self) -> &Path {
        match self {
            DirectoryHandle::Synthetic { path, .. } => path,
            DirectoryHandle::Passthrough { path, .. } => path,
        }
    }

    /// Release any real resources
    pub fn close(&self) -> Result<()> {
        match self {
            DirectoryHandle::Synthetic { .. } => Ok(()),
            DirectoryHandle::Passthrough { dir, .. } => dir.close(),
        }
    }
}

/// Manages open file and directory handles
pub struct HandleTable {
    next_fh: AtomicU64,
    files: DashMap<u64, Arc<File>>,
    dirs: DashMap<u64, Arc<DirectoryHandle>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_fh: AtomicU64::new(1),
            files: DashMap::new(),
            dirs: DashMap::new(),
        }
    }

    fn alloc(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::SeqCst)
    }

    /// Register an open real file
    pub fn insert_file(&self, file: File) -> u64 {
        let fh = self.alloc();
        self.files.insert(fh, Arc::new(file));
        fh
    }

    pub fn file(&self, fh: u64) -> Result<Arc<File>> {
        self.files
            .get(&fh)
            .map(|f| Arc::clone(f.value()))
            .ok_or(Error::BadHandle(fh))
    }

    pub fn remove_file(&self, fh: u64) -> Option<Arc<File>> {
        self.files.remove(&fh).map(|(_, f)| f)
    }

    /// Register an open directory
    pub fn insert_dir(&self, dir: DirectoryHandle) -> u64 {
        let fh = self.alloc();
        self.dirs.insert(fh, Arc::new(dir));
        fh
    }

    pub fn dir(&self, fh: u64) -> Result<Arc<DirectoryHandle>> {
        self.dirs
            .get(&fh)
            .map(|d| Arc::clone(d.value()))
            .ok_or(Error::BadHandle(fh))
    }

    pub fn remove_dir(&self, fh: u64) -> Option<Arc<DirectoryHandle>> {
        self.dirs.remove(&fh).map(|(_, d)| d)
    }

    /// Number of open files and directories
    pub fn open_count(&self) -> (usize, usize) {
        (self.files.len(), self.dirs.len())
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
