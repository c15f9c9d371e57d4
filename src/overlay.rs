//! Overlay context: the real root and the trie anchored to it

use crate::config::Config;
use crate::error::Result;
use crate::trie::{load_list, load_reader, ListSource, LoadReport, NameTrie};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::info;

/// Immutable state shared by every filesystem operation
#[derive(Debug)]
pub struct Overlay {
    /// Canonical real path the synthetic tree is anchored to
    root: PathBuf,
    /// Names admitted from the input list
    trie: NameTrie,
}

impl Overlay {
    /// Build from an already-loaded trie; `root` must be canonical
    pub fn new(root: PathBuf, trie: NameTrie) -> Self {
        Self { root, trie }
    }

    /// Canonicalize the configured root and load the list against it
    pub fn load(config: &Config, source: &ListSource) -> Result<(Self, LoadReport)> {
        let root = canonical_root(&config.root_dir())?;
        let (trie, report) = load_list(source, &root)?;
        info!("Overlay anchored at {:?}", root);
        Ok((Self::new(root, trie), report))
    }

    /// Load from an arbitrary reader
    pub fn from_reader<R: BufRead>(reader: R, root: &Path) -> Result<(Self, LoadReport)> {
        let root = canonical_root(root)?;
        let (trie, report) = load_reader(reader, &root)?;
        Ok((Self::new(root, trie), report))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trie(&self) -> &NameTrie {
        &self.trie
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    let root = if root.as_os_str().is_empty() {
        Path::new("/")
    } else {
        root
    };
    Ok(std::fs::canonicalize(root)?)
}
