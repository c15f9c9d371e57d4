//! Virtual path resolution
//!
//! Walks the name trie to decide whether a virtual path is a synthetic
//! directory, a passthrough into the real filesystem, or absent.

use crate::error::{Error, Result};
use crate::overlay::Overlay;
use crate::trie::{NameTrie, NodeId};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Outcome of resolving a virtual path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// Directory whose contents are exactly the trie node's children
    Synthetic { node: NodeId, real_path: PathBuf },
    /// Everything at and below this point comes from the real filesystem
    Passthrough { real_path: PathBuf },
}

impl ResolvedTarget {
    /// Real path to operate on for non-directory operations
    pub fn real_path(&self) -> &Path {
        match self {
            ResolvedTarget::Synthetic { real_path, .. } => real_path,
            ResolvedTarget::Passthrough { real_path } => real_path,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, ResolvedTarget::Synthetic { .. })
    }
}

/// Resolves virtual paths against the overlay
#[derive(Debug, Clone)]
pub struct PathResolver {
    overlay: Arc<Overlay>,
}

impl PathResolver {
    pub fn new(overlay: Arc<Overlay>) -> Self {
        Self { overlay }
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Resolve a virtual path
    pub fn resolve(&self, virtual_path: &Path) -> Result<ResolvedTarget> {
        let trie = self.overlay.trie();
        let mut node = NameTrie::ROOT;

        for component in virtual_path.components() {
            let name = match component {
                Component::Normal(name) => name,
                Component::RootDir | Component::CurDir | Component::Prefix(_) => continue,
                Component::ParentDir => {
                    return Err(Error::NotFound(virtual_path.display().to_string()))
                }
            };

            if trie.is_passthrough(node) {
                return Ok(ResolvedTarget::Passthrough {
                    real_path: self.real_path(virtual_path),
                });
            }

            node = trie
                .child(node, name)
                .ok_or_else(|| Error::NotFound(virtual_path.display().to_string()))?;
        }

        let real_path = self.real_path(virtual_path);
        if trie.is_passthrough(node) {
            Ok(ResolvedTarget::Passthrough { real_path })
        } else {
            Ok(ResolvedTarget::Synthetic { node, real_path })
        }
    }

    /// `root + virtual_path`
    pub fn real_path(&self, virtual_path: &Path) -> PathBuf {
        let relative = virtual_path.strip_prefix("/").unwrap_or(virtual_path);
        if relative.as_os_str().is_empty() {
            self.overlay.root().to_path_buf()
        } else {
            self.overlay.root().join(relative)
        }
    }
}
