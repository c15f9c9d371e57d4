//! Overlay inode management
//!
//! FUSE addresses nodes by inode number while the overlay resolves by
//! virtual path. Node ids are the real objects' inode numbers, so hard
//! links share a node and a number survives forget and re-lookup. The root
//! is always `FUSE_ROOT_ID`. A real number that is already taken by another
//! object (a second device, or the value 1) gets an id from a fallback
//! range instead.

use fuser::FUSE_ROOT_ID;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// First node id handed out when a real inode number cannot be used
const FALLBACK_INO_BASE: u64 = 1 << 63;

/// Identity of a real object: device and inode number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RealId {
    pub dev: u64,
    pub ino: u64,
}

impl RealId {
    pub fn of(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

/// Node known to the kernel
#[derive(Debug, Clone)]
struct Inode {
    /// Virtual path of the most recent lookup
    path: PathBuf,
    /// Real object behind the node; `None` for the root
    real: Option<RealId>,
    /// Outstanding kernel lookups
    lookups: u64,
}

#[derive(Default)]
struct Tables {
    by_ino: HashMap<u64, Inode>,
    by_real: HashMap<RealId, u64>,
}

/// Maps kernel node ids to virtual paths
pub struct InodeTable {
    next_fallback: AtomicU64,
    tables: RwLock<Tables>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut tables = Tables::default();
        tables.by_ino.insert(
            FUSE_ROOT_ID,
            Inode {
                path: PathBuf::from("/"),
                real: None,
                lookups: 0,
            },
        );

        Self {
            next_fallback: AtomicU64::new(FALLBACK_INO_BASE),
            tables: RwLock::new(tables),
        }
    }

    /// Virtual path of a node
    pub fn path(&self, ino: u64) -> Option<PathBuf> {
        self.tables.read().by_ino.get(&ino).map(|e| e.path.clone())
    }

    /// Record a kernel lookup of `path`, returning its node id
    ///
    /// A second path to the same real object (a hard link) reuses the node
    /// and becomes the path it resolves through.
    pub fn lookup(&self, path: &Path, real: RealId) -> u64 {
        let mut tables = self.tables.write();

        if let Some(&ino) = tables.by_real.get(&real) {
            if let Some(entry) = tables.by_ino.get_mut(&ino) {
                entry.lookups += 1;
                if entry.path != path {
                    entry.path = path.to_path_buf();
                }
                return ino;
            }
        }

        let ino = self.node_id(&tables, real);
        tables.by_real.insert(real, ino);
        tables.by_ino.insert(
            ino,
            Inode {
                path: path.to_path_buf(),
                real: Some(real),
                lookups: 1,
            },
        );
        ino
    }

    fn node_id(&self, tables: &Tables, real: RealId) -> u64 {
        if real.ino != 0 && real.ino != FUSE_ROOT_ID && !tables.by_ino.contains_key(&real.ino) {
            return real.ino;
        }
        loop {
            let ino = self.next_fallback.fetch_add(1, Ordering::SeqCst);
            if !tables.by_ino.contains_key(&ino) {
                return ino;
            }
        }
    }

    /// Drop `nlookup` kernel references; the node goes away at zero
    pub fn forget(&self, ino: u64, nlookup: u64) {
        if ino == FUSE_ROOT_ID {
            return;
        }

        let mut tables = self.tables.write();
        let remove = match tables.by_ino.get_mut(&ino) {
            Some(entry) => {
                entry.lookups = entry.lookups.saturating_sub(nlookup);
                entry.lookups == 0
            }
            None => false,
        };

        if remove {
            if let Some(real) = tables.by_ino.remove(&ino).and_then(|e| e.real) {
                tables.by_real.remove(&real);
            }
        }
    }

    /// Number of tracked nodes, root included
    pub fn len(&self) -> usize {
        self.tables.read().by_ino.len()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
