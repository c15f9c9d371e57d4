//! FUSE filesystem implementation
//!
//! Serves the overlay through `fuser`: paths are resolved against the name
//! trie, synthetic directories are listed from it, and everything else is
//! forwarded to the real filesystem under the overlay root.

mod attr;
mod filesystem;
mod handle;
mod inode;
mod passthrough;
mod resolver;

pub use attr::{file_attr, AttributeBridge, FsStats};
pub use filesystem::{DirEntry, ListFs};
pub use handle::{DirectoryHandle, HandleTable};
pub use inode::{InodeTable, RealId};
pub use passthrough::{EntryKind, PassthroughDirectory, RealDirEntry};
pub use resolver::{PathResolver, ResolvedTarget};
