//! listfs - Read-only FUSE overlay over a list of existing paths
//!
//! Given a newline-delimited list of real paths, this library presents
//! them as a directory tree. Directories made only of listed names are
//! synthetic; a listed path that has nothing listed beneath it exposes its
//! whole real subtree.

pub mod config;
pub mod error;
pub mod fs;
pub mod overlay;
pub mod trie;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::fs::ListFs;
    pub use crate::overlay::Overlay;
    pub use crate::trie::{ListSource, NameTrie};
}
