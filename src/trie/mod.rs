//! Name trie built from the input list
//!
//! The trie holds one node per unique path component of every accepted
//! list entry. It is built once at startup and never mutated afterwards,
//! so it can be shared across FUSE worker threads without locking.

pub mod loader;
mod node;

pub use loader::{load_list, load_reader, ListSource, LoadReport, RejectReason, RejectedEntry};
pub use node::{NameTrie, NodeId, TrieNode};
