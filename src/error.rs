//! Error types for listfs

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for listfs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or serving the overlay
#[derive(Error, Debug)]
pub enum Error {
    /// Host filesystem call failed; the OS error code is forwarded as-is
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Host call made through nix failed
    #[error("System call failed: {0}")]
    Nix(#[from] nix::Error),

    /// Virtual path does not exist in the overlay
    #[error("No such entry: {0}")]
    NotFound(String),

    /// Listed entry could not be canonicalized
    #[error("Cannot resolve listed entry {path:?}: {source}")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Listed entry lies outside the overlay root after canonicalization
    #[error("Listed entry {path:?} is outside root {root:?}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Trie growth could not allocate
    #[error("Out of memory while building the name trie")]
    OutOfMemory,

    /// Directory cursor lock could not be acquired in time
    #[error("Timed out waiting for directory cursor")]
    LockTimeout,

    /// Directory stream was already torn down
    #[error("Directory handle is closed")]
    HandleClosed,

    /// Unknown file or directory handle
    #[error("Bad handle: {0}")]
    BadHandle(u64),

    /// Unknown inode number
    #[error("Inode not found: {0}")]
    InodeNotFound(u64),

    /// Directory offset that was never handed out for this handle
    #[error("Invalid directory offset: {0}")]
    InvalidOffset(i64),

    /// Write access requested on the read-only overlay
    #[error("Read-only filesystem")]
    ReadOnly,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Errno value handed back to the kernel for this error
    pub fn errno(&self) -> i32 {
        match self {
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            Error::Nix(e) => *e as i32,
            Error::NotFound(_) | Error::InodeNotFound(_) => libc::ENOENT,
            Error::Unresolvable { source, .. } => source.raw_os_error().unwrap_or(libc::ENOENT),
            Error::OutsideRoot { .. } => libc::EXDEV,
            Error::OutOfMemory => libc::ENOMEM,
            Error::LockTimeout => libc::EAGAIN,
            Error::HandleClosed | Error::BadHandle(_) => libc::EBADF,
            Error::InvalidOffset(_) => libc::EINVAL,
            Error::ReadOnly => libc::EROFS,
            Error::Config(_) | Error::InvalidConfig(_) => libc::EIO,
        }
    }

    /// Whether this error means the entry does not exist
    pub fn is_not_found(&self) -> bool {
        self.errno() == libc::ENOENT
    }
}
