//! Attribute forwarding to the host filesystem
//!
//! The overlay is attribute-transparent: values come straight from the
//! real objects. The inode number is the kernel node id, which is the real
//! one for everything but the root.

use crate::error::{Error, Result};
use fuser::FileAttr;
use nix::sys::statvfs::{statvfs, Statvfs};
use std::fs::{self, File, Metadata};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::passthrough::EntryKind;

/// Filesystem statistics forwarded from the real filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

impl From<&Statvfs> for FsStats {
    fn from(st: &Statvfs) -> Self {
        Self {
            blocks: st.blocks() as u64,
            bfree: st.blocks_free() as u64,
            bavail: st.blocks_available() as u64,
            files: st.files() as u64,
            ffree: st.files_free() as u64,
            bsize: st.block_size() as u32,
            namelen: st.name_max() as u32,
            frsize: st.fragment_size() as u32,
        }
    }
}

/// Forwards attribute queries for real paths
#[derive(Debug, Clone)]
pub struct AttributeBridge {
    /// Follow symlinks when stat'ing and reading xattrs
    follow_symlinks: bool,
}

impl AttributeBridge {
    pub fn new(follow_symlinks: bool) -> Self {
        Self { follow_symlinks }
    }

    pub fn follows_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    /// Metadata for a real path
    pub fn metadata(&self, real: &Path) -> Result<Metadata> {
        if self.follow_symlinks {
            fs::metadata(real)
        } else {
            fs::symlink_metadata(real)
        }
        .map_err(Error::Io)
    }

    /// Metadata for an open file
    pub fn handle_metadata(&self, file: &File) -> Result<Metadata> {
        file.metadata().map_err(Error::Io)
    }

    /// Kind of a real object, for directory listings
    pub fn kind(&self, real: &Path) -> Result<EntryKind> {
        self.metadata(real)
            .map(|meta| EntryKind::from_file_type(meta.file_type()))
    }

    /// Symlink target, returned verbatim
    pub fn readlink(&self, real: &Path) -> Result<PathBuf> {
        fs::read_link(real).map_err(Error::Io)
    }

    /// Statistics of the filesystem holding `real`
    pub fn statfs(&self, real: &Path) -> Result<FsStats> {
        let st = statvfs(real)?;
        Ok(FsStats::from(&st))
    }

    /// Value of one extended attribute
    pub fn getxattr(&self, real: &Path, name: &std::ffi::OsStr) -> Result<Vec<u8>> {
        let value = if self.follow_symlinks {
            xattr::get_deref(real, name)
        } else {
            xattr::get(real, name)
        }?;
        value.ok_or(Error::Io(std::io::Error::from_raw_os_error(no_attr_errno())))
    }

    /// Extended attribute names, NUL-separated as the kernel expects
    pub fn listxattr(&self, real: &Path) -> Result<Vec<u8>> {
        use std::os::unix::ffi::OsStrExt;

        let names = if self.follow_symlinks {
            xattr::list_deref(real)
        } else {
            xattr::list(real)
        }?;

        let mut data = Vec::new();
        for name in names {
            data.extend_from_slice(name.as_bytes());
            data.push(0);
        }
        Ok(data)
    }

    /// Permission check against the real object
    ///
    /// Write access is refused outright since the overlay is read-only.
    pub fn access(&self, real: &Path, mask: i32) -> Result<()> {
        use nix::unistd::{access, AccessFlags};

        if mask & libc::W_OK != 0 {
            return Err(Error::ReadOnly);
        }
        let flags = AccessFlags::from_bits_truncate(mask);
        access(real, flags)?;
        Ok(())
    }
}

/// Errno for a missing extended attribute
fn no_attr_errno() -> i32 {
    #[cfg(target_os = "macos")]
    {
        libc::ENOATTR
    }
    #[cfg(not(target_os = "macos"))]
    {
        libc::ENODATA
    }
}

/// Build the kernel attribute record for a real object
pub fn file_attr(ino: u64, meta: &Metadata) -> FileAttr {
    FileAttr {
        ino,
        size: meta.len(),
        blocks: meta.blocks(),
        atime: timestamp(meta.atime(), meta.atime_nsec()),
        mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
        ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
        crtime: meta.created().unwrap_or(UNIX_EPOCH),
        kind: EntryKind::from_file_type(meta.file_type()).to_fuser_type(),
        perm: (meta.mode() & 0o7777) as u16,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as u32,
        blksize: meta.blksize() as u32,
        flags: 0,
    }
}

fn timestamp(secs: i64, nsecs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nsecs as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(nsecs as u64)
    }
}
