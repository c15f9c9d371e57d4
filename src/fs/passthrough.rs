//! Real directory enumeration for passthrough directories
//!
//! A real directory stream has a single movable cursor. Concurrent readdir
//! calls on one open handle share it, so every read repositions the cursor
//! and reads one entry while holding the cursor mutex, then releases it.
//! The surrounding read-write lock keeps teardown exclusive against
//! in-flight reads.
//!
//! Entries are addressed by sequence number (real `.` and `..` skipped).
//! The stream's native position token is recorded after every entry, so any
//! sequence number handed out earlier can be resumed from.

use crate::error::{Error, Result};
use nix::errno::Errno;
use parking_lot::{Mutex, RwLock};
use std::ffi::{CStr, CString, OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::time::Duration;
use tracing::{debug, warn};

/// Kind of a real directory entry, as reported by the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    /// Stream did not report a type (`DT_UNKNOWN`)
    Unknown,
}

impl EntryKind {
    fn from_dirent_type(d_type: u8) -> Self {
        match d_type {
            libc::DT_REG => EntryKind::RegularFile,
            libc::DT_DIR => EntryKind::Directory,
            libc::DT_LNK => EntryKind::Symlink,
            libc::DT_BLK => EntryKind::BlockDevice,
            libc::DT_CHR => EntryKind::CharDevice,
            libc::DT_FIFO => EntryKind::Fifo,
            libc::DT_SOCK => EntryKind::Socket,
            _ => EntryKind::Unknown,
        }
    }

    /// Classify from metadata when the stream gave no type
    pub fn from_file_type(ft: std::fs::FileType) -> Self {
        use std::os::unix::fs::FileTypeExt;
        if ft.is_file() {
            EntryKind::RegularFile
        } else if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_block_device() {
            EntryKind::BlockDevice
        } else if ft.is_char_device() {
            EntryKind::CharDevice
        } else if ft.is_fifo() {
            EntryKind::Fifo
        } else if ft.is_socket() {
            EntryKind::Socket
        } else {
            EntryKind::Unknown
        }
    }

    /// `fuser` cannot send `DT_UNKNOWN`; unknown kinds go out as regular
    /// files and the kernel learns the real type on lookup.
    pub fn to_fuser_type(self) -> fuser::FileType {
        match self {
            EntryKind::RegularFile | EntryKind::Unknown => fuser::FileType::RegularFile,
            EntryKind::Directory => fuser::FileType::Directory,
            EntryKind::Symlink => fuser::FileType::Symlink,
            EntryKind::BlockDevice => fuser::FileType::BlockDevice,
            EntryKind::CharDevice => fuser::FileType::CharDevice,
            EntryKind::Fifo => fuser::FileType::NamedPipe,
            EntryKind::Socket => fuser::FileType::Socket,
        }
    }
}

/// One entry read from a real directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealDirEntry {
    pub name: OsString,
    /// Inode number on the real filesystem
    pub ino: u64,
    pub kind: EntryKind,
}

/// Owned `DIR*` stream
struct RealDirStream {
    dir: NonNull<libc::DIR>,
}

// The stream is only ever touched under the cursor mutex.
unsafe impl Send for RealDirStream {}

impl RealDirStream {
    fn open(path: &Path) -> io::Result<Self> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        let dir = unsafe { libc::opendir(c_path.as_ptr()) };
        NonNull::new(dir)
            .map(|dir| Self { dir })
            .ok_or_else(io::Error::last_os_error)
    }

    fn rewind(&mut self) {
        unsafe { libc::rewinddir(self.dir.as_ptr()) }
    }

    fn seek(&mut self, position: libc::c_long) {
        unsafe { libc::seekdir(self.dir.as_ptr(), position) }
    }

    fn tell(&mut self) -> libc::c_long {
        unsafe { libc::telldir(self.dir.as_ptr()) }
    }

    /// Next entry other than `.` and `..`; `None` at end of stream
    fn next_entry(&mut self) -> io::Result<Option<RealDirEntry>> {
        loop {
            Errno::clear();
            let ent = unsafe { libc::readdir(self.dir.as_ptr()) };
            if ent.is_null() {
                return match Errno::last() {
                    Errno::UnknownErrno => Ok(None),
                    errno => Err(io::Error::from(errno)),
                };
            }

            let (name, ino, d_type) = unsafe {
                let ent = &*ent;
                let name = CStr::from_ptr(ent.d_name.as_ptr());
                (
                    OsStr::from_bytes(name.to_bytes()).to_os_string(),
                    ent.d_ino as u64,
                    ent.d_type,
                )
            };

            if name == "." || name == ".." {
                continue;
            }

            return Ok(Some(RealDirEntry {
                name,
                ino,
                kind: EntryKind::from_dirent_type(d_type),
            }));
        }
    }

    fn close(self) -> io::Result<()> {
        let dir = self.dir;
        std::mem::forget(self);
        if unsafe { libc::closedir(dir.as_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for RealDirStream {
    fn drop(&mut self) {
        unsafe {
            libc::closedir(self.dir.as_ptr());
        }
    }
}

/// Stream plus the position token recorded for each sequence number
struct Cursor {
    stream: RealDirStream,
    /// `positions[seq]` repositions the stream to read entry `seq`
    positions: Vec<libc::c_long>,
}

impl Cursor {
    fn read_at(&mut self, seq: usize) -> Result<Option<RealDirEntry>> {
        if seq == 0 {
            self.stream.rewind();
        } else {
            let position = *self
                .positions
                .get(seq)
                .ok_or(Error::InvalidOffset(seq as i64))?;
            self.stream.seek(position);
        }

        let entry = self.stream.next_entry()?;
        if entry.is_some() && self.positions.len() == seq + 1 {
            let next = self.stream.tell();
            self.positions.push(next);
        }
        Ok(entry)
    }
}

/// Open real directory shared by concurrent readdir calls on one handle
pub struct PassthroughDirectory {
    path: PathBuf,
    /// `None` once torn down
    state: RwLock<Option<Mutex<Cursor>>>,
    lock_timeout: Duration,
}

impl PassthroughDirectory {
    /// Open the real directory at `path`
    pub fn open(path: &Path, lock_timeout: Duration) -> Result<Self> {
        let mut stream = RealDirStream::open(path)?;
        let start = stream.tell();
        debug!("Opened real directory {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(Some(Mutex::new(Cursor {
                stream,
                positions: vec![start],
            }))),
            lock_timeout,
        })
    }

    /// Read the entry with sequence number `seq`
    ///
    /// Holds the cursor mutex only for the reposition-and-read step.
    pub fn entry_at(&self, seq: usize) -> Result<Option<RealDirEntry>> {
        let state = self
            .state
            .try_read_for(self.lock_timeout)
            .ok_or(Error::LockTimeout)?;
        let cursor = state.as_ref().ok_or(Error::HandleClosed)?;

        let mut cursor = cursor
            .try_lock_for(self.lock_timeout)
            .ok_or(Error::LockTimeout)?;
        cursor.read_at(seq)
    }

    /// Collect entries from `start` onwards until `fill` asks to stop
    ///
    /// `fill` receives each entry with its sequence number and returns
    /// `true` when its buffer is full. The cursor is released between
    /// entries.
    pub fn read_from<F>(&self, start: usize, mut fill: F) -> Result<()>
    where
        F: FnMut(usize, RealDirEntry) -> bool,
    {
        let mut seq = start;
        while let Some(entry) = self.entry_at(seq)? {
            if fill(seq, entry) {
                break;
            }
            seq += 1;
        }
        Ok(())
    }

    /// Tear down the stream
    ///
    /// Waits for in-flight reads; the stream is gone afterwards even when
    /// closing it reports an error.
    pub fn close(&self) -> Result<()> {
        let cursor = self.state.write().take();
        let Some(cursor) = cursor else {
            return Ok(());
        };

        cursor.into_inner().stream.close().map_err(|e| {
            warn!("Failed to close directory {:?}: {}", self.path, e);
            Error::Io(e)
        })
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().is_none()
    }
}

impl std::fmt::Debug for PassthroughDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassthroughDirectory")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
