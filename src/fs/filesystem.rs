//! listfs FUSE filesystem implementation
//!
//! Every operation resolves the inode's virtual path through the trie and
//! then either answers from the trie (synthetic directories) or forwards to
//! the real object under the overlay root. The operation logic lives in
//! plain methods returning [`Result`]; the [`Filesystem`] impl only
//! translates them into replies.

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyXattr, Request, FUSE_ROOT_ID,
};
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    attr::{file_attr, AttributeBridge, FsStats},
    handle::{DirectoryHandle, HandleTable},
    inode::{InodeTable, RealId},
    passthrough::{EntryKind, PassthroughDirectory},
    resolver::{PathResolver, ResolvedTarget},
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::overlay::Overlay;

/// Offset handed out with `.`
const DOT_OFFSET: i64 = 1;
/// Offset handed out with `..`; listing entries resume from here
const DOTDOT_OFFSET: i64 = 2;
/// Inode reported for an entry that cannot be stat'ed (libfuse's value)
const UNKNOWN_INO: u64 = 0xffff_ffff;

/// Directory entry produced by [`ListFs::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    /// Offset of the entry that follows this one
    pub offset: i64,
    pub kind: FileType,
    pub name: OsString,
}

/// Read-only overlay filesystem over a list of real paths
pub struct ListFs {
    resolver: PathResolver,
    bridge: AttributeBridge,
    inodes: InodeTable,
    handles: HandleTable,
    ttl: Duration,
    lock_timeout: Duration,
}

impl ListFs {
    /// Create the filesystem over a loaded overlay
    pub fn new(overlay: Arc<Overlay>, config: &Config) -> Self {
        Self {
            resolver: PathResolver::new(overlay),
            bridge: AttributeBridge::new(config.follow_symlinks),
            inodes: InodeTable::new(),
            handles: HandleTable::new(),
            ttl: config.ttl(),
            lock_timeout: config.lock_timeout(),
        }
    }

    fn virtual_path(&self, ino: u64) -> Result<PathBuf> {
        self.inodes.path(ino).ok_or(Error::InodeNotFound(ino))
    }

    fn resolve_ino(&self, ino: u64) -> Result<ResolvedTarget> {
        let path = self.virtual_path(ino)?;
        self.resolver.resolve(&path)
    }

    fn real_path_of(&self, ino: u64) -> Result<PathBuf> {
        Ok(self.resolve_ino(ino)?.real_path().to_path_buf())
    }

    /// Resolve `name` under `parent` and count a kernel lookup
    pub fn lookup_entry(&self, parent: u64, name: &OsStr) -> Result<FileAttr> {
        let path = self.virtual_path(parent)?.join(name);
        let target = self.resolver.resolve(&path)?;
        let meta = self.bridge.metadata(target.real_path())?;
        let ino = self.inodes.lookup(&path, RealId::of(&meta));
        Ok(file_attr(ino, &meta))
    }

    pub fn forget_entry(&self, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    /// Attributes of an inode, via the open file when one is given
    pub fn attr(&self, ino: u64, fh: Option<u64>) -> Result<FileAttr> {
        if let Some(file) = fh.and_then(|fh| self.handles.file(fh).ok()) {
            let meta = self.bridge.handle_metadata(&file)?;
            return Ok(file_attr(ino, &meta));
        }

        let meta = self.bridge.metadata(&self.real_path_of(ino)?)?;
        Ok(file_attr(ino, &meta))
    }

    /// Open the real file read-only
    pub fn open_file(&self, ino: u64, flags: i32) -> Result<u64> {
        let accmode = flags & libc::O_ACCMODE;
        if accmode == libc::O_WRONLY || accmode == libc::O_RDWR {
            return Err(Error::ReadOnly);
        }

        let file = File::open(self.real_path_of(ino)?)?;
        Ok(self.handles.insert_file(file))
    }

    /// Positioned read from an open file
    pub fn read_file(&self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>> {
        let file = self.handles.file(fh)?;
        let offset = u64::try_from(offset).map_err(|_| Error::InvalidOffset(offset))?;

        let mut buffer = vec![0u8; size as usize];
        let mut filled = 0usize;
        while filled < buffer.len() {
            match file.read_at(&mut buffer[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    pub fn release_file(&self, fh: u64) {
        self.handles.remove_file(fh);
    }

    /// Open a directory in synthetic or passthrough mode
    pub fn open_dir(&self, ino: u64) -> Result<u64> {
        let path = self.virtual_path(ino)?;
        let handle = match self.resolver.resolve(&path)? {
            ResolvedTarget::Synthetic { node, .. } => DirectoryHandle::Synthetic { path, node },
            ResolvedTarget::Passthrough { real_path } => {
                let dir = PassthroughDirectory::open(&real_path, self.lock_timeout).map_err(
                    |e| {
                        if e.is_not_found() {
                            Error::NotFound(path.display().to_string())
                        } else {
                            e
                        }
                    },
                )?;
                DirectoryHandle::Passthrough { path, dir }
            }
        };
        Ok(self.handles.insert_dir(handle))
    }

    /// Enumerate a directory from `offset`
    ///
    /// `.` and `..` come first unless the offset is past them. `fill`
    /// returns `true` when the reply buffer is full.
    pub fn read_dir<F>(&self, ino: u64, fh: u64, offset: i64, mut fill: F) -> Result<()>
    where
        F: FnMut(DirEntry) -> bool,
    {
        let handle = self.handles.dir(fh)?;

        if offset < DOT_OFFSET {
            let dot = DirEntry {
                ino,
                offset: DOT_OFFSET,
                kind: FileType::Directory,
                name: OsString::from("."),
            };
            if fill(dot) {
                return Ok(());
            }
        }
        if offset < DOTDOT_OFFSET {
            let dotdot = DirEntry {
                ino: self.parent_ino(handle.path()),
                offset: DOTDOT_OFFSET,
                kind: FileType::Directory,
                name: OsString::from(".."),
            };
            if fill(dotdot) {
                return Ok(());
            }
        }

        let start = (offset.max(DOTDOT_OFFSET) - DOTDOT_OFFSET) as usize;
        match handle.as_ref() {
            DirectoryHandle::Synthetic { path, node } => {
                self.read_synthetic(path, *node, start, &mut fill)
            }
            DirectoryHandle::Passthrough { path, dir } => {
                dir.read_from(start, |seq, entry| {
                    let child_path = path.join(&entry.name);
                    let kind = self.entry_kind(entry.kind, &child_path);
                    fill(DirEntry {
                        ino: entry.ino,
                        offset: entry_offset(seq),
                        kind: kind.to_fuser_type(),
                        name: entry.name,
                    })
                })
            }
        }
    }

    fn read_synthetic<F>(
        &self,
        path: &Path,
        node: crate::trie::NodeId,
        start: usize,
        fill: &mut F,
    ) -> Result<()>
    where
        F: FnMut(DirEntry) -> bool,
    {
        let trie = self.resolver.overlay().trie();

        for (seq, &child) in trie.children(node).iter().enumerate().skip(start) {
            let name = trie.name(child);
            let child_path = path.join(name);

            let meta = match self.bridge.metadata(&self.resolver.real_path(&child_path)) {
                Ok(meta) => Some(meta),
                Err(e) if e.is_not_found() => {
                    debug!("Listed entry {:?} vanished, skipping", child_path);
                    continue;
                }
                Err(e) => {
                    warn!("Cannot stat listed entry {:?}: {}", child_path, e);
                    None
                }
            };

            let kind = match &meta {
                _ if !trie.is_passthrough(child) => EntryKind::Directory,
                Some(meta) => EntryKind::from_file_type(meta.file_type()),
                None => EntryKind::Unknown,
            };

            let entry = DirEntry {
                ino: meta.as_ref().map_or(UNKNOWN_INO, |meta| meta.ino()),
                offset: entry_offset(seq),
                kind: kind.to_fuser_type(),
                name: name.to_os_string(),
            };
            if fill(entry) {
                break;
            }
        }
        Ok(())
    }

    /// Real inode of the directory above `path`; the root is its own parent
    fn parent_ino(&self, path: &Path) -> u64 {
        match path.parent() {
            Some(parent) if parent != Path::new("/") => self
                .bridge
                .metadata(&self.resolver.real_path(parent))
                .map_or(UNKNOWN_INO, |meta| meta.ino()),
            _ => FUSE_ROOT_ID,
        }
    }

    /// Kind reported for a passthrough entry, stat'ing when the stream
    /// could not tell or when symlinks are followed
    fn entry_kind(&self, reported: EntryKind, child_path: &Path) -> EntryKind {
        let needs_stat = reported == EntryKind::Unknown
            || (reported == EntryKind::Symlink && self.bridge.follows_symlinks());
        if !needs_stat {
            return reported;
        }
        self.bridge
            .kind(&self.resolver.real_path(child_path))
            .unwrap_or(reported)
    }

    /// Tear down a directory handle
    pub fn release_dir(&self, fh: u64) -> Result<()> {
        match self.handles.remove_dir(fh) {
            Some(handle) => handle.close(),
            None => Err(Error::BadHandle(fh)),
        }
    }

    pub fn read_link(&self, ino: u64) -> Result<PathBuf> {
        self.bridge.readlink(&self.real_path_of(ino)?)
    }

    pub fn stat_fs(&self, ino: u64) -> Result<FsStats> {
        self.bridge.statfs(&self.real_path_of(ino)?)
    }

    pub fn get_xattr(&self, ino: u64, name: &OsStr) -> Result<Vec<u8>> {
        self.bridge.getxattr(&self.real_path_of(ino)?, name)
    }

    pub fn list_xattr(&self, ino: u64) -> Result<Vec<u8>> {
        self.bridge.listxattr(&self.real_path_of(ino)?)
    }

    pub fn check_access(&self, ino: u64, mask: i32) -> Result<()> {
        self.bridge.access(&self.real_path_of(ino)?, mask)
    }
}

/// Offset of the entry following listing entry `seq`
fn entry_offset(seq: usize) -> i64 {
    seq as i64 + DOTDOT_OFFSET + 1
}

/// Log a failed operation and return its errno
fn errno(op: &str, e: &Error) -> i32 {
    let code = e.errno();
    if code == libc::ENOENT {
        debug!("{}: {}", op, e);
    } else {
        warn!("{} failed: {}", op, e);
    }
    code
}

fn reply_xattr(reply: ReplyXattr, data: &[u8], size: u32) {
    if size == 0 {
        reply.size(data.len() as u32);
    } else if data.len() <= size as usize {
        reply.data(data);
    } else {
        reply.error(libc::ERANGE);
    }
}

impl Filesystem for ListFs {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        info!(
            "Mounted overlay of {:?} ({} names)",
            self.resolver.overlay().root(),
            self.resolver.overlay().trie().len() - 1
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let (files, dirs) = self.handles.open_count();
        info!("Unmounting ({} files, {} directories still open)", files, dirs);
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup(parent={}, name={:?})", parent, name);

        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(e) => reply.error(errno("lookup", &e)),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.forget_entry(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        debug!("getattr(ino={}, fh={:?})", ino, fh);

        match self.attr(ino, fh) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(e) => reply.error(errno("getattr", &e)),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        debug!("readlink(ino={})", ino);

        match self.read_link(ino) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(e) => reply.error(errno("readlink", &e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!("open(ino={}, flags={})", ino, flags);

        match self.open_file(ino, flags) {
            Ok(fh) => reply.opened(fh, fuser::consts::FOPEN_KEEP_CACHE),
            Err(e) => reply.error(errno("open", &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read(ino={}, fh={}, offset={}, size={})", ino, fh, offset, size);

        match self.read_file(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno("read", &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!("release(ino={}, fh={})", ino, fh);
        self.release_file(fh);
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        debug!("opendir(ino={})", ino);

        match self.open_dir(ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(errno("opendir", &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir(ino={}, fh={}, offset={})", ino, fh, offset);

        let result = self.read_dir(ino, fh, offset, |entry| {
            reply.add(entry.ino, entry.offset, entry.kind, &entry.name)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno("readdir", &e)),
        }
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        debug!("releasedir(ino={}, fh={})", ino, fh);

        match self.release_dir(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno("releasedir", &e)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        debug!("statfs(ino={})", ino);

        match self.stat_fs(ino) {
            Ok(st) => reply.statfs(
                st.blocks, st.bfree, st.bavail, st.files, st.ffree, st.bsize, st.namelen,
                st.frsize,
            ),
            Err(e) => reply.error(errno("statfs", &e)),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        debug!("getxattr(ino={}, name={:?}, size={})", ino, name, size);

        match self.get_xattr(ino, name) {
            Ok(value) => reply_xattr(reply, &value, size),
            Err(e) => reply.error(errno("getxattr", &e)),
        }
    }

    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: ReplyXattr) {
        debug!("listxattr(ino={}, size={})", ino, size);

        match self.list_xattr(ino) {
            Ok(names) => reply_xattr(reply, &names, size),
            Err(e) => reply.error(errno("listxattr", &e)),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        debug!("access(ino={}, mask={})", ino, mask);

        match self.check_access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno("access", &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    /// Real tree:
    ///
    /// ```text
    /// a/b/c.txt   (listed)
    /// a/b/other   (not listed)
    /// a/d/x       (under listed a/d)
    /// a/d/y/z
    /// a/hidden    (not listed)
    /// ```
    fn scenario() -> (TempDir, ListFs) {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/b/c.txt"), b"contents of c").unwrap();
        fs::write(root.join("a/b/other"), b"unlisted").unwrap();
        fs::create_dir_all(root.join("a/d/y")).unwrap();
        fs::write(root.join("a/d/x"), b"x").unwrap();
        fs::write(root.join("a/d/y/z"), b"z").unwrap();
        fs::write(root.join("a/hidden"), b"h").unwrap();

        let fs = mount_list(&root, "a/b/c.txt\na/d\n");
        (dir, fs)
    }

    fn mount_list(root: &Path, list: &str) -> ListFs {
        let (overlay, _) = Overlay::from_reader(list.as_bytes(), root).unwrap();
        ListFs::new(Arc::new(overlay), &Config::default())
    }

    fn ino_of(fs: &ListFs, path: &str) -> Result<u64> {
        let mut ino = FUSE_ROOT_ID;
        for component in Path::new(path).iter().skip(1) {
            ino = fs.lookup_entry(ino, component)?.ino;
        }
        Ok(ino)
    }

    fn list(fs: &ListFs, path: &str) -> Vec<String> {
        let ino = ino_of(fs, path).unwrap();
        let fh = fs.open_dir(ino).unwrap();
        let mut names = Vec::new();
        fs.read_dir(ino, fh, 0, |entry| {
            names.push(entry.name.to_string_lossy().into_owned());
            false
        })
        .unwrap();
        fs.release_dir(fh).unwrap();
        names
    }

    fn walk(fs: &ListFs, path: &str, out: &mut BTreeSet<String>) {
        for name in list(fs, path) {
            if name == "." || name == ".." {
                continue;
            }
            let child = format!("{}/{}", path.trim_end_matches('/'), name);
            let attr = fs.lookup_entry(ino_of(fs, path).unwrap(), OsStr::new(&name)).unwrap();
            out.insert(child.clone());
            if attr.kind == FileType::Directory {
                walk(fs, &child, out);
            }
        }
    }

    fn walk_real(base: &Path, prefix: &str, out: &mut BTreeSet<String>) {
        for entry in fs::read_dir(base).unwrap() {
            let entry = entry.unwrap();
            let child = format!("{}/{}", prefix, entry.file_name().to_string_lossy());
            out.insert(child.clone());
            if entry.file_type().unwrap().is_dir() {
                walk_real(&entry.path(), &child, out);
            }
        }
    }

    #[test]
    fn test_synthetic_listings() {
        let (_dir, fs) = scenario();
        assert_eq!(list(&fs, "/"), vec![".", "..", "a"]);
        assert_eq!(list(&fs, "/a"), vec![".", "..", "b", "d"]);
        assert_eq!(list(&fs, "/a/b"), vec![".", "..", "c.txt"]);
    }

    #[test]
    fn test_unlisted_siblings_hidden() {
        let (_dir, fs) = scenario();
        let a = ino_of(&fs, "/a").unwrap();
        assert_eq!(
            fs.lookup_entry(a, OsStr::new("hidden")).unwrap_err().errno(),
            libc::ENOENT
        );
        assert!(ino_of(&fs, "/a/b/other").unwrap_err().is_not_found());
    }

    #[test]
    fn test_passthrough_subtree_matches_real() {
        let (dir, fs) = scenario();
        let root = fs::canonicalize(dir.path()).unwrap();

        let mut overlay = BTreeSet::new();
        walk(&fs, "/a/d", &mut overlay);
        let mut real = BTreeSet::new();
        walk_real(&root.join("a/d"), "/a/d", &mut real);

        assert_eq!(overlay, real);
        assert!(overlay.contains("/a/d/y/z"));
    }

    #[test]
    fn test_read_matches_real_file() {
        let (_dir, fs) = scenario();
        let ino = ino_of(&fs, "/a/b/c.txt").unwrap();
        let fh = fs.open_file(ino, libc::O_RDONLY).unwrap();

        assert_eq!(fs.read_file(fh, 0, 4096).unwrap(), b"contents of c");
        assert_eq!(fs.read_file(fh, 9, 4096).unwrap(), b"of c");
        assert!(fs.read_file(fh, 100, 10).unwrap().is_empty());

        let attr = fs.attr(ino, Some(fh)).unwrap();
        assert_eq!(attr.size, 13);
        assert_eq!(attr.ino, ino);
        fs.release_file(fh);
        assert!(fs.read_file(fh, 0, 1).is_err());
    }

    #[test]
    fn test_attributes_forwarded() {
        let (dir, fs) = scenario();
        let root = fs::canonicalize(dir.path()).unwrap();
        let ino = ino_of(&fs, "/a/d/x").unwrap();

        let attr = fs.attr(ino, None).unwrap();
        let meta = fs::symlink_metadata(root.join("a/d/x")).unwrap();
        assert_eq!(attr.size, meta.len());
        assert_eq!(attr.mtime, meta.modified().unwrap());
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.ino, meta.ino());

        let dir_attr = fs.attr(FUSE_ROOT_ID, None).unwrap();
        assert_eq!(dir_attr.kind, FileType::Directory);
    }

    #[test]
    fn test_write_open_refused() {
        let (_dir, fs) = scenario();
        let ino = ino_of(&fs, "/a/b/c.txt").unwrap();
        assert!(matches!(fs.open_file(ino, libc::O_RDWR), Err(Error::ReadOnly)));
        assert!(matches!(fs.open_file(ino, libc::O_WRONLY), Err(Error::ReadOnly)));
        assert!(matches!(fs.check_access(ino, libc::W_OK), Err(Error::ReadOnly)));
        assert!(fs.check_access(ino, libc::R_OK).is_ok());
    }

    #[test]
    fn test_readdir_resumes_without_dots() {
        let (_dir, fs) = scenario();
        let a = ino_of(&fs, "/a").unwrap();
        let fh = fs.open_dir(a).unwrap();

        let mut first = Vec::new();
        fs.read_dir(a, fh, 0, |entry| {
            first.push(entry);
            first.len() == 3
        })
        .unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].name, OsString::from("b"));

        let mut rest = Vec::new();
        fs.read_dir(a, fh, first[2].offset, |entry| {
            rest.push(entry.name);
            false
        })
        .unwrap();
        assert_eq!(rest, vec![OsString::from("d")]);

        let mut after_dot = Vec::new();
        fs.read_dir(a, fh, DOT_OFFSET, |entry| {
            after_dot.push(entry.name);
            false
        })
        .unwrap();
        assert_eq!(after_dot, vec![OsString::from(".."), "b".into(), "d".into()]);
        fs.release_dir(fh).unwrap();
    }

    #[test]
    fn test_passthrough_readdir_resumes() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("big")).unwrap();
        for i in 0..40 {
            fs::write(root.join(format!("big/f{:02}", i)), b"").unwrap();
        }
        let fs = mount_list(&root, "big\n");

        let ino = ino_of(&fs, "/big").unwrap();
        let fh = fs.open_dir(ino).unwrap();

        let mut full = Vec::new();
        fs.read_dir(ino, fh, 0, |entry| {
            full.push(entry);
            false
        })
        .unwrap();
        assert_eq!(full.len(), 42);

        let mut resumed = full[..10].to_vec();
        fs.read_dir(ino, fh, full[9].offset, |entry| {
            resumed.push(entry);
            false
        })
        .unwrap();
        assert_eq!(resumed, full);
        fs.release_dir(fh).unwrap();
    }

    #[test]
    fn test_readdir_does_not_grow_inode_table() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("big")).unwrap();
        for i in 0..500 {
            fs::write(root.join(format!("big/f{:03}", i)), b"").unwrap();
        }
        let fs = mount_list(&root, "big\n");

        let ino = ino_of(&fs, "/big").unwrap();
        let tracked = fs.inodes.len();
        for _ in 0..3 {
            assert_eq!(list(&fs, "/big").len(), 502);
            assert_eq!(list(&fs, "/").len(), 3);
        }
        assert_eq!(fs.inodes.len(), tracked);

        fs.forget_entry(ino, 4);
        assert_eq!(fs.inodes.len(), 1);
    }

    #[test]
    fn test_hard_links_share_inode() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("links")).unwrap();
        fs::write(root.join("links/f"), b"shared").unwrap();
        fs::hard_link(root.join("links/f"), root.join("links/g")).unwrap();
        let real_ino = fs::symlink_metadata(root.join("links/f")).unwrap().ino();

        let entry_inos = |fs: &ListFs| {
            let ino = ino_of(fs, "/links").unwrap();
            let fh = fs.open_dir(ino).unwrap();
            let mut inos = Vec::new();
            fs.read_dir(ino, fh, DOTDOT_OFFSET, |entry| {
                inos.push((entry.name, entry.ino));
                false
            })
            .unwrap();
            fs.release_dir(fh).unwrap();
            inos.sort();
            inos
        };
        let expected: Vec<(OsString, u64)> =
            vec![("f".into(), real_ino), ("g".into(), real_ino)];

        // Passthrough directory
        let fs = mount_list(&root, "links\n");
        let f = ino_of(&fs, "/links/f").unwrap();
        let g = ino_of(&fs, "/links/g").unwrap();
        assert_eq!(f, real_ino);
        assert_eq!(f, g);
        assert_eq!(fs.attr(g, None).unwrap().nlink, 2);
        assert_eq!(entry_inos(&fs), expected);

        // Synthetic directory
        let fs = mount_list(&root, "links/f\nlinks/g\n");
        assert_eq!(ino_of(&fs, "/links/f").unwrap(), ino_of(&fs, "/links/g").unwrap());
        assert_eq!(entry_inos(&fs), expected);
    }

    #[test]
    fn test_dot_entries_carry_directory_inodes() {
        let (dir, fs) = scenario();
        let root = fs::canonicalize(dir.path()).unwrap();
        let d = ino_of(&fs, "/a/d").unwrap();
        let fh = fs.open_dir(d).unwrap();

        let mut dots = Vec::new();
        fs.read_dir(d, fh, 0, |entry| {
            dots.push(entry.ino);
            dots.len() == 2
        })
        .unwrap();
        fs.release_dir(fh).unwrap();

        let parent = fs::symlink_metadata(root.join("a")).unwrap().ino();
        assert_eq!(dots, vec![d, parent]);
    }

    #[test]
    fn test_vanished_directory_is_not_found() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("gone")).unwrap();
        fs::create_dir(root.join("kept")).unwrap();
        let fs = mount_list(&root, "gone\nkept\n");

        let ino = ino_of(&fs, "/gone").unwrap();
        fs::remove_dir(root.join("gone")).unwrap();

        let err = fs.open_dir(ino).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(list(&fs, "/"), vec![".", "..", "kept"]);
    }

    #[test]
    fn test_outside_root_excluded() {
        let dir = tempdir().unwrap();
        let outer = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(outer.join("home")).unwrap();
        fs::create_dir(outer.join("etc")).unwrap();
        fs::write(outer.join("etc/passwd"), b"root:x:0:0").unwrap();

        let list_text = format!("{}\n", outer.join("etc/passwd").display());
        let fs = mount_list(&outer.join("home"), &list_text);
        assert_eq!(list(&fs, "/"), vec![".", ".."]);
    }

    #[test]
    fn test_release_dir_twice() {
        let (_dir, fs) = scenario();
        let d = ino_of(&fs, "/a/d").unwrap();
        let fh = fs.open_dir(d).unwrap();
        fs.release_dir(fh).unwrap();
        assert!(matches!(fs.release_dir(fh), Err(Error::BadHandle(_))));
        assert!(fs.read_dir(d, fh, 0, |_| false).is_err());
    }

    #[test]
    fn test_symlink_passthrough() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(root.join("links")).unwrap();
        std::os::unix::fs::symlink("../elsewhere", root.join("links/l")).unwrap();
        let fs = mount_list(&root, "links\n");

        let ino = ino_of(&fs, "/links/l").unwrap();
        assert_eq!(fs.attr(ino, None).unwrap().kind, FileType::Symlink);
        assert_eq!(fs.read_link(ino).unwrap(), PathBuf::from("../elsewhere"));
    }

    #[test]
    fn test_statfs_forwarded() {
        let (_dir, fs) = scenario();
        let stats = fs.stat_fs(FUSE_ROOT_ID).unwrap();
        assert!(stats.bsize > 0);
    }

    #[test]
    fn test_forget_then_lookup_again() {
        let (_dir, fs) = scenario();
        let a = ino_of(&fs, "/a").unwrap();
        fs.forget_entry(a, 1);
        let again = ino_of(&fs, "/a").unwrap();
        assert_eq!(again, a);
        assert_eq!(list(&fs, "/a"), vec![".", "..", "b", "d"]);
        assert!(fs.attr(again, None).is_ok());
    }
}
