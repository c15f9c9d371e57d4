//! Loading the input list into a [`NameTrie`]
//!
//! Each line names a real filesystem object. Lines are canonicalized
//! against the real filesystem, checked for containment in the overlay
//! root and inserted relative to it. Bad lines are skipped with a
//! diagnostic; only allocation failure aborts the load.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::unix::ffi::OsStringExt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use super::NameTrie;

/// Where the input list comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSource {
    /// Read from standard input
    Stdin,
    /// Read from a file
    File(PathBuf),
}

impl ListSource {
    /// Interpret a command-line argument; `-` selects standard input
    pub fn from_arg(arg: &Path) -> Self {
        if arg == Path::new("-") {
            ListSource::Stdin
        } else {
            ListSource::File(arg.to_path_buf())
        }
    }

    /// Display name, used as the default mount fsname
    pub fn display_name(&self) -> String {
        match self {
            ListSource::Stdin => "stdin".to_string(),
            ListSource::File(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// Why a listed entry was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Could not be canonicalized (missing, dangling link, permission)
    Unresolvable,
    /// Canonical form lies outside the overlay root
    OutsideRoot,
}

/// A listed entry that did not make it into the trie
#[derive(Debug, Clone)]
pub struct RejectedEntry {
    /// 1-based line number in the list
    pub line: usize,
    /// Entry as written
    pub path: PathBuf,
    pub reason: RejectReason,
}

/// Summary of a list load
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Entries inserted into the trie
    pub accepted: usize,
    /// Blank lines skipped
    pub blank: usize,
    /// Entries skipped with a diagnostic
    pub rejected: Vec<RejectedEntry>,
}

/// Load a list from its source, anchored at `root`
///
/// `root` must already be canonical.
pub fn load_list(source: &ListSource, root: &Path) -> Result<(NameTrie, LoadReport)> {
    info!("Loading list from {}", source.display_name());
    match source {
        ListSource::Stdin => {
            let stdin = io::stdin();
            let locked = stdin.lock();
            load_reader(locked, root)
        }
        ListSource::File(path) => {
            let file = File::open(path)?;
            load_reader(BufReader::new(file), root)
        }
    }
}

/// Load newline-delimited entries from any reader
pub fn load_reader<R: BufRead>(mut reader: R, root: &Path) -> Result<(NameTrie, LoadReport)> {
    let mut trie = NameTrie::new();
    let mut report = LoadReport::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;

        strip_line_ending(&mut buf);
        if buf.is_empty() {
            report.blank += 1;
            continue;
        }

        let entry = PathBuf::from(OsString::from_vec(buf.clone()));
        match admit(&entry, root) {
            Ok(relative) => {
                let components = relative.components().filter_map(|c| match c {
                    Component::Normal(name) => Some(name.to_os_string()),
                    _ => None,
                });
                trie.insert(components)?;
                report.accepted += 1;
                debug!("Listed {:?} as /{}", entry, relative.display());
            }
            Err(e) => {
                warn!("Skipping line {}: {}", line_no, e);
                let reason = match e {
                    Error::OutsideRoot { .. } => RejectReason::OutsideRoot,
                    _ => RejectReason::Unresolvable,
                };
                report.rejected.push(RejectedEntry {
                    line: line_no,
                    path: entry,
                    reason,
                });
            }
        }
    }

    info!(
        "Loaded {} entries ({} nodes, depth {}, {} rejected)",
        report.accepted,
        trie.len(),
        trie.depth(),
        report.rejected.len()
    );

    Ok((trie, report))
}

/// Canonicalize `entry` and return its path relative to `root`
///
/// Containment is checked component-wise, so `/data2` is not inside
/// `/data`.
pub fn admit(entry: &Path, root: &Path) -> Result<PathBuf> {
    let absolute = if entry.is_absolute() {
        entry.to_path_buf()
    } else {
        root.join(entry)
    };

    let canonical = std::fs::canonicalize(&absolute).map_err(|source| Error::Unresolvable {
        path: entry.to_path_buf(),
        source,
    })?;

    canonical
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| Error::OutsideRoot {
            path: canonical.clone(),
            root: root.to_path_buf(),
        })
}

fn strip_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::AsRawFd;
    use tempfile::tempdir;

    fn canonical_root(dir: &Path) -> PathBuf {
        fs::canonicalize(dir).unwrap()
    }

    #[test]
    fn test_relative_and_absolute_entries() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/b/c.txt"), b"c").unwrap();
        fs::create_dir(root.join("a/d")).unwrap();

        let list = format!("a/b/c.txt\n{}\n", root.join("a/d").display());
        let (trie, report) = load_reader(list.as_bytes(), &root).unwrap();

        assert_eq!(report.accepted, 2);
        assert!(report.rejected.is_empty());
        let a = trie.child(NameTrie::ROOT, OsStr::new("a")).unwrap();
        let children: Vec<_> = trie.children(a).iter().map(|&c| trie.name(c)).collect();
        assert_eq!(children, vec![OsStr::new("b"), OsStr::new("d")]);
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        fs::write(root.join("x"), b"x").unwrap();

        let (trie, report) = load_reader("\n\nx\r\n\n".as_bytes(), &root).unwrap();
        assert_eq!(report.blank, 3);
        assert_eq!(report.accepted, 1);
        assert!(trie.child(NameTrie::ROOT, OsStr::new("x")).is_some());
    }

    #[test]
    fn test_non_utf8_line_kept_as_raw_bytes() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        let name = OsStr::from_bytes(b"caf\xe9");
        fs::write(root.join(name), b"latin-1").unwrap();

        let (trie, report) = load_reader(&b"caf\xe9\n"[..], &root).unwrap();
        assert_eq!(report.accepted, 1);
        let child = trie.child(NameTrie::ROOT, name).unwrap();
        assert_eq!(trie.name(child).as_bytes(), b"caf\xe9");
    }

    #[test]
    fn test_load_list_from_file() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        fs::write(root.join("x"), b"x").unwrap();
        let list = root.join("list.txt");
        fs::write(&list, b"x\nmissing\n").unwrap();

        let (trie, report) = load_list(&ListSource::File(list), &root).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 1);
        assert!(trie.child(NameTrie::ROOT, OsStr::new("x")).is_some());

        let err = load_list(&ListSource::File(root.join("absent.txt")), &root).unwrap_err();
        assert_eq!(err.errno(), libc::ENOENT);
    }

    #[test]
    fn test_load_list_from_stdin() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        fs::create_dir_all(root.join("a/b")).unwrap();
        let list = root.join("list.txt");
        fs::write(&list, b"a/b\n\n").unwrap();

        // Point fd 0 at the list for the duration of the load
        let input = File::open(&list).unwrap();
        let saved = unsafe { libc::dup(0) };
        assert!(saved >= 0);
        assert_eq!(unsafe { libc::dup2(input.as_raw_fd(), 0) }, 0);
        let result = load_list(&ListSource::Stdin, &root);
        unsafe {
            libc::dup2(saved, 0);
            libc::close(saved);
        }

        let (trie, report) = result.unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.blank, 1);
        let a = trie.child(NameTrie::ROOT, OsStr::new("a")).unwrap();
        assert!(trie.child(a, OsStr::new("b")).is_some());
    }

    #[test]
    fn test_missing_entry_is_skipped() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        fs::write(root.join("present"), b"").unwrap();

        let (trie, report) = load_reader("missing\npresent\n".as_bytes(), &root).unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].line, 1);
        assert_eq!(report.rejected[0].reason, RejectReason::Unresolvable);
        assert_eq!(trie.children(NameTrie::ROOT).len(), 1);
    }

    #[test]
    fn test_outside_root_rejected() {
        let outer = tempdir().unwrap();
        let outer_root = canonical_root(outer.path());
        fs::create_dir(outer_root.join("home")).unwrap();
        fs::create_dir(outer_root.join("etc")).unwrap();
        fs::write(outer_root.join("etc/passwd"), b"root").unwrap();

        let root = outer_root.join("home");
        let list = format!("{}\n", outer_root.join("etc/passwd").display());
        let (trie, report) = load_reader(list.as_bytes(), &root).unwrap();

        assert_eq!(report.accepted, 0);
        assert_eq!(report.rejected[0].reason, RejectReason::OutsideRoot);
        assert!(trie.is_empty());
        assert!(!trie.is_passthrough(NameTrie::ROOT));
    }

    #[test]
    fn test_sibling_prefix_is_not_contained() {
        let outer = tempdir().unwrap();
        let outer_root = canonical_root(outer.path());
        fs::create_dir(outer_root.join("data")).unwrap();
        fs::create_dir(outer_root.join("data2")).unwrap();

        let root = outer_root.join("data");
        let err = admit(&outer_root.join("data2"), &root).unwrap_err();
        assert!(matches!(err, Error::OutsideRoot { .. }));
    }

    #[test]
    fn test_dotdot_escape_rejected() {
        let outer = tempdir().unwrap();
        let outer_root = canonical_root(outer.path());
        fs::create_dir(outer_root.join("root")).unwrap();
        fs::write(outer_root.join("secret"), b"s").unwrap();

        let root = outer_root.join("root");
        let err = admit(Path::new("../secret"), &root).unwrap_err();
        assert!(matches!(err, Error::OutsideRoot { .. }));
    }

    #[test]
    fn test_symlink_canonicalized_into_root() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("link")).unwrap();

        let relative = admit(Path::new("link"), &root).unwrap();
        assert_eq!(relative, PathBuf::from("real"));
    }

    #[test]
    fn test_duplicate_and_prefix_entries() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        fs::create_dir_all(root.join("a/b")).unwrap();

        let (trie, report) = load_reader("a/b\na/b\na\n".as_bytes(), &root).unwrap();
        assert_eq!(report.accepted, 3);
        assert_eq!(trie.len(), 3);
    }

    #[test]
    fn test_root_entry_marks_root_listed() {
        let dir = tempdir().unwrap();
        let root = canonical_root(dir.path());
        let list = format!("{}\n", root.display());

        let (trie, _) = load_reader(list.as_bytes(), &root).unwrap();
        assert!(trie.root_listed());
        assert!(trie.is_passthrough(NameTrie::ROOT));
    }

    #[test]
    fn test_list_source_from_arg() {
        assert_eq!(ListSource::from_arg(Path::new("-")), ListSource::Stdin);
        assert_eq!(
            ListSource::from_arg(Path::new("files.txt")),
            ListSource::File(PathBuf::from("files.txt"))
        );
    }
}
