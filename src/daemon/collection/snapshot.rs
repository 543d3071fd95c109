use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{config::FilesystemConfig, similarity::is_binary};

#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    /// Absent when the file is above the size limit and was never read
    pub hash: Option<[u8; 32]>,
    pub modified: Option<SystemTime>,
    pub size: u64,
    /// Text content, absent for binary and oversized files
    pub content: Option<Arc<str>>,
}

impl FileEntry {
    fn from_bytes(bytes: Vec<u8>, modified: Option<SystemTime>) -> Self {
        let hash: [u8; 32] = Sha256::digest(&bytes).into();
        let size = bytes.len() as u64;
        let content = if is_binary(&bytes) {
            None
        } else {
            String::from_utf8(bytes).ok().map(Arc::from)
        };
        Self {
            hash: Some(hash),
            modified,
            size,
            content,
        }
    }

    fn same_metadata(&self, size: u64, modified: Option<SystemTime>) -> bool {
        self.size == size && self.modified.is_some() && self.modified == modified
    }

    /// Whether the content is known to be the same, ignoring timestamps.
    pub fn same_content(&self, other: &FileEntry) -> bool {
        match (self.hash, other.hash) {
            (Some(a), Some(b)) => a == b,
            _ => self.size == other.size && self.modified == other.modified,
        }
    }
}

/// Path to file state mapping of every tracked file.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, FileEntry>,
}

impl Snapshot {
    pub fn get(&self, path: &Path) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn carry_over(&mut self, previous: &Snapshot, prefix: &Path) {
        for (path, entry) in previous.entries.iter().filter(|(p, _)| p.starts_with(prefix)) {
            self.entries
                .entry(path.clone())
                .or_insert_with(|| entry.clone());
        }
    }
}

impl FromIterator<(PathBuf, FileEntry)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (PathBuf, FileEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Decides which files are part of a snapshot.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    exclude_dirs: Vec<String>,
    ignored: Vec<PathBuf>,
}

impl PathFilter {
    pub fn from_config(config: &FilesystemConfig) -> Self {
        Self {
            include: config.include_filetypes.clone(),
            exclude: config.exclude_filetypes.clone(),
            exclude_dirs: config.exclude_dirs.clone(),
            ignored: config.ignored_paths.clone(),
        }
    }

    pub fn accepts_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|v| v.to_string_lossy().to_lowercase()) else {
            return false;
        };
        let included = self.include.is_empty() || self.include.iter().any(|v| name.ends_with(v));
        let excluded = self.exclude.iter().any(|v| name.ends_with(v));
        included && !excluded && !self.is_ignored(path)
    }

    fn skips_dir(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && (self
                .exclude_dirs
                .iter()
                .any(|v| entry.file_name().to_string_lossy() == v.as_str())
                || self.is_ignored(entry.path()))
    }

    /// Application output. Covers the sidecar files written next to a log too.
    fn is_ignored(&self, path: &Path) -> bool {
        self.ignored.iter().any(|ignored| {
            if path.starts_with(ignored) {
                return true;
            }
            match (ignored.file_name(), path.file_name()) {
                (Some(ignored_name), Some(name)) => {
                    path.parent() == ignored.parent()
                        && name
                            .to_string_lossy()
                            .starts_with(ignored_name.to_string_lossy().as_ref())
                }
                _ => false,
            }
        })
    }
}

/// Walks every root and builds a fresh snapshot. Blocking.
///
/// Files whose size and modification time match `previous` aren't read again. Files and
/// directories that fail to read keep their previous state so that an IO hiccup never shows up as a
/// deletion.
pub fn take_snapshot(
    roots: &[PathBuf],
    filter: &PathFilter,
    max_file_size: u64,
    previous: &Snapshot,
) -> Snapshot {
    let mut fresh = Snapshot::default();
    let mut failed = vec![];

    for root in roots {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !filter.skips_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(v) => v,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    if e.depth() == 0 {
                        warn!("Couldn't list watched directory {path:?}: {e}");
                    } else {
                        debug!("Skipping unreadable {path:?}: {e}");
                    }
                    failed.push(path);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !filter.accepts_file(entry.path()) {
                continue;
            }

            match read_entry(&entry, max_file_size, previous) {
                Ok(file) => {
                    fresh.entries.insert(entry.into_path(), file);
                }
                Err(e) => {
                    debug!("Skipping unreadable {:?}: {e}", entry.path());
                    failed.push(entry.into_path());
                }
            }
        }
    }

    for path in failed {
        fresh.carry_over(previous, &path);
    }
    fresh
}

fn read_entry(
    entry: &DirEntry,
    max_file_size: u64,
    previous: &Snapshot,
) -> std::io::Result<FileEntry> {
    let metadata = entry.metadata().map_err(std::io::Error::from)?;
    let size = metadata.len();
    let modified = metadata.modified().ok();

    if let Some(known) = previous.get(entry.path()) {
        if known.same_metadata(size, modified) {
            return Ok(known.clone());
        }
    }

    if size > max_file_size {
        return Ok(FileEntry {
            hash: None,
            modified,
            size,
            content: None,
        });
    }

    let bytes = std::fs::read(entry.path())?;
    Ok(FileEntry::from_bytes(bytes, modified))
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use anyhow::Result;
    use tempfile::tempdir;

    use super::{take_snapshot, PathFilter, Snapshot};
    use crate::config::FilesystemConfig;

    fn filter(include: &[&str], exclude: &[&str], ignored: Vec<PathBuf>) -> PathFilter {
        PathFilter::from_config(&FilesystemConfig {
            include_filetypes: include.iter().map(|v| v.to_string()).collect(),
            exclude_filetypes: exclude.iter().map(|v| v.to_string()).collect(),
            ignored_paths: ignored,
            ..Default::default()
        })
    }

    #[test]
    fn test_filters() {
        let filter = filter(&[".rs", ".md"], &[".gen.rs"], vec!["/state/log.json".into()]);

        assert!(filter.accepts_file("/w/main.rs".as_ref()));
        assert!(filter.accepts_file("/w/README.MD".as_ref()));
        assert!(!filter.accepts_file("/w/schema.gen.rs".as_ref()));
        assert!(!filter.accepts_file("/w/data.json".as_ref()));
        assert!(!filter.accepts_file("/state/log.json".as_ref()));
        assert!(!filter.accepts_file("/state/log.json.tmp".as_ref()));
    }

    #[test]
    fn test_snapshot_contents() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("src"))?;
        fs::create_dir_all(root.join(".git"))?;
        fs::write(root.join("src/lib.rs"), "pub fn a() {}\n")?;
        fs::write(root.join("notes.txt"), "hello")?;
        fs::write(root.join("image.bin"), [0u8, 1, 2, 3])?;
        fs::write(root.join("big.txt"), "x".repeat(64))?;
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main")?;

        let snapshot = take_snapshot(
            &[root.clone()],
            &filter(&[], &[], vec![]),
            32,
            &Snapshot::default(),
        );

        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.get(&root.join(".git/HEAD")).is_none());
        assert_eq!(
            snapshot.get(&root.join("src/lib.rs")).and_then(|v| v.content.as_deref()),
            Some("pub fn a() {}\n")
        );

        let binary = snapshot.get(&root.join("image.bin")).unwrap();
        assert!(binary.hash.is_some());
        assert!(binary.content.is_none());

        let big = snapshot.get(&root.join("big.txt")).unwrap();
        assert!(big.hash.is_none());
        assert_eq!(big.size, 64);
        Ok(())
    }

    #[test]
    fn test_missing_root_keeps_previous_entries() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("project");
        fs::create_dir_all(&root)?;
        fs::write(root.join("a.txt"), "a")?;
        let filter = filter(&[], &[], vec![]);

        let previous = take_snapshot(&[root.clone()], &filter, 1024, &Snapshot::default());
        fs::remove_dir_all(&root)?;
        let fresh = take_snapshot(&[root.clone()], &filter, 1024, &previous);

        assert_eq!(fresh.len(), 1);
        assert!(fresh.get(&root.join("a.txt")).is_some());
        Ok(())
    }
}
