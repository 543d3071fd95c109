use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::{
    config::FilesystemConfig,
    daemon::storage::entities::{ChangeKind, ChangeRecord},
    similarity::{diff_lines, similarity},
};

use super::snapshot::{take_snapshot, FileEntry, PathFilter, Snapshot};

/// Deleted and added files at least this similar are reported as a rename.
pub const RENAME_THRESHOLD: f64 = 0.8;

/// Upper bound of diff lines kept per modification
pub const MAX_EXCERPT_LINES: usize = 20;

/// Rules that turn two snapshots into change records.
#[derive(Debug, Clone)]
pub struct ChangeRules {
    pub major_change_threshold: f64,
    pub min_lines_changed: usize,
    pub major_changes_only: bool,
}

impl ChangeRules {
    pub fn from_config(config: &FilesystemConfig) -> Self {
        Self {
            major_change_threshold: config.major_change_threshold,
            min_lines_changed: config.min_lines_changed,
            major_changes_only: config.major_changes_only,
        }
    }
}

/// Detects filesystem changes between ticks. Owns the snapshot of the previous tick.
pub struct FilesystemTracker {
    roots: Arc<[PathBuf]>,
    filter: Arc<PathFilter>,
    max_file_size: u64,
    rules: ChangeRules,
    previous: Option<Arc<Snapshot>>,
}

impl FilesystemTracker {
    pub fn new(config: &FilesystemConfig) -> Self {
        Self {
            roots: config.dirs.clone().into(),
            filter: Arc::new(PathFilter::from_config(config)),
            max_file_size: config.max_file_size,
            rules: ChangeRules::from_config(config),
            previous: None,
        }
    }

    /// Scans the watched directories and returns what changed since the last scan. The first scan
    /// only records a baseline.
    #[instrument(skip(self))]
    pub async fn scan(&mut self, moment: DateTime<Utc>) -> Result<Vec<ChangeRecord>> {
        let roots = self.roots.clone();
        let filter = self.filter.clone();
        let max_file_size = self.max_file_size;
        let previous = self.previous.clone().unwrap_or_default();

        let fresh = tokio::task::spawn_blocking(move || {
            take_snapshot(&roots, &filter, max_file_size, &previous)
        })
        .await?;

        let records = match &self.previous {
            Some(previous) => diff_snapshots(previous, &fresh, &self.rules, moment),
            None => {
                info!("Recorded baseline of {} files", fresh.len());
                vec![]
            }
        };

        self.previous = Some(Arc::new(fresh));
        debug!("Detected {} changes", records.len());
        Ok(records)
    }
}

fn modified_record(
    path: &Path,
    old: &FileEntry,
    new: &FileEntry,
    rules: &ChangeRules,
    moment: DateTime<Utc>,
) -> ChangeRecord {
    let mut record = ChangeRecord::structural(path.to_path_buf(), ChangeKind::Modified, moment);
    match (&old.content, &new.content) {
        (Some(old), Some(new)) => {
            let score = similarity(old, new);
            let diff = diff_lines(old, new, MAX_EXCERPT_LINES);
            record.is_major = (1.0 - score) > rules.major_change_threshold
                && diff.changed_lines() >= rules.min_lines_changed;
            record.similarity_score = Some(score);
            record.lines_added = diff.lines_added;
            record.lines_removed = diff.lines_removed;
            record.diff = diff.excerpt;
        }
        // Binary or oversized content has no lines to count
        _ => {
            record.similarity_score = Some(0.0);
            record.is_major = rules.major_change_threshold < 1.0;
        }
    }
    record
}

fn rename_score(old: &FileEntry, new: &FileEntry) -> f64 {
    match (&old.content, &new.content) {
        (Some(old), Some(new)) => similarity(old, new),
        _ if old.hash.is_some() && old.hash == new.hash => 1.0,
        _ => 0.0,
    }
}

/// Compares two snapshots.
///
/// Added and modified files come first in path order, deleted files after them. A deleted file
/// whose content is close enough to an added one is merged with it into a single rename, placed
/// where the added record was.
pub fn diff_snapshots(
    previous: &Snapshot,
    fresh: &Snapshot,
    rules: &ChangeRules,
    moment: DateTime<Utc>,
) -> Vec<ChangeRecord> {
    let mut records = vec![];
    // Index into `records` and entry of every added file still available for rename pairing
    let mut added = vec![];

    for (path, entry) in fresh.iter() {
        match previous.get(path) {
            None => {
                added.push((records.len(), entry));
                records.push(ChangeRecord::structural(
                    path.clone(),
                    ChangeKind::Added,
                    moment,
                ));
            }
            Some(old) if !old.same_content(entry) => {
                records.push(modified_record(path, old, entry, rules, moment));
            }
            Some(_) => (),
        }
    }

    let mut deleted = vec![];
    for (path, old) in previous.iter().filter(|(p, _)| fresh.get(p).is_none()) {
        let best = added
            .iter()
            .enumerate()
            .map(|(i, (_, new))| (i, rename_score(old, new)))
            .filter(|(_, score)| *score >= RENAME_THRESHOLD)
            .fold(None, |best: Option<(usize, f64)>, candidate| match best {
                Some(b) if b.1 >= candidate.1 => Some(b),
                _ => Some(candidate),
            });

        match best {
            Some((i, _)) => {
                let (position, _) = added.remove(i);
                let to = records[position].path.clone();
                records[position] = ChangeRecord::renamed(path.clone(), to, moment);
            }
            None => deleted.push(ChangeRecord::structural(
                path.clone(),
                ChangeKind::Deleted,
                moment,
            )),
        }
    }
    records.extend(deleted);

    if rules.major_changes_only {
        records.retain(|v| v.is_major);
    }
    records
}
