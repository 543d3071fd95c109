use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
    Renamed,
}

/// One filesystem event. Records are never mutated after the tracker creates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: PathBuf,
    pub kind: ChangeKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Similarity of old and new content. Only present for [ChangeKind::Modified].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    /// Previous location. Only present for [ChangeKind::Renamed].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<PathBuf>,
    pub is_major: bool,
    #[serde(default)]
    pub lines_added: usize,
    #[serde(default)]
    pub lines_removed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff: Vec<String>,
}

impl ChangeRecord {
    /// Creates a structural record. Structural changes are always major.
    pub fn structural(path: PathBuf, kind: ChangeKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            path,
            kind,
            timestamp,
            similarity_score: None,
            renamed_from: None,
            is_major: true,
            lines_added: 0,
            lines_removed: 0,
            diff: vec![],
        }
    }

    pub fn renamed(from: PathBuf, to: PathBuf, timestamp: DateTime<Utc>) -> Self {
        Self {
            renamed_from: Some(from),
            ..Self::structural(to, ChangeKind::Renamed, timestamp)
        }
    }
}

/// Terminal pane snapshot that differed enough from the previous one to be kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// `session:window.pane`
    pub pane_id: Arc<str>,
    pub content: Arc<str>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command: Option<String>,
    /// Retained records are never duplicates, the field is kept for readers of the log.
    #[serde(default)]
    pub is_duplicate: bool,
}

/// Everything the collectors observed during one tick.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub changes: Vec<ChangeRecord>,
    pub captures: Vec<CaptureRecord>,
    pub moment: DateTime<Utc>,
}
