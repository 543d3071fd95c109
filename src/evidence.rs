//! Turns the evidence logs into a bounded, textual payload for the summarizer.
//!
//! Every record becomes one [EvidenceEntry]. When the entries don't fit into the token limit,
//! structural changes and major edits are kept before anything else, and within the same class
//! recent entries win over older ones. The payload itself is always chronological.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::daemon::storage::entities::{CaptureRecord, ChangeKind, ChangeRecord};

/// Rough average of characters per token across common tokenizers.
pub const CHARS_PER_TOKEN: usize = 4;

/// Trailing lines of a capture shown in its entry.
pub const CAPTURE_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Significance {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceEntry {
    pub timestamp: DateTime<Utc>,
    pub significance: Significance,
    pub text: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvidencePayload {
    pub entries: Vec<EvidenceEntry>,
    pub total_tokens: usize,
    /// Entries that didn't fit into the budget
    pub omitted: usize,
}

impl EvidencePayload {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|v| v.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn time_prefix(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("[%Y-%m-%d %H:%M:%S]")
        .to_string()
}

impl EvidenceEntry {
    fn new(timestamp: DateTime<Utc>, significance: Significance, text: String) -> Self {
        Self {
            tokens: estimate_tokens(&text),
            timestamp,
            significance,
            text,
        }
    }

    pub fn from_change(record: &ChangeRecord) -> Self {
        let mut text = time_prefix(record.timestamp);
        let path = record.path.display();
        // Writing into a String can't fail
        let _ = match record.kind {
            ChangeKind::Added => write!(text, " Added {path}"),
            ChangeKind::Deleted => write!(text, " Deleted {path}"),
            ChangeKind::Renamed => match &record.renamed_from {
                Some(from) => write!(text, " Renamed {} -> {path}", from.display()),
                None => write!(text, " Renamed to {path}"),
            },
            ChangeKind::Modified => write!(
                text,
                " Modified {path} ({}, similarity {:.2}, +{} -{})",
                if record.is_major { "major" } else { "minor" },
                record.similarity_score.unwrap_or(0.0),
                record.lines_added,
                record.lines_removed,
            ),
        };
        for line in &record.diff {
            let _ = write!(text, "\n    {line}");
        }

        let significance = match record.kind {
            ChangeKind::Modified if !record.is_major => Significance::Low,
            _ => Significance::High,
        };
        Self::new(record.timestamp, significance, text)
    }

    pub fn from_capture(record: &CaptureRecord) -> Self {
        let mut text = time_prefix(record.timestamp);
        let _ = match &record.last_command {
            Some(command) => write!(text, " Captured pane {} ($ {command}):", record.pane_id),
            None => write!(text, " Captured pane {}:", record.pane_id),
        };

        let lines = record.content.lines().collect::<Vec<_>>();
        let tail = &lines[lines.len().saturating_sub(CAPTURE_TAIL_LINES)..];
        for line in tail {
            let _ = write!(text, "\n    {line}");
        }
        Self::new(record.timestamp, Significance::Low, text)
    }
}

/// Builds the payload of at most `token_limit` estimated tokens.
///
/// Low entries are never kept while a high entry that fits the limit on its own is left out. The
/// payload is empty only when there are no records or when no single entry fits the limit.
pub fn build_payload(
    changes: &[ChangeRecord],
    captures: &[CaptureRecord],
    token_limit: usize,
) -> EvidencePayload {
    let entries = changes
        .iter()
        .map(EvidenceEntry::from_change)
        .chain(captures.iter().map(EvidenceEntry::from_capture))
        .collect::<Vec<_>>();

    // Order in which entries claim budget. Ties keep the later record first.
    let mut candidates = (0..entries.len()).collect::<Vec<_>>();
    candidates.sort_by(|&a, &b| {
        let (a_entry, b_entry) = (&entries[a], &entries[b]);
        b_entry
            .significance
            .cmp(&a_entry.significance)
            .then(b_entry.timestamp.cmp(&a_entry.timestamp))
            .then(b.cmp(&a))
    });

    let mut total_tokens = 0;
    let mut selected = vec![];
    // Set once a high entry that could fit on its own was left out. From then on low entries
    // would only take space that belongs to it.
    let mut high_evicted = false;
    for index in candidates {
        let entry = &entries[index];
        if entry.significance == Significance::Low && high_evicted {
            continue;
        }
        if total_tokens + entry.tokens <= token_limit {
            total_tokens += entry.tokens;
            selected.push(index);
        } else if entry.significance == Significance::High && entry.tokens <= token_limit {
            high_evicted = true;
        }
    }

    selected.sort_by(|&a, &b| {
        entries[a]
            .timestamp
            .cmp(&entries[b].timestamp)
            .then(a.cmp(&b))
    });

    let omitted = entries.len() - selected.len();
    let mut entries = entries.into_iter().map(Some).collect::<Vec<_>>();
    EvidencePayload {
        entries: selected
            .into_iter()
            .filter_map(|i| entries[i].take())
            .collect(),
        total_tokens,
        omitted,
    }
}
