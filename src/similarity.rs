//! Text similarity built on longest matching blocks (Ratcliff/Obershelp style ratio).
//!
//! Multi-line texts are compared line by line, single-line texts character by character. The
//! matcher drops "popular" elements from its index for long sequences, which keeps it fast on
//! source-file sized input while staying deterministic.

use std::{cmp::Ordering, collections::HashMap, hash::Hash};

/// Sequences at least this long get popular elements removed from the index.
const AUTOJUNK_MIN_LEN: usize = 200;

/// Amount of bytes inspected when deciding whether content is binary.
const BINARY_PROBE_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// Edit operation transforming `a[a_start..a_end]` into `b[b_start..b_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCode {
    pub tag: OpTag,
    pub a_start: usize,
    pub a_end: usize,
    pub b_start: usize,
    pub b_end: usize,
}

pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Hash + Eq> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&'a T, Vec<usize>> = HashMap::new();
        for (j, item) in b.iter().enumerate() {
            b2j.entry(item).or_default().push(j);
        }

        if b.len() >= AUTOJUNK_MIN_LEN {
            let popular_limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= popular_limit);
        }

        Self { a, b, b2j }
    }

    /// Finds the longest block `a[i..i+k] == b[j..j+k]` inside the given ranges. Ties are resolved
    /// towards the earliest block in `a`, then in `b`.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next_j2len = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                    next_j2len.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = next_j2len;
        }

        // Popular elements are missing from the index, grow the block over them.
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        Match {
            a: best_i,
            b: best_j,
            size: best_size,
        }
    }

    /// Returns non-overlapping matching blocks ordered by position, terminated by a zero sized
    /// sentinel at `(a.len(), b.len())`.
    pub fn matching_blocks(&self) -> Vec<Match> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size == 0 {
                continue;
            }
            if alo < m.a && blo < m.b {
                queue.push((alo, m.a, blo, m.b));
            }
            if m.a + m.size < ahi && m.b + m.size < bhi {
                queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
            }
            blocks.push(m);
        }
        blocks.sort_by_key(|m| (m.a, m.b));

        let mut collapsed: Vec<Match> = Vec::with_capacity(blocks.len() + 1);
        for block in blocks {
            match collapsed.last_mut() {
                Some(last) if last.a + last.size == block.a && last.b + last.size == block.b => {
                    last.size += block.size;
                }
                _ => collapsed.push(block),
            }
        }
        collapsed.push(Match {
            a: la,
            b: lb,
            size: 0,
        });
        collapsed
    }

    pub fn opcodes(&self) -> Vec<OpCode> {
        let (mut i, mut j) = (0, 0);
        let mut codes = Vec::new();
        for m in self.matching_blocks() {
            let tag = match (i < m.a, j < m.b) {
                (true, true) => Some(OpTag::Replace),
                (true, false) => Some(OpTag::Delete),
                (false, true) => Some(OpTag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                codes.push(OpCode {
                    tag,
                    a_start: i,
                    a_end: m.a,
                    b_start: j,
                    b_end: m.b,
                });
            }
            i = m.a + m.size;
            j = m.b + m.size;
            if m.size > 0 {
                codes.push(OpCode {
                    tag: OpTag::Equal,
                    a_start: m.a,
                    a_end: i,
                    b_start: m.b,
                    b_end: j,
                });
            }
        }
        codes
    }

    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = self.matching_blocks().iter().map(|m| m.size).sum();
        2.0 * matched as f64 / total as f64
    }
}

/// Ratio that doesn't depend on argument order. The matcher is biased towards the sequence it
/// indexes, so the pair is put into a canonical order first.
fn symmetric_ratio<T: Hash + Ord>(a: &[T], b: &[T]) -> f64 {
    let ordering = a.len().cmp(&b.len()).then_with(|| a.cmp(b));
    match ordering {
        Ordering::Greater => SequenceMatcher::new(b, a).ratio(),
        Ordering::Less | Ordering::Equal => SequenceMatcher::new(a, b).ratio(),
    }
}

/// Normalized similarity of two texts in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    if a.contains('\n') || b.contains('\n') {
        let a_lines = a.lines().collect::<Vec<_>>();
        let b_lines = b.lines().collect::<Vec<_>>();
        symmetric_ratio(&a_lines, &b_lines)
    } else {
        let a_chars = a.chars().collect::<Vec<_>>();
        let b_chars = b.chars().collect::<Vec<_>>();
        symmetric_ratio(&a_chars, &b_chars)
    }
}


/// Content is binary when its head holds bytes that never show up in text, or when it isn't
/// valid UTF-8.
pub fn is_binary(content: &[u8]) -> bool {
    let head = &content[..content.len().min(BINARY_PROBE_LEN)];
    let has_control = head
        .iter()
        .any(|&byte| byte == 0x7f || (byte < 0x20 && !matches!(byte, 7..=10 | 12 | 13 | 27)));
    has_control || std::str::from_utf8(content).is_err()
}

/// Line level summary of a modification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineDiff {
    pub lines_added: usize,
    pub lines_removed: usize,
    /// `-`/`+` prefixed lines of the first changed regions, bounded by the caller.
    pub excerpt: Vec<String>,
}

impl LineDiff {
    pub fn changed_lines(&self) -> usize {
        self.lines_added + self.lines_removed
    }
}

pub fn diff_lines(old: &str, new: &str, max_excerpt_lines: usize) -> LineDiff {
    let old_lines = old.lines().collect::<Vec<_>>();
    let new_lines = new.lines().collect::<Vec<_>>();
    let matcher = SequenceMatcher::new(&old_lines, &new_lines);

    let mut diff = LineDiff::default();
    for op in matcher.opcodes() {
        if op.tag == OpTag::Equal {
            continue;
        }
        diff.lines_removed += op.a_end - op.a_start;
        diff.lines_added += op.b_end - op.b_start;

        let removed = old_lines[op.a_start..op.a_end].iter().map(|l| format!("-{l}"));
        let added = new_lines[op.b_start..op.b_end].iter().map(|l| format!("+{l}"));
        for line in removed.chain(added) {
            if diff.excerpt.len() >= max_excerpt_lines {
                break;
            }
            diff.excerpt.push(line);
        }
    }
    diff
}
