//! Reconciles the append-only journal text into the active working set.
//!
//! The journal is read as a flat list of lines. Each line is classified into a
//! [`LineKind`], then a single walk merges repeated appearances of the same
//! [`EntryKey`]: the later occurrence decides state and position, notes
//! accumulate. Nothing here fails; a line that does not fit the grammar is kept
//! as plain content.

use crate::model::{Entry, EntryKey, Marker, Note, WorkingSet};
use std::collections::HashMap;
use tracing::debug;

/// Run of dashes that marks a section header.
pub const SEPARATOR_RUN: &str = "-------";

/// Label of the section written when triage is committed.
pub const TRIAGE_LABEL: &str = "Triage";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    Separator {
        label: &'a str,
    },
    TopLevel {
        marker: Option<Marker>,
        content: &'a str,
    },
    Indented {
        marker: Option<Marker>,
        content: &'a str,
    },
}

pub fn classify(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.contains(SEPARATOR_RUN) {
        return LineKind::Separator {
            label: section_label(trimmed),
        };
    }
    let (marker, content) = split_marker(trimmed);
    if is_indented(line) {
        LineKind::Indented { marker, content }
    } else {
        if line.starts_with(' ') {
            debug!(line, "single-space indent treated as top level");
        }
        LineKind::TopLevel { marker, content }
    }
}

/// Splits an optional leading marker from already trimmed text.
///
/// Unknown glyphs and markers without content fall back to the whole text.
pub fn split_marker(text: &str) -> (Option<Marker>, &str) {
    let Some(rest) = text.strip_prefix('[') else {
        return (None, text);
    };
    let Some(close) = rest.find(']') else {
        debug!(text, "unterminated marker");
        return (None, text);
    };
    let Some(marker) = Marker::from_inner(&rest[..close]) else {
        debug!(text, "unknown marker glyph");
        return (None, text);
    };
    let content = rest[close + 1..].trim();
    if content.is_empty() {
        debug!(text, "marker without content");
        return (None, text);
    }
    (Some(marker), content)
}

pub fn is_indented(line: &str) -> bool {
    line.starts_with("  ") || line.starts_with('\t')
}

fn section_label(trimmed: &str) -> &str {
    trimmed.trim_matches('-').trim()
}

fn is_triage_label(label: &str) -> bool {
    label
        .split_whitespace()
        .next()
        .map(|word| word == TRIAGE_LABEL)
        .unwrap_or(false)
}

pub fn parse(text: &str) -> WorkingSet {
    let mut walk = Reconciler::default();
    for line in text.lines() {
        walk.feed(classify(line));
    }
    walk.finish()
}

#[derive(Default)]
struct Reconciler {
    entries: HashMap<EntryKey, Entry>,
    next_order: u64,
    current: Option<EntryKey>,
    prune_armed: bool,
}

impl Reconciler {
    fn feed(&mut self, kind: LineKind<'_>) {
        match kind {
            LineKind::Blank => self.current = None,
            LineKind::Separator { label } => {
                self.current = None;
                self.prune_armed = is_triage_label(label);
            }
            LineKind::TopLevel { marker, content } => self.top_level(marker, content),
            LineKind::Indented { marker, content } => match self.current.clone() {
                Some(key) => self.note(&key, marker, content),
                None => {
                    debug!(content, "indented line without a parent entry");
                    self.top_level(marker, content);
                }
            },
        }
    }

    fn top_level(&mut self, marker: Option<Marker>, content: &str) {
        if self.prune_armed {
            self.prune_armed = false;
            self.entries.retain(|_, entry| entry.is_task);
        }
        let order = self.next_order;
        self.next_order += 1;
        let key = EntryKey::from_content(content);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                let was_resolved = entry.state.map(|m| m.is_resolved()).unwrap_or(false);
                let now_resolved = marker.map(|m| m.is_resolved()).unwrap_or(false);
                if was_resolved && !now_resolved {
                    entry.notes.clear();
                }
                entry.state = marker;
                entry.order = order;
                entry.is_task |= marker.is_some();
            }
            None => {
                self.entries
                    .insert(key.clone(), Entry::new(content, marker, order));
            }
        }
        self.current = Some(key);
    }

    fn note(&mut self, key: &EntryKey, marker: Option<Marker>, content: &str) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        match entry.notes.iter_mut().find(|n| n.content == content) {
            Some(existing) => existing.state = marker,
            None => entry.notes.push(Note::new(content, marker)),
        }
    }

    fn finish(self) -> WorkingSet {
        let mut active: WorkingSet = self
            .entries
            .into_values()
            .filter(|entry| entry.is_open())
            .collect();
        active.sort_by_key(|entry| entry.order);
        active
    }
}
