use crate::model::{Entry, EntryKey, Marker};
use crate::parser::{classify, is_indented, LineKind, SEPARATOR_RUN};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub label: String,
    pub stamp: String,
}

impl SectionHeader {
    pub fn new(label: impl Into<String>, at: DateTime<Local>) -> Self {
        SectionHeader {
            label: label.into(),
            stamp: format_stamp(at),
        }
    }
}

impl fmt::Display for SectionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{run} {} {} {run}",
            self.label,
            self.stamp,
            run = SEPARATOR_RUN
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched { lines: usize },
    Missed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scorecard {
    pub done: usize,
    pub cancelled: usize,
    pub deferred: usize,
}

pub fn format_stamp(at: DateTime<Local>) -> String {
    at.format("%I:%M %p").to_string()
}

pub fn journal_file_name(date: NaiveDate) -> String {
    format!("{}-notes.txt", date.format(DATE_FORMAT))
}

/// Plan file for the day after `today`, next to the journal.
pub fn plan_file_path(journal: &Path, today: NaiveDate) -> PathBuf {
    let tomorrow = today.succ_opt().unwrap_or(today);
    let name = format!("{}-plan.txt", tomorrow.format(DATE_FORMAT));
    match journal.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

pub fn ensure_journal(path: &Path, now: DateTime<Local>) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let header = SectionHeader::new("Session Start", now);
    fs::write(path, format!("{header}\n")).with_context(|| format!("creating {:?}", path))?;
    Ok(())
}

pub fn read_journal(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {:?}", path))
}

/// Appends a section header and the given entries. An empty `items` still
/// records the header.
pub fn commit_section(path: &Path, header: &SectionHeader, items: &[Entry]) -> Result<()> {
    let mut block = format!("\n{header}\n");
    for entry in items {
        block.push_str(&entry.to_line());
        block.push('\n');
        for note in &entry.notes {
            block.push_str("  ");
            block.push_str(&note.to_line());
            block.push('\n');
        }
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {:?}", path))?;
    file.write_all(block.as_bytes())
        .with_context(|| format!("appending to {:?}", path))?;
    Ok(())
}

/// Rewrites the marker of the first open top-level line for `key` and of
/// every indented line directly under it. Lines already resolved are history
/// and stay as written.
pub fn patch_entry(path: &Path, key: &EntryKey, marker: Marker) -> Result<PatchOutcome> {
    let text = read_journal(path)?;
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    let Some(start) = find_block(&lines, key, 0) else {
        return Ok(PatchOutcome::Missed);
    };
    lines[start] = remark(&lines[start], marker);
    let mut patched = 1;
    for line in lines.iter_mut().skip(start + 1) {
        if !matches!(classify(line), LineKind::Indented { .. }) {
            break;
        }
        *line = remark(line, marker);
        patched += 1;
    }
    fs::write(path, lines.concat()).with_context(|| format!("patching {:?}", path))?;
    Ok(PatchOutcome::Patched { lines: patched })
}

/// Rewrites the marker of one note line inside the last open block of `key`
/// that contains it. Later occurrences of a note win on re-read, so the last
/// one is the line that counts.
pub fn patch_note(
    path: &Path,
    key: &EntryKey,
    note_content: &str,
    marker: Marker,
) -> Result<PatchOutcome> {
    let text = read_journal(path)?;
    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    let mut target = None;
    let mut from = 0;
    while let Some(start) = find_block(&lines, key, from) {
        for (idx, line) in lines.iter().enumerate().skip(start + 1) {
            match classify(line) {
                LineKind::Indented { content, .. } if content == note_content => {
                    target = Some(idx);
                    break;
                }
                LineKind::Indented { .. } => {}
                _ => break,
            }
        }
        from = start + 1;
    }
    let Some(idx) = target else {
        return Ok(PatchOutcome::Missed);
    };
    lines[idx] = remark(&lines[idx], marker);
    fs::write(path, lines.concat()).with_context(|| format!("patching {:?}", path))?;
    Ok(PatchOutcome::Patched { lines: 1 })
}

pub fn daily_summary(path: &Path) -> Result<Scorecard> {
    let mut card = Scorecard::default();
    if !path.exists() {
        return Ok(card);
    }
    for line in read_journal(path)?.lines() {
        if is_indented(line) {
            continue;
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with(Marker::Done.glyph()) {
            card.done += 1;
        } else if trimmed.starts_with(Marker::Cancelled.glyph()) {
            card.cancelled += 1;
        } else if trimmed.starts_with(Marker::Deferred.glyph()) {
            card.deferred += 1;
        }
    }
    Ok(card)
}

fn find_block(lines: &[String], key: &EntryKey, from: usize) -> Option<usize> {
    lines.iter().enumerate().skip(from).find_map(|(idx, line)| {
        match classify(line) {
            LineKind::TopLevel { marker, content }
                if key.matches(content) && !marker.map(|m| m.is_resolved()).unwrap_or(false) =>
            {
                Some(idx)
            }
            _ => None,
        }
    })
}

/// Replaces or inserts the marker of a single line, keeping its indentation,
/// content and line terminator.
fn remark(line: &str, marker: Marker) -> String {
    let body = line.trim_end_matches(['\n', '\r']);
    let ending = &line[body.len()..];
    let indent_len = body.len() - body.trim_start().len();
    let (indent, rest) = body.split_at(indent_len);
    let rest = rest.trim_end();
    let content = match classify(body) {
        LineKind::TopLevel {
            marker: Some(_),
            content,
        }
        | LineKind::Indented {
            marker: Some(_),
            content,
        } => content,
        _ => rest,
    };
    format!("{indent}{} {content}{ending}", marker.glyph())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Note;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 10, 19, hour, minute, 0)
            .single()
            .expect("valid local time")
    }

    #[test]
    fn header_formats_label_and_stamp() {
        let header = SectionHeader::new("Triage", at(14, 5));
        assert_eq!(header.to_string(), "------- Triage 02:05 PM -------");
    }

    #[test]
    fn empty_commit_still_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        fs::write(&path, "existing\n").unwrap();
        commit_section(&path, &SectionHeader::new("Break", at(9, 0)), &[]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "existing\n\n------- Break 09:00 AM -------\n");
    }

    #[test]
    fn commit_writes_entries_and_indented_notes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.txt");
        let mut entry = Entry::new("ship", Some(Marker::Pending), 0);
        entry.notes.push(Note::new("tag", Some(Marker::Done)));
        entry.notes.push(Note::new("remember docs", None));
        let plain = Entry::new("idea", None, 1);
        commit_section(&path, &SectionHeader::new("Work", at(9, 30)), &[entry, plain]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "\n------- Work 09:30 AM -------\n[ ] ship\n  [x] tag\n  remember docs\nidea\n"
        );
    }

    #[test]
    fn patch_rewrites_first_block_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        let original = "intro\n[] Write spec\n  [ ] outline\n  loose note\nnext\n\n\
                        ------- Triage 09:00 AM -------\n[ ] Write spec\n";
        fs::write(&path, original).unwrap();
        let outcome =
            patch_entry(&path, &EntryKey::from_content("Write spec"), Marker::Done).unwrap();
        assert_eq!(outcome, PatchOutcome::Patched { lines: 3 });
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "intro\n[x] Write spec\n  [x] outline\n  [x] loose note\nnext\n\n\
             ------- Triage 09:00 AM -------\n[ ] Write spec\n"
        );
        assert_eq!(text.lines().count(), original.lines().count());
    }

    #[test]
    fn patch_leaves_everything_outside_the_block_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        let head = "morning thoughts\r\n[ ] other\n";
        let tail = "[ ] other\n  untouched child\n\n------- Triage 09:00 AM -------\n\
                    [ ] ship\n  [ ] tag\ntrailing note\n  \t odd spacing \n";
        fs::write(&path, format!("{head}[ ] ship\n  [ ] tag\n{tail}")).unwrap();
        let outcome = patch_entry(&path, &EntryKey::from_content("ship"), Marker::Done).unwrap();
        assert_eq!(outcome, PatchOutcome::Patched { lines: 2 });
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{head}[x] ship\n  [x] tag\n{tail}")
        );
    }

    #[test]
    fn patch_skips_resolved_occurrences() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        fs::write(&path, "[-] a\n  [-] old\n\n------- New Entry -------\n[ ] a\n").unwrap();
        let outcome = patch_entry(&path, &EntryKey::from_content("a"), Marker::Done).unwrap();
        assert_eq!(outcome, PatchOutcome::Patched { lines: 1 });
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[-] a\n  [-] old\n\n------- New Entry -------\n[x] a\n"
        );
        fs::write(&path, "[x] a\n").unwrap();
        let outcome = patch_entry(&path, &EntryKey::from_content("a"), Marker::Done).unwrap();
        assert_eq!(outcome, PatchOutcome::Missed);
    }

    #[test]
    fn patch_preserves_missing_trailing_newline_and_crlf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        fs::write(&path, "a\r\n[ ] b").unwrap();
        patch_entry(&path, &EntryKey::from_content("b"), Marker::Cancelled).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\r\n[-] b");
    }

    #[test]
    fn patch_miss_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        fs::write(&path, "[ ] a\n  [ ] b\n").unwrap();
        let outcome = patch_entry(&path, &EntryKey::from_content("b"), Marker::Done).unwrap();
        assert_eq!(outcome, PatchOutcome::Missed);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[ ] a\n  [ ] b\n");
    }

    #[test]
    fn patch_note_targets_single_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        fs::write(&path, "[ ] task\n  [ ] a\n  [ ] b\n").unwrap();
        let outcome = patch_note(&path, &EntryKey::from_content("task"), "b", Marker::Done).unwrap();
        assert_eq!(outcome, PatchOutcome::Patched { lines: 1 });
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[ ] task\n  [ ] a\n  [x] b\n"
        );
    }

    #[test]
    fn patch_note_searches_later_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        fs::write(&path, "[ ] task\n\n------- New Entry -------\n[ ] task\n  added\n").unwrap();
        let outcome =
            patch_note(&path, &EntryKey::from_content("task"), "added", Marker::Done).unwrap();
        assert_eq!(outcome, PatchOutcome::Patched { lines: 1 });
        assert!(fs::read_to_string(&path).unwrap().ends_with("  [x] added\n"));
    }

    #[test]
    fn patch_note_prefers_the_latest_restatement() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        fs::write(
            &path,
            "[ ] task\n  [ ] b\n\n------- Triage 09:00 AM -------\n[ ] task\n  [ ] a\n  [ ] b\n",
        )
        .unwrap();
        patch_note(&path, &EntryKey::from_content("task"), "b", Marker::Done).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[ ] task\n  [ ] b\n\n------- Triage 09:00 AM -------\n[ ] task\n  [ ] a\n  [x] b\n"
        );
    }

    #[test]
    fn ensure_journal_writes_session_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("20261019-notes.txt");
        ensure_journal(&path, at(8, 0)).unwrap();
        ensure_journal(&path, at(9, 0)).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "------- Session Start 08:00 AM -------\n"
        );
    }

    #[test]
    fn summary_counts_top_level_markers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("j.txt");
        fs::write(
            &path,
            "[x] a\n  [x] sub\n[-] b\n[>] c\n[x] d\n[ ] e\n",
        )
        .unwrap();
        let card = daily_summary(&path).unwrap();
        assert_eq!(
            card,
            Scorecard {
                done: 2,
                cancelled: 1,
                deferred: 1
            }
        );
        assert_eq!(daily_summary(&dir.path().join("none.txt")).unwrap(), Scorecard::default());
    }

    #[test]
    fn plan_file_lands_next_to_journal() {
        let today = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let path = plan_file_path(Path::new("/tmp/logs/20261231-notes.txt"), today);
        assert_eq!(path, PathBuf::from("/tmp/logs/20270101-plan.txt"));
        assert_eq!(journal_file_name(today), "20261231-notes.txt");
    }
}
