use crate::command_line::{parse_command, Address, Command, CommandError};
use crate::config::SessionConfig;
use crate::journal::{self, PatchOutcome, SectionHeader};
use crate::model::{Entry, Marker, WorkingSet};
use crate::parser;
use anyhow::Result;
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const DEFERRED_LABEL: &str = "Deferred from last session";

/// Monotonic elapsed time plus the local wall clock used for section stamps.
pub trait Clock {
    fn elapsed(&self) -> Duration;
    fn local_now(&self) -> DateTime<Local>;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn local_now(&self) -> DateTime<Local> {
        Local::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Triage,
    Work,
    Break,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Triage => "triage",
            Mode::Work => "work",
            Mode::Break => "break",
        }
    }

    fn completion_label(&self) -> &'static str {
        match self {
            Mode::Triage => "Triage Complete",
            Mode::Work => "Flow Complete",
            Mode::Break => "Break Complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    NewEntry,
    Rescue,
}

impl Prompt {
    pub fn question(&self) -> &'static str {
        match self {
            Prompt::NewEntry => "New entry ('[ ] ' prefix for a task):",
            Prompt::Rescue => "Rescue remaining entries into the journal? (y/n)",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BreakState {
    paused_at: Duration,
    countdown_start: Duration,
    length: Duration,
    last_chime: Option<Duration>,
}

/// Everything the display needs for one frame.
pub struct SessionView<'a> {
    pub mode: Mode,
    pub journal_name: String,
    pub entries: &'a [Entry],
    pub status: &'a str,
    pub prompt: Option<Prompt>,
    pub focus_elapsed: Option<Duration>,
    pub focus_alert: bool,
    pub break_remaining: Option<Duration>,
    pub break_overtime: bool,
}

pub struct Session<C: Clock> {
    config: SessionConfig,
    clock: C,
    mode: Mode,
    working_set: WorkingSet,
    snapshot: WorkingSet,
    next_order: u64,
    status: String,
    prompt: Option<Prompt>,
    focus_started: Option<Duration>,
    break_state: Option<BreakState>,
}

impl<C: Clock> Session<C> {
    /// Creates the journal if needed and loads the working set from it.
    pub fn open(config: SessionConfig, clock: C) -> Result<Self> {
        journal::ensure_journal(&config.journal_path, clock.local_now())?;
        let text = journal::read_journal(&config.journal_path)?;
        let working_set = parser::parse(&text);
        info!(
            journal = %config.journal_path.display(),
            entries = working_set.len(),
            "journal loaded"
        );
        Ok(Session::new(config, clock, working_set))
    }

    pub fn new(config: SessionConfig, clock: C, working_set: WorkingSet) -> Self {
        let next_order = working_set.iter().map(|e| e.order + 1).max().unwrap_or(0);
        Session {
            config,
            clock,
            mode: Mode::Triage,
            snapshot: working_set.clone(),
            working_set,
            next_order,
            status: "DeepWork ready.".into(),
            prompt: None,
            focus_started: None,
            break_state: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn working_set(&self) -> &[Entry] {
        &self.working_set
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn prompt(&self) -> Option<Prompt> {
        self.prompt
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Advances timers for one loop iteration. Returns true when the break
    /// chime should sound.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.elapsed();
        match self.mode {
            Mode::Work => {
                if self.focus_started.is_none() && !self.working_set.is_empty() {
                    self.focus_started = Some(now);
                }
                false
            }
            Mode::Break => {
                let interval = self.config.chime_interval;
                let Some(state) = self.break_state.as_mut() else {
                    return false;
                };
                if now.saturating_sub(state.countdown_start) < state.length {
                    return false;
                }
                let due = state
                    .last_chime
                    .map(|last| now.saturating_sub(last) >= interval)
                    .unwrap_or(true);
                if due {
                    state.last_chime = Some(now);
                }
                due
            }
            Mode::Triage => false,
        }
    }

    pub fn focus_elapsed(&self) -> Option<Duration> {
        let started = self.focus_started?;
        let now = match (self.mode, &self.break_state) {
            (Mode::Break, Some(state)) => state.paused_at,
            _ => self.clock.elapsed(),
        };
        Some(now.saturating_sub(started))
    }

    pub fn view(&self) -> SessionView<'_> {
        let focus_elapsed = self.focus_elapsed();
        let (break_remaining, break_overtime) = match (self.mode, &self.break_state) {
            (Mode::Break, Some(state)) => {
                let spent = self.clock.elapsed().saturating_sub(state.countdown_start);
                (
                    Some(state.length.saturating_sub(spent)),
                    spent >= state.length,
                )
            }
            _ => (None, false),
        };
        SessionView {
            mode: self.mode,
            journal_name: self.config.journal_name(),
            entries: &self.working_set,
            status: &self.status,
            prompt: self.prompt,
            focus_elapsed,
            focus_alert: focus_elapsed
                .map(|e| e > self.config.alert_threshold)
                .unwrap_or(false),
            break_remaining,
            break_overtime,
        }
    }

    /// Dispatches one completed input line.
    pub fn handle_line(&mut self, line: &str) -> Outcome {
        if let Some(prompt) = self.prompt.take() {
            return self.answer(prompt, line);
        }
        let result = parse_command(line)
            .map_err(anyhow::Error::from)
            .and_then(|command| match command {
                Some(command) => self.dispatch(command),
                None => Ok(Outcome::Continue),
            });
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let message = format!("{err:#}");
                error!(command = line, error = %message, "command failed");
                self.status = format!("Error: {message}");
                Outcome::Continue
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::Quit => return Ok(self.quit()),
            Command::Triage => self.enter_triage(),
            Command::New => {
                self.prompt = Some(Prompt::NewEntry);
                self.status = Prompt::NewEntry.question().into();
            }
            Command::Work => match self.mode {
                Mode::Triage => self.commit_triage()?,
                Mode::Break => self.resume_work()?,
                Mode::Work => self.status = "Already working.".into(),
            },
            Command::Break(minutes) => match self.mode {
                Mode::Triage => return Err(CommandError::WrongMode("b", "triage").into()),
                Mode::Work | Mode::Break => self.start_break(minutes)?,
            },
            Command::Ignore(idx) => {
                self.require_mode(Mode::Triage, "i")?;
                self.ignore(idx)?;
            }
            Command::Prioritize { src, dest } => {
                self.require_mode(Mode::Triage, "p")?;
                self.prioritize(src, dest)?;
            }
            Command::Assign { src, dest } => {
                self.require_mode(Mode::Triage, "a")?;
                self.assign(src, dest)?;
            }
            Command::Resolve(marker) => {
                let verb = match marker {
                    Marker::Cancelled => "-",
                    Marker::Deferred => ">",
                    _ => "x",
                };
                self.require_mode(Mode::Work, verb)?;
                self.resolve_front(marker)?;
            }
            Command::ResolveNote(idx) => {
                self.require_mode(Mode::Work, "x#")?;
                self.resolve_note(idx)?;
            }
        }
        Ok(Outcome::Continue)
    }

    fn require_mode(&self, mode: Mode, verb: &'static str) -> Result<(), CommandError> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(CommandError::WrongMode(verb, self.mode.label()))
        }
    }

    fn answer(&mut self, prompt: Prompt, line: &str) -> Outcome {
        let result = match prompt {
            Prompt::NewEntry => self.add_entry(line).map(|_| Outcome::Continue),
            Prompt::Rescue => {
                let rescue = line.trim().eq_ignore_ascii_case("y");
                Ok(self.finish_interrupted(rescue))
            }
        };
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let message = format!("{err:#}");
                error!(error = %message, "prompt failed");
                self.status = format!("Error: {message}");
                Outcome::Continue
            }
        }
    }

    fn header(&self, label: &str) -> SectionHeader {
        SectionHeader::new(label, self.clock.local_now())
    }

    fn commit(&self, label: &str, items: &[Entry]) -> Result<()> {
        journal::commit_section(&self.config.journal_path, &self.header(label), items)?;
        info!(label, items = items.len(), "section committed");
        Ok(())
    }

    fn enter_triage(&mut self) {
        self.mode = Mode::Triage;
        self.focus_started = None;
        self.break_state = None;
        self.snapshot = self.working_set.clone();
        self.status = "Back to triage.".into();
        info!("entered triage");
    }

    fn commit_triage(&mut self) -> Result<()> {
        let delta = triage_delta(&self.snapshot, &self.working_set);
        self.commit(parser::TRIAGE_LABEL, delta)?;
        self.snapshot = self.working_set.clone();
        self.mode = Mode::Work;
        self.focus_started = None;
        self.status.clear();
        info!(entries = self.working_set.len(), "entered work");
        Ok(())
    }

    fn ignore(&mut self, idx: Option<usize>) -> Result<()> {
        let idx = match idx {
            Some(idx) => idx,
            None if self.working_set.len() == 1 => 0,
            None => return Err(CommandError::AmbiguousIndex.into()),
        };
        if idx >= self.working_set.len() {
            return Err(CommandError::OutOfRange(idx).into());
        }
        let mut entry = self.working_set[idx].clone();
        if entry.is_task {
            entry.state = Some(Marker::Cancelled);
            for note in &mut entry.notes {
                if !matches!(note.state, Some(Marker::Done) | Some(Marker::Deferred)) {
                    note.state = Some(Marker::Cancelled);
                }
            }
            self.commit(Marker::Cancelled.label(), std::slice::from_ref(&entry))?;
        }
        self.working_set.remove(idx);
        self.status = format!("Ignored: {}", entry.content);
        Ok(())
    }

    fn prioritize(&mut self, src: usize, dest: usize) -> Result<()> {
        if src >= self.working_set.len() {
            return Err(CommandError::OutOfRange(src).into());
        }
        let entry = self.working_set.remove(src);
        let dest = dest.min(self.working_set.len());
        self.status = format!("Moved '{}' to {}", entry.content, dest);
        self.working_set.insert(dest, entry);
        Ok(())
    }

    fn assign(&mut self, src: Address, dest: usize) -> Result<()> {
        let len = self.working_set.len();
        if dest >= len {
            return Err(CommandError::OutOfRange(dest).into());
        }
        match src {
            Address::Entry(src) => {
                if src >= len {
                    return Err(CommandError::OutOfRange(src).into());
                }
                if src == dest {
                    return Err(CommandError::InvalidArgument {
                        what: "destination",
                        value: format!("{dest} (same entry)"),
                    }
                    .into());
                }
                let entry = self.working_set.remove(src);
                let dest = if src < dest { dest - 1 } else { dest };
                self.status = format!(
                    "Assigned '{}' under '{}'",
                    entry.content, self.working_set[dest].content
                );
                self.working_set[dest].notes.extend(entry.into_notes());
            }
            Address::Note { entry, note } => {
                let parent = self
                    .working_set
                    .get_mut(entry)
                    .ok_or(CommandError::OutOfRange(entry))?;
                if note >= parent.notes.len() {
                    return Err(CommandError::OutOfRange(note).into());
                }
                let moved = parent.notes.remove(note);
                self.status = format!(
                    "Assigned '{}' under '{}'",
                    moved.content, self.working_set[dest].content
                );
                self.working_set[dest].notes.push(moved);
            }
        }
        Ok(())
    }

    fn resolve_front(&mut self, marker: Marker) -> Result<()> {
        let Some(front) = self.working_set.first() else {
            self.status = "Nothing to resolve.".into();
            return Ok(());
        };
        let key = front.key();
        let mut resolved = front.clone();
        resolved.resolve(marker);
        let patched = journal::patch_entry(&self.config.journal_path, &key, marker)?;
        self.commit("Work", std::slice::from_ref(&resolved))?;
        let original = self.working_set.remove(0);
        self.focus_started = None;
        info!(entry = %key, state = marker.label(), "entry resolved");
        if marker == Marker::Deferred {
            // Plan copy only after the journal writes; the entry is gone from the set.
            let header = self.header(DEFERRED_LABEL);
            let plan = &self.config.plan_path;
            journal::commit_section(plan, &header, std::slice::from_ref(&original))?;
            info!(plan = %plan.display(), entry = %key, "deferred to plan");
        }
        self.status = match patched {
            PatchOutcome::Patched { .. } => format!("{}: {}", marker.label(), resolved.content),
            PatchOutcome::Missed => {
                warn!(entry = %key, "no open line found to patch");
                format!(
                    "{}: {} (warning: no open line for it in the journal, only appended)",
                    marker.label(),
                    resolved.content
                )
            }
        };
        Ok(())
    }

    fn resolve_note(&mut self, idx: usize) -> Result<()> {
        let Some(front) = self.working_set.first() else {
            self.status = "Nothing to resolve.".into();
            return Ok(());
        };
        let note = front.notes.get(idx).ok_or(CommandError::OutOfRange(idx))?;
        let key = front.key();
        let patched =
            journal::patch_note(&self.config.journal_path, &key, &note.content, Marker::Done)?;
        let content = note.content.clone();
        self.working_set[0].notes[idx].state = Some(Marker::Done);
        self.status = match patched {
            PatchOutcome::Patched { .. } => format!("Done: {content}"),
            PatchOutcome::Missed => {
                warn!(entry = %key, note = %content, "no note line found to patch");
                format!("Done: {content} (warning: not found in the journal)")
            }
        };
        Ok(())
    }

    fn add_entry(&mut self, line: &str) -> Result<()> {
        let text = line.trim();
        if text.is_empty() {
            self.status = "No entry added.".into();
            return Ok(());
        }
        let (marker, content) = parser::split_marker(text);
        if marker.map(|m| m.is_resolved()).unwrap_or(false) {
            return Err(CommandError::ResolvedNewEntry.into());
        }
        if content.is_empty() {
            return Err(CommandError::EmptyEntry.into());
        }
        let entry = Entry::new(content, marker, self.next_order);
        let key = entry.key();
        if self.working_set.iter().any(|e| e.key() == key) {
            return Err(CommandError::DuplicateEntry(content.to_string()).into());
        }
        self.commit("New Entry", std::slice::from_ref(&entry))?;
        self.next_order += 1;
        self.status = format!("Added: {}", entry.to_line());
        self.working_set.push(entry);
        Ok(())
    }

    fn start_break(&mut self, minutes: Option<i64>) -> Result<()> {
        let minutes = minutes.unwrap_or(i64::from(self.config.default_break_minutes));
        if minutes <= 0 {
            return Err(CommandError::NonPositiveBreak.into());
        }
        let length = u64::try_from(minutes)
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(|| CommandError::InvalidArgument {
                what: "break minutes",
                value: minutes.to_string(),
            })?;
        self.commit("Break", &[])?;
        let now = self.clock.elapsed();
        let paused_at = match (self.mode, &self.break_state) {
            (Mode::Break, Some(state)) => state.paused_at,
            _ => now,
        };
        self.break_state = Some(BreakState {
            paused_at,
            countdown_start: now,
            length,
            last_chime: None,
        });
        self.mode = Mode::Break;
        self.status = format!("On break for {minutes} min. 'w' to resume.");
        info!(minutes, "break started");
        Ok(())
    }

    fn resume_work(&mut self) -> Result<()> {
        self.commit("Work Session Re-started", &[])?;
        if let Some(state) = self.break_state.take() {
            let paused = self.clock.elapsed().saturating_sub(state.paused_at);
            self.focus_started = self.focus_started.map(|start| start + paused);
            info!(paused_secs = paused.as_secs(), "work resumed");
        }
        self.mode = Mode::Work;
        self.status = "Back to work.".into();
        Ok(())
    }

    fn quit(&mut self) -> Outcome {
        if !self.working_set.is_empty() {
            self.prompt = Some(Prompt::Rescue);
            self.status = format!("Session interrupted. {}", Prompt::Rescue.question());
            return Outcome::Continue;
        }
        if let Err(err) = self.commit(self.mode.completion_label(), &[]) {
            error!(error = ?err, "final commit failed");
        }
        Outcome::Quit
    }

    fn finish_interrupted(&mut self, rescue: bool) -> Outcome {
        let items: &[Entry] = if rescue { &self.working_set } else { &[] };
        if let Err(err) = self.commit("Interrupted", items) {
            error!(error = ?err, "final commit failed");
        }
        info!(rescued = rescue, "session interrupted");
        Outcome::Quit
    }
}

/// Entries to restate in a triage commit.
///
/// Starts at the first position where the set diverges from the snapshot and
/// reaches back to the first plain note, so a re-parse keeps order and keeps
/// every note. Identical sets give an empty slice.
pub fn triage_delta<'a>(snapshot: &[Entry], current: &'a [Entry]) -> &'a [Entry] {
    if snapshot == current {
        return &[];
    }
    let diverge = snapshot
        .iter()
        .zip(current)
        .position(|(before, now)| before != now)
        .unwrap_or(snapshot.len().min(current.len()));
    let first_note = current
        .iter()
        .position(|e| !e.is_task)
        .unwrap_or(current.len());
    &current[diverge.min(first_note)..]
}
