use crate::model::{Entry, Marker, Note};
use crate::session::{Clock, Mode, Outcome, Session, SessionView};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{stdout, Stdout, Write};
use std::time::Duration;
use tracing::{info, warn};

/// Renders one frame of the session.
pub trait Display {
    fn render(&mut self, view: &SessionView<'_>, input: &str) -> Result<()>;
    fn chime(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    Interrupt,
}

/// Line-buffered command source. `poll` waits at most `timeout`.
pub trait Input {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>>;
    fn pending(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Quit,
    Interrupted,
}

pub fn run<C: Clock>(session: &mut Session<C>) -> Result<Exit> {
    let mut screen = Screen::acquire()?;
    let mut input = KeyboardInput::default();
    let result = drive(session, &mut screen, &mut input);
    screen.release()?;
    result
}

/// Cooperative loop: tick timers, draw, then wait briefly for input.
pub fn drive<C, D, I>(session: &mut Session<C>, display: &mut D, input: &mut I) -> Result<Exit>
where
    C: Clock,
    D: Display,
    I: Input,
{
    let poll = session.config().poll_interval;
    loop {
        if session.tick() {
            display.chime()?;
        }
        display.render(&session.view(), input.pending())?;
        match input.poll(poll)? {
            Some(InputEvent::Line(line)) => {
                if session.handle_line(&line) == Outcome::Quit {
                    info!("session finished");
                    return Ok(Exit::Quit);
                }
            }
            Some(InputEvent::Interrupt) => {
                warn!(mode = session.mode().label(), "interrupted without final commit");
                return Ok(Exit::Interrupted);
            }
            None => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct LineBuffer {
    text: String,
}

impl LineBuffer {
    pub fn push(&mut self, ch: char) {
        self.text.push(ch);
    }

    pub fn backspace(&mut self) {
        self.text.pop();
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Default)]
pub struct KeyboardInput {
    buffer: LineBuffer,
}

impl KeyboardInput {
    fn apply(&mut self, key: KeyEvent) -> Option<InputEvent> {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(InputEvent::Interrupt)
            }
            KeyCode::Char(ch) => {
                self.buffer.push(ch);
                None
            }
            KeyCode::Backspace => {
                self.buffer.backspace();
                None
            }
            KeyCode::Esc => {
                self.buffer.clear();
                None
            }
            KeyCode::Enter => Some(InputEvent::Line(self.buffer.take())),
            _ => None,
        }
    }
}

impl Input for KeyboardInput {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(self.apply(key)),
            _ => Ok(None),
        }
    }

    fn pending(&self) -> &str {
        self.buffer.as_str()
    }
}

/// Raw-mode alternate screen, restored on drop if `release` was not reached.
pub struct Screen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    active: bool,
}

impl Screen {
    pub fn acquire() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(err.into());
        }
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Screen {
            terminal,
            active: true,
        })
    }

    pub fn release(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl Display for Screen {
    fn render(&mut self, view: &SessionView<'_>, input: &str) -> Result<()> {
        self.terminal.draw(|f| draw(f, view, input))?;
        Ok(())
    }

    fn chime(&mut self) -> Result<()> {
        let backend = self.terminal.backend_mut();
        backend.write_all(b"\x07")?;
        backend.flush()?;
        Ok(())
    }
}

fn draw(f: &mut ratatui::Frame<'_>, view: &SessionView<'_>, input: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
            Constraint::Length(2),
            Constraint::Length(1),
        ])
        .split(f.size());

    let accent = accent_style(view);
    let header = Paragraph::new(header_line(view))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(accent));
    f.render_widget(header, rows[0]);

    let body = Paragraph::new(body_lines(view)).wrap(Wrap { trim: false });
    f.render_widget(body, rows[1]);

    let help = Paragraph::new(help_line(view.mode))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
    f.render_widget(help, rows[2]);

    let status_text = match view.prompt {
        Some(prompt) => prompt.question().to_string(),
        None => format!("Status: {}", view.status),
    };
    let status = Paragraph::new(Span::styled(
        status_text,
        Style::default().fg(Color::Gray),
    ))
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(status, rows[3]);

    let prompt = Paragraph::new(Line::from(vec![
        Span::styled(">> ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{input}▌")),
    ]));
    f.render_widget(prompt, rows[4]);
}

fn accent_style(view: &SessionView<'_>) -> Style {
    match view.mode {
        Mode::Triage => Style::default().fg(Color::Cyan),
        Mode::Work if view.focus_alert => Style::default()
            .fg(Color::Red)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED),
        Mode::Work => Style::default()
            .fg(Color::Blue)
            .add_modifier(Modifier::BOLD),
        Mode::Break if view.break_overtime => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::SLOW_BLINK),
        Mode::Break => Style::default().fg(Color::Green),
    }
}

fn header_line(view: &SessionView<'_>) -> Line<'static> {
    let accent = accent_style(view);
    match view.mode {
        Mode::Triage => Line::from(Span::styled(
            format!("TRIAGE: {}", view.journal_name),
            accent,
        )),
        Mode::Work => {
            let title = if view.focus_alert {
                " !!! FOCUS LIMIT EXCEEDED !!! "
            } else {
                " DEEP WORK SESSION "
            };
            let clock = view
                .focus_elapsed
                .map(format_clock)
                .unwrap_or_else(|| "--:--".into());
            Line::from(vec![
                Span::styled(title, accent),
                Span::raw(format!(" | Time: {clock}")),
            ])
        }
        Mode::Break => {
            let text = if view.break_overtime {
                " BREAK OVER: 'w' to get back to work ".to_string()
            } else {
                let left = view
                    .break_remaining
                    .map(format_clock)
                    .unwrap_or_else(|| "--:--".into());
                format!(" ON BREAK | {left} left ")
            };
            Line::from(Span::styled(text, accent))
        }
    }
}

fn body_lines(view: &SessionView<'_>) -> Vec<Line<'static>> {
    match view.mode {
        Mode::Triage => triage_lines(view.entries),
        Mode::Work => work_lines(view.entries),
        Mode::Break => {
            let mut lines = vec![Line::from(Span::styled(
                "Step away from the keyboard.",
                Style::default().fg(Color::Green),
            ))];
            if let Some(front) = view.entries.first() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!("Paused: {}", front.content),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            lines
        }
    }
}

fn triage_lines(entries: &[Entry]) -> Vec<Line<'static>> {
    if entries.is_empty() {
        return vec![Line::from(vec![
            Span::styled(
                "[FREE WRITE MODE]",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" Everything triaged or finished."),
        ])];
    }
    let mut lines = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        lines.push(Line::from(Span::styled(
            format!("{i}: {}", entry.to_line()),
            entry_style(entry.is_task && entry.state != Some(Marker::Done)),
        )));
        for (j, note) in entry.notes.iter().enumerate() {
            lines.push(Line::from(Span::styled(
                format!("   {i}.{j}: {}", note.to_line()),
                entry_style(is_open_task(note)),
            )));
        }
    }
    lines
}

fn work_lines(entries: &[Entry]) -> Vec<Line<'static>> {
    let Some(front) = entries.first() else {
        return vec![Line::from(vec![
            Span::styled(
                "[FLOW COMPLETE]",
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" Press 'q' to finish or 't' to triage."),
        ])];
    };
    let mut lines = vec![Line::from(Span::styled(
        format!("FOCUS >> {}", front.content),
        Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
    ))];
    for (j, note) in front.notes.iter().enumerate() {
        lines.push(Line::from(Span::styled(
            format!("  {j}: {}", note.to_line()),
            entry_style(is_open_task(note)),
        )));
    }
    if entries.len() > 1 {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("{} more after this", entries.len() - 1),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines
}

fn is_open_task(note: &Note) -> bool {
    note.state == Some(Marker::Pending)
}

fn entry_style(highlight: bool) -> Style {
    if highlight {
        Style::default()
            .fg(Color::LightCyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn help_line(mode: Mode) -> Line<'static> {
    let keys: &[(&str, &str)] = match mode {
        Mode::Triage => &[
            ("p# #", "reorder"),
            ("a# #", "assign"),
            ("i#", "ignore"),
            ("n", "new"),
            ("w", "work"),
            ("q", "quit"),
        ],
        Mode::Work => &[
            ("x", "done"),
            ("x#", "subtask"),
            ("-", "cancel"),
            (">", "defer"),
            ("n", "new"),
            ("b #", "break"),
            ("t", "triage"),
            ("q", "quit"),
        ],
        Mode::Break => &[
            ("w", "resume"),
            ("b #", "restart break"),
            ("n", "new"),
            ("t", "triage"),
            ("q", "quit"),
        ],
    };
    let mut spans = Vec::new();
    for (key, action) in keys {
        spans.push(Span::styled(
            format!("[{key}]"),
            Style::default().fg(Color::LightCyan),
        ));
        spans.push(Span::raw(format!(" {action}  ")));
    }
    Line::from(spans)
}

fn format_clock(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use chrono::{DateTime, Local};
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::tempdir;

    struct FrozenClock;

    impl Clock for FrozenClock {
        fn elapsed(&self) -> Duration {
            Duration::ZERO
        }

        fn local_now(&self) -> DateTime<Local> {
            Local::now()
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        frames: Vec<(Mode, String)>,
        chimes: usize,
    }

    impl Display for RecordingDisplay {
        fn render(&mut self, view: &SessionView<'_>, input: &str) -> Result<()> {
            self.frames.push((view.mode, input.to_string()));
            Ok(())
        }

        fn chime(&mut self) -> Result<()> {
            self.chimes += 1;
            Ok(())
        }
    }

    struct ScriptedInput {
        events: VecDeque<Option<InputEvent>>,
    }

    impl ScriptedInput {
        fn new(events: Vec<Option<InputEvent>>) -> Self {
            ScriptedInput {
                events: events.into(),
            }
        }
    }

    impl Input for ScriptedInput {
        fn poll(&mut self, _timeout: Duration) -> Result<Option<InputEvent>> {
            Ok(self
                .events
                .pop_front()
                .unwrap_or(Some(InputEvent::Interrupt)))
        }

        fn pending(&self) -> &str {
            ""
        }
    }

    fn line(text: &str) -> Option<InputEvent> {
        Some(InputEvent::Line(text.to_string()))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn line_buffer_supports_erase() {
        let mut input = KeyboardInput::default();
        for ch in "x2".chars() {
            assert_eq!(input.apply(key(KeyCode::Char(ch))), None);
        }
        input.apply(key(KeyCode::Backspace));
        assert_eq!(input.pending(), "x");
        assert_eq!(
            input.apply(key(KeyCode::Enter)),
            Some(InputEvent::Line("x".into()))
        );
        assert_eq!(input.pending(), "");
        input.apply(key(KeyCode::Char('q')));
        input.apply(key(KeyCode::Esc));
        assert_eq!(input.pending(), "");
    }

    #[test]
    fn ctrl_c_interrupts() {
        let mut input = KeyboardInput::default();
        let event = input.apply(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(event, Some(InputEvent::Interrupt));
    }

    #[test]
    fn drive_dispatches_lines_until_quit() {
        let dir = tempdir().unwrap();
        let config = SessionConfig::for_paths(
            dir.path().join("20261019-notes.txt"),
            dir.path().join("20261020-plan.txt"),
        );
        fs::write(&config.journal_path, "[ ] only task\n").unwrap();
        let mut session = Session::open(config, FrozenClock).unwrap();
        let mut display = RecordingDisplay::default();
        let mut input = ScriptedInput::new(vec![None, line("w"), None, line("x"), line("q")]);
        let exit = drive(&mut session, &mut display, &mut input).unwrap();
        assert_eq!(exit, Exit::Quit);
        let modes: Vec<Mode> = display.frames.iter().map(|(m, _)| *m).collect();
        assert_eq!(
            modes,
            vec![Mode::Triage, Mode::Triage, Mode::Work, Mode::Work, Mode::Work]
        );
        assert!(session.working_set().is_empty());
        let text = fs::read_to_string(&session.config().journal_path).unwrap();
        assert!(text.contains("------- Flow Complete "));
    }

    #[test]
    fn interrupt_ends_loop_without_commit() {
        let dir = tempdir().unwrap();
        let config = SessionConfig::for_paths(
            dir.path().join("j.txt"),
            dir.path().join("p.txt"),
        );
        fs::write(&config.journal_path, "[ ] a\n").unwrap();
        let mut session = Session::open(config, FrozenClock).unwrap();
        let before = fs::read_to_string(&session.config().journal_path).unwrap();
        let mut display = RecordingDisplay::default();
        let mut input = ScriptedInput::new(vec![Some(InputEvent::Interrupt)]);
        let exit = drive(&mut session, &mut display, &mut input).unwrap();
        assert_eq!(exit, Exit::Interrupted);
        assert_eq!(
            fs::read_to_string(&session.config().journal_path).unwrap(),
            before
        );
    }

    #[test]
    fn clock_formats_minutes_past_the_hour() {
        assert_eq!(format_clock(Duration::from_secs(65)), "01:05");
        assert_eq!(format_clock(Duration::from_secs(95 * 60 + 3)), "95:03");
    }

    #[test]
    fn triage_lines_index_entries_and_notes() {
        let mut entry = Entry::new("a", Some(Marker::Pending), 0);
        entry.notes.push(Note::new("step", Some(Marker::Pending)));
        let lines = triage_lines(&[entry, Entry::new("idea", None, 1)]);
        let text: Vec<String> = lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert_eq!(text, vec!["0: [ ] a", "   0.0: [ ] step", "1: idea"]);
    }

    #[test]
    fn empty_work_view_reports_flow_complete() {
        let lines = work_lines(&[]);
        let text: String = lines[0].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(text.starts_with("[FLOW COMPLETE]"));
    }
}
