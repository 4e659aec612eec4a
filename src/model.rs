use std::fmt;

/// Status glyph prefixing a task line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Pending,
    Done,
    Cancelled,
    Deferred,
}

impl Marker {
    pub fn glyph(&self) -> &'static str {
        match self {
            Marker::Pending => "[ ]",
            Marker::Done => "[x]",
            Marker::Cancelled => "[-]",
            Marker::Deferred => "[>]",
        }
    }

    /// Maps the character between the brackets. `[]` and `[ ]` are both open.
    pub fn from_inner(inner: &str) -> Option<Marker> {
        match inner {
            "" | " " => Some(Marker::Pending),
            "x" => Some(Marker::Done),
            "-" => Some(Marker::Cancelled),
            ">" => Some(Marker::Deferred),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Marker::Pending)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Marker::Pending => "Pending",
            Marker::Done => "Done",
            Marker::Cancelled => "Cancelled",
            Marker::Deferred => "Deferred",
        }
    }
}

/// Identity of an entry across revisions of the journal.
///
/// Entries carry no stable id: two lines are the same entry when their
/// normalized content matches. Every lookup goes through this type so the
/// scheme can change in one place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey(String);

impl EntryKey {
    pub fn from_content(content: &str) -> Self {
        EntryKey(content.trim().to_string())
    }

    pub fn matches(&self, content: &str) -> bool {
        self.0 == content.trim()
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub content: String,
    pub state: Option<Marker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub content: String,
    pub is_task: bool,
    pub state: Option<Marker>,
    pub notes: Vec<Note>,
    pub order: u64,
}

/// Unresolved entries in display order.
pub type WorkingSet = Vec<Entry>;

impl Note {
    pub fn new(content: impl Into<String>, state: Option<Marker>) -> Self {
        Note {
            content: content.into(),
            state,
        }
    }

    pub fn to_line(&self) -> String {
        render(self.state, &self.content)
    }
}

impl Entry {
    pub fn new(content: impl Into<String>, state: Option<Marker>, order: u64) -> Self {
        Entry {
            content: content.into(),
            is_task: state.is_some(),
            state,
            notes: Vec::new(),
            order,
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey::from_content(&self.content)
    }

    pub fn is_open(&self) -> bool {
        !self.state.map(|m| m.is_resolved()).unwrap_or(false)
    }

    /// Applies `marker` to the entry and every one of its notes.
    pub fn resolve(&mut self, marker: Marker) {
        self.is_task = true;
        self.state = Some(marker);
        for note in &mut self.notes {
            note.state = Some(marker);
        }
    }

    pub fn to_line(&self) -> String {
        if self.is_task {
            render(Some(self.state.unwrap_or(Marker::Pending)), &self.content)
        } else {
            render(self.state, &self.content)
        }
    }

    /// Collapses the entry into a single note, used when it is assigned under
    /// another entry.
    pub fn into_notes(self) -> Vec<Note> {
        let state = if self.is_task {
            Some(self.state.unwrap_or(Marker::Pending))
        } else {
            self.state
        };
        let mut notes = vec![Note::new(self.content, state)];
        notes.extend(self.notes);
        notes
    }
}

fn render(state: Option<Marker>, content: &str) -> String {
    match state {
        Some(marker) => format!("{} {}", marker.glyph(), content),
        None => content.to_string(),
    }
}
