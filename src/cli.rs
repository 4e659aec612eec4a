use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "deepwork",
    version,
    about = "Triage a plain-text daily journal and work through it one task at a time"
)]
pub struct Cli {
    /// Journal file (defaults to YYYYMMDD-notes.txt for today)
    pub journal: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_is_optional_positional() {
        let cli = Cli::parse_from(["deepwork"]);
        assert!(cli.journal.is_none());
        let cli = Cli::parse_from(["deepwork", "notes/today.txt"]);
        assert_eq!(cli.journal, Some(PathBuf::from("notes/today.txt")));
    }
}
