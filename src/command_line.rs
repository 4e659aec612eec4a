use crate::model::Marker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Entry(usize),
    Note { entry: usize, note: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Work,
    Ignore(Option<usize>),
    Prioritize { src: usize, dest: usize },
    Assign { src: Address, dest: usize },
    Resolve(Marker),
    ResolveNote(usize),
    New,
    Break(Option<i64>),
    Triage,
    Quit,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("missing {what} for '{verb}'")]
    MissingArgument { verb: &'static str, what: &'static str },
    #[error("invalid {what}: {value}")]
    InvalidArgument { what: &'static str, value: String },
    #[error("index {0} is out of range")]
    OutOfRange(usize),
    #[error("an index is required when more than one entry is listed")]
    AmbiguousIndex,
    #[error("'{0}' is not available during {1}")]
    WrongMode(&'static str, &'static str),
    #[error("break length must be a positive number of minutes")]
    NonPositiveBreak,
    #[error("new entries must be open: use '[ ]' or no marker")]
    ResolvedNewEntry,
    #[error("'{0}' is already in the working set")]
    DuplicateEntry(String),
    #[error("entry text cannot be empty")]
    EmptyEntry,
}

/// Parses one interactive line. `Ok(None)` is a blank line.
///
/// A verb letter directly followed by a digit is split, so `i2` reads as
/// `i 2` and `x1` as `x 1`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    let Some(first) = line.chars().next() else {
        return Ok(None);
    };
    let rest = &line[first.len_utf8()..];
    let (verb, args): (String, Vec<&str>) = match rest.chars().next() {
        Some(c) if c.is_ascii_digit() => (first.to_lowercase().collect(), rest.split_whitespace().collect()),
        _ => {
            let mut parts = line.split_whitespace();
            let verb = parts.next().unwrap_or_default().to_lowercase();
            (verb, parts.collect())
        }
    };

    let command = match verb.as_str() {
        "w" => Command::Work,
        "t" => Command::Triage,
        "q" => Command::Quit,
        "n" => Command::New,
        "-" => Command::Resolve(Marker::Cancelled),
        ">" => Command::Resolve(Marker::Deferred),
        "x" => match args.first() {
            Some(raw) => Command::ResolveNote(index(raw)?),
            None => Command::Resolve(Marker::Done),
        },
        "i" => Command::Ignore(args.first().map(|raw| index(raw)).transpose()?),
        "p" => {
            let src = required(&args, 0, "p", "source index")?;
            let dest = args.get(1).map(|raw| index(raw)).transpose()?.unwrap_or(0);
            Command::Prioritize { src, dest }
        }
        "a" => {
            let raw = args.first().ok_or(CommandError::MissingArgument {
                verb: "a",
                what: "source address",
            })?;
            let src = address(raw)?;
            let dest = required(&args, 1, "a", "destination index")?;
            Command::Assign { src, dest }
        }
        "b" => Command::Break(
            args.first()
                .map(|raw| {
                    raw.parse::<i64>().map_err(|_| CommandError::InvalidArgument {
                        what: "break minutes",
                        value: raw.to_string(),
                    })
                })
                .transpose()?,
        ),
        _ => return Err(CommandError::Unknown(line.to_string())),
    };
    Ok(Some(command))
}

fn required(
    args: &[&str],
    pos: usize,
    verb: &'static str,
    what: &'static str,
) -> Result<usize, CommandError> {
    let raw = args
        .get(pos)
        .ok_or(CommandError::MissingArgument { verb, what })?;
    index(raw)
}

fn index(raw: &str) -> Result<usize, CommandError> {
    raw.parse::<usize>()
        .map_err(|_| CommandError::InvalidArgument {
            what: "index",
            value: raw.to_string(),
        })
}

fn address(raw: &str) -> Result<Address, CommandError> {
    match raw.split_once('.') {
        Some((entry, note)) => Ok(Address::Note {
            entry: index(entry)?,
            note: index(note)?,
        }),
        None => Ok(Address::Entry(index(raw)?)),
    }
}
