//! The line-oriented command grammar.
//!
//! A command is one newline-terminated ASCII line of at most three tokens
//! separated by runs of whitespace: a case-insensitive verb, a file name,
//! and (for WRITE) the content, which is everything after the second token
//! and may itself contain spaces.

use thiserror::Error;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(String),
    Write(String, String),
    Read(String),
    Delete(String),
    List,
    Quit,
}

impl Command {
    /// The command verb, for logging.
    #[must_use]
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create(_) => "CREATE",
            Self::Write(..) => "WRITE",
            Self::Read(_) => "READ",
            Self::Delete(_) => "DELETE",
            Self::List => "LIST",
            Self::Quit => "QUIT",
        }
    }
}

/// A malformed command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command.")]
    Unknown,
    #[error("CREATE requires a filename")]
    CreateUsage,
    #[error("WRITE requires filename and content")]
    WriteUsage,
    #[error("READ requires a filename")]
    ReadUsage,
    #[error("DELETE requires a filename")]
    DeleteUsage,
}

impl ProtocolError {
    /// The single reply line the server sends for this error.
    #[must_use]
    pub fn wire_message(self) -> String {
        format!("ERROR: {self}")
    }
}

/// Split off the next whitespace-run-delimited token.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if s.is_empty() {
        return None;
    }
    let end = s
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(s.len());
    Some((&s[..end], &s[end..]))
}

/// Parse one command line.
pub fn parse(line: &str) -> Result<Command, ProtocolError> {
    let line = line.trim_matches(|c: char| c.is_ascii_whitespace());
    let Some((verb, rest)) = next_token(line) else {
        return Err(ProtocolError::Empty);
    };

    match verb.to_ascii_uppercase().as_str() {
        "CREATE" => {
            let (name, _) = next_token(rest).ok_or(ProtocolError::CreateUsage)?;
            Ok(Command::Create(name.to_owned()))
        }
        "WRITE" => {
            let (name, rest) = next_token(rest).ok_or(ProtocolError::WriteUsage)?;
            // Content keeps its internal whitespace; the line's outer
            // whitespace is already gone.
            let content = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
            if content.is_empty() {
                return Err(ProtocolError::WriteUsage);
            }
            Ok(Command::Write(name.to_owned(), content.to_owned()))
        }
        "READ" => {
            let (name, _) = next_token(rest).ok_or(ProtocolError::ReadUsage)?;
            Ok(Command::Read(name.to_owned()))
        }
        "DELETE" => {
            let (name, _) = next_token(rest).ok_or(ProtocolError::DeleteUsage)?;
            Ok(Command::Delete(name.to_owned()))
        }
        "LIST" => Ok(Command::List),
        "QUIT" => Ok(Command::Quit),
        _ => Err(ProtocolError::Unknown),
    }
}
