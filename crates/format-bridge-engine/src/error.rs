use std::time::Duration;

/// Formatter output that does not have the expected shape
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("formatter output is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("malformed replacements document: {0}")]
    Malformed(String),
    #[error("replacements document has no <cursor> element")]
    MissingCursor,
    #[error("invalid {field} value {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid cursor header line: {0}")]
    InvalidHeader(#[from] serde_json::Error),
}

/// A replacement that cannot be applied to the buffer it was aimed at
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("replacement {start}..{end} is outside the buffer (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("replacement boundary {offset} splits a UTF-8 character")]
    NotCharBoundary { offset: usize },
    #[error("replacement at offset {offset} comes after one at {previous_offset}")]
    Unordered { offset: usize, previous_offset: usize },
}

/// Everything that can stop a formatting run
///
/// Each variant displays as a single message fit for a notification. Process
/// failures carry the command line and environment overrides so the user can
/// reproduce the call in a shell.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error(
        "running {program} failed - not installed? Try running it in a shell: {command}. {source}"
    )]
    Launch {
        program: String,
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {timeout:?} writing the source file to the formatter ({command})")]
    WriteTimeout { timeout: Duration, command: String },
    #[error("timed out after {timeout:?} waiting for the formatter to finish ({command})")]
    ExitTimeout { timeout: Duration, command: String },
    #[error("{command} failed with {}, error: {stderr}", exit_description(.code))]
    NonzeroExit {
        code: Option<i32>,
        stderr: String,
        command: String,
    },
    #[error("writing to the formatter failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("reading formatter output failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to parse formatter output: {0}")]
    Parse(#[from] ParseError),
    #[error("failed to apply formatter edits: {0}")]
    Edit(#[from] EditError),
    #[error("formatting was interrupted: {0}")]
    Interrupted(String),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}
