//! Formatter argument construction.

use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Wire format the formatter is asked to answer in
///
/// Chosen by configuration (it depends on what the installed formatter
/// supports) and handed to the response parser unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputProtocol {
    /// `-output-replacements-xml`: cursor plus a replacement list
    #[default]
    ReplacementsXml,
    /// Plain `-cursor` output: a JSON header line, then the whole file
    CursorHeaderText,
}

/// The part of the file the formatter should touch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatScope {
    /// Everything; `length` is the adjusted document length
    WholeFile { length: usize },
    /// Only these byte ranges, ascending and non-overlapping
    Ranges(Vec<Range<usize>>),
}

impl FormatScope {
    /// True when there is nothing to format (an empty range list)
    pub fn is_empty(&self) -> bool {
        matches!(self, FormatScope::Ranges(ranges) if ranges.is_empty())
    }
}

/// Everything needed for one formatter run, built per user action and used once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRequest {
    /// Path the formatter uses to pick style and language (`-assume-filename`)
    pub source_path: PathBuf,
    pub cursor: usize,
    pub scope: FormatScope,
    pub binary: String,
    pub extra_args: Vec<String>,
    /// Environment variables set on top of the inherited environment
    pub env: Vec<(String, String)>,
}

/// A fully resolved command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Shell-like rendering for logs and error messages
    pub fn command_line(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Turns a [`FormatRequest`] into the formatter's argument vector
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    pub protocol: OutputProtocol,
    /// Emit `-offset=0 -length=<len>` for whole-file runs instead of omitting them
    pub whole_file_offsets: bool,
}

impl CommandBuilder {
    pub fn new(protocol: OutputProtocol) -> Self {
        Self {
            protocol,
            whole_file_offsets: false,
        }
    }

    pub fn with_whole_file_offsets(mut self, enabled: bool) -> Self {
        self.whole_file_offsets = enabled;
        self
    }

    pub fn build(&self, request: &FormatRequest) -> Invocation {
        Invocation {
            program: request.binary.clone(),
            args: self.args(request),
            env: request.env.clone(),
        }
    }

    /// Argument vector, without the program name
    ///
    /// Extra arguments come first, then style, output mode, file name and
    /// cursor, then one `-offset`/`-length` pair per range.
    pub fn args(&self, request: &FormatRequest) -> Vec<String> {
        let mut args = request.extra_args.clone();
        args.push("-style=file".to_string());
        if self.protocol == OutputProtocol::ReplacementsXml {
            args.push("-output-replacements-xml".to_string());
        }
        args.push(format!(
            "-assume-filename={}",
            request.source_path.display()
        ));
        args.push(format!("-cursor={}", request.cursor));

        match &request.scope {
            FormatScope::WholeFile { length } => {
                if self.whole_file_offsets {
                    push_range(&mut args, &(0..*length));
                }
            }
            FormatScope::Ranges(ranges) => {
                for range in ranges {
                    push_range(&mut args, range);
                }
            }
        }

        args
    }
}

fn push_range(args: &mut Vec<String>, range: &Range<usize>) {
    args.push(format!("-offset={}", range.start));
    args.push(format!("-length={}", range.end.saturating_sub(range.start)));
}
