//! Deciding what part of the document to format.

use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::FormatScope;

/// Which user action triggered formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatMode {
    /// Format the whole file regardless of selection
    WholeFile,
    /// Format the selection, or the caret's line when nothing is selected
    Selection,
    /// Selection if there is one, else changed regions when enabled, else whole file
    #[default]
    Auto,
}

/// Read-only view of the editor state formatting starts from
pub trait EditorView {
    fn file_path(&self) -> &Path;
    /// Full buffer text, written to the formatter's stdin
    fn text(&self) -> String;
    /// Length as the host reports it; see [`RangeSelector::length_adjustment`]
    fn reported_length(&self) -> usize;
    fn caret(&self) -> usize;
    fn selection(&self) -> Range<usize>;
}

/// Result of asking version control which parts of a file changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangedRanges {
    /// File is not under version control
    Untracked,
    /// Lookup failed or the diff was too large to use
    Unavailable,
    /// Byte ranges in the current text; empty means nothing changed
    Ranges(Vec<Range<usize>>),
}

pub trait ChangedRangesProvider {
    fn changed_ranges(&self, path: &Path, text: &str) -> ChangedRanges;
}

/// Provider for hosts without version control
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVcs;

impl ChangedRangesProvider for NoVcs {
    fn changed_ranges(&self, _path: &Path, _text: &str) -> ChangedRanges {
        ChangedRanges::Untracked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSelector {
    /// Restrict auto mode to version-control changes
    pub only_changed_regions: bool,
    /// Subtracted from the reported length to get the formattable length.
    /// Hosts that count a trailing sentinel use 1; plain files use 0.
    pub length_adjustment: usize,
}

impl Default for RangeSelector {
    fn default() -> Self {
        Self {
            only_changed_regions: false,
            length_adjustment: 1,
        }
    }
}

impl RangeSelector {
    pub fn doc_length(&self, reported_length: usize) -> usize {
        reported_length.saturating_sub(self.length_adjustment)
    }

    /// Pick the scope for `mode`
    ///
    /// `changed` is only called in auto mode with no selection and
    /// `only_changed_regions` set. A [`FormatScope::Ranges`] with no ranges
    /// means there is nothing to format.
    pub fn select(
        &self,
        mode: FormatMode,
        reported_length: usize,
        selection: Range<usize>,
        changed: impl FnOnce() -> ChangedRanges,
    ) -> FormatScope {
        let doc_len = self.doc_length(reported_length);
        let whole = FormatScope::WholeFile { length: doc_len };
        let selection = clamp(selection, doc_len);

        match mode {
            FormatMode::WholeFile => whole,
            // An empty selection still names the caret's line
            FormatMode::Selection => FormatScope::Ranges(vec![selection]),
            FormatMode::Auto if !selection.is_empty() => FormatScope::Ranges(vec![selection]),
            FormatMode::Auto if !self.only_changed_regions => whole,
            FormatMode::Auto => match changed() {
                ChangedRanges::Ranges(ranges) => {
                    FormatScope::Ranges(normalize(ranges, doc_len))
                }
                ChangedRanges::Untracked | ChangedRanges::Unavailable => whole,
            },
        }
    }
}

fn clamp(range: Range<usize>, len: usize) -> Range<usize> {
    let start = range.start.min(len);
    let end = range.end.min(len).max(start);
    start..end
}

/// Clamp, sort and merge touching ranges
fn normalize(mut ranges: Vec<Range<usize>>, len: usize) -> Vec<Range<usize>> {
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges.into_iter().map(|r| clamp(r, len)) {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}
