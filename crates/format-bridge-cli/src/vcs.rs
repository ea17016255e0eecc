//! Changed regions from git.

use std::ops::Range;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::OnceLock;

use format_bridge_engine::{ChangedRanges, ChangedRangesProvider};
use regex::Regex;

/// Diffs bigger than this are not worth mapping; the caller falls back
const MAX_DIFF_BYTES: usize = 1 << 20;

/// Reads changed lines from `git diff -U0` against HEAD
///
/// The diff is taken from the working tree copy on disk, so the text passed
/// in must match the file as saved.
#[derive(Debug, Clone)]
pub struct GitChanges {
    git: String,
    max_diff_bytes: usize,
}

impl Default for GitChanges {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            max_diff_bytes: MAX_DIFF_BYTES,
        }
    }
}

impl GitChanges {
    fn git(&self, dir: &Path, args: &[&str]) -> std::io::Result<Output> {
        Command::new(&self.git).arg("-C").arg(dir).args(args).output()
    }
}

impl ChangedRangesProvider for GitChanges {
    fn changed_ranges(&self, path: &Path, text: &str) -> ChangedRanges {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return ChangedRanges::Unavailable;
        };

        match self.git(dir, &["ls-files", "--error-unmatch", "--", name]) {
            Ok(output) if output.status.success() => {}
            Ok(_) => {
                log::debug!("{} is not tracked by git", path.display());
                return ChangedRanges::Untracked;
            }
            Err(e) => {
                log::warn!("could not run git: {e}");
                return ChangedRanges::Unavailable;
            }
        }

        let output = match self.git(
            dir,
            &["diff", "-U0", "--no-color", "--no-ext-diff", "HEAD", "--", name],
        ) {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                log::warn!(
                    "git diff failed for {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim_end()
                );
                return ChangedRanges::Unavailable;
            }
            Err(e) => {
                log::warn!("could not run git: {e}");
                return ChangedRanges::Unavailable;
            }
        };

        if output.stdout.len() > self.max_diff_bytes {
            log::info!("diff for {} is too large, formatting more", path.display());
            return ChangedRanges::Unavailable;
        }

        let diff = String::from_utf8_lossy(&output.stdout);
        let ranges = hunk_ranges(&diff, text);
        log::debug!("changed ranges for {}: {ranges:?}", path.display());
        ChangedRanges::Ranges(ranges)
    }
}

fn hunk_regex() -> &'static Regex {
    static HUNK_REGEX: OnceLock<Regex> = OnceLock::new();
    HUNK_REGEX.get_or_init(|| {
        Regex::new(r"(?m)^@@ -\d+(?:,\d+)? \+(\d+)(?:,(\d+))? @@").expect("Invalid hunk regex")
    })
}

/// Map the new-side line spans of each hunk header to byte ranges of `text`
///
/// A hunk that only deletes lines becomes an empty range where they were.
pub fn hunk_ranges(diff: &str, text: &str) -> Vec<Range<usize>> {
    let line_starts = line_starts(text);
    let byte_at = |line: usize| line_starts.get(line).copied().unwrap_or(text.len());

    hunk_regex()
        .captures_iter(diff)
        .filter_map(|hunk| {
            let start: usize = hunk[1].parse().ok()?;
            let count: usize = match hunk.get(2) {
                Some(count) => count.as_str().parse().ok()?,
                None => 1,
            };
            // For pure deletions git reports the line before the gap
            let first = if count == 0 { start } else { start.saturating_sub(1) };
            Some(byte_at(first)..byte_at(first + count))
        })
        .collect()
}

fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .filter(|&start| start < text.len() || start == 0)
        .collect()
}
