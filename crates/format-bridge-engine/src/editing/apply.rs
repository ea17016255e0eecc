use crate::editing::TextBuffer;
use crate::error::EditError;
use crate::response::{FormatResult, Replacement};

/// Apply a parsed formatter result to `buffer`, then move the caret to the reported cursor
///
/// Must be called from inside the owner's edit transaction: on `Err` some
/// replacements may already have been handed to the buffer, and only the
/// transaction can roll them back. [`crate::editing::Document::transaction`]
/// does exactly that.
pub fn apply_format<B: TextBuffer + ?Sized>(
    buffer: &mut B,
    result: &FormatResult,
) -> Result<(), EditError> {
    match result {
        FormatResult::ReplacementSet {
            cursor,
            replacements,
        } => {
            apply_replacements(buffer, replacements)?;
            // Already in post-format coordinates, no drift correction
            buffer.move_cursor(*cursor);
        }
        FormatResult::FullText { cursor, text } => {
            let len = buffer.len();
            buffer.replace(0..len, text);
            buffer.move_cursor(*cursor);
        }
    }
    Ok(())
}

/// Apply replacements given in original-buffer coordinates, in order
///
/// Each replacement's original offset is shifted by the net size change of
/// every replacement before it (the drift). That is only correct while the
/// list is ascending and non-overlapping, which the formatter guarantees;
/// ordering, bounds and UTF-8 boundaries are checked before each edit reaches
/// the buffer.
///
/// Returns the total drift, i.e. `new_len - old_len`.
pub fn apply_replacements<B: TextBuffer + ?Sized>(
    buffer: &mut B,
    replacements: &[Replacement],
) -> Result<isize, EditError> {
    let mut drift: isize = 0;
    let mut previous_offset = 0;

    for replacement in replacements {
        if replacement.offset < previous_offset {
            return Err(EditError::Unordered {
                offset: replacement.offset,
                previous_offset,
            });
        }
        previous_offset = replacement.offset;

        let len = buffer.len();
        let out_of_bounds = || EditError::OutOfBounds {
            start: replacement.offset,
            end: replacement.offset.saturating_add(replacement.length),
            len,
        };
        // Drift pushing the start below zero is as invalid as running past the end
        let start = replacement
            .offset
            .checked_add_signed(drift)
            .ok_or_else(out_of_bounds)?;
        let end = start
            .checked_add(replacement.length)
            .filter(|&end| end <= len)
            .ok_or_else(out_of_bounds)?;
        for offset in [start, end] {
            if !buffer.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }

        drift = replacement
            .drift()
            .and_then(|d| drift.checked_add(d))
            .ok_or_else(out_of_bounds)?;
        buffer.replace(start..end, &replacement.value);
    }

    Ok(drift)
}
