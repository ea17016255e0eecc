/*!
 * # Editing
 *
 * Everything that mutates text lives here.
 *
 * - **`TextBuffer`**: the seam to whatever owns the text. A host editor
 *   implements it on the handle it gets inside its own write transaction;
 *   the bundled [`Document`] implements it on [`Transaction`].
 * - **`apply`**: turns a parsed formatter result into buffer edits, walking
 *   replacements in original-offset order and carrying the accumulated
 *   drift forward so each one lands where the formatter meant it.
 * - **`document`**: xi-rope backed buffer with staged, all-or-nothing
 *   transactions.
 * - **`patch`**: what a committed transaction changed.
 */

pub mod apply;
pub mod document;
pub mod patch;

pub use apply::{apply_format, apply_replacements};
pub use document::{Document, Transaction};
pub use patch::Patch;

use std::ops::Range;

/// Mutable text addressed by byte offsets
///
/// Implementations are only handed out inside the owner's edit transaction;
/// the applier never keeps a reference past a single call.
pub trait TextBuffer {
    /// Current length in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `offset` falls between two UTF-8 code points (or at either end)
    fn is_char_boundary(&self, offset: usize) -> bool;

    /// Replace `range` with `text`
    ///
    /// Callers must pass a range inside the buffer whose ends are char
    /// boundaries; [`apply_replacements`] checks this before every call.
    fn replace(&mut self, range: Range<usize>, text: &str);

    /// Move the caret, collapsing any selection
    fn move_cursor(&mut self, offset: usize);
}
