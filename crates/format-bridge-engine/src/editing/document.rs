use std::marker::PhantomData;
use std::ops::Range;

use xi_rope::Rope;
use xi_rope::delta::Builder;

use crate::editing::{Patch, TextBuffer};

/// In-memory text buffer backed by an xi-rope
///
/// Document is the buffer the bridge edits when it is not embedded in a host
/// editor that brings its own. It keeps:
///
/// ## 1. Single Source of Truth (xi-rope buffer)
/// - **Lossless storage**: the whole file lives in one `xi_rope::Rope`
/// - **Exact round-trip**: `to_bytes()` returns the original bytes until an edit lands
///
/// ## 2. Caret and selection
/// - Byte offsets into the buffer, moved by edits and by formatter results
///
/// ## 3. Transactions
/// - All mutation goes through [`Document::transaction`]: edits are staged on a
///   copy of the rope and only committed when the closure succeeds, so an
///   error half-way through a replacement list leaves the document untouched
/// - The version only increments when the text actually changed
///
/// ## Usage Pattern
///
/// ```rust
/// # use format_bridge_engine::editing::{Document, TextBuffer};
/// let mut doc = Document::from_bytes(b"int  x;").unwrap();
///
/// let patch = doc
///     .transaction(|tx| {
///         tx.replace(3..5, " ");
///         tx.move_cursor(4);
///         Ok::<(), std::convert::Infallible>(())
///     })
///     .unwrap();
///
/// assert_eq!(doc.text(), "int x;");
/// assert_eq!(patch.version, 1);
/// assert_eq!(doc.cursor(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    /// xi-rope buffer containing the entire document as UTF-8 bytes
    pub(crate) buffer: Rope,
    /// Current selection/cursor position as byte offsets in buffer
    pub(crate) selection: Range<usize>,
    /// Version counter incremented on each committed text change
    pub(crate) version: u64,
}

impl Document {
    /// Create a new document from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        // Convert bytes to string, ensuring valid UTF-8
        let text = std::str::from_utf8(bytes)?;
        let buffer = Rope::from(text);

        Ok(Self {
            buffer,
            selection: 0..0,
            version: 0,
        })
    }

    /// Get the document's content as raw bytes (exact round-trip)
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.to_string().into_bytes()
    }

    /// Get the current text content
    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    /// Get the buffer length in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    /// Get the current selection range
    pub fn selection(&self) -> Range<usize> {
        self.selection.clone()
    }

    /// Set the selection range, clamped to the buffer
    pub fn set_selection(&mut self, selection: Range<usize>) {
        let len = self.buffer.len();
        let start = selection.start.min(len);
        let end = selection.end.min(len).max(start);
        self.selection = start..end;
    }

    /// Caret position (the end of the selection)
    pub fn cursor(&self) -> usize {
        self.selection.end
    }

    /// Get the current version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Slice the buffer to a cow string
    pub fn slice_to_cow(&self, range: Range<usize>) -> std::borrow::Cow<'_, str> {
        let doc_len = self.buffer.len();

        // Clamp range to document bounds to prevent xi-rope panic
        let start = range.start.min(doc_len);
        let end = range.end.min(doc_len).max(start);

        self.buffer.slice_to_cow(start..end)
    }

    /// Run `edit` against a staged copy of the buffer and commit on success
    ///
    /// The closure sees a [`Transaction`] implementing [`TextBuffer`]. If it
    /// returns `Err`, nothing is committed: text, selection and version stay
    /// exactly as they were.
    pub fn transaction<F, E>(&mut self, edit: F) -> Result<Patch, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<(), E>,
    {
        let mut tx = Transaction {
            buffer: self.buffer.clone(),
            selection: self.selection.clone(),
            changed: Vec::new(),
            _document: PhantomData,
        };

        edit(&mut tx)?;

        let Transaction {
            buffer,
            selection,
            changed,
            ..
        } = tx;

        if !changed.is_empty() {
            self.buffer = buffer;
            self.version += 1;
        }
        self.selection = selection.clone();

        Ok(Patch {
            changed,
            new_selection: selection,
            version: self.version,
        })
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        // Compare buffer content as strings since Rope equality is structural
        self.buffer.to_string() == other.buffer.to_string()
            && self.selection == other.selection
            && self.version == other.version
    }
}

/// Staged edits against a [`Document`]
///
/// Created by [`Document::transaction`]; borrows the document mutably for its
/// whole lifetime so no other edit can interleave with it.
pub struct Transaction<'a> {
    buffer: Rope,
    selection: Range<usize>,
    changed: Vec<Range<usize>>,
    _document: PhantomData<&'a mut Document>,
}

impl Transaction<'_> {
    /// Text as staged so far
    pub fn text(&self) -> String {
        self.buffer.to_string()
    }
}

impl TextBuffer for Transaction<'_> {
    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn is_char_boundary(&self, offset: usize) -> bool {
        let len = self.buffer.len();
        offset == 0 || offset == len || (offset < len && self.buffer.is_codepoint_boundary(offset))
    }

    fn replace(&mut self, range: Range<usize>, text: &str) {
        let removed = range.end - range.start;
        let inserted = text.len();

        let mut builder = Builder::new(self.buffer.len());
        builder.replace(range.clone(), Rope::from(text));
        let delta = builder.build();
        self.buffer = delta.apply(&self.buffer);

        // Earlier changed ranges after this edit move with it
        let shift = |pos: usize| -> usize {
            if pos >= range.end {
                pos + inserted - removed
            } else if pos > range.start {
                range.start + inserted
            } else {
                pos
            }
        };
        for r in self.changed.iter_mut() {
            *r = shift(r.start)..shift(r.end);
        }
        self.selection = shift(self.selection.start)..shift(self.selection.end);

        self.changed.push(range.start..range.start + inserted);
    }

    fn move_cursor(&mut self, offset: usize) {
        let offset = offset.min(self.buffer.len());
        self.selection = offset..offset;
    }
}
