/// Result of committing an edit transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Byte ranges in the new text that received inserted content
    pub changed: Vec<std::ops::Range<usize>>,
    pub new_selection: std::ops::Range<usize>,
    pub version: u64,
}

impl Patch {
    /// True when the transaction did not touch the text (cursor moves only)
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}
