pub mod bridge;
pub mod command;
pub mod editing;
pub mod error;
pub mod locator;
pub mod process;
pub mod ranges;
pub mod response;

// Re-export key types for easier usage
pub use bridge::{BridgeOptions, FormatBridge};
pub use command::{CommandBuilder, FormatRequest, FormatScope, Invocation, OutputProtocol};
pub use editing::{Document, Patch, TextBuffer, apply_format, apply_replacements};
pub use error::{EditError, FormatError, ParseError};
pub use locator::{BinaryLocator, DEFAULT_BINARY, ResolvedBinary};
pub use process::{ProcessOutcome, ProcessRunner, Timeouts};
pub use ranges::{
    ChangedRanges, ChangedRangesProvider, EditorView, FormatMode, NoVcs, RangeSelector,
};
pub use response::{FormatResult, Replacement};
