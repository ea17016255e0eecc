//! One formatting run from editor state to applied edits.
//!
//! [`FormatBridge::prepare`] runs on the caller's thread and snapshots what
//! is needed (path, cursor, scope, resolved binary). [`FormatBridge::run`]
//! does the process work and parsing and never touches the buffer, so it can
//! run in the background. Applying the result goes through the buffer
//! owner's transaction, see [`FormatBridge::format_document`].

use std::ops::Range;
use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;

use crate::command::{CommandBuilder, FormatRequest, OutputProtocol};
use crate::editing::{Document, Patch, apply_format};
use crate::error::FormatError;
use crate::locator::BinaryLocator;
use crate::process::{ProcessRunner, Timeouts};
use crate::ranges::{ChangedRangesProvider, EditorView, FormatMode, RangeSelector};
use crate::response::{self, FormatResult};

#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    pub protocol: OutputProtocol,
    pub whole_file_offsets: bool,
    pub selector: RangeSelector,
    pub timeouts: Timeouts,
    /// Passed to the formatter ahead of the generated arguments
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FormatBridge {
    locator: BinaryLocator,
    builder: CommandBuilder,
    selector: RangeSelector,
    runner: ProcessRunner,
    extra_args: Vec<String>,
}

impl FormatBridge {
    pub fn new(locator: BinaryLocator, options: BridgeOptions) -> Self {
        Self {
            locator,
            builder: CommandBuilder::new(options.protocol)
                .with_whole_file_offsets(options.whole_file_offsets),
            selector: options.selector,
            runner: ProcessRunner::new(options.timeouts),
            extra_args: options.extra_args,
        }
    }

    pub fn protocol(&self) -> OutputProtocol {
        self.builder.protocol
    }

    /// Snapshot the request for `mode`, or `None` when there is nothing to format
    pub fn prepare<V, P>(&self, mode: FormatMode, view: &V, provider: &P) -> Option<FormatRequest>
    where
        V: EditorView + ?Sized,
        P: ChangedRangesProvider + ?Sized,
    {
        let path = view.file_path();
        let reported_length = view.reported_length();
        let cursor = view.caret().min(self.selector.doc_length(reported_length));

        let scope = self
            .selector
            .select(mode, reported_length, view.selection(), || {
                provider.changed_ranges(path, &view.text())
            });
        if scope.is_empty() {
            log::info!("no changed regions in {}, nothing to format", path.display());
            return None;
        }

        let resolved = self.locator.locate();
        Some(FormatRequest {
            source_path: path.to_path_buf(),
            cursor,
            scope,
            binary: resolved.command,
            extra_args: self.extra_args.clone(),
            env: resolved.env,
        })
    }

    /// Run the formatter over `text` and parse what it printed
    pub async fn run(&self, request: &FormatRequest, text: String) -> Result<FormatResult, FormatError> {
        let invocation = self.builder.build(request);
        let protocol = self.builder.protocol;

        let outcome = self
            .runner
            .run_with(&invocation, text, move |bytes| response::parse(protocol, &bytes))
            .await?;
        let result = outcome.stdout?;

        if let FormatResult::ReplacementSet { replacements, .. } = &result {
            log::debug!(
                "{} replacements for {}",
                replacements.len(),
                request.source_path.display()
            );
        }
        Ok(result)
    }

    /// [`run`](Self::run) on the tokio runtime; the handle resolves to the same result
    pub fn spawn(
        &self,
        request: FormatRequest,
        text: String,
    ) -> JoinHandle<Result<FormatResult, FormatError>> {
        let bridge = self.clone();
        tokio::spawn(async move { bridge.run(&request, text).await })
    }

    /// Format `document` in place as if it were the file at `path`
    ///
    /// Returns `Ok(None)` when there was nothing to format. Edits are applied
    /// in one transaction: on any error the document is unchanged. Changed
    /// range lookup and binary resolution may start processes, so they run on
    /// the blocking pool.
    pub async fn format_document<P>(
        &self,
        mode: FormatMode,
        document: &mut Document,
        path: &Path,
        provider: &P,
    ) -> Result<Option<Patch>, FormatError>
    where
        P: ChangedRangesProvider + Clone + Send + 'static,
    {
        let snapshot = DocumentSnapshot {
            path: path.to_path_buf(),
            text: document.text(),
            reported_length: document.len() + self.selector.length_adjustment,
            caret: document.cursor(),
            selection: document.selection(),
        };
        let bridge = self.clone();
        let provider = provider.clone();
        let (request, text) = tokio::task::spawn_blocking(move || {
            let request = bridge.prepare(mode, &snapshot, &provider);
            (request, snapshot.text)
        })
        .await
        .map_err(|e| FormatError::Interrupted(e.to_string()))?;
        let Some(request) = request else {
            return Ok(None);
        };

        let result = self.run(&request, text).await?;
        let patch = document.transaction(|tx| apply_format(tx, &result))?;

        log::info!(
            "formatted {}: {} edits, cursor at {}",
            path.display(),
            patch.changed.len(),
            patch.new_selection.end
        );
        Ok(Some(patch))
    }
}

/// Owned [`EditorView`] of a [`Document`], taken before formatting starts
struct DocumentSnapshot {
    path: PathBuf,
    text: String,
    /// Document length plus the selector's adjustment; a document has no trailing sentinel
    reported_length: usize,
    caret: usize,
    selection: Range<usize>,
}

impl EditorView for DocumentSnapshot {
    fn file_path(&self) -> &Path {
        &self.path
    }

    fn text(&self) -> String {
        self.text.clone()
    }

    fn reported_length(&self) -> usize {
        self.reported_length
    }

    fn caret(&self) -> usize {
        self.caret
    }

    fn selection(&self) -> Range<usize> {
        self.selection.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FormatScope;
    use crate::ranges::{ChangedRanges, NoVcs};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    struct Editor {
        path: PathBuf,
        text: String,
        caret: usize,
        selection: Range<usize>,
    }

    impl EditorView for Editor {
        fn file_path(&self) -> &Path {
            &self.path
        }
        fn text(&self) -> String {
            self.text.clone()
        }
        // Host counts one trailing sentinel
        fn reported_length(&self) -> usize {
            self.text.len() + 1
        }
        fn caret(&self) -> usize {
            self.caret
        }
        fn selection(&self) -> Range<usize> {
            self.selection.clone()
        }
    }

    #[derive(Clone)]
    struct FixedChanges(ChangedRanges);

    /// Stands in for a slow VCS lookup and records when it returned
    #[derive(Clone, Default)]
    struct SlowChanges {
        finished: Arc<Mutex<Option<Instant>>>,
    }

    impl ChangedRangesProvider for SlowChanges {
        fn changed_ranges(&self, _path: &Path, _text: &str) -> ChangedRanges {
            std::thread::sleep(Duration::from_millis(300));
            *self.finished.lock().unwrap() = Some(Instant::now());
            ChangedRanges::Ranges(Vec::new())
        }
    }

    impl ChangedRangesProvider for FixedChanges {
        fn changed_ranges(&self, _path: &Path, _text: &str) -> ChangedRanges {
            self.0.clone()
        }
    }

    fn editor(text: &str, caret: usize, selection: Range<usize>) -> Editor {
        Editor {
            path: PathBuf::from("/work/src/main.cc"),
            text: text.to_string(),
            caret,
            selection,
        }
    }

    fn bridge(only_changed_regions: bool) -> FormatBridge {
        FormatBridge::new(
            BinaryLocator::new("fb-missing-formatter-91c").with_fallback_dirs(Vec::new()),
            BridgeOptions {
                selector: RangeSelector {
                    only_changed_regions,
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_prepare_clamps_cursor_to_doc_length() {
        let view = editor("int x;", 50, 0..0);

        let request = bridge(false).prepare(FormatMode::WholeFile, &view, &NoVcs).unwrap();

        assert_eq!(request.cursor, 6);
        assert_eq!(request.scope, FormatScope::WholeFile { length: 6 });
        assert_eq!(request.source_path, PathBuf::from("/work/src/main.cc"));
        assert_eq!(request.binary, "fb-missing-formatter-91c");
    }

    #[test]
    fn test_prepare_selection_range() {
        let view = editor("int x;\nint   y;\n", 10, 7..15);

        let request = bridge(false).prepare(FormatMode::Auto, &view, &NoVcs).unwrap();

        assert_eq!(request.scope, FormatScope::Ranges(vec![7..15]));
        assert_eq!(request.cursor, 10);
    }

    #[test]
    fn test_prepare_with_no_changes_returns_none() {
        let view = editor("int x;", 0, 0..0);
        let provider = FixedChanges(ChangedRanges::Ranges(Vec::new()));

        assert_eq!(bridge(true).prepare(FormatMode::Auto, &view, &provider), None);
    }

    #[test]
    fn test_prepare_uses_changed_ranges() {
        let view = editor("int x;\nint   y;\n", 0, 0..0);
        let provider = FixedChanges(ChangedRanges::Ranges(vec![7..40]));

        let request = bridge(true).prepare(FormatMode::Auto, &view, &provider).unwrap();

        assert_eq!(request.scope, FormatScope::Ranges(vec![7..16]));
    }

    #[test]
    fn test_prepare_untracked_falls_back_to_whole_file() {
        let view = editor("int x;", 0, 0..0);

        let request = bridge(true).prepare(FormatMode::Auto, &view, &NoVcs).unwrap();

        assert_eq!(request.scope, FormatScope::WholeFile { length: 6 });
    }

    #[tokio::test]
    async fn test_missing_formatter_leaves_document_untouched() {
        let bridge = FormatBridge::new(
            BinaryLocator::new("/nonexistent/fb-formatter"),
            BridgeOptions::default(),
        );
        let mut doc = Document::from_bytes(b"int  x;").unwrap();

        let err = bridge
            .format_document(FormatMode::WholeFile, &mut doc, Path::new("a.cc"), &NoVcs)
            .await
            .unwrap_err();

        assert!(matches!(err, FormatError::Launch { .. }), "got {err:?}");
        assert_eq!(doc.text(), "int  x;");
        assert_eq!(doc.version(), 0);
    }

    #[tokio::test]
    async fn test_changed_range_lookup_does_not_stall_the_runtime() {
        let provider = SlowChanges::default();
        let mut doc = Document::from_bytes(b"int  x;").unwrap();
        let bridge = bridge(true);

        let (result, ticked) = tokio::join!(
            bridge.format_document(FormatMode::Auto, &mut doc, Path::new("a.cc"), &provider),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Instant::now()
            }
        );

        assert_eq!(result.unwrap(), None);
        let finished = provider.finished.lock().unwrap().unwrap();
        assert!(ticked < finished, "timer waited for the lookup");
        assert_eq!(doc.text(), "int  x;");
    }
}
