use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use format_bridge_config::{Config, OutputFormat};
use format_bridge_engine::{
    BinaryLocator, BridgeOptions, Document, FormatBridge, FormatMode, OutputProtocol,
    RangeSelector, Timeouts,
};
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process;

mod vcs;

use vcs::GitChanges;

/// Format a source file with clang-format and apply the edits it reports
#[derive(Parser, Debug)]
#[command(name = "format-bridge")]
#[command(version)]
#[command(about = "Run clang-format over a file and apply its replacements", long_about = None)]
struct Args {
    /// Source file to format
    file: PathBuf,

    /// What to format
    #[arg(short, long, value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    /// Selected byte range as START:END; the caret sits at END
    #[arg(short, long, value_parser = parse_selection)]
    selection: Option<Range<usize>>,

    /// Caret byte offset when nothing is selected
    #[arg(short, long, conflicts_with = "selection")]
    cursor: Option<usize>,

    /// Write the result back to FILE instead of printing it
    #[arg(short, long)]
    in_place: bool,

    /// Config file to use instead of ~/.config/format-bridge/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Formatter binary name or path (overrides config)
    #[arg(long)]
    binary: Option<String>,

    /// PATH used to find and run the formatter (overrides config)
    #[arg(long)]
    path: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Whole,
    Selection,
    Auto,
}

impl From<Mode> for FormatMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Whole => FormatMode::WholeFile,
            Mode::Selection => FormatMode::Selection,
            Mode::Auto => FormatMode::Auto,
        }
    }
}

fn parse_selection(value: &str) -> Result<Range<usize>, String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got {value:?}"))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid selection start {start:?}: {e}"))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid selection end {end:?}: {e}"))?;
    if end < start {
        return Err(format!("selection end {end} is before start {start}"));
    }
    Ok(start..end)
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?
            .with_context(|| format!("Config file not found: {}", path.display()))?,
        None => Config::load()?.unwrap_or_default(),
    };

    Ok(Config {
        binary: args.binary.clone().unwrap_or(config.binary),
        path: args.path.clone().or(config.path),
        ..config
    }
    .normalized())
}

fn bridge_options(config: &Config) -> BridgeOptions {
    BridgeOptions {
        protocol: match config.output {
            OutputFormat::Xml => OutputProtocol::ReplacementsXml,
            OutputFormat::Text => OutputProtocol::CursorHeaderText,
        },
        whole_file_offsets: config.whole_file_offsets,
        selector: RangeSelector {
            only_changed_regions: config.only_changed_regions,
            ..Default::default()
        },
        timeouts: Timeouts {
            write: config.write_timeout(),
            exit: config.exit_timeout(),
        },
        extra_args: config.extra_args.clone(),
    }
}

fn build_bridge(config: &Config) -> FormatBridge {
    let locator = BinaryLocator::new(config.binary.clone()).with_path_override(config.path.clone());
    FormatBridge::new(locator, bridge_options(config))
}

fn read_document(file: &Path, selection: Range<usize>) -> Result<Document> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let mut document = Document::from_bytes(&bytes)
        .with_context(|| format!("{} is not valid UTF-8", file.display()))?;
    document.set_selection(selection);
    Ok(document)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    log::debug!("Using config: {config:?}");

    let selection = args.selection.clone().unwrap_or_else(|| {
        let caret = args.cursor.unwrap_or(0);
        caret..caret
    });
    let mut document = read_document(&args.file, selection)?;

    let bridge = build_bridge(&config);
    let patch = bridge
        .format_document(args.mode.into(), &mut document, &args.file, &GitChanges::default())
        .await?;

    let changed = patch.as_ref().is_some_and(|p| !p.is_noop());
    if args.in_place {
        if changed {
            std::fs::write(&args.file, document.to_bytes())
                .with_context(|| format!("Failed to write {}", args.file.display()))?;
        }
    } else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&document.to_bytes())?;
        stdout.flush()?;
    }

    match patch {
        Some(_) => eprintln!("cursor: {}", document.cursor()),
        None => eprintln!("nothing to format"),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
