//! jsift: Extract registered fields from newline-delimited JSON
//!
//! Usage:
//!   # Read from file, output to stdout
//!   jsift --path properties.STREET --path geometry.coordinates events.jsonl
//!
//!   # Read from stdin, paths from a file
//!   cat events.jsonl | jsift --paths-file paths.txt
//!
//!   # Trace traversal decisions
//!   RUST_LOG=jsift=trace jsift --path a.b events.jsonl

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use jsift::{flatten_lines, FlattenConfig, Flattener, PathIndex, RecordWriter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "jsift")]
#[command(about = "Extract registered fields from newline-delimited JSON", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Field path to extract, segments joined by the delimiter (repeatable)
    #[arg(long = "path", short = 'p', value_name = "PATH")]
    paths: Vec<String>,

    /// File with one field path per line
    #[arg(long)]
    paths_file: Option<String>,

    /// Delimiter between path segments on the command line and in output
    #[arg(long, short = 'd', default_value = ".")]
    delimiter: String,

    /// Maximum object/array nesting to descend into (default: 128)
    #[arg(long)]
    max_nesting: Option<usize>,

    /// Stop at the first document that fails to decode
    #[arg(long)]
    fail_fast: bool,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    if args.delimiter.is_empty() {
        bail!("--delimiter must not be empty");
    }

    let mut config = FlattenConfig::default();
    if let Some(depth) = args.max_nesting {
        config.max_nesting = depth;
    }

    let index = build_index(&args, &config)?;
    if index.is_empty() {
        warn!("no paths registered, nothing will be extracted");
    }

    let mut flattener = Flattener::with_config(Arc::new(index), config.clone());
    let mut writer = RecordWriter::new(std::io::stdout().lock())
        .with_delimiter(config.separator, args.delimiter.as_str());

    let reader = if let Some(file_path) = &args.input {
        let file =
            File::open(file_path).with_context(|| format!("Failed to open {}", file_path))?;
        Box::new(BufReader::new(file)) as Box<dyn BufRead>
    } else {
        Box::new(std::io::stdin().lock()) as Box<dyn BufRead>
    };

    let summary = flatten_lines(reader, &mut flattener, &mut writer, args.fail_fast)?;
    info!(
        documents = summary.documents,
        records = summary.records,
        errors = summary.errors,
        "done"
    );

    Ok(())
}

/// Collect paths from flags and the paths file, translating the delimiter
/// into the index separator
fn build_index(args: &Args, config: &FlattenConfig) -> Result<PathIndex> {
    let mut raw_paths = args.paths.clone();

    if let Some(paths_file) = &args.paths_file {
        let file = File::open(paths_file)
            .with_context(|| format!("Failed to open paths file {}", paths_file))?;
        for line in BufReader::new(file).lines() {
            let line = line.context("Failed to read paths file")?;
            let line = line.trim();
            if !line.is_empty() {
                raw_paths.push(line.to_string());
            }
        }
    }

    let separator = char::from(config.separator).to_string();
    let mut index = PathIndex::with_config(config);
    index
        .extend(raw_paths.iter().map(|p| {
            p.split(args.delimiter.as_str())
                .collect::<Vec<_>>()
                .join(separator.as_str())
        }))
        .context("Failed to register paths")?;

    info!(paths = index.path_count(), "registered paths");
    Ok(index)
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
