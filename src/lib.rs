//! # jsift - guided JSON field extraction
//!
//! Pulls only the leaf values a pattern matcher cares about out of raw JSON
//! documents, in a single pass, without materializing anything else.
//!
//! ## Modules
//!
//! - **index**: trie of registered field paths
//! - **flatten**: guided traversal producing field records
//! - **decoder**: lazy JSON cursor the traversal runs on
//! - **matcher**: seam to the pattern-matching engine
//!
//! ## Quick Start
//!
//! ```rust
//! use jsift::{Flattener, PathIndex};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let index = PathIndex::from_paths(["properties\nSTREET", "geometry\ncoordinates"])?;
//! let mut flattener = Flattener::new(Arc::new(index));
//!
//! let doc = br#"{"properties":{"STREET":"CRANLEIGH","ZIP":"94103"},
//!                "geometry":{"coordinates":[[1.0,2.0]]}}"#;
//! let fields = flattener.flatten(doc)?;
//!
//! assert_eq!(fields[0].value, br#""CRANLEIGH""#);
//! assert_eq!(fields[1].value, b"1.0");
//! assert_eq!(fields[1].array_trail.len(), 2);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use tracing::warn;

pub mod decoder;
pub mod error;
pub mod flatten;
pub mod index;
pub mod matcher;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DecodeError, Error};
pub use flatten::{Flattener, RecordWriter};
pub use index::{NodeId, NodeRef, PathIndex};
pub use matcher::{matches_for_document, Matcher};
pub use types::{ArrayPos, ArrayTrail, FieldRecord, FlattenConfig, Path, PATH_SEPARATOR};

/// Totals from one [`flatten_lines`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub documents: u64,
    pub records: u64,
    pub errors: u64,
}

/// Flatten a stream of newline-delimited JSON documents and write every
/// record. Blank lines are ignored.
///
/// A document that fails to decode is reported and its partial records are
/// still written; with `fail_fast` the first such document ends the run.
pub fn flatten_lines<R: BufRead, W: Write>(
    mut reader: R,
    flattener: &mut Flattener,
    writer: &mut RecordWriter<W>,
    fail_fast: bool,
) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read line {}", line_no + 1))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = trim_line(&buf);
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let doc = summary.documents;
        summary.documents += 1;

        if let Err(err) = flattener.flatten(line) {
            summary.errors += 1;
            if fail_fast {
                return Err(err).context(format!("Failed to flatten line {}", line_no));
            }
            warn!(line = line_no, error = %err, "document only partially flattened");
        }

        summary.records += writer.write_records(doc, flattener.fields())? as u64;
    }

    writer.flush()?;
    Ok(summary)
}

/// Strip the line terminator, `\n` or `\r\n`
fn trim_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
