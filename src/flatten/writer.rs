use crate::types::{ArrayPos, FieldRecord, PATH_SEPARATOR};
use anyhow::{Context, Result};
use serde::Serialize;
use std::borrow::Cow;
use std::io::Write;

/// One output line
#[derive(Serialize)]
struct RecordLine<'r> {
    doc: u64,
    path: Cow<'r, str>,
    value: Cow<'r, str>,
    trail: &'r [ArrayPos],
}

/// Writes field records as JSON Lines, one object per record
pub struct RecordWriter<W: Write> {
    writer: W,
    separator: u8,
    delimiter: String,
}

impl<W: Write> RecordWriter<W> {
    /// Paths are written as-is, segments joined by the separator byte
    pub fn new(writer: W) -> Self {
        RecordWriter {
            writer,
            separator: PATH_SEPARATOR,
            delimiter: char::from(PATH_SEPARATOR).to_string(),
        }
    }

    /// Render paths with `delimiter` between segments instead of `separator`
    pub fn with_delimiter(mut self, separator: u8, delimiter: impl Into<String>) -> Self {
        self.separator = separator;
        self.delimiter = delimiter.into();
        self
    }

    /// Write the records of document number `doc`, returning how many were written
    pub fn write_records(&mut self, doc: u64, records: &[FieldRecord]) -> Result<usize> {
        for record in records {
            let line = RecordLine {
                doc,
                path: self.render_path(record),
                value: record.value_str(),
                trail: &record.array_trail,
            };

            let json = serde_json::to_string(&line).context("Failed to serialize record")?;
            writeln!(self.writer, "{}", json).context("Failed to write record")?;
        }
        Ok(records.len())
    }

    fn render_path<'r>(&self, record: &'r FieldRecord) -> Cow<'r, str> {
        if self.delimiter.len() == 1 && self.delimiter.as_bytes()[0] == self.separator {
            return record.path.to_string_lossy();
        }

        let segments: Vec<Cow<'_, str>> = record
            .path
            .segments(self.separator)
            .map(String::from_utf8_lossy)
            .collect();
        Cow::Owned(segments.join(self.delimiter.as_str()))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
