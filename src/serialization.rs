//! Writers for extracted tables and run reports.
//!
//! Extracted tables are written either as a single JSON array (one record
//! per line inside the brackets) or as NDJSON.

use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::dump::TableExtraction;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output layout for extracted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Ndjson,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Ndjson => "ndjson",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "ndjson" | "jsonl" => Ok(OutputFormat::Ndjson),
            other => Err(format!("unknown output format '{}' (expected json or ndjson)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One JSON document per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut self.writer, item)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flush and return the number of lines written.
    pub fn finish(mut self) -> Result<usize, SerializationError> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// A JSON array streamed one element at a time.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Write the opening bracket.
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        writer.write_all(b"[")?;
        Ok(Self { writer, written: 0 })
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<(), SerializationError> {
        let separator: &[u8] = if self.written == 0 { b"\n  " } else { b",\n  " };
        self.writer.write_all(separator)?;
        serde_json::to_writer(&mut self.writer, item)?;
        self.written += 1;
        Ok(())
    }

    /// Close the array, flush and return the number of elements written.
    pub fn finish(mut self) -> Result<usize, SerializationError> {
        let closing: &[u8] = if self.written == 0 { b"]\n" } else { b"\n]\n" };
        self.writer.write_all(closing)?;
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Write a table's records to `<dir>/<table>.<ext>`.
///
/// # Arguments
///
/// * `extraction` - Records of one table
/// * `dir` - Output directory (created when missing)
/// * `format` - JSON array or NDJSON
///
/// # Returns
///
/// The path written.
pub fn write_table(
    extraction: &TableExtraction,
    dir: &Path,
    format: OutputFormat,
) -> Result<PathBuf, SerializationError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.{}", extraction.table, format.extension()));
    let file = BufWriter::new(File::create(&path)?);

    let written = match format {
        OutputFormat::Json => {
            let mut writer = JsonArrayWriter::new(file)?;
            for record in &extraction.records {
                writer.write(record)?;
            }
            writer.finish()?
        }
        OutputFormat::Ndjson => {
            let mut writer = NdjsonWriter::new(file);
            for record in &extraction.records {
                writer.write(record)?;
            }
            writer.finish()?
        }
    };

    tracing::debug!("Wrote {} records to {}", written, path.display());
    Ok(path)
}

/// Write any serializable value as pretty-printed JSON.
pub fn write_json_file<T: Serialize>(value: &T, path: &Path) -> Result<(), SerializationError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}
