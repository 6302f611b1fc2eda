//! Extraction of typed records from MySQL-style dump text.
//!
//! Only the shape produced by `mysqldump` is understood: `CREATE TABLE`
//! structure blocks with one backtick-quoted column per line, and
//! ``INSERT INTO `table` VALUES (...),(...);`` bulk inserts.

pub mod assembler;
pub mod schema;
pub mod tokenizer;

use std::path::Path;

pub use assembler::{extract_table, extract_tables, ExtractionSummary, TableExtraction, TableOutcome};
pub use schema::{extract_schema, TableSchema};
pub use tokenizer::{infer_scalar, tokenize_rows, tokenize_values, ValuesClause};

/// Read a dump file, replacing invalid UTF-8 sequences with U+FFFD.
pub fn read_dump<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}
