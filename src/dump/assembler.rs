//! Record assembly: schema + tokenized rows → one record per row.

use serde::Serialize;
use tracing::{debug, warn};

use crate::dump::schema::{extract_schema, TableSchema};
use crate::dump::tokenizer::tokenize_rows;
use crate::error::DumpError;
use crate::record::{FieldValue, Record};

/// Records recovered for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableExtraction {
    pub table: String,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
    /// Rows whose field count did not match the column count.
    pub dropped_rows: usize,
    /// Rows removed by [`TableExtraction::retain_min_id`].
    pub filtered_rows: usize,
    /// `INSERT` statements found for the table.
    pub statements: usize,
}

impl TableExtraction {
    fn new(schema: TableSchema) -> Self {
        Self {
            table: schema.table,
            columns: schema.columns,
            records: Vec::new(),
            dropped_rows: 0,
            filtered_rows: 0,
            statements: 0,
        }
    }

    /// Keep only records whose integer `column` is greater than `min_id`.
    ///
    /// Records without an integer value in `column` are removed as well.
    /// Returns the number of records removed.
    pub fn retain_min_id(&mut self, column: &str, min_id: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|record| {
            record
                .get(column)
                .and_then(FieldValue::as_i64)
                .is_some_and(|id| id > min_id)
        });
        let removed = before - self.records.len();
        self.filtered_rows += removed;
        removed
    }
}

/// Extract every row of `table` from the dump.
///
/// Returns `Ok(None)` when the table has no structure block. Any structural
/// failure in one of the table's `VALUES` clauses aborts the whole table.
pub fn extract_table(dump: &str, table: &str) -> Result<Option<TableExtraction>, DumpError> {
    let Some(schema) = extract_schema(dump, table) else {
        debug!(table, "no structure block found");
        return Ok(None);
    };

    let mut extraction = TableExtraction::new(schema);
    let prefix = format!("INSERT INTO `{}` VALUES", table);
    let mut cursor = 0;

    while let Some(found) = dump[cursor..].find(&prefix) {
        let start = cursor + found;
        let clause_start = start + prefix.len();
        if !starts_line(dump, start) {
            cursor = clause_start;
            continue;
        }
        let clause = tokenize_rows(&dump[clause_start..])?;
        extraction.statements += 1;

        for values in clause.rows {
            if values.len() != extraction.columns.len() {
                extraction.dropped_rows += 1;
                continue;
            }
            let record: Record = extraction
                .columns
                .iter()
                .cloned()
                .zip(values)
                .collect();
            extraction.records.push(record);
        }

        cursor = clause_start + clause.consumed;
    }

    if extraction.dropped_rows > 0 {
        warn!(
            table,
            dropped = extraction.dropped_rows,
            columns = extraction.columns.len(),
            "dropped rows whose field count does not match the schema"
        );
    }
    debug!(
        table,
        records = extraction.records.len(),
        statements = extraction.statements,
        "table extracted"
    );

    Ok(Some(extraction))
}

/// Statements begin at column 0; anything else is quoted data.
fn starts_line(dump: &str, at: usize) -> bool {
    at == 0 || dump.as_bytes()[at - 1] == b'\n'
}

/// Result of extracting one table in a multi-table run.
#[derive(Debug, Clone)]
pub enum TableOutcome {
    Extracted(TableExtraction),
    Absent { table: String },
    Failed { table: String, reason: DumpError },
}

impl TableOutcome {
    pub fn table(&self) -> &str {
        match self {
            TableOutcome::Extracted(extraction) => &extraction.table,
            TableOutcome::Absent { table } | TableOutcome::Failed { table, .. } => table,
        }
    }
}

/// Outcomes of a multi-table extraction, in the order tables were requested.
#[derive(Debug, Clone, Default)]
pub struct ExtractionSummary {
    pub outcomes: Vec<TableOutcome>,
}

impl ExtractionSummary {
    pub fn extracted(&self) -> impl Iterator<Item = &TableExtraction> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            TableOutcome::Extracted(extraction) => Some(extraction),
            _ => None,
        })
    }

    pub fn total_records(&self) -> usize {
        self.extracted().map(|e| e.records.len()).sum()
    }

    pub fn dropped_rows(&self) -> usize {
        self.extracted().map(|e| e.dropped_rows).sum()
    }

    pub fn absent_tables(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TableOutcome::Absent { .. }))
            .map(TableOutcome::table)
            .collect()
    }

    pub fn failed_tables(&self) -> Vec<(&str, &DumpError)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                TableOutcome::Failed { table, reason } => Some((table.as_str(), reason)),
                _ => None,
            })
            .collect()
    }
}

/// Extract several tables, continuing past absent or malformed ones.
pub fn extract_tables<S: AsRef<str>>(dump: &str, tables: &[S]) -> ExtractionSummary {
    let outcomes = tables
        .iter()
        .map(|table| {
            let table = table.as_ref();
            match extract_table(dump, table) {
                Ok(Some(extraction)) => TableOutcome::Extracted(extraction),
                Ok(None) => TableOutcome::Absent {
                    table: table.to_string(),
                },
                Err(reason) => {
                    warn!(table, %reason, "aborting table");
                    TableOutcome::Failed {
                        table: table.to_string(),
                        reason,
                    }
                }
            }
        })
        .collect();

    ExtractionSummary { outcomes }
}
