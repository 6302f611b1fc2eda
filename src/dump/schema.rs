//! Column discovery from `CREATE TABLE` blocks.

use regex::Regex;

/// Ordered column names of one dumped table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Locate the structure block for `table` and return its columns in
/// declaration order.
///
/// Returns `None` when the dump has no block for the table, or the block
/// declares no backtick-quoted columns. Missing tables are expected in
/// partial dumps and are not an error.
///
/// # Example
/// ```
/// use dumpsync::dump::extract_schema;
///
/// let dump = "CREATE TABLE `tbl_area` (\n  `id` int NOT NULL,\n  `name` varchar(50),\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB;\n";
/// let schema = extract_schema(dump, "tbl_area").unwrap();
/// assert_eq!(schema.columns, vec!["id", "name"]);
/// ```
pub fn extract_schema(dump: &str, table: &str) -> Option<TableSchema> {
    let pattern = format!(
        r"(?s)CREATE TABLE (?:IF NOT EXISTS )?`{}`\s*\((.*?)\)\s*ENGINE",
        regex::escape(table)
    );
    let re = Regex::new(&pattern).ok()?;
    let block = re.captures(dump)?.get(1)?.as_str();

    let columns: Vec<String> = block
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('`'))
        .filter_map(|line| line.split('`').nth(1))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    if columns.is_empty() {
        return None;
    }

    Some(TableSchema {
        table: table.to_string(),
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
DROP TABLE IF EXISTS `tbl_employee`;
CREATE TABLE `tbl_employee` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `firstname` varchar(100) DEFAULT NULL,
  `lastname` varchar(100) DEFAULT NULL,
  `salary` decimal(10,2) DEFAULT '0.00',
  PRIMARY KEY (`id`),
  KEY `idx_name` (`lastname`,`firstname`)
) ENGINE=InnoDB DEFAULT CHARSET=latin1;

CREATE TABLE `tbl_employee_log` (
  `log_id` int(11) NOT NULL
) ENGINE=InnoDB;
";

    #[test]
    fn test_extracts_columns_in_order() {
        let schema = extract_schema(DUMP, "tbl_employee").unwrap();
        assert_eq!(schema.columns, vec!["id", "firstname", "lastname", "salary"]);
        assert_eq!(schema.column_count(), 4);
    }

    #[test]
    fn test_table_name_is_matched_exactly() {
        let schema = extract_schema(DUMP, "tbl_employee_log").unwrap();
        assert_eq!(schema.columns, vec!["log_id"]);
    }

    #[test]
    fn test_missing_table_is_absent() {
        assert!(extract_schema(DUMP, "tbl_branchinfo").is_none());
        assert!(extract_schema(DUMP, "tbl_").is_none());
    }
}
