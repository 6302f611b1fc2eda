//! The authoritative employee roster.
//!
//! The roster is a spreadsheet maintained by HR. dumpsync consumes it as a
//! [`RosterGrid`] (rows of cell text, typically a CSV export of the sheet),
//! locates the header row and turns each data row into a [`RosterRow`].

use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::RosterError;
use crate::reconcile::identity::normalize_key;

/// Normalized header names the roster understands.
const COL_EMPLOYEE_ID: &str = "employeeid";
const COL_NICKNAME: &str = "nickname";
const COL_FIRST_NAME: &str = "firstname";
const COL_LAST_NAME: &str = "lastname";
const COL_PASSWORD: &str = "password";
const COL_CONTACT: &str = "contactnumber";
const COL_POSITION: &str = "position";
const COL_EMAIL: &str = "email";

const REQUIRED_COLUMNS: [&str; 3] = [COL_EMPLOYEE_ID, COL_FIRST_NAME, COL_LAST_NAME];

/// A rectangular-ish grid of cell text. Short rows read as empty cells.
#[derive(Debug, Clone, Default)]
pub struct RosterGrid {
    rows: Vec<Vec<String>>,
}

impl RosterGrid {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Read a headerless, possibly ragged CSV export.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, RosterError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        if let Some(first) = rows.first_mut().and_then(|row| row.first_mut()) {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.to_string();
            }
        }
        Ok(Self { rows })
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, RosterError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_csv_reader(file)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// One employee row from the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterRow {
    /// 1-based row number in the sheet.
    pub row: usize,
    pub employee_id: Option<i64>,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    /// Lower-cased.
    pub email: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub position: String,
    pub contact_number: Option<String>,
}

impl RosterRow {
    pub fn email_is_valid(&self) -> bool {
        is_valid_email(&self.email)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// A row that was read but could not be used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterWarning {
    pub row: usize,
    pub message: String,
}

/// Parsed roster.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Roster {
    pub rows: Vec<RosterRow>,
    /// Data rows with no name, nickname or email.
    pub blank_rows: usize,
    pub warnings: Vec<RosterWarning>,
}

struct ColumnMap {
    employee_id: usize,
    first_name: usize,
    last_name: usize,
    nickname: Option<usize>,
    password: Option<usize>,
    contact: Option<usize>,
    position: Option<usize>,
    email: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[String]) -> Option<Self> {
        let find = |name: &str| header.iter().position(|cell| cell == name);
        Some(Self {
            employee_id: find(COL_EMPLOYEE_ID)?,
            first_name: find(COL_FIRST_NAME)?,
            last_name: find(COL_LAST_NAME)?,
            nickname: find(COL_NICKNAME),
            password: find(COL_PASSWORD),
            contact: find(COL_CONTACT),
            position: find(COL_POSITION),
            email: find(COL_EMAIL),
        })
    }
}

fn cell(row: &[String], index: Option<usize>) -> String {
    index
        .and_then(|i| row.get(i))
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

impl Roster {
    /// Locate the header row and parse every data row below it.
    pub fn from_grid(grid: &RosterGrid) -> Result<Self, RosterError> {
        let rows = grid.rows();
        let (header_idx, columns) = rows
            .iter()
            .enumerate()
            .find_map(|(idx, row)| {
                let normalized: Vec<String> = row.iter().map(|c| normalize_key(c)).collect();
                if REQUIRED_COLUMNS.iter().all(|req| normalized.iter().any(|c| c == req)) {
                    ColumnMap::from_header(&normalized).map(|columns| (idx, columns))
                } else {
                    None
                }
            })
            .ok_or(RosterError::HeaderNotFound)?;

        debug!(header_row = header_idx + 1, "roster header located");

        let mut roster = Roster::default();
        for (idx, row) in rows.iter().enumerate().skip(header_idx + 1) {
            let row_number = idx + 1;
            let first_name = cell(row, Some(columns.first_name));
            let last_name = cell(row, Some(columns.last_name));
            let nickname = cell(row, columns.nickname);
            let email = cell(row, columns.email).to_lowercase();

            if first_name.is_empty() && last_name.is_empty() && nickname.is_empty() && email.is_empty() {
                roster.blank_rows += 1;
                continue;
            }

            let raw_id = normalize_numeric_text(&cell(row, Some(columns.employee_id)));
            let employee_id = if raw_id.is_empty() {
                None
            } else {
                match parse_employee_id(&raw_id) {
                    Some(id) => Some(id),
                    None => {
                        warn!(row = row_number, value = %raw_id, "invalid employee id in roster");
                        roster.warnings.push(RosterWarning {
                            row: row_number,
                            message: format!("invalid employee id: {}", raw_id),
                        });
                        None
                    }
                }
            };

            let password = normalize_numeric_text(&cell(row, columns.password));
            let contact = normalize_numeric_text(&cell(row, columns.contact));

            roster.rows.push(RosterRow {
                row: row_number,
                employee_id,
                nickname,
                first_name,
                last_name,
                email,
                password: (!password.is_empty()).then_some(password),
                position: cell(row, columns.position),
                contact_number: (!contact.is_empty()).then_some(contact),
            });
        }

        Ok(roster)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn numeric_cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+(\.0+)?$").expect("valid numeric cell pattern"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

/// Spreadsheets export whole numbers as `1234.0`; turn those back into
/// `1234`. Anything else is returned trimmed.
pub fn normalize_numeric_text(text: &str) -> String {
    let text = text.trim();
    if numeric_cell_re().is_match(text) {
        let whole = text.split('.').next().unwrap_or(text);
        return whole.to_string();
    }
    text.to_string()
}

/// Parse a roster employee id. Fractional values truncate toward zero.
pub fn parse_employee_id(text: &str) -> Option<i64> {
    if let Ok(id) = text.parse::<i64>() {
        return Some(id);
    }
    let value = text.parse::<f64>().ok().filter(|f| f.is_finite())?;
    let truncated = value.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return None;
    }
    Some(truncated as i64)
}

pub fn is_valid_email(email: &str) -> bool {
    email_re().is_match(email)
}
