//! Typed scalar values and ordered records.
//!
//! Everything that flows through dumpsync (rows recovered from a dump,
//! documents fetched from the store, canonical documents written back) is a
//! [`Record`]: an insertion-ordered map from field name to [`FieldValue`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field value.
///
/// Dump rows only ever produce `String`, `Int`, `Float` and `Null`. The
/// remaining variants arrive from the document store or are written by
/// reconciliation. `Raw` holds a store value with no native variant
/// (timestamps, geo points, references, bytes) in its typed wire form so it
/// is written back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FieldValue>),
    Map(IndexMap<String, FieldValue>),
    Null,
    Raw(serde_json::Value),
}

/// One row or document, keyed by column/field name in source order.
pub type Record = IndexMap<String, FieldValue>;

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Integer view of the value.
    ///
    /// Integer text (as produced by spreadsheet or legacy string columns) is
    /// accepted as well, so `'42'` and `42` identify the same row.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Text used for name matching and username candidates. Null is empty.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Render the value as a SQL literal using the dump's escape rules.
    ///
    /// Only the scalar variants have a dump representation; the others are
    /// written as quoted JSON text.
    pub fn to_sql_literal(&self) -> String {
        match self {
            FieldValue::Null => "NULL".to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::Float(f) => {
                let text = f.to_string();
                if text.contains('.') {
                    text
                } else {
                    format!("{}.0", text)
                }
            }
            FieldValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            FieldValue::String(s) => quote_sql_string(s),
            FieldValue::List(_) | FieldValue::Map(_) | FieldValue::Raw(_) => {
                let json = serde_json::to_string(self).unwrap_or_default();
                quote_sql_string(&json)
            }
        }
    }
}

fn quote_sql_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::List(l) => write!(f, "{:?}", l),
            FieldValue::Map(m) => write!(f, "{:?}", m),
            FieldValue::Null => write!(f, "null"),
            FieldValue::Raw(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items.into_iter().map(FieldValue::String).collect())
    }
}

/// Text of a record field, empty when missing or null.
pub fn field_text(record: &Record, field: &str) -> String {
    record.get(field).map(FieldValue::to_text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_serializes_in_column_order() {
        let mut record = Record::new();
        record.insert("id".to_string(), FieldValue::Int(7));
        record.insert("name".to_string(), FieldValue::from("Ana"));
        record.insert("rate".to_string(), FieldValue::Float(1.5));
        record.insert("notes".to_string(), FieldValue::Null);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":7,"name":"Ana","rate":1.5,"notes":null}"#);
    }

    #[test]
    fn test_as_i64_accepts_integer_text() {
        assert_eq!(FieldValue::Int(3).as_i64(), Some(3));
        assert_eq!(FieldValue::from(" 12 ").as_i64(), Some(12));
        assert_eq!(FieldValue::from("12a").as_i64(), None);
        assert_eq!(FieldValue::Float(1.0).as_i64(), None);
    }

    #[test]
    fn test_raw_store_value_serializes_verbatim() {
        let raw = FieldValue::Raw(json!({"timestampValue": "2020-01-01T00:00:00Z"}));
        assert_eq!(
            serde_json::to_string(&raw).unwrap(),
            r#"{"timestampValue":"2020-01-01T00:00:00Z"}"#
        );
        assert_eq!(raw.to_text(), r#"{"timestampValue":"2020-01-01T00:00:00Z"}"#);
        assert_eq!(raw.as_str(), None);
    }

    #[test]
    fn test_sql_literal_escapes() {
        assert_eq!(FieldValue::from("O'Brien").to_sql_literal(), r"'O\'Brien'");
        assert_eq!(FieldValue::from("a\\b\n").to_sql_literal(), r"'a\\b\n'");
        assert_eq!(FieldValue::Float(2.0).to_sql_literal(), "2.0");
        assert_eq!(FieldValue::Null.to_sql_literal(), "NULL");
    }
}
