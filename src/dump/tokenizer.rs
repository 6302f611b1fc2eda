//! Tokenizers for bulk-insert `VALUES` clauses.
//!
//! [`tokenize_rows`] walks a whole clause and splits it into tuples;
//! [`tokenize_values`] turns one tuple interior into typed scalars. Both are
//! single forward scans that understand apostrophe-quoted literals and
//! backslash escapes.

use crate::error::DumpError;
use crate::record::FieldValue;

/// Rows recovered from one `VALUES` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesClause {
    pub rows: Vec<Vec<FieldValue>>,
    /// Bytes of input consumed, including the terminating `;` when present.
    pub consumed: usize,
    /// Whether scanning stopped at a `;`.
    pub terminated: bool,
}

/// Tokenize one tuple interior (the text between the outer parentheses).
///
/// # Example
/// ```
/// use dumpsync::dump::tokenize_values;
/// use dumpsync::FieldValue;
///
/// let values = tokenize_values("1,'Smith, John',NULL").unwrap();
/// assert_eq!(values, vec![
///     FieldValue::Int(1),
///     FieldValue::String("Smith, John".to_string()),
///     FieldValue::Null,
/// ]);
/// ```
pub fn tokenize_values(interior: &str) -> Result<Vec<FieldValue>, DumpError> {
    tokenize_values_at(interior, 0)
}

fn tokenize_values_at(interior: &str, base: usize) -> Result<Vec<FieldValue>, DumpError> {
    let mut fields = Vec::new();
    let mut field_start = 0;
    let mut depth = 0usize;
    let mut in_literal = false;
    let mut escape_pending = false;
    let mut literal_start = 0;

    for (i, ch) in interior.char_indices() {
        if escape_pending {
            escape_pending = false;
            continue;
        }
        match ch {
            '\\' => escape_pending = true,
            '\'' => {
                if !in_literal {
                    literal_start = i;
                }
                in_literal = !in_literal;
            }
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => depth = depth.saturating_sub(1),
            ',' if !in_literal && depth == 0 => {
                fields.push(infer_scalar(&interior[field_start..i]));
                field_start = i + 1;
            }
            _ => {}
        }
    }

    if in_literal {
        return Err(DumpError::UnterminatedLiteral {
            offset: base + literal_start,
        });
    }

    fields.push(infer_scalar(&interior[field_start..]));
    Ok(fields)
}

/// Split a `VALUES` clause into rows.
///
/// `clause` is the text following the `VALUES` keyword. Scanning stops at the
/// first `;` outside any row and literal; running out of input is accepted
/// only between rows.
pub fn tokenize_rows(clause: &str) -> Result<ValuesClause, DumpError> {
    let mut rows = Vec::new();
    let mut depth = 0usize;
    let mut row_start = 0;
    let mut in_literal = false;
    let mut escape_pending = false;
    let mut literal_start = 0;

    for (i, ch) in clause.char_indices() {
        if escape_pending {
            escape_pending = false;
            continue;
        }
        if ch == '\\' {
            escape_pending = true;
            continue;
        }
        if in_literal {
            if ch == '\'' {
                in_literal = false;
            }
            continue;
        }

        match ch {
            '\'' => {
                in_literal = true;
                literal_start = i;
            }
            '(' => {
                if depth == 0 {
                    row_start = i + 1;
                }
                depth += 1;
            }
            ')' => {
                if depth == 0 {
                    return Err(DumpError::UnbalancedParentheses { offset: i });
                }
                depth -= 1;
                if depth == 0 {
                    rows.push(tokenize_values_at(&clause[row_start..i], row_start)?);
                }
            }
            ';' if depth == 0 => {
                return Ok(ValuesClause {
                    rows,
                    consumed: i + 1,
                    terminated: true,
                });
            }
            _ => {}
        }
    }

    if in_literal {
        return Err(DumpError::UnterminatedLiteral {
            offset: literal_start,
        });
    }
    if depth > 0 {
        return Err(DumpError::UnbalancedParentheses {
            offset: row_start.saturating_sub(1),
        });
    }

    Ok(ValuesClause {
        rows,
        consumed: clause.len(),
        terminated: false,
    })
}

/// Infer the scalar type of one raw field.
pub fn infer_scalar(raw: &str) -> FieldValue {
    let text = raw.trim();

    if text.eq_ignore_ascii_case("NULL") {
        return FieldValue::Null;
    }
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return FieldValue::String(unescape_literal(&text[1..text.len() - 1]));
    }
    if is_integer(text) {
        if let Ok(i) = text.parse::<i64>() {
            return FieldValue::Int(i);
        }
        return FieldValue::String(text.to_string());
    }
    if is_decimal(text) {
        if let Ok(f) = text.parse::<f64>() {
            return FieldValue::Float(f);
        }
    }
    FieldValue::String(text.to_string())
}

fn unescape_literal(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_integer(text: &str) -> bool {
    is_digits(text.strip_prefix('-').unwrap_or(text))
}

fn is_decimal(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    match unsigned.split_once('.') {
        Some((whole, frac)) => is_digits(whole) && is_digits(frac),
        None => false,
    }
}
