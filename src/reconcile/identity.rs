//! Matching roster rows to employee ids in the canonical pool.

use std::collections::{HashMap, HashSet};

use crate::record::{field_text, Record};
use crate::roster::RosterRow;

use super::fields::{FIRST_NAME, LAST_NAME, LEGACY_STATUS, NICKNAME};

/// Lower-case and keep only ASCII letters and digits.
///
/// ```
/// use dumpsync::reconcile::normalize_key;
///
/// assert_eq!(normalize_key(" Dela Cruz-Jr. "), "delacruzjr");
/// assert_eq!(normalize_key("Employee ID"), "employeeid");
/// ```
pub fn normalize_key(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Normalized name components joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Build a key, or `None` when every component normalizes to empty.
    pub fn from_parts(parts: &[&str]) -> Option<Self> {
        let normalized: Vec<String> = parts.iter().map(|p| normalize_key(p)).collect();
        if normalized.iter().all(String::is_empty) {
            return None;
        }
        Some(Self(normalized.join("|")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Name keys over the canonical pool, built once before roster matching.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    by_first_last: HashMap<IdentityKey, Vec<i64>>,
    by_nick_last: HashMap<IdentityKey, Vec<i64>>,
    ids: HashSet<i64>,
    active: HashSet<i64>,
}

impl IdentityIndex {
    /// Index `pool` in iteration order; ids keep that order within a key.
    pub fn build<'a, I>(pool: I) -> Self
    where
        I: IntoIterator<Item = (i64, &'a Record)>,
    {
        let mut index = Self::default();
        for (id, record) in pool {
            let first = field_text(record, FIRST_NAME);
            let last = field_text(record, LAST_NAME);
            let nick = field_text(record, NICKNAME);

            if let Some(key) = IdentityKey::from_parts(&[first.as_str(), last.as_str()]) {
                index.by_first_last.entry(key).or_default().push(id);
            }
            if let Some(key) = IdentityKey::from_parts(&[nick.as_str(), last.as_str()]) {
                index.by_nick_last.entry(key).or_default().push(id);
            }
            if record.get(LEGACY_STATUS).and_then(|v| v.as_i64()) == Some(1) {
                index.active.insert(id);
            }
            index.ids.insert(id);
        }
        index
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Candidate ids for a roster row: explicit id, then first+last matches,
    /// then nickname+last matches, without repeats.
    pub fn candidates(&self, row: &RosterRow) -> Vec<i64> {
        let mut out = Vec::new();
        if let Some(id) = row.employee_id.filter(|id| self.contains(*id)) {
            out.push(id);
        }
        let lookups = [
            (&self.by_first_last, IdentityKey::from_parts(&[row.first_name.as_str(), row.last_name.as_str()])),
            (&self.by_nick_last, IdentityKey::from_parts(&[row.nickname.as_str(), row.last_name.as_str()])),
        ];
        for (map, key) in lookups {
            let Some(ids) = key.and_then(|key| map.get(&key)) else {
                continue;
            };
            for id in ids {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
        out
    }
}

/// Result of resolving one roster row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// `fallback` is set when every candidate had already been matched in
    /// this run and the unfiltered list was used.
    Matched { id: i64, fallback: bool },
    Unmatched { reason: String },
}

/// Run-scoped matcher: remembers which ids roster rows already claimed.
#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    index: IdentityIndex,
    matched: HashSet<i64>,
}

impl IdentityMatcher {
    pub fn new(index: IdentityIndex) -> Self {
        Self {
            index,
            matched: HashSet::new(),
        }
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    /// Resolve `row` to one id and mark it matched.
    ///
    /// The first candidate wins unless a later one is active; an explicit
    /// id only decides among inactive candidates.
    pub fn resolve(&mut self, row: &RosterRow) -> Resolution {
        let raw = self.index.candidates(row);
        if raw.is_empty() {
            return Resolution::Unmatched {
                reason: "no employee match".to_string(),
            };
        }

        let fresh: Vec<i64> = raw.iter().copied().filter(|id| !self.matched.contains(id)).collect();
        let fallback = fresh.is_empty();
        let candidates = if fallback { raw } else { fresh };

        let id = if candidates.len() > 1 {
            candidates
                .iter()
                .copied()
                .find(|id| self.index.active.contains(id))
                .unwrap_or(candidates[0])
        } else {
            candidates[0]
        };

        self.matched.insert(id);
        Resolution::Matched { id, fallback }
    }
}
