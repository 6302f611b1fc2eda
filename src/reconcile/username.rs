//! Unique username derivation.

use std::collections::HashSet;

pub const MAX_USERNAME_LEN: usize = 48;

/// Lower-case, keep `[a-z0-9._-]`, trim leading/trailing separators and cap
/// the length.
pub fn sanitize_username(text: &str) -> String {
    let kept: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        .collect();
    kept.trim_matches(|c| matches!(c, '.' | '_' | '-'))
        .chars()
        .take(MAX_USERNAME_LEN)
        .collect()
}

/// Raw username candidates in preference order.
pub fn username_candidates(
    email: &str,
    nickname: &str,
    first_name: &str,
    last_name: &str,
    id: i64,
) -> Vec<String> {
    let mut out = Vec::new();

    let email = email.trim().to_lowercase();
    if let Some((local, _)) = email.split_once('@') {
        out.push(local.to_string());
    }
    let nickname = nickname.trim();
    if !nickname.is_empty() {
        out.push(nickname.to_string());
    }
    let first = first_name.trim();
    let last = last_name.trim();
    if !first.is_empty() && !last.is_empty() {
        out.push(format!("{}.{}", first, last));
    }
    if !first.is_empty() {
        out.push(first.to_string());
    }
    out.push(format!("emp{}", id));
    out
}

/// Usernames claimed during one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct UsernameRegistry {
    claimed: HashSet<String>,
}

impl UsernameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a username that already exists in the store.
    pub fn reserve(&mut self, existing: &str) {
        let name = sanitize_username(existing);
        if !name.is_empty() {
            self.claimed.insert(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.claimed.contains(name)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Claim a unique username for identity `id`.
    ///
    /// `current` (the identity's previous username) is released first so the
    /// identity can take it back without a suffix. The first candidate that
    /// sanitizes to a non-empty string is the base; collisions get a numeric
    /// suffix starting at 2.
    pub fn claim(&mut self, candidates: &[String], id: i64, current: Option<&str>) -> String {
        if let Some(current) = current {
            self.claimed.remove(&sanitize_username(current));
        }

        let base = candidates
            .iter()
            .map(|raw| sanitize_username(raw))
            .find(|name| !name.is_empty())
            .unwrap_or_else(|| format!("emp{}", id));

        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.claimed.contains(&candidate) {
            candidate = format!("{}{}", base, suffix);
            suffix += 1;
        }
        self.claimed.insert(candidate.clone());
        candidate
    }
}
