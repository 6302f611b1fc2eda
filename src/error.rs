//! Error types for each layer.

use thiserror::Error;

/// Structural failure while tokenizing a `VALUES` clause.
///
/// Either variant means the clause cannot be trusted; callers abort the
/// affected table instead of keeping truncated rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DumpError {
    #[error("unterminated quoted literal starting at byte {offset}")]
    UnterminatedLiteral { offset: usize },

    #[error("unbalanced parentheses in VALUES clause at byte {offset}")]
    UnbalancedParentheses { offset: usize },
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("cannot detect roster header row (need employee id, first name and last name columns)")]
    HeaderNotFound,

    #[error("failed to read roster: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),

    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected store payload: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing store setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dump error in table {table}: {source}")]
    Dump {
        table: String,
        #[source]
        source: DumpError,
    },

    #[error("table {0} has no structure block or no rows in the dump")]
    EmptyTable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
