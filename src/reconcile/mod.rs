//! Three-source employee reconciliation.
//!
//! Dump rows, documents already in the store and roster rows are combined
//! into exactly one canonical document per employee id. Only roster-matched
//! employees end up active; everything else is forced inactive.
//!
//! # Example
//!
//! ```
//! use dumpsync::reconcile::{MergeOptions, ReconciliationMerger, RoleModuleTable};
//! use dumpsync::{FieldValue, Record};
//!
//! let mut row = Record::new();
//! row.insert("id".to_string(), FieldValue::Int(7));
//! row.insert("firstname".to_string(), FieldValue::from("Ana"));
//!
//! let table = RoleModuleTable::defaults();
//! let merger = ReconciliationMerger::new(&table, MergeOptions::new("2026-01-01T00:00:00Z", "roster.csv"));
//! let outcome = merger.merge(&[row], &[], &[]);
//!
//! assert_eq!(outcome.tally.inactive, 1);
//! assert_eq!(outcome.documents[&7].fields["marga_active"], FieldValue::Bool(false));
//! ```

pub mod credential;
pub mod identity;
pub mod merger;
pub mod roles;
pub mod username;

pub use credential::{CredentialHasher, HashedCredential};
pub use identity::{normalize_key, IdentityIndex, IdentityKey, IdentityMatcher, Resolution};
pub use merger::{
    CanonicalDocument, IdentityState, MergeOptions, MergeTally, Origin, ReconciliationMerger,
    ReconciliationOutcome, UnmatchedRow,
};
pub use roles::{classify_position, normalize_modules, Role, RoleModuleTable};
pub use username::{sanitize_username, username_candidates, UsernameRegistry};

/// Field names on employee documents.
pub mod fields {
    pub const ID: &str = "id";
    pub const FIRST_NAME: &str = "firstname";
    pub const LAST_NAME: &str = "lastname";
    pub const NICKNAME: &str = "nickname";
    /// Legacy status column; `1` marks a currently employed person.
    pub const LEGACY_STATUS: &str = "estatus";
    pub const USERNAME: &str = "username";
    pub const EMAIL: &str = "email";
    pub const CONTACT_NUMBER: &str = "contact_number";

    pub const ACTIVE: &str = "marga_active";
    pub const ACCOUNT_ACTIVE: &str = "marga_account_active";
    pub const ROLE: &str = "marga_role";
    pub const ALLOWED_MODULES: &str = "marga_allowed_modules";
    pub const MODULES_CONFIGURED: &str = "allowed_modules_configured";
    pub const UPDATED_AT: &str = "marga_updated_at";
    pub const SOURCE_FILE: &str = "marga_source_file";
    pub const SOURCE_ROW: &str = "marga_source_row";
    pub const LOGIN_EMAIL: &str = "marga_login_email";
    pub const PASSWORD_UPDATED_AT: &str = "marga_password_updated_at";
}
