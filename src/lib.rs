//! # dumpsync: SQL dump extraction and employee reconciliation
//!
//! dumpsync recovers typed records from a MySQL-style dump and merges them,
//! together with an HR roster and the documents already in a remote
//! document store, into exactly one canonical document per employee.
//!
//! ## Features
//!
//! - **Dump extraction**: quote- and escape-aware `INSERT ... VALUES` tokenizer,
//!   `CREATE TABLE` column recovery, per-table outcomes for multi-table runs
//! - **Reconciliation**: identity matching across dump, store and roster,
//!   forced deactivation of everything the roster does not name, unique
//!   usernames, role/module assignment and PBKDF2 credential hashing
//! - **Store client**: paginated fetch and field-masked upsert against a
//!   Firestore-style REST API
//!
//! ## Example: extracting a table
//!
//! ```
//! use dumpsync::dump::extract_table;
//! use dumpsync::FieldValue;
//!
//! let dump = "CREATE TABLE `tbl_area` (\n  `id` int(11),\n  `name` varchar(20)\n) ENGINE=InnoDB;\n\
//!             INSERT INTO `tbl_area` VALUES (1,'North, East'),(2,NULL);";
//!
//! let table = extract_table(dump, "tbl_area").unwrap().unwrap();
//! assert_eq!(table.records.len(), 2);
//! assert_eq!(table.records[0]["name"], FieldValue::from("North, East"));
//! assert!(table.records[1]["name"].is_null());
//! ```

pub mod config;
pub mod dump;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod roster;
pub mod serialization;
pub mod store;

// Re-export key types
pub use error::{ConfigError, DumpError, PipelineError, RosterError, StoreError};
pub use record::{FieldValue, Record};

pub use config::{resolve_store_config, StoreOverrides, SyncConfig};
pub use dump::{extract_table, extract_tables, ExtractionSummary, TableExtraction, TableOutcome};
pub use pipeline::{PipelineRun, ReconcileJob, RunReport};
pub use roster::{Roster, RosterGrid, RosterRow};
pub use serialization::{write_table, OutputFormat, SerializationError};
pub use store::{DocumentStore, StoreClient, StoreConfig};
