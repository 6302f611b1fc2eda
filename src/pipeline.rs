//! End-to-end reconciliation run: fetch, merge, write.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::dump::extract_table;
use crate::error::PipelineError;
use crate::reconcile::{
    CredentialHasher, MergeOptions, MergeTally, ReconciliationMerger, RoleModuleTable, UnmatchedRow,
};
use crate::record::Record;
use crate::roster::Roster;
use crate::store::DocumentStore;

/// What the dump contributed to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DumpStats {
    pub table: String,
    pub statements: usize,
    pub rows: usize,
    pub dropped_rows: usize,
}

/// Roster-level counters that never reach the merger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterStats {
    pub rows: usize,
    pub blank_rows: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertFailure {
    pub id: i64,
    pub reason: String,
}

/// Machine-readable summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub source_file: String,
    pub collection: String,
    pub dump: DumpStats,
    pub roster: RosterStats,
    pub tally: MergeTally,
    pub unmatched: Vec<UnmatchedRow>,
    /// Documents written (zero on a dry run).
    pub written: usize,
    pub failures: Vec<UpsertFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of [`ReconcileJob::run`]: the report plus the documents that were
/// (or on a dry run would have been) written, in id order.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub report: RunReport,
    pub documents: Vec<(i64, Record)>,
}

/// Settings for a reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileJob {
    pub employee_table: String,
    pub employee_collection: String,
    pub role_collection: String,
    pub dry_run: bool,
    pub hasher: CredentialHasher,
}

impl ReconcileJob {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            employee_table: config.employee_table.clone(),
            employee_collection: config.collections.employees.clone(),
            role_collection: config.collections.role_permissions.clone(),
            dry_run: false,
            hasher: CredentialHasher::default(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_hasher(mut self, hasher: CredentialHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Run with the current time as the run timestamp.
    pub async fn run<S: DocumentStore>(
        &self,
        store: &S,
        dump: &str,
        roster: &Roster,
        source_file: &str,
    ) -> Result<PipelineRun, PipelineError> {
        self.run_at(store, dump, roster, source_file, Utc::now()).await
    }

    /// Run with a fixed timestamp.
    ///
    /// # Arguments
    ///
    /// * `store` - Document store holding employees and role permissions
    /// * `dump` - Full dump text
    /// * `roster` - Parsed roster
    /// * `source_file` - Roster file name recorded on activated documents
    /// * `now` - Timestamp written to `marga_updated_at`
    ///
    /// # Errors
    ///
    /// Fails before anything is written when the employee table is missing
    /// or malformed, or when either collection cannot be fetched. Individual
    /// upsert failures are collected in the report instead.
    pub async fn run_at<S: DocumentStore>(
        &self,
        store: &S,
        dump: &str,
        roster: &Roster,
        source_file: &str,
        now: DateTime<Utc>,
    ) -> Result<PipelineRun, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, dry_run = self.dry_run, "starting reconciliation");

        let extraction = extract_table(dump, &self.employee_table)
            .map_err(|source| PipelineError::Dump {
                table: self.employee_table.clone(),
                source,
            })?
            .filter(|extraction| !extraction.records.is_empty())
            .ok_or_else(|| PipelineError::EmptyTable(self.employee_table.clone()))?;
        info!(
            table = %extraction.table,
            rows = extraction.records.len(),
            dropped = extraction.dropped_rows,
            "employee rows extracted"
        );

        let existing = store.fetch_collection(&self.employee_collection).await?;
        let role_docs = store.fetch_collection(&self.role_collection).await?;
        let roles = RoleModuleTable::defaults().with_overrides(&role_docs);

        let options = MergeOptions::new(now.to_rfc3339_opts(SecondsFormat::Micros, false), source_file);
        let outcome = ReconciliationMerger::new(&roles, options)
            .with_hasher(self.hasher)
            .merge(&extraction.records, &existing, &roster.rows);
        let documents = outcome.emit();

        let mut written = 0;
        let mut failures = Vec::new();
        if self.dry_run {
            info!(documents = documents.len(), "dry run; skipping writes");
        } else {
            for (id, fields) in &documents {
                match store.upsert(&self.employee_collection, &id.to_string(), fields).await {
                    Ok(()) => written += 1,
                    Err(err) => {
                        warn!(id, error = %err, "upsert failed");
                        failures.push(UpsertFailure {
                            id: *id,
                            reason: err.to_string(),
                        });
                    }
                }
            }
            info!(written, failed = failures.len(), "write phase complete");
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            source_file: source_file.to_string(),
            collection: self.employee_collection.clone(),
            dump: DumpStats {
                table: extraction.table.clone(),
                statements: extraction.statements,
                rows: extraction.records.len(),
                dropped_rows: extraction.dropped_rows,
            },
            roster: RosterStats {
                rows: roster.rows.len(),
                blank_rows: roster.blank_rows,
                warnings: roster.warnings.len(),
            },
            tally: outcome.tally,
            unmatched: outcome.unmatched,
            written,
            failures,
        };

        Ok(PipelineRun { report, documents })
    }
}
