//! Store + dump merge, forced deactivation and roster overlay.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::record::{field_text, FieldValue, Record};
use crate::roster::RosterRow;
use crate::store::codec::DOC_ID_FIELD;

use super::credential::CredentialHasher;
use super::fields;
use super::identity::{IdentityIndex, IdentityMatcher, Resolution};
use super::roles::{classify_position, Role, RoleModuleTable};
use super::username::{username_candidates, UsernameRegistry};

/// Per-run inputs that end up on activated documents.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// RFC 3339 timestamp written to `marga_updated_at`.
    pub run_timestamp: String,
    /// Roster file name written to `marga_source_file`.
    pub source_file: String,
}

impl MergeOptions {
    pub fn new(run_timestamp: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            run_timestamp: run_timestamp.into(),
            source_file: source_file.into(),
        }
    }
}

/// Lifecycle of one identity within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdentityState {
    DumpOnly,
    Merged,
    Deactivated,
    Activated,
}

/// Where a canonical document's fields came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Dump,
    Store,
    DumpAndStore,
}

/// The single reconciled document for one employee id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalDocument {
    pub id: i64,
    pub fields: Record,
    pub origin: Origin,
    pub state: IdentityState,
    /// Roster row that activated this document, if any.
    pub source_row: Option<usize>,
}

impl CanonicalDocument {
    /// Build from a dump row alone.
    pub fn from_dump(id: i64, row: &Record) -> Self {
        let mut record = row.clone();
        record.insert(fields::ID.to_string(), FieldValue::Int(id));
        CanonicalDocument {
            id,
            fields: record,
            origin: Origin::Dump,
            state: IdentityState::DumpOnly,
            source_row: None,
        }
    }

    /// Layer the dump fields over the stored document for the same id.
    pub fn merge_store(&mut self, stored: &Record) {
        let dump_fields = std::mem::replace(&mut self.fields, stored.clone());
        for (key, value) in dump_fields {
            self.fields.insert(key, value);
        }
        self.origin = Origin::DumpAndStore;
        self.state = IdentityState::Merged;
    }

    /// Carry a store-only document over unchanged.
    pub fn from_store(id: i64, stored: &Record) -> Self {
        CanonicalDocument {
            id,
            fields: stored.clone(),
            origin: Origin::Store,
            state: IdentityState::Merged,
            source_row: None,
        }
    }

    /// Force the document inactive and normalize its role.
    pub fn deactivate(&mut self, roles: &RoleModuleTable) {
        let role = Role::from_name(&field_text(&self.fields, fields::ROLE)).unwrap_or(Role::Viewer);
        self.set(fields::ACTIVE, false);
        self.set(fields::ACCOUNT_ACTIVE, false);
        self.set_role(role, roles);
        self.state = IdentityState::Deactivated;
    }

    /// Activate from a matched roster row. Returns the username assigned.
    pub fn activate(
        &mut self,
        row: &RosterRow,
        roles: &RoleModuleTable,
        usernames: &mut UsernameRegistry,
        hasher: &CredentialHasher,
        options: &MergeOptions,
    ) -> String {
        self.set(fields::ACTIVE, true);
        self.set(fields::ACCOUNT_ACTIVE, true);
        self.set_role(classify_position(&row.position), roles);
        self.set(fields::UPDATED_AT, options.run_timestamp.as_str());
        self.set(fields::SOURCE_FILE, options.source_file.as_str());
        self.set(fields::SOURCE_ROW, row.row as i64);

        if let Some(contact) = &row.contact_number {
            self.set(fields::CONTACT_NUMBER, contact.as_str());
        }
        if row.email_is_valid() {
            self.set(fields::EMAIL, row.email.as_str());
            self.set(fields::LOGIN_EMAIL, row.email.as_str());
        }

        let current = field_text(&self.fields, fields::USERNAME);
        let candidates = username_candidates(
            &row.email,
            &row.nickname,
            &row.first_name,
            &row.last_name,
            self.id,
        );
        let username = usernames.claim(&candidates, self.id, Some(current.as_str()));
        self.set(fields::USERNAME, username.as_str());

        if let Some(password) = row.password.as_deref() {
            hasher.hash(password).apply_to(&mut self.fields);
            self.set(fields::PASSWORD_UPDATED_AT, options.run_timestamp.as_str());
        }

        self.state = IdentityState::Activated;
        self.source_row = Some(row.row);
        username
    }

    pub fn is_active(&self) -> bool {
        self.fields.get(fields::ACTIVE).and_then(FieldValue::as_bool) == Some(true)
    }

    /// Fields ready to write back, without reserved store fields.
    pub fn into_fields(mut self) -> Record {
        self.fields.shift_remove(DOC_ID_FIELD);
        self.fields
    }

    fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    fn set_role(&mut self, role: Role, roles: &RoleModuleTable) {
        self.set(fields::ROLE, role.as_str());
        self.set(fields::ALLOWED_MODULES, roles.modules(role).to_vec());
        self.set(fields::MODULES_CONFIGURED, false);
    }
}

/// A roster row that resolved to no employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedRow {
    pub row: usize,
    pub name: String,
    pub reason: String,
}

/// Counters for one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeTally {
    pub dump_rows: usize,
    pub dump_rows_without_id: usize,
    pub duplicate_dump_ids: usize,
    pub store_docs: usize,
    pub store_docs_without_id: usize,
    pub store_only_docs: usize,
    pub roster_rows: usize,
    /// Roster rows resolved to an id, re-matches included.
    pub matched: usize,
    /// Roster rows that fell back to an id already matched in this run.
    pub rematched: usize,
    pub unmatched: usize,
    pub active: usize,
    pub inactive: usize,
}

/// Result of [`ReconciliationMerger::merge`].
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    /// Canonical documents in pool order.
    pub documents: IndexMap<i64, CanonicalDocument>,
    pub unmatched: Vec<UnmatchedRow>,
    pub tally: MergeTally,
}

impl ReconciliationOutcome {
    /// Documents to write, in ascending id order.
    pub fn emit(&self) -> Vec<(i64, Record)> {
        let mut out: Vec<(i64, Record)> = self
            .documents
            .values()
            .map(|doc| (doc.id, doc.clone().into_fields()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }
}

/// Combines dump rows, the store snapshot and the roster.
pub struct ReconciliationMerger<'a> {
    roles: &'a RoleModuleTable,
    options: MergeOptions,
    hasher: CredentialHasher,
}

impl<'a> ReconciliationMerger<'a> {
    pub fn new(roles: &'a RoleModuleTable, options: MergeOptions) -> Self {
        Self {
            roles,
            options,
            hasher: CredentialHasher::default(),
        }
    }

    pub fn with_hasher(mut self, hasher: CredentialHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Run the full merge.
    ///
    /// # Arguments
    ///
    /// * `dump_rows` - Employee rows recovered from the dump, in dump order
    /// * `store_docs` - Documents currently in the employee collection
    /// * `roster` - Authoritative roster rows, in file order
    ///
    /// # Returns
    ///
    /// One canonical document per id plus unmatched roster rows and tallies.
    pub fn merge(&self, dump_rows: &[Record], store_docs: &[Record], roster: &[RosterRow]) -> ReconciliationOutcome {
        let mut tally = MergeTally {
            dump_rows: dump_rows.len(),
            store_docs: store_docs.len(),
            roster_rows: roster.len(),
            ..Default::default()
        };

        let mut stored_by_id: IndexMap<i64, &Record> = IndexMap::new();
        for doc in store_docs {
            match doc.get(fields::ID) {
                Some(FieldValue::Int(id)) => {
                    stored_by_id.insert(*id, doc);
                }
                _ => {
                    debug!(doc_id = %field_text(doc, DOC_ID_FIELD), "store document has no integer id");
                    tally.store_docs_without_id += 1;
                }
            }
        }

        let mut documents: IndexMap<i64, CanonicalDocument> = IndexMap::new();
        for row in dump_rows {
            let Some(id) = row.get(fields::ID).and_then(FieldValue::as_i64) else {
                tally.dump_rows_without_id += 1;
                continue;
            };
            if documents.contains_key(&id) {
                warn!(id, "duplicate id in dump; later row wins");
                tally.duplicate_dump_ids += 1;
            }
            let mut doc = CanonicalDocument::from_dump(id, row);
            if let Some(stored) = stored_by_id.get(&id) {
                doc.merge_store(stored);
            }
            documents.insert(id, doc);
        }

        for (id, stored) in &stored_by_id {
            if !documents.contains_key(id) {
                documents.insert(*id, CanonicalDocument::from_store(*id, stored));
                tally.store_only_docs += 1;
            }
        }

        let mut usernames = UsernameRegistry::new();
        for doc in documents.values_mut() {
            doc.deactivate(self.roles);
            usernames.reserve(&field_text(&doc.fields, fields::USERNAME));
        }

        info!(
            documents = documents.len(),
            store_only = tally.store_only_docs,
            "canonical pool built; all documents deactivated"
        );

        let index = IdentityIndex::build(documents.iter().map(|(id, doc)| (*id, &doc.fields)));
        let mut matcher = IdentityMatcher::new(index);
        let mut unmatched = Vec::new();

        for row in roster {
            match matcher.resolve(row) {
                Resolution::Matched { id, fallback } => {
                    let Some(doc) = documents.get_mut(&id) else {
                        continue;
                    };
                    let username = doc.activate(row, self.roles, &mut usernames, &self.hasher, &self.options);
                    debug!(row = row.row, id, username = %username, fallback, "roster row matched");
                    tally.matched += 1;
                    if fallback {
                        tally.rematched += 1;
                    }
                }
                Resolution::Unmatched { reason } => {
                    warn!(row = row.row, name = %row.display_name(), "roster row unmatched");
                    unmatched.push(UnmatchedRow {
                        row: row.row,
                        name: row.display_name(),
                        reason,
                    });
                }
            }
        }

        tally.unmatched = unmatched.len();
        tally.active = documents.values().filter(|doc| doc.is_active()).count();
        tally.inactive = documents.len() - tally.active;

        info!(
            matched = tally.matched,
            unmatched = tally.unmatched,
            active = tally.active,
            inactive = tally.inactive,
            "reconciliation complete"
        );

        ReconciliationOutcome {
            documents,
            unmatched,
            tally,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::codec::{decode_document, encode_fields};

    const NOW: &str = "2026-03-01T08:00:00+00:00";

    fn record(pairs: &[(&str, FieldValue)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn dump_employee(id: i64, first: &str, last: &str) -> Record {
        record(&[
            ("id", FieldValue::Int(id)),
            ("firstname", FieldValue::from(first)),
            ("lastname", FieldValue::from(last)),
            ("nickname", FieldValue::Null),
            ("estatus", FieldValue::Int(1)),
        ])
    }

    fn roster_row(row: usize, id: Option<i64>, first: &str, last: &str, position: &str) -> RosterRow {
        RosterRow {
            row,
            employee_id: id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            position: position.to_string(),
            ..Default::default()
        }
    }

    fn merger(table: &RoleModuleTable) -> ReconciliationMerger<'_> {
        ReconciliationMerger::new(table, MergeOptions::new(NOW, "roster.csv"))
            .with_hasher(CredentialHasher::with_iterations(1))
    }

    #[test]
    fn test_dump_fields_win_over_store() {
        let table = RoleModuleTable::defaults();
        let stored = record(&[
            ("id", FieldValue::Int(5)),
            ("_docId", FieldValue::from("5")),
            ("firstname", FieldValue::from("Old")),
            ("username", FieldValue::from("ana")),
            ("extra", FieldValue::from("kept")),
        ]);
        let outcome = merger(&table).merge(&[dump_employee(5, "Ana", "Reyes")], &[stored], &[]);

        let doc = &outcome.documents[&5];
        assert_eq!(doc.origin, Origin::DumpAndStore);
        assert_eq!(doc.state, IdentityState::Deactivated);
        assert_eq!(doc.fields["firstname"], FieldValue::from("Ana"));
        assert_eq!(doc.fields["extra"], FieldValue::from("kept"));

        let emitted = outcome.emit();
        assert!(!emitted[0].1.contains_key("_docId"));
    }

    #[test]
    fn test_dump_only_until_store_merged() {
        let mut doc = CanonicalDocument::from_dump(5, &dump_employee(5, "Ana", "Reyes"));
        assert_eq!(doc.state, IdentityState::DumpOnly);
        assert_eq!(doc.origin, Origin::Dump);

        doc.merge_store(&record(&[
            ("id", FieldValue::Int(5)),
            ("username", FieldValue::from("ana")),
            ("firstname", FieldValue::from("Old")),
        ]));
        assert_eq!(doc.state, IdentityState::Merged);
        assert_eq!(doc.origin, Origin::DumpAndStore);
        assert_eq!(doc.fields["firstname"], FieldValue::from("Ana"));
        assert_eq!(doc.fields["username"], FieldValue::from("ana"));
    }

    #[test]
    fn test_store_values_without_native_type_survive_write_back() {
        let table = RoleModuleTable::defaults();
        let stored = serde_json::json!({
            "name": "projects/p/databases/(default)/documents/tbl_employee/900",
            "fields": {
                "id": {"integerValue": "900"},
                "hired_at": {"timestampValue": "2020-01-01T00:00:00Z"},
                "home": {"geoPointValue": {"latitude": 14.55, "longitude": 121.02}},
                "photo": {"referenceValue": "projects/p/databases/(default)/documents/photos/900"},
                "badge": {"bytesValue": "aGVsbG8="}
            }
        });
        let doc = decode_document(&stored);

        let outcome = merger(&table).merge(&[], &[doc], &[]);
        let emitted = outcome.emit();
        assert_eq!(emitted.len(), 1);
        let encoded = encode_fields(&emitted[0].1);

        for field in ["hired_at", "home", "photo", "badge"] {
            assert_eq!(encoded[field], stored["fields"][field], "{} changed", field);
        }
        assert_eq!(encoded["marga_active"], serde_json::json!({"booleanValue": false}));
    }

    #[test]
    fn test_branch_manager_becomes_admin() {
        let table = RoleModuleTable::defaults();
        let mut row = roster_row(3, Some(5), "Ana", "Reyes", "Branch Manager");
        row.email = "ana.reyes@example.com".to_string();
        row.password = Some("1234".to_string());
        row.contact_number = Some("09171234567".to_string());

        let outcome = merger(&table).merge(&[dump_employee(5, "Ana", "Reyes")], &[], &[row]);
        let doc = &outcome.documents[&5];

        assert_eq!(doc.state, IdentityState::Activated);
        assert_eq!(doc.source_row, Some(3));
        assert_eq!(doc.fields["marga_active"], FieldValue::Bool(true));
        assert_eq!(doc.fields["marga_account_active"], FieldValue::Bool(true));
        assert_eq!(doc.fields["marga_role"], FieldValue::from("admin"));
        assert_eq!(
            doc.fields["marga_allowed_modules"],
            FieldValue::from(table.modules(Role::Admin).to_vec())
        );
        assert_eq!(doc.fields["allowed_modules_configured"], FieldValue::Bool(false));
        assert_eq!(doc.fields["marga_updated_at"], FieldValue::from(NOW));
        assert_eq!(doc.fields["marga_source_file"], FieldValue::from("roster.csv"));
        assert_eq!(doc.fields["marga_source_row"], FieldValue::Int(3));
        assert_eq!(doc.fields["email"], FieldValue::from("ana.reyes@example.com"));
        assert_eq!(doc.fields["marga_login_email"], FieldValue::from("ana.reyes@example.com"));
        assert_eq!(doc.fields["contact_number"], FieldValue::from("09171234567"));
        assert_eq!(doc.fields["username"], FieldValue::from("ana.reyes"));
        assert_eq!(doc.fields["password_algo"], FieldValue::from("PBKDF2-SHA256"));
        assert_eq!(doc.fields["marga_password_updated_at"], FieldValue::from(NOW));
        assert!(!doc.fields.values().any(|v| v.as_str() == Some("1234")));
    }

    #[test]
    fn test_overridden_modules_used_on_activation() {
        let overrides = record(&[
            ("role", FieldValue::from("admin")),
            ("allowed_modules", FieldValue::from("billing, reports")),
        ]);
        let table = RoleModuleTable::defaults().with_overrides(&[overrides]);
        let row = roster_row(2, None, "Ana", "Reyes", "Branch Manager");

        let outcome = merger(&table).merge(&[dump_employee(5, "Ana", "Reyes")], &[], &[row]);
        assert_eq!(
            outcome.documents[&5].fields["marga_allowed_modules"],
            FieldValue::from(vec!["billing".to_string(), "reports".to_string()])
        );
    }

    #[test]
    fn test_store_only_documents_deactivated_with_viewer_role() {
        let table = RoleModuleTable::defaults();
        let stored = record(&[
            ("id", FieldValue::Int(900)),
            ("marga_active", FieldValue::Bool(true)),
            ("marga_role", FieldValue::from("superuser")),
        ]);
        let no_id = record(&[("_docId", FieldValue::from("abc"))]);

        let outcome = merger(&table).merge(&[dump_employee(1, "A", "B")], &[stored, no_id], &[]);

        let doc = &outcome.documents[&900];
        assert_eq!(doc.origin, Origin::Store);
        assert!(!doc.is_active());
        assert_eq!(doc.fields["marga_account_active"], FieldValue::Bool(false));
        assert_eq!(doc.fields["marga_role"], FieldValue::from("viewer"));
        assert_eq!(outcome.tally.store_only_docs, 1);
        assert_eq!(outcome.tally.store_docs_without_id, 1);
        assert_eq!(outcome.documents.len(), 2);
    }

    #[test]
    fn test_duplicate_and_missing_dump_ids() {
        let table = RoleModuleTable::defaults();
        let rows = vec![
            dump_employee(1, "First", "Copy"),
            record(&[("firstname", FieldValue::from("NoId"))]),
            dump_employee(1, "Second", "Copy"),
        ];
        let outcome = merger(&table).merge(&rows, &[], &[]);

        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.documents[&1].fields["firstname"], FieldValue::from("Second"));
        assert_eq!(outcome.tally.duplicate_dump_ids, 1);
        assert_eq!(outcome.tally.dump_rows_without_id, 1);
    }

    #[test]
    fn test_usernames_unique_across_run() {
        let table = RoleModuleTable::defaults();
        let stored = record(&[("id", FieldValue::Int(50)), ("username", FieldValue::from("ana"))]);
        let rows = vec![dump_employee(1, "Ana", "Reyes"), dump_employee(2, "Ana", "Santos")];
        let mut first = roster_row(2, Some(1), "Ana", "Reyes", "");
        first.nickname = "Ana".to_string();
        let mut second = roster_row(3, Some(2), "Ana", "Santos", "");
        second.nickname = "Ana".to_string();

        let outcome = merger(&table).merge(&rows, &[stored], &[first, second]);

        assert_eq!(outcome.documents[&1].fields["username"], FieldValue::from("ana2"));
        assert_eq!(outcome.documents[&2].fields["username"], FieldValue::from("ana3"));
        assert_eq!(outcome.documents[&50].fields["username"], FieldValue::from("ana"));
    }

    #[test]
    fn test_unmatched_and_rematched_rows() {
        let table = RoleModuleTable::defaults();
        let rows = vec![dump_employee(1, "Ana", "Reyes")];
        let roster = vec![
            roster_row(2, None, "Ana", "Reyes", "Collector"),
            roster_row(3, None, "Ana", "Reyes", "Cashier"),
            roster_row(4, None, "Nobody", "Here", ""),
        ];
        let outcome = merger(&table).merge(&rows, &[], &roster);

        assert_eq!(outcome.tally.matched, 2);
        assert_eq!(outcome.tally.rematched, 1);
        assert_eq!(outcome.unmatched, vec![UnmatchedRow {
            row: 4,
            name: "Nobody Here".to_string(),
            reason: "no employee match".to_string(),
        }]);
        assert_eq!(outcome.documents[&1].fields["marga_role"], FieldValue::from("billing"));
        assert_eq!(outcome.documents[&1].source_row, Some(3));
    }

    #[test]
    fn test_merge_is_idempotent_under_fixed_timestamp() {
        let table = RoleModuleTable::defaults();
        let rows = vec![dump_employee(1, "Ana", "Reyes"), dump_employee(2, "Ben", "Cruz")];
        let roster = vec![roster_row(2, None, "Ben", "Cruz", "Driver")];

        let first = merger(&table).merge(&rows, &[], &roster);
        let stored: Vec<Record> = first.emit().into_iter().map(|(_, doc)| doc).collect();
        let second = merger(&table).merge(&rows, &stored, &roster);

        assert_eq!(first.emit(), second.emit());
        assert_eq!(second.tally.active, 1);
        assert_eq!(second.tally.inactive, 1);
    }
}
