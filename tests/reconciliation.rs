//! End-to-end reconciliation against an in-memory document store

use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Mutex;

use dumpsync::config::SyncConfig;
use dumpsync::pipeline::ReconcileJob;
use dumpsync::reconcile::{CredentialHasher, HashedCredential};
use dumpsync::roster::{Roster, RosterGrid};
use dumpsync::store::{DocumentStore, DOC_ID_FIELD};
use dumpsync::{FieldValue, PipelineError, Record, StoreError};

const DUMP: &str = r#"
CREATE TABLE `tbl_employee` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `firstname` varchar(50) DEFAULT NULL,
  `lastname` varchar(50) DEFAULT NULL,
  `nickname` varchar(50) DEFAULT NULL,
  `position_id` int(11) DEFAULT NULL,
  `estatus` int(1) DEFAULT NULL,
  PRIMARY KEY (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=latin1;
INSERT INTO `tbl_employee` VALUES (1,'Juan','Dela Cruz','Jun',3,1),(2,'Maria','Santos',NULL,4,0),(3,'Maria','Santos','Mia',4,1),(4,'Pedro','Reyes','',2,1);
"#;

const ROSTER: &str = "\
Employee ID,Nickname,First Name,Last Name,Password,Contact Number,Position,Email
1.0,Jun,Juan,Dela Cruz,1234,09171234567,Branch Manager,JUAN@example.com
,,Maria,Santos,,,Collector,
,,Nobody,Known,,,Driver,
";

#[derive(Default)]
struct MemoryStore {
    collections: Mutex<IndexMap<String, IndexMap<String, Record>>>,
    writes: Mutex<Vec<String>>,
    failing_ids: HashSet<String>,
}

impl MemoryStore {
    fn insert(&self, collection: &str, id: &str, record: Record) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), record);
    }

    fn get(&self, collection: &str, id: &str) -> Option<Record> {
        self.collections.lock().unwrap().get(collection)?.get(id).cloned()
    }

    fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl DocumentStore for MemoryStore {
    async fn fetch_collection(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let collections = self.collections.lock().unwrap();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .map(|(id, doc)| {
                let mut doc = doc.clone();
                doc.insert(DOC_ID_FIELD.to_string(), FieldValue::from(id.as_str()));
                doc
            })
            .collect())
    }

    async fn upsert(&self, collection: &str, id: &str, fields: &Record) -> Result<(), StoreError> {
        if self.failing_ids.contains(id) {
            return Err(StoreError::Status {
                status: 403,
                message: "Missing or insufficient permissions.".to_string(),
            });
        }
        assert!(!fields.contains_key(DOC_ID_FIELD));
        let mut collections = self.collections.lock().unwrap();
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        for (name, value) in fields {
            doc.insert(name.clone(), value.clone());
        }
        self.writes.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

fn record(pairs: &[(&str, FieldValue)]) -> Record {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn roster(text: &str) -> Roster {
    Roster::from_grid(&RosterGrid::from_csv_reader(text.as_bytes()).unwrap()).unwrap()
}

fn job() -> ReconcileJob {
    ReconcileJob::new(&SyncConfig::default()).with_hasher(CredentialHasher::with_iterations(2))
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::default();
    store.insert(
        "tbl_employee",
        "1",
        record(&[
            ("id", FieldValue::Int(1)),
            ("username", FieldValue::from("jun")),
            ("app_theme", FieldValue::from("dark")),
        ]),
    );
    store.insert(
        "tbl_employee",
        "900",
        record(&[
            ("id", FieldValue::Int(900)),
            ("firstname", FieldValue::from("Ghost")),
            ("marga_active", FieldValue::Bool(true)),
            ("marga_role", FieldValue::from("owner")),
        ]),
    );
    store.insert(
        "tbl_employee",
        "legacy-abc",
        record(&[("firstname", FieldValue::from("No id"))]),
    );
    store.insert(
        "marga_role_permissions",
        "collection",
        record(&[("allowed_modules", FieldValue::from("collections, customers"))]),
    );
    store
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 18, 9, 30, 0).unwrap()
}

#[tokio::test]
async fn test_full_run_writes_one_document_per_id() {
    let store = seeded_store();
    let run = job()
        .run_at(&store, DUMP, &roster(ROSTER), "Final Marga Users.csv", now())
        .await
        .unwrap();
    let report = &run.report;

    assert_eq!(store.writes(), vec!["1", "2", "3", "4", "900"]);
    assert_eq!(report.written, 5);
    assert!(report.succeeded());
    assert_eq!(report.dump.rows, 4);
    assert_eq!(report.tally.store_docs, 3);
    assert_eq!(report.tally.store_docs_without_id, 1);
    assert_eq!(report.tally.store_only_docs, 1);
    assert_eq!(report.tally.matched, 2);
    assert_eq!(report.tally.active, 2);
    assert_eq!(report.tally.inactive, 3);
    assert_eq!(report.unmatched.len(), 1);
    assert_eq!(report.unmatched[0].row, 4);
    assert_eq!(report.unmatched[0].name, "Nobody Known");

    let juan = store.get("tbl_employee", "1").unwrap();
    assert_eq!(juan["marga_active"], FieldValue::Bool(true));
    assert_eq!(juan["marga_role"], FieldValue::from("admin"));
    assert_eq!(juan["username"], FieldValue::from("juan"));
    assert_eq!(juan["email"], FieldValue::from("juan@example.com"));
    assert_eq!(juan["app_theme"], FieldValue::from("dark"));
    assert_eq!(juan["marga_source_file"], FieldValue::from("Final Marga Users.csv"));
    assert_eq!(juan["marga_updated_at"], FieldValue::from("2026-02-18T09:30:00.000000+00:00"));
    assert!(HashedCredential::from_record(&juan).unwrap().verify("1234"));

    // Two Maria Santos rows; the one with estatus 1 wins.
    let maria = store.get("tbl_employee", "3").unwrap();
    assert_eq!(maria["marga_active"], FieldValue::Bool(true));
    assert_eq!(maria["marga_role"], FieldValue::from("collection"));
    assert_eq!(
        maria["marga_allowed_modules"],
        FieldValue::from(vec!["collections".to_string(), "customers".to_string()])
    );
    assert_eq!(maria["username"], FieldValue::from("maria.santos"));
    assert_eq!(
        store.get("tbl_employee", "2").unwrap()["marga_active"],
        FieldValue::Bool(false)
    );

    let ghost = store.get("tbl_employee", "900").unwrap();
    assert_eq!(ghost["marga_active"], FieldValue::Bool(false));
    assert_eq!(ghost["marga_role"], FieldValue::from("viewer"));

    let untouched = store.get("tbl_employee", "legacy-abc").unwrap();
    assert_eq!(untouched.len(), 1);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let store = seeded_store();
    let run = job()
        .dry_run(true)
        .run_at(&store, DUMP, &roster(ROSTER), "roster.csv", now())
        .await
        .unwrap();

    assert!(store.writes().is_empty());
    assert_eq!(run.report.written, 0);
    assert!(run.report.dry_run);
    assert_eq!(run.documents.len(), 5);
    assert_eq!(
        store.get("tbl_employee", "900").unwrap()["marga_active"],
        FieldValue::Bool(true)
    );
}

#[tokio::test]
async fn test_upsert_failures_do_not_stop_the_run() {
    let mut store = seeded_store();
    store.failing_ids.insert("2".to_string());

    let run = job()
        .run_at(&store, DUMP, &roster(ROSTER), "roster.csv", now())
        .await
        .unwrap();

    assert_eq!(store.writes(), vec!["1", "3", "4", "900"]);
    assert_eq!(run.report.written, 4);
    assert_eq!(run.report.failures.len(), 1);
    assert_eq!(run.report.failures[0].id, 2);
    assert!(run.report.failures[0].reason.contains("403"));
    assert!(!run.report.succeeded());
}

#[tokio::test]
async fn test_missing_employee_table_is_fatal() {
    let store = seeded_store();
    let err = job()
        .run_at(&store, "-- empty dump\n", &roster(ROSTER), "roster.csv", now())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::EmptyTable(ref table) if table == "tbl_employee"));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let roster_text = "\
Employee ID,Nickname,First Name,Last Name,Position
4,,Pedro,Reyes,Field Technician
,Jun,Juan,Dela Cruz,HR Officer
";
    let store = seeded_store();
    let first = job()
        .run_at(&store, DUMP, &roster(roster_text), "roster.csv", now())
        .await
        .unwrap();
    let second = job()
        .run_at(&store, DUMP, &roster(roster_text), "roster.csv", now())
        .await
        .unwrap();

    assert_eq!(first.documents, second.documents);
    assert_eq!(second.report.tally.active, 2);

    let juan = store.get("tbl_employee", "1").unwrap();
    assert_eq!(juan["marga_role"], FieldValue::from("hr"));
    assert_eq!(juan["username"], FieldValue::from("jun"));
}
