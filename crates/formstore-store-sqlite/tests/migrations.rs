// crates/formstore-store-sqlite/tests/migrations.rs
// ============================================================================
// Module: SQLite Migration Tests
// Description: Validate schema creation, upgrades and downgrade recovery.
// Purpose: Ensure opening a store never fails on a schema version alone.
// Dependencies: formstore-store-sqlite, formstore-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Opens stores over fresh, legacy (v1) and newer-than-supported databases
//! and checks the resulting schema, rows and migration reports.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Mutex;

use formstore_core::Form;
use formstore_core::FormDbId;
use formstore_core::FormsRepository;
use formstore_core::InstanceDbId;
use formstore_core::InstanceStatus;
use formstore_core::InstancesRepository;
use formstore_core::MigrationAction;
use formstore_core::MigrationAuditEvent;
use formstore_core::audit::DeletionAuditEvent;
use formstore_core::audit::FormStoreAuditSink;
use formstore_core::audit::ReconcileAuditEvent;
use formstore_store_sqlite::SqliteFormStore;
use formstore_store_sqlite::SqliteStoreConfig;
use formstore_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const FORMS_V1: &str = "
    CREATE TABLE forms (
        _id INTEGER PRIMARY KEY AUTOINCREMENT,
        display_name TEXT NOT NULL,
        description TEXT,
        form_id TEXT NOT NULL,
        version TEXT,
        md5_hash TEXT NOT NULL,
        date INTEGER NOT NULL,
        form_media_path TEXT NOT NULL,
        form_file_path TEXT NOT NULL,
        language TEXT,
        submission_uri TEXT,
        base64_rsa_public_key TEXT,
        jr_cache_file_path TEXT
    );
    CREATE INDEX idx_forms_md5_hash ON forms (md5_hash);
    INSERT INTO forms (display_name, form_id, version, md5_hash, date, form_media_path,
                       form_file_path, jr_cache_file_path)
    VALUES ('Basic', 'basic', NULL, 'h1', 100, '/forms/basic-media', '/forms/basic.xml',
            '/cache/basic.formdef');
    PRAGMA user_version = 1;
";

const INSTANCES_V1: &str = "
    CREATE TABLE instances (
        _id INTEGER PRIMARY KEY AUTOINCREMENT,
        display_name TEXT NOT NULL,
        submission_uri TEXT,
        can_edit_when_complete INTEGER NOT NULL DEFAULT 0,
        instance_file_path TEXT NOT NULL,
        jr_form_id TEXT NOT NULL,
        jr_version TEXT,
        status TEXT NOT NULL,
        last_status_change_date INTEGER NOT NULL,
        display_subtext TEXT
    );
    INSERT INTO instances (display_name, can_edit_when_complete, instance_file_path,
                           jr_form_id, jr_version, status, last_status_change_date,
                           display_subtext)
    VALUES ('Basic 1', 1, '/instances/basic_1/basic_1.xml', 'basic', NULL, 'submitted', 200,
            'Sent on Monday');
    PRAGMA user_version = 1;
";

fn seed(path: &Path, sql: &str) {
    let connection = Connection::open(path).unwrap();
    connection.execute_batch(sql).unwrap();
}

fn columns(path: &Path, table: &str) -> Vec<String> {
    let connection = Connection::open(path).unwrap();
    let mut statement = connection.prepare("SELECT name FROM pragma_table_info(?1)").unwrap();
    statement
        .query_map(params![table], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

fn index_exists(path: &Path, name: &str) -> bool {
    let connection = Connection::open(path).unwrap();
    connection
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
        == 1
}

fn user_version(path: &Path) -> i64 {
    Connection::open(path).unwrap().query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap()
}

#[derive(Default)]
struct RecordingSink {
    migrations: Mutex<Vec<MigrationAuditEvent>>,
}

impl FormStoreAuditSink for RecordingSink {
    fn record_reconcile(&self, _event: &ReconcileAuditEvent) {}

    fn record_deletion(&self, _event: &DeletionAuditEvent) {}

    fn record_migration(&self, event: &MigrationAuditEvent) {
        self.migrations.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn fresh_directory_creates_both_databases() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig::new(dir.path().join("metadata"));
    let store = SqliteFormStore::open(&config).unwrap();

    let reports = store.migration_reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].database, "forms");
    assert_eq!(reports[0].action, MigrationAction::Created);
    assert_eq!((reports[0].from_version, reports[0].to_version), (0, 5));
    assert_eq!(reports[1].database, "instances");
    assert_eq!((reports[1].from_version, reports[1].to_version), (0, 4));
    drop(store);

    assert_eq!(user_version(&config.forms_db_path()), 5);
    assert_eq!(user_version(&config.instances_db_path()), 4);
    assert!(index_exists(&config.forms_db_path(), "idx_forms_form_id_version"));

    let reopened = SqliteFormStore::open(&config).unwrap();
    assert!(reopened.migration_reports().iter().all(|r| r.action == MigrationAction::Current));
}

#[test]
fn version_one_forms_upgrade_keeps_rows() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig::new(dir.path());
    seed(&config.forms_db_path(), FORMS_V1);

    let store = SqliteFormStore::open(&config).unwrap();
    let report = &store.migration_reports()[0];
    assert_eq!(report.action, MigrationAction::Upgraded);
    assert_eq!((report.from_version, report.to_version), (1, 5));

    let form = store.forms().get(FormDbId::new(1)).unwrap().unwrap();
    assert_eq!(form.form_id, "basic");
    assert_eq!(form.version, None);
    assert_eq!(form.md5_hash, "h1");
    assert!(!form.deleted);
    assert_eq!(form.auto_send, None);
    assert_eq!(form.last_updated, 0);
    drop(store);

    let names = columns(&config.forms_db_path(), "forms");
    assert!(!names.contains(&"jr_cache_file_path".to_string()));
    assert!(names.contains(&"last_updated".to_string()));
    assert!(names.contains(&"geometry_xpath".to_string()));
    assert!(index_exists(&config.forms_db_path(), "idx_forms_md5_hash"));
    assert!(index_exists(&config.forms_db_path(), "idx_forms_form_id_version"));
}

#[test]
fn version_one_instances_upgrade_drops_subtext() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig::new(dir.path());
    seed(&config.instances_db_path(), INSTANCES_V1);

    let store = SqliteFormStore::open(&config).unwrap();
    assert_eq!(store.migration_reports()[1].action, MigrationAction::Upgraded);

    let instance = store.instances().get(InstanceDbId::new(1)).unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Submitted);
    assert!(instance.can_edit_when_complete);
    assert_eq!(instance.deleted_date, None);
    assert_eq!(instance.geometry, None);
    drop(store);

    let names = columns(&config.instances_db_path(), "instances");
    assert!(!names.contains(&"display_subtext".to_string()));
    assert!(names.contains(&"geometry_type".to_string()));
}

#[test]
fn upgrade_does_not_reuse_deleted_keys() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig::new(dir.path());
    seed(&config.forms_db_path(), FORMS_V1);
    seed(
        &config.forms_db_path(),
        "INSERT INTO forms (_id, display_name, form_id, md5_hash, date, form_media_path,
                            form_file_path)
         VALUES (10, 'Gone', 'gone', 'h10', 100, '/forms/gone-media', '/forms/gone.xml');
         DELETE FROM forms WHERE _id = 10;",
    );

    let store = SqliteFormStore::open(&config).unwrap();
    assert_eq!(store.migration_reports()[0].action, MigrationAction::Upgraded);
    let id = store
        .forms()
        .save(&Form {
            form_id: "fresh".to_string(),
            display_name: "Fresh".to_string(),
            md5_hash: "h11".to_string(),
            form_file_path: "/forms/fresh.xml".to_string(),
            form_media_path: "/forms/fresh-media".to_string(),
            ..Form::default()
        })
        .unwrap();
    assert_eq!(id, FormDbId::new(11));
}

#[test]
fn unversioned_legacy_table_is_recreated() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig::new(dir.path());
    seed(
        &config.instances_db_path(),
        "CREATE TABLE instances (_id INTEGER PRIMARY KEY, path TEXT);
         INSERT INTO instances (path) VALUES ('/legacy.xml');",
    );

    let store = SqliteFormStore::open(&config).unwrap();
    let report = &store.migration_reports()[1];
    assert_eq!(report.action, MigrationAction::Recreated);
    assert_eq!((report.from_version, report.to_version), (0, 4));
    assert!(store.instances().get_all().unwrap().is_empty());
    drop(store);

    let names = columns(&config.instances_db_path(), "instances");
    assert!(names.contains(&"status".to_string()));
    assert!(!names.contains(&"path".to_string()));
    assert_eq!(user_version(&config.instances_db_path()), 4);
}

#[test]
fn newer_version_is_recreated_instead_of_failing() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig::new(dir.path());
    seed(
        &config.forms_db_path(),
        "CREATE TABLE forms (_id INTEGER PRIMARY KEY, future_column BLOB);
         INSERT INTO forms (future_column) VALUES (x'00');
         PRAGMA user_version = 42;",
    );
    let audit = RecordingSink::default();

    let store = SqliteFormStore::open_with_audit(&config, &audit).unwrap();
    let report = &store.migration_reports()[0];
    assert_eq!(report.action, MigrationAction::Recreated);
    assert_eq!((report.from_version, report.to_version), (42, 5));

    let forms = store.forms();
    assert!(forms.get_all().unwrap().is_empty());
    assert_eq!(forms.get(FormDbId::new(1)).unwrap(), None);
    assert!(forms.get_all_not_deleted_by_form_id_and_version("basic", None).unwrap().is_empty());

    let json = serde_json::to_value(report).unwrap();
    assert_eq!(json["action"], "recreated");

    let events = audit.migrations.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, MigrationAction::Recreated);
    assert_eq!(events[1].action, MigrationAction::Created);
    drop(events);
    drop(store);
    assert_eq!(user_version(&config.forms_db_path()), 5);
}

#[test]
fn metadata_path_that_is_a_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"x").unwrap();
    let result = SqliteFormStore::open(&SqliteStoreConfig::new(&file));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn database_path_that_is_a_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig::new(dir.path());
    std::fs::create_dir(config.forms_db_path()).unwrap();
    let result = SqliteFormStore::open(&config);
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}
