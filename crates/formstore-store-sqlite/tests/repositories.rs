// crates/formstore-store-sqlite/tests/repositories.rs
// ============================================================================
// Module: SQLite Repository Tests
// Description: Validate the Forms and Instances repository contracts.
// Purpose: Ensure SQLite repositories match the in-memory semantics.
// Dependencies: formstore-store-sqlite, formstore-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Exercises CRUD, natural-key filters (including missing versions),
//! soft deletion and status queries against on-disk databases.

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

use std::sync::Arc;
use std::thread;

use formstore_core::Form;
use formstore_core::FormDbId;
use formstore_core::FormsRepository;
use formstore_core::Instance;
use formstore_core::InstanceStatus;
use formstore_core::InstancesRepository;
use formstore_core::RepositoryError;
use formstore_store_sqlite::SqliteFormStore;
use formstore_store_sqlite::SqliteStoreConfig;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn open() -> (TempDir, SqliteFormStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteFormStore::open(&SqliteStoreConfig::new(dir.path())).unwrap();
    (dir, store)
}

fn form(path: &str, form_id: &str, version: Option<&str>, date: i64) -> Form {
    Form {
        form_id: form_id.to_string(),
        version: version.map(str::to_string),
        display_name: form_id.to_string(),
        md5_hash: format!("md5:{path}"),
        form_file_path: path.to_string(),
        form_media_path: format!("{path}-media"),
        date,
        ..Form::default()
    }
}

fn instance(path: &str, form_id: &str, version: Option<&str>, status: InstanceStatus) -> Instance {
    Instance {
        display_name: path.to_string(),
        instance_file_path: path.to_string(),
        jr_form_id: form_id.to_string(),
        jr_version: version.map(str::to_string),
        status,
        ..Instance::default()
    }
}

// ============================================================================
// SECTION: Forms
// ============================================================================

#[test]
fn form_rows_round_trip_every_column() {
    let (_dir, store) = open();
    let forms = store.forms();
    let mut row = Form {
        description: Some("A basic form".to_string()),
        language: Some("en".to_string()),
        submission_uri: Some("https://example.org/submit".to_string()),
        base64_rsa_public_key: Some("MIIB".to_string()),
        auto_send: Some("true".to_string()),
        auto_delete: Some("false".to_string()),
        geometry_xpath: Some("/data/location".to_string()),
        last_updated: 77,
        ..form("/forms/basic.xml", "basic", Some("2024"), 10)
    };
    let id = forms.save(&row).unwrap();
    row.id = Some(id);
    assert_eq!(forms.get(id).unwrap(), Some(row.clone()));

    row.md5_hash = "changed".to_string();
    row.display_name = "Renamed".to_string();
    assert_eq!(forms.save(&row).unwrap(), id);
    assert_eq!(forms.get_one_by_path("/forms/basic.xml").unwrap(), Some(row.clone()));
    assert_eq!(forms.get_one_by_md5_hash("changed").unwrap(), Some(row));
}

#[test]
fn updating_missing_form_is_not_found() {
    let (_dir, store) = open();
    let mut row = form("/forms/a.xml", "a", None, 0);
    row.id = Some(FormDbId::new(99));
    assert!(matches!(store.forms().save(&row), Err(RepositoryError::NotFound(_))));
}

#[test]
fn missing_version_matches_only_unversioned_rows() {
    let (_dir, store) = open();
    let forms = store.forms();
    forms.save(&form("/f/a.xml", "basic", None, 1)).unwrap();
    forms.save(&form("/f/b.xml", "basic", Some("1"), 2)).unwrap();
    forms.save(&form("/f/c.xml", "basic", None, 3)).unwrap();
    forms.save(&form("/f/d.xml", "other", None, 4)).unwrap();

    let unversioned = forms.get_all_by_form_id_and_version("basic", None).unwrap();
    let paths: Vec<_> = unversioned.iter().map(|f| f.form_file_path.as_str()).collect();
    assert_eq!(paths, vec!["/f/a.xml", "/f/c.xml"]);
    assert_eq!(forms.get_all_by_form_id_and_version("basic", Some("1")).unwrap().len(), 1);
    assert_eq!(forms.get_all_by_form_id("basic").unwrap().len(), 3);
}

#[test]
fn latest_prefers_newest_date_then_highest_key() {
    let (_dir, store) = open();
    let forms = store.forms();
    forms.save(&form("/f/a.xml", "basic", None, 5)).unwrap();
    let newest = forms.save(&form("/f/b.xml", "basic", None, 9)).unwrap();
    let tie = forms.save(&form("/f/c.xml", "basic", None, 9)).unwrap();
    assert!(tie > newest);
    forms.soft_delete(tie).unwrap();

    let latest = forms.get_latest_by_form_id_and_version("basic", None).unwrap().unwrap();
    assert_eq!(latest.id, Some(tie));
    assert_eq!(forms.get_latest_by_form_id_and_version("absent", None).unwrap(), None);
}

#[test]
fn soft_delete_hides_row_until_restored() {
    let (_dir, store) = open();
    let forms = store.forms();
    let id = forms.save(&form("/f/a.xml", "basic", Some("1"), 1)).unwrap();
    forms.soft_delete(id).unwrap();

    assert!(forms.get(id).unwrap().unwrap().deleted);
    assert!(forms.get_all_not_deleted().unwrap().is_empty());
    assert!(forms.get_all_not_deleted_by_form_id("basic").unwrap().is_empty());
    let live = forms.get_all_not_deleted_by_form_id_and_version("basic", Some("1")).unwrap();
    assert!(live.is_empty());
    assert_eq!(forms.get_all_by_form_id_and_version("basic", Some("1")).unwrap().len(), 1);

    forms.restore(id).unwrap();
    assert_eq!(forms.get_all_not_deleted().unwrap().len(), 1);
}

#[test]
fn form_keys_are_not_reused() {
    let (_dir, store) = open();
    let forms = store.forms();
    let first = forms.save(&form("/f/a.xml", "a", None, 1)).unwrap();
    forms.delete(first).unwrap();
    forms.delete(first).unwrap();
    let second = forms.save(&form("/f/b.xml", "b", None, 1)).unwrap();
    assert!(second > first);

    forms.delete_all().unwrap();
    assert!(forms.get_all().unwrap().is_empty());
}

// ============================================================================
// SECTION: Instances
// ============================================================================

#[test]
fn instances_filter_by_status_and_count() {
    let (_dir, store) = open();
    let instances = store.instances();
    instances.save(&instance("/i/1.xml", "basic", None, InstanceStatus::Incomplete)).unwrap();
    instances.save(&instance("/i/2.xml", "basic", None, InstanceStatus::Complete)).unwrap();
    instances.save(&instance("/i/3.xml", "basic", None, InstanceStatus::SubmissionFailed)).unwrap();
    instances.save(&instance("/i/4.xml", "other", None, InstanceStatus::Submitted)).unwrap();

    let sendable = [InstanceStatus::Complete, InstanceStatus::SubmissionFailed];
    let found = instances.get_all_by_status(&sendable).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|i| sendable.contains(&i.status)));
    assert_eq!(instances.get_count_by_status(&sendable).unwrap(), 2);
    assert_eq!(instances.get_count_by_status(&InstanceStatus::ALL).unwrap(), 4);
    assert_eq!(instances.get_count_by_status(&[]).unwrap(), 0);
    assert!(instances.get_all_by_status(&[]).unwrap().is_empty());
    assert_eq!(instances.get_all_by_form_id("basic").unwrap().len(), 3);
}

#[test]
fn instance_soft_delete_records_the_date() {
    let (_dir, store) = open();
    let instances = store.instances();
    let id = instances
        .save(&instance("/i/1.xml", "basic", Some("1"), InstanceStatus::Complete))
        .unwrap();
    instances.soft_delete(id, 1_234).unwrap();

    let row = instances.get(id).unwrap().unwrap();
    assert_eq!(row.deleted_date, Some(1_234));
    assert!(instances.get_all_not_deleted().unwrap().is_empty());
    assert!(
        instances
            .get_all_not_deleted_by_form_id_and_version("basic", Some("1"))
            .unwrap()
            .is_empty()
    );

    instances.restore(id).unwrap();
    let referencing =
        instances.get_all_not_deleted_by_form_id_and_version("basic", Some("1")).unwrap();
    assert_eq!(referencing.len(), 1);
    assert_eq!(instances.get_one_by_path("/i/1.xml").unwrap().unwrap().id, Some(id));
}

#[test]
fn unknown_stored_status_is_invalid_data() {
    let (dir, store) = open();
    let config = SqliteStoreConfig::new(dir.path());
    let id = store
        .instances()
        .save(&instance("/i/1.xml", "basic", None, InstanceStatus::Complete))
        .unwrap();
    Connection::open(config.instances_db_path())
        .unwrap()
        .execute("UPDATE instances SET status = 'archived' WHERE _id = ?1", [id.get()])
        .unwrap();

    assert!(matches!(store.instances().get(id), Err(RepositoryError::Invalid(_))));
    assert!(matches!(store.instances().get_all(), Err(RepositoryError::Invalid(_))));
}

#[test]
fn concurrent_writers_each_get_distinct_keys() {
    let (_dir, store) = open();
    let instances = store.instances();
    let handles: Vec<_> = (0 .. 4)
        .map(|worker| {
            let instances = Arc::clone(&instances);
            thread::spawn(move || {
                (0 .. 10)
                    .map(|n| {
                        let path = format!("/i/{worker}-{n}.xml");
                        instances
                            .save(&instance(&path, "basic", None, InstanceStatus::Incomplete))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut keys: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 40);
    assert_eq!(instances.get_all().unwrap().len(), 40);
}
