// crates/formstore-config/tests/project_context.rs
// ============================================================================
// Module: Config Validation and Context Tests
// Description: Semantic validation rules and runtime object construction.
// Purpose: Ensure a validated config drives the store, reconciler and audit.
// Dependencies: formstore-config, formstore-core, tempfile
// ============================================================================

//! ## Overview
//! Checks cross-field validation and that a [`ProjectContext`] built from
//! config opens the store, reconciles and writes audit lines where the
//! config says.

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

use std::fs;
use std::path::Path;

use formstore_config::AuditSinkKind;
use formstore_config::ConfigError;
use formstore_config::FormStoreConfig;
use formstore_config::ProjectContext;
use formstore_core::ChangeLockProvider;
use formstore_core::FormsRepository;
use formstore_store_sqlite::SqliteStoreMode;
use formstore_store_sqlite::SqliteSyncMode;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn project_block(id: &str, root: &str) -> String {
    format!(
        "[[projects]]\nid = \"{id}\"\nforms_dir = \"{root}/{id}/forms\"\n\
         metadata_dir = \"{root}/{id}/metadata\"\n"
    )
}

fn invalid(content: &str) -> String {
    match FormStoreConfig::from_toml(content) {
        Err(ConfigError::Invalid(message)) => message,
        other => panic!("expected invalid config, got {other:?}"),
    }
}

fn toml_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

const FORM: &str = r#"<?xml version="1.0"?>
<h:html xmlns="http://www.w3.org/2002/xforms" xmlns:h="http://www.w3.org/1999/xhtml">
  <h:head>
    <h:title>Basic</h:title>
    <model><instance><data id="basic"/></instance></model>
  </h:head>
</h:html>
"#;

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn defaults_fill_store_and_audit_sections() {
    let config = FormStoreConfig::from_toml(&project_block("demo", "/data")).unwrap();
    assert_eq!(config.store.journal_mode, SqliteStoreMode::Wal);
    assert_eq!(config.store.sync_mode, SqliteSyncMode::Full);
    assert_eq!(config.store.busy_timeout_ms, 5_000);
    assert_eq!(config.audit.sink, AuditSinkKind::Stderr);

    let store = config.projects[0].store_config(&config.store);
    assert_eq!(store.forms_db_path(), Path::new("/data/demo/metadata/forms.db"));
}

#[test]
fn semantic_rules_are_enforced() {
    assert!(invalid("").contains("at least one project"));
    let zero_timeout = format!("[store]\nbusy_timeout_ms = 0\n{}", project_block("a", "/d"));
    assert!(invalid(&zero_timeout).contains("busy_timeout_ms"));
    let duplicate = format!("{}{}", project_block("a", "/d"), project_block("a", "/e"));
    assert!(invalid(&duplicate).contains("duplicate project id"));
    let empty_dir = "[[projects]]\nid = \"a\"\nforms_dir = \"\"\nmetadata_dir = \"m\"\n";
    assert!(invalid(empty_dir).contains("forms_dir must not be empty"));
    let shared = "[[projects]]\nid = \"a\"\nforms_dir = \"fa\"\nmetadata_dir = \"m\"\n\
                  [[projects]]\nid = \"b\"\nforms_dir = \"fb\"\nmetadata_dir = \"m\"\n";
    assert!(invalid(shared).contains("share metadata_dir"));
}

#[test]
fn audit_path_must_match_sink() {
    let missing = format!("[audit]\nsink = \"file\"\n{}", project_block("a", "/d"));
    assert!(invalid(&missing).contains("audit.path is required"));
    let stray =
        format!("[audit]\nsink = \"none\"\npath = \"x.jsonl\"\n{}", project_block("a", "/d"));
    assert!(invalid(&stray).contains("only valid"));
}

#[test]
fn project_selection_requires_an_id_when_ambiguous() {
    let single = FormStoreConfig::from_toml(&project_block("a", "/d")).unwrap();
    assert_eq!(single.project(None).unwrap().id, "a");
    assert!(single.project(Some("b")).is_err());

    let two = format!("{}{}", project_block("a", "/d"), project_block("b", "/d"));
    let config = FormStoreConfig::from_toml(&two).unwrap();
    assert!(matches!(config.project(None), Err(ConfigError::Invalid(_))));
    assert_eq!(config.project(Some("b")).unwrap().id, "b");
}

// ============================================================================
// SECTION: Context
// ============================================================================

#[test]
fn context_reconciles_and_audits_to_file() {
    let root = TempDir::new().unwrap();
    let root_text = toml_path(root.path());
    let audit_path = root.path().join("audit.jsonl");
    let content = format!(
        "[store]\njournal_mode = \"delete\"\n[audit]\nsink = \"file\"\npath = \"{}\"\n{}",
        toml_path(&audit_path),
        project_block("demo", &root_text),
    );
    let config = FormStoreConfig::from_toml(&content).unwrap();
    let context: ProjectContext = config.project_context(Some("demo")).unwrap();
    fs::create_dir_all(&context.forms_dir).unwrap();
    fs::write(context.forms_dir.join("basic.xml"), FORM).unwrap();

    let store = context.open_store().unwrap();
    let locks = ChangeLockProvider::new();
    let report = context.reconciler(&store, &locks).synchronize().unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(store.forms().get_all().unwrap()[0].form_id, "basic");
    drop(store);

    let lines: Vec<serde_json::Value> = fs::read_to_string(&audit_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["event"], "schema_migration");
    assert_eq!(lines[1]["event"], "schema_migration");
    assert_eq!(lines[2]["event"], "forms_reconcile");
    assert_eq!(lines[2]["project_id"], "demo");
}

#[test]
fn unopenable_audit_file_is_io_error() {
    let root = TempDir::new().unwrap();
    let audit_path = root.path().join("missing-dir").join("audit.jsonl");
    let content = format!(
        "[audit]\nsink = \"file\"\npath = \"{}\"\n{}",
        toml_path(&audit_path),
        project_block("demo", &toml_path(root.path())),
    );
    let config = FormStoreConfig::from_toml(&content).unwrap();
    assert!(matches!(config.project_context(None), Err(ConfigError::Io(_))));
}
