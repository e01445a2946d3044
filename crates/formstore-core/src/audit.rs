// crates/formstore-core/src/audit.rs
// ============================================================================
// Module: Formstore Audit Logging
// Description: Structured audit events for reconciliation, deletion and
//              schema migration.
// Purpose: Emit JSON-line records without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every consistency-relevant outcome is reported as a serializable event to
//! a [`FormStoreAuditSink`]. Sinks are chosen by configuration and passed in
//! explicitly; nothing here is global. Events carry identifiers and counts
//! only, never form definition content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::time::unix_millis;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome label for a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The pass ran to completion.
    Completed,
    /// The pass lost the lock race and did nothing.
    Skipped,
    /// The pass stopped at a failing file.
    Failed,
}

/// Outcome label for a form deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionMode {
    /// The row was removed.
    Hard,
    /// The row was flagged deleted.
    Soft,
    /// The deletion lost the lock race and did nothing.
    Skipped,
    /// No row exists for the key.
    Missing,
}

/// Action taken when a database was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationAction {
    /// Fresh database; current schema created.
    Created,
    /// Older schema upgraded step by step.
    Upgraded,
    /// Schema already current.
    Current,
    /// Newer, unknown schema replaced by the current one.
    Recreated,
}

/// Reconciliation audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Project identifier.
    pub project_id: String,
    /// Pass outcome.
    pub outcome: ReconcileOutcome,
    /// Rows inserted.
    pub inserted: usize,
    /// Rows updated in place.
    pub updated: usize,
    /// Files left untouched.
    pub unchanged: usize,
    /// Soft-deleted rows restored by a new definition.
    pub restored: usize,
    /// Failure message when the pass failed.
    pub error: Option<String>,
}

/// Form deletion audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Project identifier.
    pub project_id: String,
    /// Surrogate key of the targeted row.
    pub form_db_id: i64,
    /// Declared form identifier, when the row existed.
    pub form_id: Option<String>,
    /// Declared version, when the row existed.
    pub version: Option<String>,
    /// Deletion mode applied.
    pub mode: DeletionMode,
    /// Non-deleted instances referencing the natural key.
    pub referencing_instances: usize,
}

/// Schema migration audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Database label (`forms` or `instances`).
    pub database: &'static str,
    /// Stored version found at open.
    pub from_version: i64,
    /// Version after open.
    pub to_version: i64,
    /// Action taken.
    pub action: MigrationAction,
}

impl ReconcileAuditEvent {
    /// Creates a reconciliation event with zero counts.
    #[must_use]
    pub fn new(project_id: impl Into<String>, outcome: ReconcileOutcome) -> Self {
        Self {
            event: "forms_reconcile",
            timestamp_ms: unix_millis(),
            project_id: project_id.into(),
            outcome,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            restored: 0,
            error: None,
        }
    }
}

impl DeletionAuditEvent {
    /// Creates a deletion event for the given key.
    #[must_use]
    pub fn new(project_id: impl Into<String>, form_db_id: i64, mode: DeletionMode) -> Self {
        Self {
            event: "form_delete",
            timestamp_ms: unix_millis(),
            project_id: project_id.into(),
            form_db_id,
            form_id: None,
            version: None,
            mode,
            referencing_instances: 0,
        }
    }
}

impl MigrationAuditEvent {
    /// Creates a migration event.
    #[must_use]
    pub fn new(
        database: &'static str,
        from_version: i64,
        to_version: i64,
        action: MigrationAction,
    ) -> Self {
        Self {
            event: "schema_migration",
            timestamp_ms: unix_millis(),
            database,
            from_version,
            to_version,
            action,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for formstore events.
pub trait FormStoreAuditSink: Send + Sync {
    /// Record a reconciliation event.
    fn record_reconcile(&self, event: &ReconcileAuditEvent);

    /// Record a deletion event.
    fn record_deletion(&self, event: &DeletionAuditEvent);

    /// Record a migration event.
    fn record_migration(&self, _event: &MigrationAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event to stderr.
    fn emit<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl FormStoreAuditSink for StderrAuditSink {
    fn record_reconcile(&self, event: &ReconcileAuditEvent) {
        Self::emit(event);
    }

    fn record_deletion(&self, event: &DeletionAuditEvent) {
        Self::emit(event);
    }

    fn record_migration(&self, event: &MigrationAuditEvent) {
        Self::emit(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event.
    fn emit<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl FormStoreAuditSink for FileAuditSink {
    fn record_reconcile(&self, event: &ReconcileAuditEvent) {
        self.emit(event);
    }

    fn record_deletion(&self, event: &DeletionAuditEvent) {
        self.emit(event);
    }

    fn record_migration(&self, event: &MigrationAuditEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl FormStoreAuditSink for NoopAuditSink {
    fn record_reconcile(&self, _event: &ReconcileAuditEvent) {}

    fn record_deletion(&self, _event: &DeletionAuditEvent) {}

    fn record_migration(&self, _event: &MigrationAuditEvent) {}
}
