// crates/formstore-core/src/runtime/reconcile.rs
// ============================================================================
// Module: Disk Forms Reconciler
// Description: Brings the Forms table in line with the forms directory.
// Purpose: Detect and repair drift between definition files and metadata.
// Dependencies: crate::core, crate::interfaces, crate::audit, serde, thiserror
// ============================================================================

//! ## Overview
//! A pass enumerates definition files, hashes each one and compares it with
//! the row stored for the same path:
//! - no row: parse the header and insert a row,
//! - different hash: parse the header and update the row in place,
//! - same hash: leave the row untouched.
//!
//! Rows whose files disappeared are never removed here; deletion is an
//! explicit action handled by [`crate::FormDeleter`]. The pass runs under the
//! project's forms [`ChangeLock`]; losing the race skips the pass without an
//! error. Each file is committed on its own, so the first failing file stops
//! the pass while earlier files stay applied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::audit::FormStoreAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::ReconcileAuditEvent;
use crate::audit::ReconcileOutcome;
use crate::core::Clock;
use crate::core::Form;
use crate::core::FormHeader;
use crate::core::ProjectId;
use crate::core::SystemClock;
use crate::core::XmlFormHeaderParser;
use crate::core::hashing::md5_hex;
use crate::interfaces::FormHeaderParser;
use crate::interfaces::FormsRepository;
use crate::interfaces::RepositoryError;
use crate::runtime::change_lock::ChangeLock;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Extension of candidate definition files.
const DEFINITION_EXTENSION: &str = "xml";

// ============================================================================
// SECTION: Results
// ============================================================================

/// Counts describing one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// True when the pass lost the lock race and did nothing.
    pub skipped: bool,
    /// Rows inserted for new files.
    pub inserted: usize,
    /// Rows updated because their file changed.
    pub updated: usize,
    /// Files whose hash matched the stored row.
    pub unchanged: usize,
    /// Soft-deleted rows restored because a new definition replaced them.
    pub restored: usize,
}

impl ReconcileReport {
    /// Report for a pass that did not run.
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Reconciliation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// The forms directory or a definition file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// A definition header could not be parsed.
    #[error("failed to parse form definition {path}: {message}")]
    Parse {
        /// Definition file path.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// The metadata store rejected a read or write.
    #[error("failed to update metadata for {path}: {source}")]
    Repository {
        /// Definition file path.
        path: String,
        /// Repository error.
        source: RepositoryError,
    },
}

/// What happened to a single definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileChange {
    /// New row inserted.
    Inserted,
    /// Existing row updated.
    Updated,
    /// Soft-deleted row updated and restored.
    Restored,
    /// Row left untouched.
    Unchanged,
}

// ============================================================================
// SECTION: Reconciler
// ============================================================================

/// Reconciles a project's forms directory with its Forms table.
pub struct DiskFormsReconciler {
    /// Project scope reported in audit events.
    project_id: ProjectId,
    /// Directory holding definition files.
    forms_dir: PathBuf,
    /// Forms table.
    forms: Arc<dyn FormsRepository>,
    /// Lock guarding the project's forms.
    lock: Arc<ChangeLock>,
    /// Definition header reader.
    parser: Arc<dyn FormHeaderParser>,
    /// Timestamp source for `last_updated`.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn FormStoreAuditSink>,
}

impl DiskFormsReconciler {
    /// Creates a reconciler using the XML header parser, the system clock and
    /// no audit output.
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        forms_dir: impl Into<PathBuf>,
        forms: Arc<dyn FormsRepository>,
        lock: Arc<ChangeLock>,
    ) -> Self {
        Self {
            project_id,
            forms_dir: forms_dir.into(),
            forms,
            lock,
            parser: Arc::new(XmlFormHeaderParser),
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Replaces the header parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn FormHeaderParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn FormStoreAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Runs one pass and returns its counts.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] for the first file that could not be read,
    /// parsed or stored. Files processed before it remain committed.
    pub fn synchronize(&self) -> Result<ReconcileReport, ReconcileError> {
        let result = self.lock.with_lock(|acquired| {
            if acquired { self.reconcile_locked() } else { Ok(ReconcileReport::skipped()) }
        });
        self.record(&result);
        result
    }

    /// Runs one pass and returns the failure message, if any.
    ///
    /// A skipped pass is not a failure and yields `None`.
    #[must_use]
    pub fn synchronize_and_return_error(&self) -> Option<String> {
        self.synchronize().err().map(|err| err.to_string())
    }

    /// Runs the pass body; the caller holds the lock.
    fn reconcile_locked(&self) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport::default();
        for path in list_definition_files(&self.forms_dir)? {
            match self.reconcile_file(&path)? {
                FileChange::Inserted => report.inserted += 1,
                FileChange::Updated => report.updated += 1,
                FileChange::Restored => {
                    report.updated += 1;
                    report.restored += 1;
                }
                FileChange::Unchanged => report.unchanged += 1,
            }
        }
        Ok(report)
    }

    /// Reconciles one definition file with its row.
    fn reconcile_file(&self, path: &Path) -> Result<FileChange, ReconcileError> {
        let bytes = fs::read(path).map_err(|err| io_error(path, &err))?;
        let md5_hash = md5_hex(&bytes);
        let path_text = path.to_string_lossy();
        let existing = self
            .forms
            .get_one_by_path(&path_text)
            .map_err(|source| repository_error(path, source))?;

        match existing {
            Some(form) if form.md5_hash == md5_hash => Ok(FileChange::Unchanged),
            Some(mut form) => {
                let header = self.parse(path, &bytes)?;
                let change =
                    if form.deleted { FileChange::Restored } else { FileChange::Updated };
                form.apply_header(header);
                form.md5_hash = md5_hash;
                form.deleted = false;
                form.last_updated = self.clock.now_millis();
                self.forms.save(&form).map_err(|source| repository_error(path, source))?;
                Ok(change)
            }
            None => {
                let header = self.parse(path, &bytes)?;
                let form = Form::from_header(header, md5_hash, path, self.clock.now_millis());
                self.forms.save(&form).map_err(|source| repository_error(path, source))?;
                Ok(FileChange::Inserted)
            }
        }
    }

    /// Reads the header of a definition file.
    fn parse(&self, path: &Path, bytes: &[u8]) -> Result<FormHeader, ReconcileError> {
        self.parser.parse_header(bytes).map_err(|err| ReconcileError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }

    /// Emits the audit event for a finished pass.
    fn record(&self, result: &Result<ReconcileReport, ReconcileError>) {
        let event = match result {
            Ok(report) => {
                let outcome = if report.skipped {
                    ReconcileOutcome::Skipped
                } else {
                    ReconcileOutcome::Completed
                };
                let mut event = ReconcileAuditEvent::new(self.project_id.as_str(), outcome);
                event.inserted = report.inserted;
                event.updated = report.updated;
                event.unchanged = report.unchanged;
                event.restored = report.restored;
                event
            }
            Err(err) => {
                let mut event =
                    ReconcileAuditEvent::new(self.project_id.as_str(), ReconcileOutcome::Failed);
                event.error = Some(err.to_string());
                event
            }
        };
        self.audit.record_reconcile(&event);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Lists candidate definition files in sorted order.
///
/// Only regular, non-hidden `.xml` files directly inside `forms_dir` are
/// candidates; symlinks count when their target is a regular file. A missing
/// directory has no candidates.
fn list_definition_files(forms_dir: &Path) -> Result<Vec<PathBuf>, ReconcileError> {
    let entries = match fs::read_dir(forms_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_error(forms_dir, &err)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| io_error(forms_dir, &err))?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let is_definition = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case(DEFINITION_EXTENSION));
        if hidden || !is_definition {
            continue;
        }
        // Follows symlinks; a dangling link is not a candidate.
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => files.push(path),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(&path, &err)),
        }
    }
    files.sort();
    Ok(files)
}

/// Builds an I/O reconciliation error for `path`.
fn io_error(path: &Path, err: &io::Error) -> ReconcileError {
    ReconcileError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Builds a repository reconciliation error for `path`.
fn repository_error(path: &Path, source: RepositoryError) -> ReconcileError {
    ReconcileError::Repository {
        path: path.display().to_string(),
        source,
    }
}
