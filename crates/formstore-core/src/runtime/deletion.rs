// crates/formstore-core/src/runtime/deletion.rs
// ============================================================================
// Module: Form Deletion Policy
// Description: Chooses between hard and soft deletion of a form row.
// Purpose: Remove forms without erasing the provenance of their instances.
// Dependencies: crate::core, crate::interfaces, crate::audit, thiserror
// ============================================================================

//! ## Overview
//! A form row is hard-deleted when no live instance references its
//! `(form_id, version)` pair, or when another row shares that pair (so this
//! row cannot be the only copy). Otherwise it is soft-deleted: flagged but
//! kept, so its instances still resolve the form they came from.
//!
//! A hard delete also removes the definition file and its media directory so
//! the next reconciliation pass does not import the form again. A soft delete
//! leaves files in place. Instances are never touched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::audit::DeletionAuditEvent;
use crate::audit::DeletionMode;
use crate::audit::FormStoreAuditSink;
use crate::audit::NoopAuditSink;
use crate::core::Form;
use crate::core::FormDbId;
use crate::core::ProjectId;
use crate::interfaces::FormsRepository;
use crate::interfaces::InstancesRepository;
use crate::interfaces::RepositoryError;
use crate::runtime::change_lock::ChangeLock;

// ============================================================================
// SECTION: Results
// ============================================================================

/// Result of a deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionOutcome {
    /// The row was removed along with its files.
    HardDeleted,
    /// The row was flagged deleted and kept.
    SoftDeleted,
    /// Another operation held the forms lock; nothing changed.
    Skipped,
    /// No row exists for the key.
    NotFound,
}

impl DeletionOutcome {
    /// Returns the audit label for this outcome.
    const fn mode(self) -> DeletionMode {
        match self {
            Self::HardDeleted => DeletionMode::Hard,
            Self::SoftDeleted => DeletionMode::Soft,
            Self::Skipped => DeletionMode::Skipped,
            Self::NotFound => DeletionMode::Missing,
        }
    }
}

/// Deletion failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeletionError {
    /// The metadata store rejected a read or write.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// A definition file or media directory could not be removed.
    #[error("failed to remove {path}: {message}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Deleter
// ============================================================================

/// Applies the deletion policy to a project's forms.
pub struct FormDeleter {
    /// Project scope reported in audit events.
    project_id: ProjectId,
    /// Forms table.
    forms: Arc<dyn FormsRepository>,
    /// Instances table, read to find referencing instances.
    instances: Arc<dyn InstancesRepository>,
    /// Lock guarding the project's forms.
    lock: Arc<ChangeLock>,
    /// Audit sink.
    audit: Arc<dyn FormStoreAuditSink>,
}

impl FormDeleter {
    /// Creates a deleter with no audit output.
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        forms: Arc<dyn FormsRepository>,
        instances: Arc<dyn InstancesRepository>,
        lock: Arc<ChangeLock>,
    ) -> Self {
        Self {
            project_id,
            forms,
            instances,
            lock,
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn FormStoreAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Deletes the form row with the given key under the forms lock.
    ///
    /// # Errors
    ///
    /// Returns [`DeletionError`] when the store or filesystem fails.
    pub fn delete(&self, id: FormDbId) -> Result<DeletionOutcome, DeletionError> {
        let mut event =
            DeletionAuditEvent::new(self.project_id.as_str(), id.get(), DeletionMode::Skipped);
        let result = self.lock.with_lock(|acquired| {
            if acquired { self.delete_locked(id, &mut event) } else { Ok(DeletionOutcome::Skipped) }
        });
        if let Ok(outcome) = &result {
            event.mode = outcome.mode();
            self.audit.record_deletion(&event);
        }
        result
    }

    /// Applies the policy; the caller holds the lock.
    fn delete_locked(
        &self,
        id: FormDbId,
        event: &mut DeletionAuditEvent,
    ) -> Result<DeletionOutcome, DeletionError> {
        let Some(form) = self.forms.get(id)? else {
            return Ok(DeletionOutcome::NotFound);
        };
        let version = form.version.as_deref();
        let instances =
            self.instances.get_all_not_deleted_by_form_id_and_version(&form.form_id, version)?;
        let siblings = self.forms.get_all_by_form_id_and_version(&form.form_id, version)?;
        event.form_id = Some(form.form_id.clone());
        event.version = form.version.clone();
        event.referencing_instances = instances.len();

        if instances.is_empty() || siblings.len() > 1 {
            remove_form_files(&form)?;
            self.forms.delete(id)?;
            Ok(DeletionOutcome::HardDeleted)
        } else {
            self.forms.soft_delete(id)?;
            Ok(DeletionOutcome::SoftDeleted)
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Removes a form's definition file and media directory, ignoring absent ones.
fn remove_form_files(form: &Form) -> Result<(), DeletionError> {
    if !form.form_file_path.is_empty() {
        ignore_missing(Path::new(&form.form_file_path), fs::remove_file(&form.form_file_path))?;
    }
    if !form.form_media_path.is_empty() {
        ignore_missing(
            Path::new(&form.form_media_path),
            fs::remove_dir_all(&form.form_media_path),
        )?;
    }
    Ok(())
}

/// Treats `NotFound` as success.
fn ignore_missing(path: &Path, result: io::Result<()>) -> Result<(), DeletionError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(DeletionError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }),
    }
}
