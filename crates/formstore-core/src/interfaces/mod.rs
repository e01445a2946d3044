// crates/formstore-core/src/interfaces/mod.rs
// ============================================================================
// Module: Formstore Interfaces
// Description: Backend-agnostic repository and header-parser contracts.
// Purpose: Define the narrow surfaces callers use to read and write metadata.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Each metadata table is reached through one narrow repository trait. Natural
//! key lookups always return every match: `(form_id, version)` is not unique.
//! Mutating calls are expected to run while the caller holds the relevant
//! [`crate::ChangeLock`]; repositories do not enforce this themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Form;
use crate::core::FormDbId;
use crate::core::FormHeader;
use crate::core::Instance;
use crate::core::InstanceDbId;
use crate::core::InstanceStatus;

// ============================================================================
// SECTION: Repository Errors
// ============================================================================

/// Repository errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Backend storage failure.
    #[error("repository store error: {0}")]
    Store(String),
    /// The row addressed by an update does not exist.
    #[error("repository row not found: {0}")]
    NotFound(String),
    /// Stored data could not be decoded.
    #[error("repository invalid data: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Forms Repository
// ============================================================================

/// Access to the Forms table.
pub trait FormsRepository: Send + Sync {
    /// Returns the row with the given surrogate key, soft-deleted or not.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get(&self, id: FormDbId) -> Result<Option<Form>, RepositoryError>;

    /// Returns the row backed by the given definition file path.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_one_by_path(&self, form_file_path: &str) -> Result<Option<Form>, RepositoryError>;

    /// Returns the first row whose definition hashes to `md5_hash`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_one_by_md5_hash(&self, md5_hash: &str) -> Result<Option<Form>, RepositoryError>;

    /// Returns every row, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all(&self) -> Result<Vec<Form>, RepositoryError>;

    /// Returns every row available to fill (not soft-deleted).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_not_deleted(&self) -> Result<Vec<Form>, RepositoryError>;

    /// Returns every row declaring `form_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_by_form_id(&self, form_id: &str) -> Result<Vec<Form>, RepositoryError>;

    /// Returns every non-deleted row declaring `form_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_not_deleted_by_form_id(&self, form_id: &str)
    -> Result<Vec<Form>, RepositoryError>;

    /// Returns every row declaring `(form_id, version)`; `None` matches rows
    /// without a version.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Form>, RepositoryError>;

    /// Returns every non-deleted row declaring `(form_id, version)`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_not_deleted_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Form>, RepositoryError>;

    /// Returns the most recently imported row declaring `(form_id, version)`,
    /// soft-deleted or not. Ties on import date resolve to the highest key.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_latest_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Option<Form>, RepositoryError>;

    /// Inserts a row when `form.id` is `None`, otherwise updates it in place.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when updating a missing row.
    fn save(&self, form: &Form) -> Result<FormDbId, RepositoryError>;

    /// Removes a row. Missing rows are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn delete(&self, id: FormDbId) -> Result<(), RepositoryError>;

    /// Flags a row as deleted while keeping it resolvable by key.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn soft_delete(&self, id: FormDbId) -> Result<(), RepositoryError>;

    /// Clears the soft-delete flag of a row.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn restore(&self, id: FormDbId) -> Result<(), RepositoryError>;

    /// Removes every row.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn delete_all(&self) -> Result<(), RepositoryError>;
}

// ============================================================================
// SECTION: Instances Repository
// ============================================================================

/// Access to the Instances table.
pub trait InstancesRepository: Send + Sync {
    /// Returns the row with the given surrogate key.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get(&self, id: InstanceDbId) -> Result<Option<Instance>, RepositoryError>;

    /// Returns the row backed by the given instance file path.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_one_by_path(&self, instance_file_path: &str)
    -> Result<Option<Instance>, RepositoryError>;

    /// Returns every row, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all(&self) -> Result<Vec<Instance>, RepositoryError>;

    /// Returns every row that is not soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_not_deleted(&self) -> Result<Vec<Instance>, RepositoryError>;

    /// Returns every row whose status is one of `statuses`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_by_status(
        &self,
        statuses: &[InstanceStatus],
    ) -> Result<Vec<Instance>, RepositoryError>;

    /// Counts rows whose status is one of `statuses`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_count_by_status(&self, statuses: &[InstanceStatus]) -> Result<u64, RepositoryError>;

    /// Returns every row produced by any version of `form_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_by_form_id(&self, form_id: &str) -> Result<Vec<Instance>, RepositoryError>;

    /// Returns every non-deleted row produced by `(form_id, version)`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn get_all_not_deleted_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Instance>, RepositoryError>;

    /// Inserts a row when `instance.id` is `None`, otherwise updates it.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] when updating a missing row.
    fn save(&self, instance: &Instance) -> Result<InstanceDbId, RepositoryError>;

    /// Removes a row. Missing rows are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn delete(&self, id: InstanceDbId) -> Result<(), RepositoryError>;

    /// Stamps `deleted_date` on a row.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn soft_delete(&self, id: InstanceDbId, deleted_at_millis: i64)
    -> Result<(), RepositoryError>;

    /// Clears `deleted_date` on a row.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn restore(&self, id: InstanceDbId) -> Result<(), RepositoryError>;

    /// Removes every row.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the backend fails.
    fn delete_all(&self) -> Result<(), RepositoryError>;
}

// ============================================================================
// SECTION: Header Parser
// ============================================================================

/// Errors raised while reading a definition header.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The document is not well-formed.
    #[error("malformed form definition: {0}")]
    Malformed(String),
    /// A required header field is absent.
    #[error("form definition missing required field: {0}")]
    MissingField(String),
}

/// Reads identifying metadata from a form definition.
///
/// Implementations are pure functions of the definition bytes.
pub trait FormHeaderParser: Send + Sync {
    /// Parses the definition header.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] when the header cannot be read.
    fn parse_header(&self, definition: &[u8]) -> Result<FormHeader, HeaderError>;
}
