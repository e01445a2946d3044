// crates/formstore-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Form Store
// Description: Opens and migrates a project's metadata databases.
// Purpose: Hand out SQLite-backed Forms and Instances repositories.
// Dependencies: formstore-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! A project's metadata directory holds two databases: [`FORMS_DB_FILE`] and
//! [`INSTANCES_DB_FILE`]. [`SqliteFormStore::open`] validates the paths,
//! opens each database with the configured pragmas and runs its migration
//! before any repository is handed out. Database contents are untrusted:
//! undecodable rows surface as errors rather than panics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use formstore_core::FormStoreAuditSink;
use formstore_core::MigrationAuditEvent;
use formstore_core::NoopAuditSink;
use formstore_core::RepositoryError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;
use thiserror::Error;

use crate::forms::FORMS_SCHEMA;
use crate::forms::SqliteFormsRepository;
use crate::instances::INSTANCES_SCHEMA;
use crate::instances::SqliteInstancesRepository;
use crate::migration::MigrationReport;
use crate::migration::SchemaHistory;
use crate::migration::migrate;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File name of the Forms database inside the metadata directory.
pub const FORMS_DB_FILE: &str = "forms.db";
/// File name of the Instances database inside the metadata directory.
pub const INSTANCES_DB_FILE: &str = "instances.db";
/// Default busy timeout for `SQLite` connections.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for a project's metadata databases.
///
/// # Invariants
/// - `metadata_dir` must resolve to a directory (created when missing).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Directory holding `forms.db` and `instances.db`.
    pub metadata_dir: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default pragmas.
    #[must_use]
    pub fn new(metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            metadata_dir: metadata_dir.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Returns the Forms database path.
    #[must_use]
    pub fn forms_db_path(&self) -> PathBuf {
        self.metadata_dir.join(FORMS_DB_FILE)
    }

    /// Returns the Instances database path.
    #[must_use]
    pub fn instances_db_path(&self) -> PathBuf {
        self.metadata_dir.join(INSTANCES_DB_FILE)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding row payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored data could not be decoded.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version has no migration path.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for RepositoryError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::VersionMismatch(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
        }
    }
}

/// Maps an engine error into a store error.
pub(crate) fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// A project's migrated Forms and Instances databases.
///
/// # Invariants
/// - Both databases are at their current schema version once constructed.
/// - Each connection is serialized through its repository's mutex.
pub struct SqliteFormStore {
    /// Forms repository.
    forms: Arc<SqliteFormsRepository>,
    /// Instances repository.
    instances: Arc<SqliteInstancesRepository>,
    /// Migration outcome per database, Forms first.
    migration_reports: Vec<MigrationReport>,
}

impl SqliteFormStore {
    /// Opens and migrates both databases without audit output.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when a path is invalid, a database
    /// cannot be opened or a migration fails.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Self::open_with_audit(config, &NoopAuditSink)
    }

    /// Opens and migrates both databases, recording each migration.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when a path is invalid, a database
    /// cannot be opened or a migration fails.
    pub fn open_with_audit(
        config: &SqliteStoreConfig,
        audit: &dyn FormStoreAuditSink,
    ) -> Result<Self, SqliteStoreError> {
        ensure_metadata_dir(&config.metadata_dir)?;
        let (forms_connection, forms_report) =
            open_database(&config.forms_db_path(), config, &FORMS_SCHEMA, audit)?;
        let (instances_connection, instances_report) =
            open_database(&config.instances_db_path(), config, &INSTANCES_SCHEMA, audit)?;
        Ok(Self {
            forms: Arc::new(SqliteFormsRepository::new(forms_connection)),
            instances: Arc::new(SqliteInstancesRepository::new(instances_connection)),
            migration_reports: vec![forms_report, instances_report],
        })
    }

    /// Returns the Forms repository.
    #[must_use]
    pub fn forms(&self) -> Arc<SqliteFormsRepository> {
        Arc::clone(&self.forms)
    }

    /// Returns the Instances repository.
    #[must_use]
    pub fn instances(&self) -> Arc<SqliteInstancesRepository> {
        Arc::clone(&self.instances)
    }

    /// Returns what opening did to each database.
    #[must_use]
    pub fn migration_reports(&self) -> &[MigrationReport] {
        &self.migration_reports
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens one database and migrates it to its current schema.
fn open_database(
    path: &Path,
    config: &SqliteStoreConfig,
    history: &SchemaHistory,
    audit: &dyn FormStoreAuditSink,
) -> Result<(Connection, MigrationReport), SqliteStoreError> {
    validate_store_path(path)?;
    let mut connection = open_connection(path, config)?;
    let report = migrate(&mut connection, history)?;
    audit.record_migration(&MigrationAuditEvent::new(
        report.database,
        report.from_version,
        report.to_version,
        report.action,
    ));
    Ok((connection, report))
}

/// Creates the metadata directory, rejecting paths that are files.
fn ensure_metadata_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("metadata dir must not be empty".to_string()));
    }
    if path.exists() && !path.is_dir() {
        return Err(SqliteStoreError::Invalid("metadata dir must be a directory".to_string()));
    }
    std::fs::create_dir_all(path).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(
    path: &Path,
    config: &SqliteStoreConfig,
) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies journal, sync and busy-timeout pragmas.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}
