// crates/formstore-store-sqlite/src/migration.rs
// ============================================================================
// Module: SQLite Schema Migration Driver
// Description: Brings a database from its stored version to the current one.
// Purpose: Upgrade step by step, and tolerate databases from newer builds.
// Dependencies: formstore-core, rusqlite, serde
// ============================================================================

//! ## Overview
//! Each database records its schema version in `PRAGMA user_version`. On
//! open the driver compares it with the version its [`SchemaHistory`]
//! expects:
//! - `0`: a fresh file; the current schema is created directly. When one of
//!   the known tables already exists the file holds an unversioned schema of
//!   unknown shape, and it is recreated instead.
//! - below current: each upgrade step runs in its own transaction, which
//!   also writes the next version, so an interrupted upgrade resumes from
//!   the last completed step.
//! - current: nothing to do.
//! - above current (or negative): the known tables are dropped and the
//!   current schema is created. Rows written by the incompatible build are
//!   lost; opening never fails because of the version alone.

// ============================================================================
// SECTION: Imports
// ============================================================================

use formstore_core::MigrationAction;
use rusqlite::Connection;
use serde::Serialize;

use crate::ddl::drop_table;
use crate::ddl::table_exists;
use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One schema change on a database handle.
pub type MigrationStep = fn(&Connection) -> Result<(), SqliteStoreError>;

/// Versioned schema of one database.
#[derive(Debug, Clone, Copy)]
pub struct SchemaHistory {
    /// Database label used in reports and audit events.
    pub database: &'static str,
    /// Tables owned by this schema, dropped when recreating.
    pub tables: &'static [&'static str],
    /// Creates the current schema on an empty database.
    pub create_current: MigrationStep,
    /// `upgrades[n]` takes the schema from version `n + 1` to `n + 2`.
    pub upgrades: &'static [MigrationStep],
}

impl SchemaHistory {
    /// Returns the version this history produces.
    #[must_use]
    pub fn current_version(&self) -> i64 {
        i64::try_from(self.upgrades.len()).map_or(i64::MAX, |steps| steps + 1)
    }
}

/// Outcome of migrating one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Database label.
    pub database: &'static str,
    /// Version found on disk.
    pub from_version: i64,
    /// Version after migration.
    pub to_version: i64,
    /// What the driver did.
    pub action: MigrationAction,
}

// ============================================================================
// SECTION: Driver
// ============================================================================

/// Migrates `connection` to the current version of `history`.
///
/// # Errors
///
/// Returns [`SqliteStoreError`] when reading the version or a migration
/// statement fails. Completed steps stay committed.
pub fn migrate(
    connection: &mut Connection,
    history: &SchemaHistory,
) -> Result<MigrationReport, SqliteStoreError> {
    let from_version = read_user_version(connection)?;
    let to_version = history.current_version();
    let unversioned = from_version == 0 && holds_any_table(connection, history)?;
    let action = if from_version == 0 && !unversioned {
        in_transaction(connection, |tx| {
            (history.create_current)(tx)?;
            write_user_version(tx, to_version)
        })?;
        MigrationAction::Created
    } else if unversioned || from_version > to_version || from_version < 0 {
        in_transaction(connection, |tx| {
            for table in history.tables {
                drop_table(tx, table)?;
            }
            (history.create_current)(tx)?;
            write_user_version(tx, to_version)
        })?;
        MigrationAction::Recreated
    } else if from_version < to_version {
        for version in from_version .. to_version {
            let step = upgrade_step(history, version)?;
            in_transaction(connection, |tx| {
                step(tx)?;
                write_user_version(tx, version + 1)
            })?;
        }
        MigrationAction::Upgraded
    } else {
        MigrationAction::Current
    };
    Ok(MigrationReport {
        database: history.database,
        from_version,
        to_version,
        action,
    })
}

/// Returns the step upgrading from `version` to `version + 1`.
fn upgrade_step(history: &SchemaHistory, version: i64) -> Result<MigrationStep, SqliteStoreError> {
    usize::try_from(version - 1)
        .ok()
        .and_then(|index| history.upgrades.get(index).copied())
        .ok_or_else(|| {
            SqliteStoreError::VersionMismatch(format!(
                "{} has no upgrade from version {version}",
                history.database
            ))
        })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads `PRAGMA user_version`.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the pragma cannot be read.
pub fn read_user_version(connection: &Connection) -> Result<i64, SqliteStoreError> {
    connection
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Returns true when any table owned by `history` exists.
fn holds_any_table(
    connection: &Connection,
    history: &SchemaHistory,
) -> Result<bool, SqliteStoreError> {
    for table in history.tables {
        if table_exists(connection, table)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Writes `PRAGMA user_version`.
fn write_user_version(connection: &Connection, version: i64) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA user_version = {version}"))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Runs `body` in a transaction, committing only on success.
fn in_transaction<F>(connection: &mut Connection, body: F) -> Result<(), SqliteStoreError>
where
    F: FnOnce(&Connection) -> Result<(), SqliteStoreError>,
{
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    body(&tx)?;
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
