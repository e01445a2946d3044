// crates/formstore-store-sqlite/src/instances.rs
// ============================================================================
// Module: SQLite Instances Repository
// Description: Instances table schema history and repository.
// Purpose: Persist filled-in form instance metadata in instances.db.
// Dependencies: formstore-core, rusqlite
// ============================================================================

//! ## Overview
//! Schema history of the Instances database:
//! - v1: base table, including the legacy `display_subtext` column.
//! - v2: `deleted_date`.
//! - v3: `geometry_type`, `geometry`.
//! - v4: table rebuilt without `display_subtext`; indexes re-created.
//!
//! `(jr_form_id, jr_version)` names the producing form but is not a foreign
//! key. Statuses are stored as their text labels.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::MutexGuard;

use formstore_core::Instance;
use formstore_core::InstanceDbId;
use formstore_core::InstanceStatus;
use formstore_core::InstancesRepository;
use formstore_core::RepositoryError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Params;
use rusqlite::Row;
use rusqlite::ToSql;
use rusqlite::params;
use rusqlite::params_from_iter;

use crate::ddl::ColumnDef;
use crate::ddl::IndexDef;
use crate::ddl::TableDef;
use crate::ddl::add_column;
use crate::ddl::create_index;
use crate::ddl::create_table;
use crate::ddl::rebuild_table;
use crate::migration::SchemaHistory;
use crate::store::SqliteStoreError;
use crate::store::db_error;

// ============================================================================
// SECTION: Schema
// ============================================================================

/// Instances table name.
const INSTANCES_TABLE: &str = "instances";

/// Versioned schema of `instances.db`.
pub const INSTANCES_SCHEMA: SchemaHistory = SchemaHistory {
    database: "instances",
    tables: &[INSTANCES_TABLE],
    create_current,
    upgrades: &[add_deleted_date, add_geometry_columns, drop_display_subtext],
};

/// Current shape of the Instances table.
fn instances_table() -> TableDef {
    TableDef::new(INSTANCES_TABLE)
        .column(ColumnDef::integer("_id").primary_key())
        .column(ColumnDef::text("display_name").not_null())
        .column(ColumnDef::text("submission_uri"))
        .column(ColumnDef::integer("can_edit_when_complete").not_null().default_integer(0))
        .column(ColumnDef::text("instance_file_path").not_null())
        .column(ColumnDef::text("jr_form_id").not_null())
        .column(ColumnDef::text("jr_version"))
        .column(
            ColumnDef::text("status").not_null().default_text(InstanceStatus::Incomplete.as_str()),
        )
        .column(ColumnDef::integer("last_status_change_date").not_null().default_integer(0))
        .column(ColumnDef::integer("deleted_date"))
        .column(ColumnDef::text("geometry_type"))
        .column(ColumnDef::text("geometry"))
}

/// Indexes of the current Instances table.
fn instances_indexes() -> [IndexDef; 2] {
    [
        IndexDef::new("idx_instances_form", INSTANCES_TABLE, &["jr_form_id", "jr_version"]),
        IndexDef::new("idx_instances_status", INSTANCES_TABLE, &["status"]),
    ]
}

/// Creates the current schema.
fn create_current(connection: &Connection) -> Result<(), SqliteStoreError> {
    create_table(connection, &instances_table())?;
    create_indexes(connection)
}

/// Creates every current index.
fn create_indexes(connection: &Connection) -> Result<(), SqliteStoreError> {
    for index in instances_indexes() {
        create_index(connection, &index)?;
    }
    Ok(())
}

/// v1 -> v2.
fn add_deleted_date(connection: &Connection) -> Result<(), SqliteStoreError> {
    add_column(connection, INSTANCES_TABLE, &ColumnDef::integer("deleted_date"))?;
    Ok(())
}

/// v2 -> v3.
fn add_geometry_columns(connection: &Connection) -> Result<(), SqliteStoreError> {
    add_column(connection, INSTANCES_TABLE, &ColumnDef::text("geometry_type"))?;
    add_column(connection, INSTANCES_TABLE, &ColumnDef::text("geometry"))?;
    Ok(())
}

/// v3 -> v4.
fn drop_display_subtext(connection: &Connection) -> Result<(), SqliteStoreError> {
    rebuild_table(connection, &instances_table())?;
    create_indexes(connection)
}

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Projection shared by every query, in [`instance_from_row`] order.
const SELECT_INSTANCES: &str = "SELECT _id, display_name, submission_uri, \
                                can_edit_when_complete, instance_file_path, jr_form_id, \
                                jr_version, status, last_status_change_date, deleted_date, \
                                geometry_type, geometry FROM instances";

/// Inserts a row; parameters follow the projection without `_id`.
const INSERT_INSTANCE: &str = "INSERT INTO instances (display_name, submission_uri, \
                               can_edit_when_complete, instance_file_path, jr_form_id, \
                               jr_version, status, last_status_change_date, deleted_date, \
                               geometry_type, geometry) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, \
                               ?9, ?10, ?11)";

/// Updates a row; `?12` is the key.
const UPDATE_INSTANCE: &str = "UPDATE instances SET display_name = ?1, submission_uri = ?2, \
                               can_edit_when_complete = ?3, instance_file_path = ?4, jr_form_id \
                               = ?5, jr_version = ?6, status = ?7, last_status_change_date = ?8, \
                               deleted_date = ?9, geometry_type = ?10, geometry = ?11 WHERE _id \
                               = ?12";

/// An instance row whose status label is not yet validated.
struct RawInstance {
    /// Row with a placeholder status.
    instance: Instance,
    /// Stored status label.
    status: String,
}

impl RawInstance {
    /// Parses the status label.
    fn decode(self) -> Result<Instance, SqliteStoreError> {
        let status = self
            .status
            .parse::<InstanceStatus>()
            .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
        Ok(Instance {
            status,
            ..self.instance
        })
    }
}

/// Reads one projected row.
fn instance_from_row(row: &Row<'_>) -> rusqlite::Result<RawInstance> {
    Ok(RawInstance {
        instance: Instance {
            id: Some(InstanceDbId::new(row.get(0)?)),
            display_name: row.get(1)?,
            submission_uri: row.get(2)?,
            can_edit_when_complete: row.get(3)?,
            instance_file_path: row.get(4)?,
            jr_form_id: row.get(5)?,
            jr_version: row.get(6)?,
            status: InstanceStatus::default(),
            last_status_change_date: row.get(8)?,
            deleted_date: row.get(9)?,
            geometry_type: row.get(10)?,
            geometry: row.get(11)?,
        },
        status: row.get(7)?,
    })
}

/// Returns `?1, ?2, ...` for `count` parameters.
fn placeholders(count: usize) -> String {
    (1 ..= count).map(|index| format!("?{index}")).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// `SQLite`-backed Instances repository.
pub struct SqliteInstancesRepository {
    /// Connection to a migrated `instances.db`.
    connection: Mutex<Connection>,
}

impl SqliteInstancesRepository {
    /// Wraps a connection whose schema is already current.
    pub(crate) const fn new(connection: Connection) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("instances connection mutex poisoned".to_string()))
    }

    /// Runs the shared projection with a trailing clause.
    fn select<P: Params>(
        &self,
        clause: &str,
        params: P,
    ) -> Result<Vec<Instance>, RepositoryError> {
        let raw = {
            let connection = self.lock()?;
            let mut statement = connection
                .prepare(&format!("{SELECT_INSTANCES} {clause}"))
                .map_err(|err| db_error(&err))?;
            statement
                .query_map(params, instance_from_row)
                .map_err(|err| db_error(&err))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| db_error(&err))?
        };
        let instances = raw.into_iter().map(RawInstance::decode).collect::<Result<Vec<_>, _>>()?;
        Ok(instances)
    }

    /// Runs the shared projection expecting at most one row.
    fn select_one<P: Params>(
        &self,
        clause: &str,
        params: P,
    ) -> Result<Option<Instance>, RepositoryError> {
        let raw = self
            .lock()?
            .query_row(&format!("{SELECT_INSTANCES} {clause}"), params, instance_from_row)
            .optional()
            .map_err(|err| db_error(&err))?;
        Ok(raw.map(RawInstance::decode).transpose()?)
    }

    /// Executes a mutating statement.
    fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, RepositoryError> {
        let changed = self.lock()?.execute(sql, params).map_err(|err| db_error(&err))?;
        Ok(changed)
    }
}

impl InstancesRepository for SqliteInstancesRepository {
    fn get(&self, id: InstanceDbId) -> Result<Option<Instance>, RepositoryError> {
        self.select_one("WHERE _id = ?1", params![id.get()])
    }

    fn get_one_by_path(
        &self,
        instance_file_path: &str,
    ) -> Result<Option<Instance>, RepositoryError> {
        self.select_one(
            "WHERE instance_file_path = ?1 ORDER BY _id LIMIT 1",
            params![instance_file_path],
        )
    }

    fn get_all(&self) -> Result<Vec<Instance>, RepositoryError> {
        self.select("ORDER BY _id", [])
    }

    fn get_all_not_deleted(&self) -> Result<Vec<Instance>, RepositoryError> {
        self.select("WHERE deleted_date IS NULL ORDER BY _id", [])
    }

    fn get_all_by_status(
        &self,
        statuses: &[InstanceStatus],
    ) -> Result<Vec<Instance>, RepositoryError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let clause = format!("WHERE status IN ({}) ORDER BY _id", placeholders(statuses.len()));
        self.select(&clause, params_from_iter(statuses.iter().map(|status| status.as_str())))
    }

    fn get_count_by_status(&self, statuses: &[InstanceStatus]) -> Result<u64, RepositoryError> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM instances WHERE status IN ({})",
            placeholders(statuses.len())
        );
        let count: i64 = self
            .lock()?
            .query_row(
                &sql,
                params_from_iter(statuses.iter().map(|status| status.as_str())),
                |row| row.get(0),
            )
            .map_err(|err| db_error(&err))?;
        u64::try_from(count)
            .map_err(|_| RepositoryError::Invalid(format!("negative instance count {count}")))
    }

    fn get_all_by_form_id(&self, form_id: &str) -> Result<Vec<Instance>, RepositoryError> {
        self.select("WHERE jr_form_id = ?1 ORDER BY _id", params![form_id])
    }

    fn get_all_not_deleted_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Instance>, RepositoryError> {
        self.select(
            "WHERE jr_form_id = ?1 AND jr_version IS ?2 AND deleted_date IS NULL ORDER BY _id",
            params![form_id, version],
        )
    }

    fn save(&self, instance: &Instance) -> Result<InstanceDbId, RepositoryError> {
        let status = instance.status.as_str();
        let values: [&dyn ToSql; 11] = [
            &instance.display_name,
            &instance.submission_uri,
            &instance.can_edit_when_complete,
            &instance.instance_file_path,
            &instance.jr_form_id,
            &instance.jr_version,
            &status,
            &instance.last_status_change_date,
            &instance.deleted_date,
            &instance.geometry_type,
            &instance.geometry,
        ];
        let connection = self.lock()?;
        if let Some(id) = instance.id {
            let key = id.get();
            let mut values = values.to_vec();
            values.push(&key);
            let changed = connection
                .execute(UPDATE_INSTANCE, values.as_slice())
                .map_err(|err| db_error(&err))?;
            if changed == 0 {
                return Err(RepositoryError::NotFound(format!("instance {id}")));
            }
            Ok(id)
        } else {
            connection.execute(INSERT_INSTANCE, values.as_slice()).map_err(|err| db_error(&err))?;
            Ok(InstanceDbId::new(connection.last_insert_rowid()))
        }
    }

    fn delete(&self, id: InstanceDbId) -> Result<(), RepositoryError> {
        self.execute("DELETE FROM instances WHERE _id = ?1", params![id.get()]).map(|_| ())
    }

    fn soft_delete(
        &self,
        id: InstanceDbId,
        deleted_at_millis: i64,
    ) -> Result<(), RepositoryError> {
        self.execute(
            "UPDATE instances SET deleted_date = ?1 WHERE _id = ?2",
            params![deleted_at_millis, id.get()],
        )
        .map(|_| ())
    }

    fn restore(&self, id: InstanceDbId) -> Result<(), RepositoryError> {
        self.execute("UPDATE instances SET deleted_date = NULL WHERE _id = ?1", params![id.get()])
            .map(|_| ())
    }

    fn delete_all(&self) -> Result<(), RepositoryError> {
        self.execute("DELETE FROM instances", []).map(|_| ())
    }
}
