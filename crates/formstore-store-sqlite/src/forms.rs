// crates/formstore-store-sqlite/src/forms.rs
// ============================================================================
// Module: SQLite Forms Repository
// Description: Forms table schema history and repository.
// Purpose: Persist form definition metadata in forms.db.
// Dependencies: formstore-core, rusqlite
// ============================================================================

//! ## Overview
//! Schema history of the Forms database:
//! - v1: base table, including the legacy `jr_cache_file_path` column.
//! - v2: `auto_send`, `auto_delete`.
//! - v3: `geometry_xpath`.
//! - v4: `deleted` soft-delete flag.
//! - v5: table rebuilt without `jr_cache_file_path` and with
//!   `last_updated`; indexes re-created.
//!
//! `(form_id, version)` is deliberately not unique. Version matching uses
//! `IS` so that a missing version matches rows without one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::MutexGuard;

use formstore_core::Form;
use formstore_core::FormDbId;
use formstore_core::FormsRepository;
use formstore_core::RepositoryError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Params;
use rusqlite::Row;
use rusqlite::ToSql;
use rusqlite::params;

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

/// Forms table name.
const FORMS_TABLE: &str = "forms";

/// Versioned schema of `forms.db`.
pub const FORMS_SCHEMA: SchemaHistory = SchemaHistory {
    database: "forms",
    tables: &[FORMS_TABLE],
    create_current,
    upgrades: &[add_auto_send_columns, add_geometry_xpath, add_deleted_flag, drop_jr_cache_path],
};

/// Current shape of the Forms table.
fn forms_table() -> TableDef {
    TableDef::new(FORMS_TABLE)
        .column(ColumnDef::integer("_id").primary_key())
        .column(ColumnDef::text("display_name").not_null())
        .column(ColumnDef::text("description"))
        .column(ColumnDef::text("form_id").not_null())
        .column(ColumnDef::text("version"))
        .column(ColumnDef::text("md5_hash").not_null())
        .column(ColumnDef::integer("date").not_null())
        .column(ColumnDef::text("form_media_path").not_null())
        .column(ColumnDef::text("form_file_path").not_null())
        .column(ColumnDef::text("language"))
        .column(ColumnDef::text("submission_uri"))
        .column(ColumnDef::text("base64_rsa_public_key"))
        .column(ColumnDef::text("auto_send"))
        .column(ColumnDef::text("auto_delete"))
        .column(ColumnDef::text("geometry_xpath"))
        .column(deleted_column())
        .column(ColumnDef::integer("last_updated").not_null().default_integer(0))
}

/// Soft-delete flag column.
fn deleted_column() -> ColumnDef {
    ColumnDef::integer("deleted").not_null().default_integer(0)
}

/// Indexes of the current Forms table.
fn forms_indexes() -> [IndexDef; 3] {
    [
        IndexDef::new("idx_forms_md5_hash", FORMS_TABLE, &["md5_hash"]),
        IndexDef::new("idx_forms_file_path", FORMS_TABLE, &["form_file_path"]),
        IndexDef::new("idx_forms_form_id_version", FORMS_TABLE, &["form_id", "version"]),
    ]
}

/// Creates the current schema.
fn create_current(connection: &Connection) -> Result<(), SqliteStoreError> {
    create_table(connection, &forms_table())?;
    create_indexes(connection)
}

/// Creates every current index.
fn create_indexes(connection: &Connection) -> Result<(), SqliteStoreError> {
    for index in forms_indexes() {
        create_index(connection, &index)?;
    }
    Ok(())
}

/// v1 -> v2.
fn add_auto_send_columns(connection: &Connection) -> Result<(), SqliteStoreError> {
    add_column(connection, FORMS_TABLE, &ColumnDef::text("auto_send"))?;
    add_column(connection, FORMS_TABLE, &ColumnDef::text("auto_delete"))?;
    Ok(())
}

/// v2 -> v3.
fn add_geometry_xpath(connection: &Connection) -> Result<(), SqliteStoreError> {
    add_column(connection, FORMS_TABLE, &ColumnDef::text("geometry_xpath"))?;
    Ok(())
}

/// v3 -> v4.
fn add_deleted_flag(connection: &Connection) -> Result<(), SqliteStoreError> {
    add_column(connection, FORMS_TABLE, &deleted_column())?;
    Ok(())
}

/// v4 -> v5.
fn drop_jr_cache_path(connection: &Connection) -> Result<(), SqliteStoreError> {
    rebuild_table(connection, &forms_table())?;
    create_indexes(connection)
}

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Projection shared by every query, in [`form_from_row`] order.
const SELECT_FORMS: &str = "SELECT _id, display_name, description, form_id, version, md5_hash, \
                            date, form_media_path, form_file_path, language, submission_uri, \
                            base64_rsa_public_key, auto_send, auto_delete, geometry_xpath, \
                            deleted, last_updated FROM forms";

/// Inserts a row; parameters follow the projection without `_id`.
const INSERT_FORM: &str = "INSERT INTO forms (display_name, description, form_id, version, \
                           md5_hash, date, form_media_path, form_file_path, language, \
                           submission_uri, base64_rsa_public_key, auto_send, auto_delete, \
                           geometry_xpath, deleted, last_updated) VALUES (?1, ?2, ?3, ?4, ?5, \
                           ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)";

/// Updates a row; `?17` is the key.
const UPDATE_FORM: &str = "UPDATE forms SET display_name = ?1, description = ?2, form_id = ?3, \
                           version = ?4, md5_hash = ?5, date = ?6, form_media_path = ?7, \
                           form_file_path = ?8, language = ?9, submission_uri = ?10, \
                           base64_rsa_public_key = ?11, auto_send = ?12, auto_delete = ?13, \
                           geometry_xpath = ?14, deleted = ?15, last_updated = ?16 WHERE _id = \
                           ?17";

/// Decodes one projected row.
fn form_from_row(row: &Row<'_>) -> rusqlite::Result<Form> {
    Ok(Form {
        id: Some(FormDbId::new(row.get(0)?)),
        display_name: row.get(1)?,
        description: row.get(2)?,
        form_id: row.get(3)?,
        version: row.get(4)?,
        md5_hash: row.get(5)?,
        date: row.get(6)?,
        form_media_path: row.get(7)?,
        form_file_path: row.get(8)?,
        language: row.get(9)?,
        submission_uri: row.get(10)?,
        base64_rsa_public_key: row.get(11)?,
        auto_send: row.get(12)?,
        auto_delete: row.get(13)?,
        geometry_xpath: row.get(14)?,
        deleted: row.get(15)?,
        last_updated: row.get(16)?,
    })
}

/// Binds a row's columns in [`INSERT_FORM`] parameter order.
fn form_values(form: &Form) -> [&dyn ToSql; 16] {
    [
        &form.display_name,
        &form.description,
        &form.form_id,
        &form.version,
        &form.md5_hash,
        &form.date,
        &form.form_media_path,
        &form.form_file_path,
        &form.language,
        &form.submission_uri,
        &form.base64_rsa_public_key,
        &form.auto_send,
        &form.auto_delete,
        &form.geometry_xpath,
        &form.deleted,
        &form.last_updated,
    ]
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// `SQLite`-backed Forms repository.
pub struct SqliteFormsRepository {
    /// Connection to a migrated `forms.db`.
    connection: Mutex<Connection>,
}

impl SqliteFormsRepository {
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
            .map_err(|_| SqliteStoreError::Db("forms connection mutex poisoned".to_string()))
    }

    /// Runs the shared projection with a trailing clause.
    fn select<P: Params>(&self, clause: &str, params: P) -> Result<Vec<Form>, RepositoryError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(&format!("{SELECT_FORMS} {clause}"))
            .map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params, form_from_row)
            .map_err(|err| db_error(&err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| db_error(&err))?;
        Ok(rows)
    }

    /// Runs the shared projection expecting at most one row.
    fn select_one<P: Params>(
        &self,
        clause: &str,
        params: P,
    ) -> Result<Option<Form>, RepositoryError> {
        let connection = self.lock()?;
        let form = connection
            .query_row(&format!("{SELECT_FORMS} {clause}"), params, form_from_row)
            .optional()
            .map_err(|err| db_error(&err))?;
        Ok(form)
    }

    /// Executes a mutating statement.
    fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, RepositoryError> {
        let changed = self.lock()?.execute(sql, params).map_err(|err| db_error(&err))?;
        Ok(changed)
    }
}

impl FormsRepository for SqliteFormsRepository {
    fn get(&self, id: FormDbId) -> Result<Option<Form>, RepositoryError> {
        self.select_one("WHERE _id = ?1", params![id.get()])
    }

    fn get_one_by_path(&self, form_file_path: &str) -> Result<Option<Form>, RepositoryError> {
        self.select_one("WHERE form_file_path = ?1 ORDER BY _id LIMIT 1", params![form_file_path])
    }

    fn get_one_by_md5_hash(&self, md5_hash: &str) -> Result<Option<Form>, RepositoryError> {
        self.select_one("WHERE md5_hash = ?1 ORDER BY _id LIMIT 1", params![md5_hash])
    }

    fn get_all(&self) -> Result<Vec<Form>, RepositoryError> {
        self.select("ORDER BY _id", [])
    }

    fn get_all_not_deleted(&self) -> Result<Vec<Form>, RepositoryError> {
        self.select("WHERE deleted = 0 ORDER BY _id", [])
    }

    fn get_all_by_form_id(&self, form_id: &str) -> Result<Vec<Form>, RepositoryError> {
        self.select("WHERE form_id = ?1 ORDER BY _id", params![form_id])
    }

    fn get_all_not_deleted_by_form_id(
        &self,
        form_id: &str,
    ) -> Result<Vec<Form>, RepositoryError> {
        self.select("WHERE form_id = ?1 AND deleted = 0 ORDER BY _id", params![form_id])
    }

    fn get_all_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Form>, RepositoryError> {
        self.select("WHERE form_id = ?1 AND version IS ?2 ORDER BY _id", params![form_id, version])
    }

    fn get_all_not_deleted_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<Form>, RepositoryError> {
        self.select(
            "WHERE form_id = ?1 AND version IS ?2 AND deleted = 0 ORDER BY _id",
            params![form_id, version],
        )
    }

    fn get_latest_by_form_id_and_version(
        &self,
        form_id: &str,
        version: Option<&str>,
    ) -> Result<Option<Form>, RepositoryError> {
        self.select_one(
            "WHERE form_id = ?1 AND version IS ?2 ORDER BY date DESC, _id DESC LIMIT 1",
            params![form_id, version],
        )
    }

    fn save(&self, form: &Form) -> Result<FormDbId, RepositoryError> {
        let values = form_values(form);
        let connection = self.lock()?;
        if let Some(id) = form.id {
            let key = id.get();
            let mut values = values.to_vec();
            values.push(&key);
            let changed =
                connection.execute(UPDATE_FORM, values.as_slice()).map_err(|err| db_error(&err))?;
            if changed == 0 {
                return Err(RepositoryError::NotFound(format!("form {id}")));
            }
            Ok(id)
        } else {
            connection.execute(INSERT_FORM, values.as_slice()).map_err(|err| db_error(&err))?;
            Ok(FormDbId::new(connection.last_insert_rowid()))
        }
    }

    fn delete(&self, id: FormDbId) -> Result<(), RepositoryError> {
        self.execute("DELETE FROM forms WHERE _id = ?1", params![id.get()]).map(|_| ())
    }

    fn soft_delete(&self, id: FormDbId) -> Result<(), RepositoryError> {
        self.execute("UPDATE forms SET deleted = 1 WHERE _id = ?1", params![id.get()]).map(|_| ())
    }

    fn restore(&self, id: FormDbId) -> Result<(), RepositoryError> {
        self.execute("UPDATE forms SET deleted = 0 WHERE _id = ?1", params![id.get()]).map(|_| ())
    }

    fn delete_all(&self) -> Result<(), RepositoryError> {
        self.execute("DELETE FROM forms", []).map(|_| ())
    }
}
