// crates/formstore-store-sqlite/src/ddl.rs
// ============================================================================
// Module: SQLite DDL Builder
// Description: Typed table/column/index definitions and schema primitives.
// Purpose: Express schema migrations without hand-formatted SQL fragments.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Migrations are written against a small vocabulary: existence checks,
//! `add_column`, `rename_table`, `copy_rows`, `drop_table`, `create_table`,
//! `create_index` and the `rebuild_table` pattern built from them. Every
//! identifier and literal reaching SQL text passes through
//! [`quote_identifier`] or [`quote_literal`]; callers never format SQL.
//!
//! All primitives are idempotent where the schema allows it, so a step that
//! was interrupted can safely run again.
//!
//! ## Invariants
//! - Identifiers are always double-quoted with embedded quotes doubled.
//! - Literals are always single-quoted with embedded quotes doubled.
//! - Values that can be bound (names in catalog lookups) are bound, not
//!   interpolated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Quoting
// ============================================================================

/// Quotes an `SQLite` identifier.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes an `SQLite` string literal.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quotes and comma-joins a column list.
fn quote_list<S: AsRef<str>>(names: &[S]) -> String {
    names.iter().map(|name| quote_identifier(name.as_ref())).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// SECTION: Definitions
// ============================================================================

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    Text,
}

impl ColumnType {
    /// Returns the SQL type name.
    const fn sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
        }
    }
}

/// Constant default of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDefault {
    /// Integer default.
    Integer(i64),
    /// Text default.
    Text(String),
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    name: String,
    /// Storage class.
    column_type: ColumnType,
    /// Whether the column is the table's primary key.
    primary_key: bool,
    /// Whether NULL is rejected.
    not_null: bool,
    /// Optional default.
    default: Option<ColumnDefault>,
}

impl ColumnDef {
    /// Creates a nullable column without a default.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            not_null: false,
            default: None,
        }
    }

    /// Creates a nullable `INTEGER` column.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    /// Creates a nullable `TEXT` column.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    /// Marks the column as primary key. Integer keys never reuse values.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Rejects NULL values.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets an integer default.
    #[must_use]
    pub fn default_integer(mut self, value: i64) -> Self {
        self.default = Some(ColumnDefault::Integer(value));
        self
    }

    /// Sets a text default.
    #[must_use]
    pub fn default_text(mut self, value: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Text(value.into()));
        self
    }

    /// Returns the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the column definition clause.
    fn sql(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.column_type.sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.column_type == ColumnType::Integer {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        match &self.default {
            Some(ColumnDefault::Integer(value)) => sql.push_str(&format!(" DEFAULT {value}")),
            Some(ColumnDefault::Text(value)) => {
                sql.push_str(" DEFAULT ");
                sql.push_str(&quote_literal(value));
            }
            None => {}
        }
        sql
    }
}

/// Table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    /// Table name.
    name: String,
    /// Columns in declaration order.
    columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Creates a table definition without columns.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column definitions.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Renders `CREATE TABLE IF NOT EXISTS` for this table under `name`.
    fn create_sql(&self, name: &str) -> String {
        let columns = self.columns.iter().map(ColumnDef::sql).collect::<Vec<_>>().join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({columns})", quote_identifier(name))
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name.
    name: String,
    /// Indexed table.
    table: String,
    /// Indexed columns.
    columns: Vec<String>,
}

impl IndexDef {
    /// Creates an index definition.
    #[must_use]
    pub fn new(name: impl Into<String>, table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.iter().map(|column| (*column).to_string()).collect(),
        }
    }
}

// ============================================================================
// SECTION: Primitives
// ============================================================================

/// Returns true when `table` exists.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the catalog query fails.
pub fn table_exists(connection: &Connection, table: &str) -> Result<bool, SqliteStoreError> {
    connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Returns true when `table` has a column named `column`.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the catalog query fails.
pub fn column_exists(
    connection: &Connection,
    table: &str,
    column: &str,
) -> Result<bool, SqliteStoreError> {
    connection
        .query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Creates `table` unless it exists.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the statement fails.
pub fn create_table(connection: &Connection, table: &TableDef) -> Result<(), SqliteStoreError> {
    execute(connection, &table.create_sql(&table.name))
}

/// Creates `index` unless it exists.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the statement fails.
pub fn create_index(connection: &Connection, index: &IndexDef) -> Result<(), SqliteStoreError> {
    execute(
        connection,
        &format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_identifier(&index.name),
            quote_identifier(&index.table),
            quote_list(&index.columns)
        ),
    )
}

/// Adds `column` to `table`; does nothing when the column exists.
///
/// Returns true when the column was added.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the statement fails.
pub fn add_column(
    connection: &Connection,
    table: &str,
    column: &ColumnDef,
) -> Result<bool, SqliteStoreError> {
    if column_exists(connection, table, column.name())? {
        return Ok(false);
    }
    execute(
        connection,
        &format!("ALTER TABLE {} ADD COLUMN {}", quote_identifier(table), column.sql()),
    )?;
    Ok(true)
}

/// Renames `old` to `new`.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when `old` is missing or `new` exists.
pub fn rename_table(connection: &Connection, old: &str, new: &str) -> Result<(), SqliteStoreError> {
    execute(
        connection,
        &format!("ALTER TABLE {} RENAME TO {}", quote_identifier(old), quote_identifier(new)),
    )
}

/// Copies the named columns of every row in `source` into `destination`.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when a table or column is missing.
pub fn copy_rows<S: AsRef<str>>(
    connection: &Connection,
    source: &str,
    columns: &[S],
    destination: &str,
) -> Result<(), SqliteStoreError> {
    let columns = quote_list(columns);
    execute(
        connection,
        &format!(
            "INSERT INTO {} ({columns}) SELECT {columns} FROM {}",
            quote_identifier(destination),
            quote_identifier(source)
        ),
    )
}

/// Drops `table` if it exists.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the statement fails.
pub fn drop_table(connection: &Connection, table: &str) -> Result<(), SqliteStoreError> {
    execute(connection, &format!("DROP TABLE IF EXISTS {}", quote_identifier(table)))
}

/// Rebuilds an existing table into the shape of `table`.
///
/// The old table is renamed aside, the new shape created, the columns both
/// shapes share are copied and the old table dropped. Columns only present in
/// the new shape take their defaults; columns only present in the old one are
/// discarded. Indexes of the old table are dropped with it, so callers
/// re-create them afterwards. The old `AUTOINCREMENT` high-water mark carries
/// over, so keys deleted before the rebuild are not handed out again.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when any statement fails.
pub fn rebuild_table(connection: &Connection, table: &TableDef) -> Result<(), SqliteStoreError> {
    let aside = format!("{}_rebuild", table.name);
    drop_table(connection, &aside)?;
    rename_table(connection, &table.name, &aside)?;
    create_table(connection, table)?;
    let mut shared = Vec::new();
    for column in &table.columns {
        if column_exists(connection, &aside, column.name())? {
            shared.push(column.name());
        }
    }
    if !shared.is_empty() {
        copy_rows(connection, &aside, &shared, &table.name)?;
    }
    carry_sequence(connection, &aside, &table.name)?;
    drop_table(connection, &aside)
}

/// Raises the `AUTOINCREMENT` counter of `to` to at least that of `from`.
///
/// Does nothing when the database has no `sqlite_sequence` table.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when a statement fails.
fn carry_sequence(connection: &Connection, from: &str, to: &str) -> Result<(), SqliteStoreError> {
    if !table_exists(connection, "sqlite_sequence")? {
        return Ok(());
    }
    // sqlite_sequence has no key on `name`, so update before inserting.
    let updated = connection
        .execute(
            "UPDATE sqlite_sequence SET seq = (SELECT MAX(seq) FROM sqlite_sequence \
             WHERE name IN (?1, ?2)) WHERE name = ?2",
            params![from, to],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if updated == 0 {
        connection
            .execute(
                "INSERT INTO sqlite_sequence (name, seq) SELECT ?2, seq FROM sqlite_sequence \
                 WHERE name = ?1",
                params![from, to],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    Ok(())
}

/// Executes a single statement.
fn execute(connection: &Connection, sql: &str) -> Result<(), SqliteStoreError> {
    connection.execute_batch(sql).map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rusqlite::Connection;

    use super::ColumnDef;
    use super::IndexDef;
    use super::TableDef;
    use super::add_column;
    use super::column_exists;
    use super::create_index;
    use super::create_table;
    use super::drop_table;
    use super::quote_identifier;
    use super::quote_literal;
    use super::rebuild_table;
    use super::table_exists;

    fn people() -> TableDef {
        TableDef::new("people")
            .column(ColumnDef::integer("_id").primary_key())
            .column(ColumnDef::text("name").not_null())
    }

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn column_clause_renders_constraints() {
        let column = ColumnDef::text("mode").not_null().default_text("o'k");
        assert_eq!(column.sql(), "\"mode\" TEXT NOT NULL DEFAULT 'o''k'");
        let key = ColumnDef::integer("_id").primary_key();
        assert_eq!(key.sql(), "\"_id\" INTEGER PRIMARY KEY AUTOINCREMENT");
    }

    #[test]
    fn primitives_are_idempotent() {
        let connection = Connection::open_in_memory().expect("open");
        create_table(&connection, &people()).expect("create");
        create_table(&connection, &people()).expect("create again");
        let flag = ColumnDef::integer("flag").not_null().default_integer(0);
        assert!(add_column(&connection, "people", &flag).expect("add"));
        assert!(!add_column(&connection, "people", &flag).expect("add again"));
        let index = IndexDef::new("idx_people_name", "people", &["name"]);
        create_index(&connection, &index).expect("index");
        create_index(&connection, &index).expect("index again");
        drop_table(&connection, "people").expect("drop");
        drop_table(&connection, "people").expect("drop again");
        assert!(!table_exists(&connection, "people").expect("exists"));
    }

    #[test]
    fn rebuild_keeps_shared_columns() {
        let connection = Connection::open_in_memory().expect("open");
        create_table(&connection, &people()).expect("create");
        add_column(&connection, "people", &ColumnDef::text("legacy")).expect("legacy");
        connection
            .execute_batch("INSERT INTO people (name, legacy) VALUES ('ada', 'x'), ('bob', 'y')")
            .expect("insert");

        let reshaped = people().column(ColumnDef::integer("score").not_null().default_integer(7));
        rebuild_table(&connection, &reshaped).expect("rebuild");

        assert!(!column_exists(&connection, "people", "legacy").expect("legacy"));
        assert!(!table_exists(&connection, "people_rebuild").expect("aside"));
        let rows: Vec<(i64, String, i64)> = connection
            .prepare("SELECT _id, name, score FROM people ORDER BY _id")
            .expect("prepare")
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("rows");
        assert_eq!(rows, vec![(1, "ada".to_string(), 7), (2, "bob".to_string(), 7)]);
    }

    #[test]
    fn rebuild_keeps_the_key_high_water_mark() {
        let connection = Connection::open_in_memory().expect("open");
        create_table(&connection, &people()).expect("create");
        connection
            .execute_batch(
                "INSERT INTO people (_id, name) VALUES (1, 'ada'), (9, 'bob');
                 DELETE FROM people WHERE _id = 9;",
            )
            .expect("seed");
        rebuild_table(&connection, &people()).expect("rebuild");
        connection.execute_batch("INSERT INTO people (name) VALUES ('cy')").expect("insert");
        assert_eq!(connection.last_insert_rowid(), 10);

        let emptied = Connection::open_in_memory().expect("open");
        create_table(&emptied, &people()).expect("create");
        emptied
            .execute_batch("INSERT INTO people (_id, name) VALUES (4, 'ada'); DELETE FROM people;")
            .expect("seed");
        rebuild_table(&emptied, &people()).expect("rebuild");
        emptied.execute_batch("INSERT INTO people (name) VALUES ('bob')").expect("insert");
        assert_eq!(emptied.last_insert_rowid(), 5);
    }

    proptest! {
        #[test]
        fn any_identifier_round_trips_through_the_catalog(suffix in "[a-zA-Z0-9 \"';()-]{0,16}") {
            let name = format!("t{suffix}");
            let connection = Connection::open_in_memory().expect("open");
            let table = TableDef::new(name.clone()).column(ColumnDef::text(name.clone()));
            create_table(&connection, &table).expect("create");
            prop_assert!(table_exists(&connection, &name).expect("exists"));
            prop_assert!(column_exists(&connection, &name, &name).expect("column"));
        }

        #[test]
        fn any_literal_selects_back_unchanged(value in "[^\u{0}]{0,32}") {
            let connection = Connection::open_in_memory().expect("open");
            let selected: String = connection
                .query_row(&format!("SELECT {}", quote_literal(&value)), [], |row| row.get(0))
                .expect("select");
            prop_assert_eq!(selected, value);
        }
    }
}
