// crates/formstore-store-sqlite/src/lib.rs
// ============================================================================
// Module: Formstore SQLite Store
// Description: Forms and Instances metadata backed by SQLite.
// Purpose: Provide durable repositories with versioned schema migrations.
// Dependencies: formstore-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate stores a project's metadata in two independently versioned
//! `SQLite` databases, `forms.db` and `instances.db`. Opening a store runs
//! the migration driver for each database before any repository call is
//! served. Schema changes are expressed through a typed DDL vocabulary that
//! quotes every identifier and literal itself.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod ddl;
pub mod forms;
pub mod instances;
pub mod migration;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use forms::FORMS_SCHEMA;
pub use forms::SqliteFormsRepository;
pub use instances::INSTANCES_SCHEMA;
pub use instances::SqliteInstancesRepository;
pub use migration::MigrationReport;
pub use migration::SchemaHistory;
pub use migration::migrate;
pub use store::DEFAULT_BUSY_TIMEOUT_MS;
pub use store::FORMS_DB_FILE;
pub use store::INSTANCES_DB_FILE;
pub use store::SqliteFormStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
