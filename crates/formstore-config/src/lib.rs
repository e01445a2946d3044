// crates/formstore-config/src/lib.rs
// ============================================================================
// Module: Formstore Config
// Description: TOML configuration for formstore projects.
// Purpose: Turn a validated config file into explicit runtime objects.
// Dependencies: formstore-core, formstore-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Loads `formstore.toml`, validates it and builds the per-project objects
//! the runtime needs: store configuration, audit sink and forms directory.
//! Nothing here is global; callers pass the resulting [`ProjectContext`]
//! into repositories, the reconciler and the deleter.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::CONFIG_ENV;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_FILE;
pub use config::FormStoreConfig;
pub use config::ProjectConfig;
pub use config::ProjectContext;
pub use config::StoreConfig;
