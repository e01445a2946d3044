// crates/formstore-core/src/lib.rs
// ============================================================================
// Module: Formstore Core Library
// Description: Public API surface for the formstore core.
// Purpose: Expose metadata types, repository interfaces and the consistency
//          runtime.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Formstore keeps a project's form and instance metadata consistent with a
//! forms directory that may change outside the application and with
//! concurrent in-process writers. It is backend-agnostic: storage is reached
//! through [`FormsRepository`] and [`InstancesRepository`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use audit::FileAuditSink;
pub use audit::FormStoreAuditSink;
pub use audit::MigrationAction;
pub use audit::MigrationAuditEvent;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use interfaces::FormHeaderParser;
pub use interfaces::FormsRepository;
pub use interfaces::HeaderError;
pub use interfaces::InstancesRepository;
pub use interfaces::RepositoryError;
pub use runtime::ChangeLock;
pub use runtime::ChangeLockProvider;
pub use runtime::DeletionError;
pub use runtime::DeletionOutcome;
pub use runtime::DiskFormsReconciler;
pub use runtime::FormDeleter;
pub use runtime::InMemoryFormsRepository;
pub use runtime::InMemoryInstancesRepository;
pub use runtime::ReconcileError;
pub use runtime::ReconcileReport;
