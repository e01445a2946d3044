// crates/formstore-core/src/runtime/mod.rs
// ============================================================================
// Module: Formstore Runtime
// Description: Consistency machinery operating on the metadata repositories.
// Purpose: Expose the change lock, reconciler, deletion policy and
//          in-memory repositories.
// Dependencies: crate::core, crate::interfaces, crate::audit
// ============================================================================

//! ## Overview
//! Runtime components coordinate writers through per-project
//! [`ChangeLock`]s and keep the Forms table consistent with the forms
//! directory.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod change_lock;
pub mod deletion;
pub mod memory;
pub mod reconcile;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use change_lock::ChangeLock;
pub use change_lock::ChangeLockProvider;
pub use deletion::DeletionError;
pub use deletion::DeletionOutcome;
pub use deletion::FormDeleter;
pub use memory::InMemoryFormsRepository;
pub use memory::InMemoryInstancesRepository;
pub use reconcile::DiskFormsReconciler;
pub use reconcile::ReconcileError;
pub use reconcile::ReconcileReport;
