// crates/formstore-core/src/core/mod.rs
// ============================================================================
// Module: Formstore Core Types
// Description: Canonical form and instance metadata structures.
// Purpose: Provide stable, serializable types shared by every store backend.
// Dependencies: md5, quick-xml, serde
// ============================================================================

//! ## Overview
//! Core types describe form definitions, filled-in instances, their
//! identifiers, and the helpers used to fingerprint and read definition files.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod form;
pub mod hashing;
pub mod header;
pub mod identifiers;
pub mod instance;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use form::Form;
pub use form::FormHeader;
pub use form::MEDIA_DIR_SUFFIX;
pub use form::media_dir_for;
pub use header::XmlFormHeaderParser;
pub use identifiers::FormDbId;
pub use identifiers::InstanceDbId;
pub use identifiers::ProjectId;
pub use instance::Instance;
pub use instance::InstanceStatus;
pub use instance::UnknownStatus;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::unix_millis;
