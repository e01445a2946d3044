// crates/formstore-core/src/core/hashing.rs
// ============================================================================
// Module: Formstore Content Hashing
// Description: Content hashes for form definition files.
// Purpose: Detect definition changes between reconciliation passes.
// Dependencies: md5
// ============================================================================

//! ## Overview
//! Definition files are fingerprinted with MD5 over their raw bytes. The hash
//! is a change detector stored alongside each form row, not an integrity or
//! authentication mechanism.

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns the lowercase hex MD5 digest of `bytes`.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}
