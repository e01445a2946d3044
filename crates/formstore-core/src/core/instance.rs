// crates/formstore-core/src/core/instance.rs
// ============================================================================
// Module: Instance Records
// Description: Metadata rows describing filled-in form instances.
// Purpose: Model the Instances table independently of its storage backend.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! An [`Instance`] records one filled-in occurrence of a form. It names the
//! form that produced it through `(jr_form_id, jr_version)`, which is not a
//! foreign key: the referenced form row may be absent, soft-deleted, or shared
//! by several rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::InstanceDbId;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Being filled in.
    #[default]
    Incomplete,
    /// Finalized and ready to send.
    Complete,
    /// Accepted by the server.
    Submitted,
    /// Last send attempt failed.
    SubmissionFailed,
}

impl InstanceStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 4] =
        [Self::Incomplete, Self::Complete, Self::Submitted, Self::SubmissionFailed];

    /// Returns the stored label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
            Self::Submitted => "submitted",
            Self::SubmissionFailed => "submission_failed",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status label is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown instance status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for InstanceStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

// ============================================================================
// SECTION: Instance
// ============================================================================

/// Metadata row for one filled-in form instance.
///
/// # Invariants
/// - `id` is `None` until the row has been saved.
/// - `deleted_date` is `Some` exactly when the row is soft-deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Surrogate key assigned by the store.
    pub id: Option<InstanceDbId>,
    /// Human readable name.
    pub display_name: String,
    /// Submission endpoint override.
    pub submission_uri: Option<String>,
    /// Whether the instance may be edited after finalizing.
    pub can_edit_when_complete: bool,
    /// Absolute path of the instance file.
    pub instance_file_path: String,
    /// Form identifier of the producing form.
    pub jr_form_id: String,
    /// Version of the producing form.
    pub jr_version: Option<String>,
    /// Lifecycle status.
    pub status: InstanceStatus,
    /// Time of the last status change (unix millis).
    pub last_status_change_date: i64,
    /// Soft-deletion time (unix millis).
    pub deleted_date: Option<i64>,
    /// Geometry type of the captured geometry.
    pub geometry_type: Option<String>,
    /// Captured geometry payload.
    pub geometry: Option<String>,
}

impl Instance {
    /// Returns true when the instance is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_date.is_some()
    }

    /// Returns true when this instance was produced by the given natural key.
    #[must_use]
    pub fn references(&self, form_id: &str, version: Option<&str>) -> bool {
        self.jr_form_id == form_id && self.jr_version.as_deref() == version
    }
}

#[cfg(test)]
mod tests {
    use super::InstanceStatus;

    #[test]
    fn status_labels_parse_back() {
        for status in InstanceStatus::ALL {
            assert_eq!(status.as_str().parse::<InstanceStatus>(), Ok(status));
        }
        assert!("finalized".parse::<InstanceStatus>().is_err());
    }
}
