// crates/formstore-core/src/core/form.rs
// ============================================================================
// Module: Form Records
// Description: Metadata rows describing imported form definitions.
// Purpose: Model the Forms table independently of its storage backend.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Form`] is one row per imported definition file. The declared
//! `(form_id, version)` pair is a natural key that is *not* unique: the same
//! or a modified definition may be copied into the forms directory more than
//! once, and every copy keeps its own row keyed by file path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FormDbId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Suffix appended to a definition file stem to name its media directory.
pub const MEDIA_DIR_SUFFIX: &str = "-media";

// ============================================================================
// SECTION: Form Header
// ============================================================================

/// Minimal metadata read from a definition header.
///
/// # Invariants
/// - `form_id` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormHeader {
    /// Declared form identifier.
    pub form_id: String,
    /// Declared version, when present.
    pub version: Option<String>,
    /// Title declared by the definition, when present.
    pub display_name: Option<String>,
    /// Submission endpoint override.
    pub submission_uri: Option<String>,
    /// Public key used to encrypt submissions.
    pub base64_rsa_public_key: Option<String>,
    /// Auto-send override declared by the definition.
    pub auto_send: Option<String>,
    /// Auto-delete override declared by the definition.
    pub auto_delete: Option<String>,
}

// ============================================================================
// SECTION: Form
// ============================================================================

/// Metadata row for one imported form definition file.
///
/// # Invariants
/// - `id` is `None` until the row has been saved.
/// - `form_file_path` identifies the row among rows sharing a natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Surrogate key assigned by the store.
    pub id: Option<FormDbId>,
    /// Declared form identifier.
    pub form_id: String,
    /// Declared version string.
    pub version: Option<String>,
    /// Human readable name.
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// MD5 content hash of the definition file (lowercase hex).
    pub md5_hash: String,
    /// Absolute path of the definition file.
    pub form_file_path: String,
    /// Absolute path of the media directory.
    pub form_media_path: String,
    /// Import time (unix millis).
    pub date: i64,
    /// Default language.
    pub language: Option<String>,
    /// Submission endpoint override.
    pub submission_uri: Option<String>,
    /// Public key used to encrypt submissions.
    pub base64_rsa_public_key: Option<String>,
    /// Auto-send override.
    pub auto_send: Option<String>,
    /// Auto-delete override.
    pub auto_delete: Option<String>,
    /// Geometry expression used for map display.
    pub geometry_xpath: Option<String>,
    /// Soft-delete marker.
    pub deleted: bool,
    /// Time of the last reconciliation write (unix millis).
    pub last_updated: i64,
}

impl Form {
    /// Builds a new, unsaved form row from a parsed header.
    #[must_use]
    pub fn from_header(
        header: FormHeader,
        md5_hash: String,
        form_file_path: &Path,
        now_millis: i64,
    ) -> Self {
        let display_name = header.display_name.clone().unwrap_or_else(|| file_stem(form_file_path));
        let mut form = Self {
            id: None,
            form_id: String::new(),
            version: None,
            display_name,
            description: None,
            md5_hash,
            form_file_path: form_file_path.to_string_lossy().into_owned(),
            form_media_path: media_dir_for(form_file_path).to_string_lossy().into_owned(),
            date: now_millis,
            language: None,
            submission_uri: None,
            base64_rsa_public_key: None,
            auto_send: None,
            auto_delete: None,
            geometry_xpath: None,
            deleted: false,
            last_updated: now_millis,
        };
        form.apply_header(header);
        form
    }

    /// Overwrites the header-derived fields of this row.
    pub fn apply_header(&mut self, header: FormHeader) {
        if let Some(display_name) = header.display_name {
            self.display_name = display_name;
        }
        self.form_id = header.form_id;
        self.version = header.version;
        self.submission_uri = header.submission_uri;
        self.base64_rsa_public_key = header.base64_rsa_public_key;
        self.auto_send = header.auto_send;
        self.auto_delete = header.auto_delete;
    }

    /// Returns true when this row carries the given natural key.
    #[must_use]
    pub fn matches(&self, form_id: &str, version: Option<&str>) -> bool {
        self.form_id == form_id && self.version.as_deref() == version
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the media directory that accompanies a definition file.
///
/// `forms/basic.xml` maps to `forms/basic-media`.
#[must_use]
pub fn media_dir_for(form_file_path: &Path) -> PathBuf {
    let name = format!("{}{MEDIA_DIR_SUFFIX}", file_stem(form_file_path));
    form_file_path.with_file_name(name)
}

/// Returns the file stem as an owned string.
fn file_stem(path: &Path) -> String {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::Form;
    use super::FormHeader;
    use super::media_dir_for;

    #[test]
    fn media_dir_sits_next_to_definition() {
        let media = media_dir_for(Path::new("/forms/basic.xml"));
        assert_eq!(media, Path::new("/forms/basic-media"));
    }

    #[test]
    fn missing_title_falls_back_to_file_stem() {
        let header = FormHeader {
            form_id: "basic".to_string(),
            ..FormHeader::default()
        };
        let form = Form::from_header(header, "abc".to_string(), Path::new("/forms/basic.xml"), 7);
        assert_eq!(form.display_name, "basic");
        assert_eq!(form.date, 7);
        assert_eq!(form.last_updated, 7);
        assert!(!form.deleted);
    }
}
