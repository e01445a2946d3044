// crates/formstore-config/src/config.rs
// ============================================================================
// Module: Formstore Configuration
// Description: Config model, bounded loading and semantic validation.
// Purpose: Reject malformed configuration before any database is touched.
// Dependencies: formstore-core, formstore-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! The config file is untrusted input. Loading enforces a path length limit,
//! a size limit and UTF-8 before parsing; parsing rejects unknown keys; and
//! [`FormStoreConfig::validate`] checks the cross-field rules serde cannot
//! express. A validated config builds one [`ProjectContext`] per project.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use formstore_core::ChangeLockProvider;
use formstore_core::DiskFormsReconciler;
use formstore_core::FileAuditSink;
use formstore_core::FormDeleter;
use formstore_core::FormStoreAuditSink;
use formstore_core::NoopAuditSink;
use formstore_core::ProjectId;
use formstore_core::StderrAuditSink;
use formstore_store_sqlite::DEFAULT_BUSY_TIMEOUT_MS;
use formstore_store_sqlite::SqliteFormStore;
use formstore_store_sqlite::SqliteStoreConfig;
use formstore_store_sqlite::SqliteStoreError;
use formstore_store_sqlite::SqliteStoreMode;
use formstore_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FORMSTORE_CONFIG";
/// Config file used when neither a path nor [`CONFIG_ENV`] is given.
pub const DEFAULT_CONFIG_FILE: &str = "formstore.toml";
/// Maximum config file size in bytes.
const MAX_CONFIG_FILE_BYTES: usize = 1024 * 1024;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum project identifier length.
const MAX_PROJECT_ID_LENGTH: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// The config file is not valid TOML for this model.
    #[error("config parse error: {0}")]
    Parse(String),
    /// The config violates a validation rule.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormStoreConfig {
    /// Database settings shared by every project.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit output settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Configured projects.
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

/// `SQLite` settings applied to every project's databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Journal mode pragma.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Synchronous pragma.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Where audit events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to [`AuditConfig::path`].
    File,
    /// Discard events.
    None,
}

/// Audit output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Selected sink.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// One project: a forms directory plus its metadata directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project identifier, unique within the file.
    pub id: String,
    /// Directory holding form definition files.
    pub forms_dir: PathBuf,
    /// Directory holding `forms.db` and `instances.db`.
    pub metadata_dir: PathBuf,
}

impl ProjectConfig {
    /// Builds the store configuration for this project.
    #[must_use]
    pub fn store_config(&self, store: &StoreConfig) -> SqliteStoreConfig {
        SqliteStoreConfig {
            metadata_dir: self.metadata_dir.clone(),
            busy_timeout_ms: store.busy_timeout_ms,
            journal_mode: store.journal_mode,
            sync_mode: store.sync_mode,
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl FormStoreConfig {
    /// Loads and validates the config file.
    ///
    /// The path is `path` when given, else the value of [`CONFIG_ENV`], else
    /// [`DEFAULT_CONFIG_FILE`] in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path, size, encoding, syntax or
    /// content is rejected.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = resolve_config_path(path, std::env::var_os(CONFIG_ENV));
        validate_path("config path", &path)?;
        let bytes = read_bytes_with_limit(&path, MAX_CONFIG_FILE_BYTES)?;
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates config text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is not valid TOML for this model
    /// or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store.busy_timeout_ms must be > 0".to_string()));
        }
        self.validate_audit()?;
        if self.projects.is_empty() {
            return Err(ConfigError::Invalid(
                "config must declare at least one project".to_string(),
            ));
        }
        let mut ids = BTreeSet::new();
        let mut metadata_dirs: BTreeMap<&Path, &str> = BTreeMap::new();
        for project in &self.projects {
            validate_project_id(&project.id)?;
            if !ids.insert(project.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate project id: {}", project.id)));
            }
            validate_path("forms_dir", &project.forms_dir)?;
            validate_path("metadata_dir", &project.metadata_dir)?;
            if let Some(other) = metadata_dirs.insert(&project.metadata_dir, &project.id) {
                return Err(ConfigError::Invalid(format!(
                    "projects {other} and {} share metadata_dir",
                    project.id
                )));
            }
        }
        Ok(())
    }

    /// Checks the audit section.
    fn validate_audit(&self) -> Result<(), ConfigError> {
        match (self.audit.sink, &self.audit.path) {
            (AuditSinkKind::File, None) => Err(ConfigError::Invalid(
                "audit.path is required when audit.sink = \"file\"".to_string(),
            )),
            (AuditSinkKind::File, Some(path)) => validate_path("audit.path", path),
            (_, Some(_)) => Err(ConfigError::Invalid(
                "audit.path is only valid when audit.sink = \"file\"".to_string(),
            )),
            (_, None) => Ok(()),
        }
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn audit_sink(&self) -> Result<Arc<dyn FormStoreAuditSink>, ConfigError> {
        match (self.audit.sink, &self.audit.path) {
            (AuditSinkKind::File, Some(path)) => {
                let sink = FileAuditSink::new(path).map_err(|err| {
                    ConfigError::Io(format!("failed to open {}: {err}", path.display()))
                })?;
                Ok(Arc::new(sink))
            }
            (AuditSinkKind::File, None) => Err(ConfigError::Invalid(
                "audit.path is required when audit.sink = \"file\"".to_string(),
            )),
            (AuditSinkKind::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            (AuditSinkKind::None, _) => Ok(Arc::new(NoopAuditSink)),
        }
    }

    /// Selects a project by id, or the only project when `id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the id is unknown, or when no id
    /// is given and the file declares more than one project.
    pub fn project(&self, id: Option<&str>) -> Result<&ProjectConfig, ConfigError> {
        match id {
            Some(id) => self
                .projects
                .iter()
                .find(|project| project.id == id)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown project: {id}"))),
            None => match self.projects.as_slice() {
                [only] => Ok(only),
                [] => Err(ConfigError::Invalid("no projects configured".to_string())),
                _ => Err(ConfigError::Invalid(
                    "several projects configured; select one by id".to_string(),
                )),
            },
        }
    }

    /// Builds the runtime context for one project.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the project cannot be selected or the
    /// audit sink cannot be built.
    pub fn project_context(&self, id: Option<&str>) -> Result<ProjectContext, ConfigError> {
        let project = self.project(id)?;
        Ok(ProjectContext {
            project_id: ProjectId::new(project.id.clone()),
            forms_dir: project.forms_dir.clone(),
            store: project.store_config(&self.store),
            audit: self.audit_sink()?,
        })
    }
}

// ============================================================================
// SECTION: Project Context
// ============================================================================

/// Everything needed to operate on one project.
#[derive(Clone)]
pub struct ProjectContext {
    /// Project identifier.
    pub project_id: ProjectId,
    /// Directory holding form definition files.
    pub forms_dir: PathBuf,
    /// Store configuration for the project's databases.
    pub store: SqliteStoreConfig,
    /// Audit sink shared by every component.
    pub audit: Arc<dyn FormStoreAuditSink>,
}

impl fmt::Debug for ProjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectContext")
            .field("project_id", &self.project_id)
            .field("forms_dir", &self.forms_dir)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ProjectContext {
    /// Opens and migrates the project's databases.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the store cannot be opened.
    pub fn open_store(&self) -> Result<SqliteFormStore, SqliteStoreError> {
        SqliteFormStore::open_with_audit(&self.store, self.audit.as_ref())
    }

    /// Builds a reconciler for the project's forms directory.
    #[must_use]
    pub fn reconciler(
        &self,
        store: &SqliteFormStore,
        locks: &ChangeLockProvider,
    ) -> DiskFormsReconciler {
        DiskFormsReconciler::new(
            self.project_id.clone(),
            &self.forms_dir,
            store.forms(),
            locks.form_lock(&self.project_id),
        )
        .with_audit_sink(Arc::clone(&self.audit))
    }

    /// Builds a deleter for the project's forms.
    #[must_use]
    pub fn deleter(&self, store: &SqliteFormStore, locks: &ChangeLockProvider) -> FormDeleter {
        FormDeleter::new(
            self.project_id.clone(),
            store.forms(),
            store.instances(),
            locks.form_lock(&self.project_id),
        )
        .with_audit_sink(Arc::clone(&self.audit))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Picks the explicit path, then the environment value, then the default.
fn resolve_config_path(path: Option<&Path>, env_value: Option<OsString>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    env_value
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}

/// Rejects empty, overlong or overlong-component paths.
fn validate_path(label: &str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(format!("{label} must not be empty")));
    }
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{label} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{label} component too long")));
        }
    }
    Ok(())
}

/// Rejects empty ids and characters outside `[A-Za-z0-9_-]`.
fn validate_project_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::Invalid("project id must not be empty".to_string()));
    }
    if id.len() > MAX_PROJECT_ID_LENGTH {
        return Err(ConfigError::Invalid(format!("project id too long: {id}")));
    }
    if !id.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_') {
        return Err(ConfigError::Invalid(format!("project id has invalid characters: {id}")));
    }
    Ok(())
}

/// Reads a file, failing once it exceeds `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ConfigError> {
    let io_error = |err: std::io::Error| {
        ConfigError::Io(format!("failed to read {}: {err}", path.display()))
    };
    let too_large = || ConfigError::Invalid("config file exceeds size limit".to_string());
    let file = File::open(path).map_err(io_error)?;
    let limit = u64::try_from(max_bytes).map_err(|_| too_large())?;
    if file.metadata().map_err(io_error)?.len() > limit {
        return Err(too_large());
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(io_error)?;
    if bytes.len() > max_bytes {
        return Err(too_large());
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
