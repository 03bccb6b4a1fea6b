// crates/ledgerflow-config/src/config.rs
// ============================================================================
// Module: Ledgerflow Configuration
// Description: TOML config model, bounded loader, and validation.
// Purpose: Turn an operator config file into validated engine and store settings.
// Dependencies: ledgerflow-core, ledgerflow-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! [`LedgerflowConfig`] mirrors `ledgerflow.toml` section by section. Loading
//! resolves the path (explicit flag, then `LEDGERFLOW_CONFIG`, then
//! `./ledgerflow.toml`), enforces path and size limits, requires UTF-8, and
//! validates every range before returning. Every section has defaults so an
//! empty file is a valid in-memory deployment.
//!
//! Security posture: config files are operator input and are validated fail
//! closed; unknown keys are parse errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use ledgerflow_core::SweeperConfig;
use ledgerflow_core::WorkflowConfig;
use ledgerflow_core::runtime::engine::DEFAULT_INSTANCE_NUMBER_PREFIX;
use ledgerflow_core::runtime::engine::DEFAULT_MANAGER_WALK_UP_HOPS;
use ledgerflow_core::runtime::engine::DEFAULT_MAX_TRANSFER_HOPS;
use ledgerflow_store_sqlite::SqliteStoreConfig;
use ledgerflow_store_sqlite::SqliteStoreMode;
use ledgerflow_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "LEDGERFLOW_CONFIG";
/// Config file name used when neither flag nor environment names one.
pub const DEFAULT_CONFIG_NAME: &str = "ledgerflow.toml";
/// Maximum config file size in bytes.
pub const MAX_CONFIG_FILE_BYTES: usize = 1024 * 1024;
/// Maximum total config path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of one config path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Default `SQLite` busy timeout.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Upper bound on the `SQLite` busy timeout.
const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;
/// Allowed range for `workflow.max_transfer_hops`.
const TRANSFER_HOPS_RANGE: std::ops::RangeInclusive<u32> = 1..=32;
/// Upper bound for `workflow.manager_walk_up_hops`.
const MAX_WALK_UP_HOPS: u32 = 16;
/// Maximum instance number prefix length.
const MAX_PREFIX_LENGTH: usize = 8;
/// Default sweeper batch size.
const DEFAULT_MAX_RECORDS_PER_RUN: usize = 200;
/// Allowed range for `sweeper.max_records_per_run`.
const RECORDS_PER_RUN_RANGE: std::ops::RangeInclusive<usize> = 1..=10_000;
/// Accepted log level names.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration load and validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// The config file is not valid TOML for the model.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A value is outside its allowed range or shape.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Root of `ledgerflow.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerflowConfig {
    /// Persistence backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Workflow engine limits.
    #[serde(default)]
    pub workflow: WorkflowSettings,
    /// Timeout sweeper limits.
    #[serde(default)]
    pub sweeper: SweeperSettings,
    /// Notification sink selection.
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Organisation snapshot location.
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Persistence backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Process-local store; state is lost on exit.
    #[default]
    Memory,
    /// Durable `SQLite` store.
    Sqlite,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend kind.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// Database file; required for `sqlite`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// `[workflow]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSettings {
    /// Maximum transfers along one record chain.
    #[serde(default = "default_max_transfer_hops")]
    pub max_transfer_hops: u32,
    /// Maximum parent departments visited when resolving a manager.
    #[serde(default = "default_manager_walk_up_hops")]
    pub manager_walk_up_hops: u32,
    /// Prefix of generated instance numbers.
    #[serde(default = "default_instance_number_prefix")]
    pub instance_number_prefix: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_transfer_hops: DEFAULT_MAX_TRANSFER_HOPS,
            manager_walk_up_hops: DEFAULT_MANAGER_WALK_UP_HOPS,
            instance_number_prefix: DEFAULT_INSTANCE_NUMBER_PREFIX.to_string(),
        }
    }
}

/// `[sweeper]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweeperSettings {
    /// Maximum overdue records handled per run.
    #[serde(default = "default_max_records_per_run")]
    pub max_records_per_run: usize,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            max_records_per_run: DEFAULT_MAX_RECORDS_PER_RUN,
        }
    }
}

/// Notification sink kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard notifications.
    Noop,
}

/// `[notifications]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: NotificationSinkKind,
    /// Output file; required for `file`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[directory]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// JSON organisation snapshot; an empty directory is used when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Line format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default transfer hop limit.
const fn default_max_transfer_hops() -> u32 {
    DEFAULT_MAX_TRANSFER_HOPS
}

/// Default manager walk-up limit.
const fn default_manager_walk_up_hops() -> u32 {
    DEFAULT_MANAGER_WALK_UP_HOPS
}

/// Default instance number prefix.
fn default_instance_number_prefix() -> String {
    DEFAULT_INSTANCE_NUMBER_PREFIX.to_string()
}

/// Default sweeper batch size.
const fn default_max_records_per_run() -> usize {
    DEFAULT_MAX_RECORDS_PER_RUN
}

/// Default log level.
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl LedgerflowConfig {
    /// Loads and validates the config file.
    ///
    /// `path` takes precedence over `LEDGERFLOW_CONFIG`, which takes
    /// precedence over `./ledgerflow.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for path, size, or encoding
    /// violations and for out-of-range values, [`ConfigError::Io`] when the
    /// file cannot be read, and [`ConfigError::Parse`] for malformed TOML.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_config_path(path, std::env::var_os(CONFIG_ENV_VAR));
        validate_config_path(&resolved)?;
        let bytes = read_config_bytes(&resolved)?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(text)
    }

    /// Parses and validates config text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section against its allowed ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_store()?;
        self.validate_workflow()?;
        self.validate_sweeper()?;
        self.validate_notifications()?;
        self.validate_logging()
    }

    /// Renders the effective config as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Engine settings for [`ledgerflow_core::WorkflowEngine`].
    #[must_use]
    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            max_transfer_hops: self.workflow.max_transfer_hops,
            manager_walk_up_hops: self.workflow.manager_walk_up_hops,
            instance_number_prefix: self.workflow.instance_number_prefix.clone(),
        }
    }

    /// Sweeper settings for [`ledgerflow_core::TimeoutSweeper`].
    #[must_use]
    pub const fn sweeper_config(&self) -> SweeperConfig {
        SweeperConfig {
            max_records_per_run: self.sweeper.max_records_per_run,
        }
    }

    /// `SQLite` settings, or `None` for the memory store.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        if self.store.store_type != StoreType::Sqlite {
            return None;
        }
        let path = self.store.path.clone()?;
        Some(SqliteStoreConfig {
            path,
            busy_timeout_ms: self.store.busy_timeout_ms,
            journal_mode: self.store.journal_mode,
            sync_mode: self.store.sync_mode,
        })
    }

    // ------------------------------------------------------------------------
    // Section validation
    // ------------------------------------------------------------------------

    /// Validates `[store]`.
    fn validate_store(&self) -> Result<(), ConfigError> {
        let store = &self.store;
        match store.store_type {
            StoreType::Memory => {
                if store.path.is_some() {
                    return Err(invalid("store.path is only allowed for sqlite stores"));
                }
            }
            StoreType::Sqlite => {
                let Some(path) = &store.path else {
                    return Err(invalid("store.path is required for sqlite stores"));
                };
                if path.as_os_str().is_empty() {
                    return Err(invalid("store.path must not be empty"));
                }
            }
        }
        if store.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "store.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Validates `[workflow]`.
    fn validate_workflow(&self) -> Result<(), ConfigError> {
        let workflow = &self.workflow;
        if !TRANSFER_HOPS_RANGE.contains(&workflow.max_transfer_hops) {
            return Err(invalid("workflow.max_transfer_hops must be between 1 and 32"));
        }
        if workflow.manager_walk_up_hops > MAX_WALK_UP_HOPS {
            return Err(invalid("workflow.manager_walk_up_hops must be at most 16"));
        }
        let prefix = &workflow.instance_number_prefix;
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LENGTH {
            return Err(invalid("workflow.instance_number_prefix must be 1 to 8 characters"));
        }
        if !prefix.bytes().all(|byte| byte.is_ascii_uppercase()) {
            return Err(invalid(
                "workflow.instance_number_prefix must contain only ASCII uppercase letters",
            ));
        }
        Ok(())
    }

    /// Validates `[sweeper]`.
    fn validate_sweeper(&self) -> Result<(), ConfigError> {
        if RECORDS_PER_RUN_RANGE.contains(&self.sweeper.max_records_per_run) {
            Ok(())
        } else {
            Err(invalid("sweeper.max_records_per_run must be between 1 and 10000"))
        }
    }

    /// Validates `[notifications]`.
    fn validate_notifications(&self) -> Result<(), ConfigError> {
        let notifications = &self.notifications;
        match (notifications.sink, &notifications.path) {
            (NotificationSinkKind::File, None) => {
                Err(invalid("notifications.path is required for the file sink"))
            }
            (NotificationSinkKind::File, Some(path)) if path.as_os_str().is_empty() => {
                Err(invalid("notifications.path must not be empty"))
            }
            (NotificationSinkKind::Stderr | NotificationSinkKind::Noop, Some(_)) => {
                Err(invalid("notifications.path is only allowed for the file sink"))
            }
            _ => Ok(()),
        }
    }

    /// Validates `[logging]`.
    fn validate_logging(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.to_ascii_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )))
        }
    }
}

// ============================================================================
// SECTION: Path Handling
// ============================================================================

/// Resolves the config path from the flag, then the environment value, then
/// the default file name.
#[must_use]
pub fn resolve_config_path(flag: Option<&Path>, env_value: Option<OsString>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_CONFIG_NAME),
    }
}

/// Enforces total and per-component path length limits.
fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(invalid("config path exceeds max length"));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(invalid("config path component too long"));
        }
    }
    Ok(())
}

/// Reads at most [`MAX_CONFIG_FILE_BYTES`] from `path`.
fn read_config_bytes(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let file = File::open(path)
        .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    let limit = u64::try_from(MAX_CONFIG_FILE_BYTES).unwrap_or(u64::MAX);
    let size = file.metadata().map_err(|err| ConfigError::Io(err.to_string()))?.len();
    if size > limit {
        return Err(invalid("config file exceeds size limit"));
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|err| ConfigError::Io(err.to_string()))?;
    if bytes.len() > MAX_CONFIG_FILE_BYTES {
        return Err(invalid("config file exceeds size limit"));
    }
    Ok(bytes)
}

/// Builds an invalid-config error from a static message.
fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_environment() {
        let path = resolve_config_path(Some(Path::new("flag.toml")), Some("env.toml".into()));
        assert_eq!(path, PathBuf::from("flag.toml"));
    }

    #[test]
    fn environment_wins_over_default() {
        let path = resolve_config_path(None, Some("env.toml".into()));
        assert_eq!(path, PathBuf::from("env.toml"));
    }

    #[test]
    fn empty_environment_falls_back_to_default() {
        let path = resolve_config_path(None, Some(OsString::new()));
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_NAME));
        assert_eq!(resolve_config_path(None, None), PathBuf::from(DEFAULT_CONFIG_NAME));
    }
}
