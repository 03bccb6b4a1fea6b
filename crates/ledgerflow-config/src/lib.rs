// crates/ledgerflow-config/src/lib.rs
// ============================================================================
// Module: Ledgerflow Config Library
// Description: Public API surface for Ledgerflow configuration.
// Purpose: Expose the TOML config model, loader, and validation.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Canonical configuration for Ledgerflow deployments. A config file is read
//! with strict size and encoding limits, parsed with `toml`, and validated
//! before any engine is built from it. Unknown keys are rejected.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::DirectoryConfig;
pub use config::LedgerflowConfig;
pub use config::LogFormat;
pub use config::LoggingConfig;
pub use config::MAX_CONFIG_FILE_BYTES;
pub use config::NotificationConfig;
pub use config::NotificationSinkKind;
pub use config::StoreConfig;
pub use config::StoreType;
pub use config::SweeperSettings;
pub use config::WorkflowSettings;
pub use config::resolve_config_path;
