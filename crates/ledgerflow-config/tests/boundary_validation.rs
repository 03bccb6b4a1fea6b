//! Boundary validation tests for ledgerflow-config.
// crates/ledgerflow-config/tests/boundary_validation.rs
// =============================================================================
// Module: Boundary Validation Tests
// Description: Min/max boundaries and cross-field rules for every section.
// Purpose: Ensure out-of-range values are rejected with a named key.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::path::PathBuf;

use ledgerflow_config::ConfigError;
use ledgerflow_config::LedgerflowConfig;
use ledgerflow_config::NotificationSinkKind;
use ledgerflow_config::StoreType;

type TestResult = Result<(), String>;

/// Assert that a validation result is an error containing a specific substring.
fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

fn sqlite_config() -> LedgerflowConfig {
    let mut config = LedgerflowConfig::default();
    config.store.store_type = StoreType::Sqlite;
    config.store.path = Some(PathBuf::from("ledgerflow.sqlite"));
    config
}

// ============================================================================
// SECTION: Store
// ============================================================================

#[test]
fn sqlite_store_requires_path() -> TestResult {
    let mut config = sqlite_config();
    config.store.path = None;
    assert_invalid(config.validate(), "store.path is required")
}

#[test]
fn memory_store_rejects_path() -> TestResult {
    let mut config = LedgerflowConfig::default();
    config.store.path = Some(PathBuf::from("ignored.sqlite"));
    assert_invalid(config.validate(), "store.path is only allowed")
}

#[test]
fn busy_timeout_upper_bound() -> TestResult {
    let mut config = sqlite_config();
    config.store.busy_timeout_ms = 600_000;
    config.validate().map_err(|err| err.to_string())?;
    config.store.busy_timeout_ms = 600_001;
    assert_invalid(config.validate(), "store.busy_timeout_ms")
}

// ============================================================================
// SECTION: Workflow
// ============================================================================

#[test]
fn transfer_hops_bounds() -> TestResult {
    let mut config = LedgerflowConfig::default();
    for accepted in [1, 32] {
        config.workflow.max_transfer_hops = accepted;
        config.validate().map_err(|err| err.to_string())?;
    }
    config.workflow.max_transfer_hops = 0;
    assert_invalid(config.validate(), "workflow.max_transfer_hops")?;
    config.workflow.max_transfer_hops = 33;
    assert_invalid(config.validate(), "workflow.max_transfer_hops")
}

#[test]
fn walk_up_hops_upper_bound() -> TestResult {
    let mut config = LedgerflowConfig::default();
    config.workflow.manager_walk_up_hops = 0;
    config.validate().map_err(|err| err.to_string())?;
    config.workflow.manager_walk_up_hops = 17;
    assert_invalid(config.validate(), "workflow.manager_walk_up_hops")
}

#[test]
fn instance_prefix_shape() -> TestResult {
    let mut config = LedgerflowConfig::default();
    config.workflow.instance_number_prefix = "ABCDEFGH".to_string();
    config.validate().map_err(|err| err.to_string())?;
    config.workflow.instance_number_prefix = "ABCDEFGHI".to_string();
    assert_invalid(config.validate(), "1 to 8 characters")?;
    config.workflow.instance_number_prefix = String::new();
    assert_invalid(config.validate(), "1 to 8 characters")?;
    config.workflow.instance_number_prefix = "Ap".to_string();
    assert_invalid(config.validate(), "ASCII uppercase")?;
    config.workflow.instance_number_prefix = "A1".to_string();
    assert_invalid(config.validate(), "ASCII uppercase")
}

// ============================================================================
// SECTION: Sweeper
// ============================================================================

#[test]
fn sweeper_batch_bounds() -> TestResult {
    let mut config = LedgerflowConfig::default();
    for accepted in [1, 10_000] {
        config.sweeper.max_records_per_run = accepted;
        config.validate().map_err(|err| err.to_string())?;
    }
    config.sweeper.max_records_per_run = 0;
    assert_invalid(config.validate(), "sweeper.max_records_per_run")?;
    config.sweeper.max_records_per_run = 10_001;
    assert_invalid(config.validate(), "sweeper.max_records_per_run")
}

// ============================================================================
// SECTION: Notifications and Logging
// ============================================================================

#[test]
fn file_sink_requires_path() -> TestResult {
    let mut config = LedgerflowConfig::default();
    config.notifications.sink = NotificationSinkKind::File;
    assert_invalid(config.validate(), "notifications.path is required")?;
    config.notifications.path = Some(PathBuf::from("notifications.jsonl"));
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn stderr_sink_rejects_path() -> TestResult {
    let mut config = LedgerflowConfig::default();
    config.notifications.path = Some(PathBuf::from("notifications.jsonl"));
    assert_invalid(config.validate(), "only allowed for the file sink")
}

#[test]
fn log_level_must_be_known() -> TestResult {
    let mut config = LedgerflowConfig::default();
    config.logging.level = "WARN".to_string();
    config.validate().map_err(|err| err.to_string())?;
    config.logging.level = "verbose".to_string();
    assert_invalid(config.validate(), "logging.level")
}

#[test]
fn parse_errors_are_reported_as_parse() -> TestResult {
    match LedgerflowConfig::from_toml_str("[workflow\nmax_transfer_hops = 2") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn text_validation_runs_after_parse() -> TestResult {
    match LedgerflowConfig::from_toml_str("[sweeper]\nmax_records_per_run = 0\n") {
        Err(ConfigError::Invalid(message)) if message.contains("sweeper") => Ok(()),
        other => Err(format!("expected invalid sweeper config, got {other:?}")),
    }
}
