//! Config load validation tests for ledgerflow-config.
// crates/ledgerflow-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding, syntax).
// Purpose: Ensure config input handling is strict and fail-closed.
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

use std::io::Write;
use std::path::Path;

use ledgerflow_config::ConfigError;
use ledgerflow_config::LedgerflowConfig;
use ledgerflow_config::MAX_CONFIG_FILE_BYTES;
use ledgerflow_config::StoreType;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<LedgerflowConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(contents: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(contents).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(LedgerflowConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        LedgerflowConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    match LedgerflowConfig::load(Some(&path)) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'#'; MAX_CONFIG_FILE_BYTES + 1])?;
    assert_invalid(LedgerflowConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(LedgerflowConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let file = write_config(b"[store]\ntype = \"memory\"\nreplicas = 3\n")?;
    match LedgerflowConfig::load(Some(file.path())) {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn load_rejects_unknown_store_type() -> TestResult {
    let file = write_config(b"[store]\ntype = \"postgres\"\n")?;
    match LedgerflowConfig::load(Some(file.path())) {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn empty_file_is_a_memory_deployment() -> TestResult {
    let file = write_config(b"")?;
    let config = LedgerflowConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config != LedgerflowConfig::default() {
        return Err("empty file should yield defaults".to_string());
    }
    if config.store.store_type != StoreType::Memory || config.sqlite_config().is_some() {
        return Err("default store should be memory".to_string());
    }
    Ok(())
}

#[test]
fn full_file_loads_every_section() -> TestResult {
    let file = write_config(
        br#"
[store]
type = "sqlite"
path = "data/ledgerflow.sqlite"
busy_timeout_ms = 2500
journal_mode = "delete"
sync_mode = "normal"

[workflow]
max_transfer_hops = 3
manager_walk_up_hops = 2
instance_number_prefix = "PAY"

[sweeper]
max_records_per_run = 50

[notifications]
sink = "file"
path = "logs/notifications.jsonl"

[directory]
path = "org.json"

[logging]
level = "debug"
format = "json"
"#,
    )?;
    let config = LedgerflowConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let sqlite = config.sqlite_config().ok_or("sqlite config missing")?;
    if sqlite.path != Path::new("data/ledgerflow.sqlite") || sqlite.busy_timeout_ms != 2500 {
        return Err(format!("unexpected sqlite config {sqlite:?}"));
    }
    let workflow = config.workflow_config();
    if workflow.max_transfer_hops != 3
        || workflow.manager_walk_up_hops != 2
        || workflow.instance_number_prefix != "PAY"
    {
        return Err(format!("unexpected workflow config {workflow:?}"));
    }
    if config.sweeper_config().max_records_per_run != 50 {
        return Err("sweeper limit not applied".to_string());
    }
    if config.directory.path.as_deref() != Some(Path::new("org.json")) {
        return Err("directory path not applied".to_string());
    }
    Ok(())
}
