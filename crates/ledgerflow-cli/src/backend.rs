// crates/ledgerflow-cli/src/backend.rs
// ============================================================================
// Module: CLI Backend Wiring
// Description: Builds stores, sinks, and the directory from a validated config.
// Purpose: Let one binary drive the engines over memory or SQLite storage.
// Dependencies: ledgerflow-config, ledgerflow-core, ledgerflow-store-sqlite
// ============================================================================

//! ## Overview
//! The engines are generic over their store and sink; the binary picks both
//! at runtime from config. [`CliStore`] and [`CliSink`] are closed enums that
//! delegate to the selected implementation so command code stays monomorphic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use ledgerflow_config::LedgerflowConfig;
use ledgerflow_config::NotificationSinkKind;
use ledgerflow_config::StoreType;
use ledgerflow_core::DispatchError;
use ledgerflow_core::FileNotificationSink;
use ledgerflow_core::InMemoryDirectory;
use ledgerflow_core::InMemoryStore;
use ledgerflow_core::NoopNotificationSink;
use ledgerflow_core::NotificationEvent;
use ledgerflow_core::NotificationSink;
use ledgerflow_core::OutputValueEngine;
use ledgerflow_core::OutputValueStore;
use ledgerflow_core::OutputValueTx;
use ledgerflow_core::StderrNotificationSink;
use ledgerflow_core::StoreError;
use ledgerflow_core::SystemClock;
use ledgerflow_core::WorkflowEngine;
use ledgerflow_core::WorkflowStore;
use ledgerflow_core::WorkflowTx;
use ledgerflow_store_sqlite::SqliteStore;
use tracing::info;

use crate::CliError;
use crate::CliResult;
use crate::MAX_INPUT_BYTES;
use crate::read_bytes_with_limit;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Store selected by `[store] type`.
#[derive(Debug, Clone)]
pub(crate) enum CliStore {
    /// Process-local store.
    Memory(InMemoryStore),
    /// Durable `SQLite` store.
    Sqlite(SqliteStore),
}

impl CliStore {
    /// Opens the configured store.
    pub(crate) fn open(config: &LedgerflowConfig) -> CliResult<Self> {
        match config.store.store_type {
            StoreType::Memory => {
                info!("using in-memory store; state is discarded on exit");
                Ok(Self::Memory(InMemoryStore::default()))
            }
            StoreType::Sqlite => {
                let sqlite = config.sqlite_config().ok_or_else(|| {
                    CliError::new("sqlite store selected without a path".to_string())
                })?;
                let store = SqliteStore::new(sqlite)
                    .map_err(|err| CliError::new(format!("failed to open store: {err}")))?;
                Ok(Self::Sqlite(store))
            }
        }
    }
}

impl WorkflowStore for CliStore {
    fn workflow_transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn WorkflowTx) -> Result<R, E>,
    {
        match self {
            Self::Memory(store) => store.workflow_transaction(work),
            Self::Sqlite(store) => store.workflow_transaction(work),
        }
    }
}

impl OutputValueStore for CliStore {
    fn output_value_transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn OutputValueTx) -> Result<R, E>,
    {
        match self {
            Self::Memory(store) => store.output_value_transaction(work),
            Self::Sqlite(store) => store.output_value_transaction(work),
        }
    }
}

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Notification sink selected by `[notifications] sink`.
#[derive(Debug)]
pub(crate) enum CliSink {
    /// JSON lines on stderr.
    Stderr(StderrNotificationSink),
    /// JSON lines appended to a file.
    File(FileNotificationSink),
    /// Discards events.
    Noop(NoopNotificationSink),
}

impl CliSink {
    /// Opens the configured sink.
    pub(crate) fn open(config: &LedgerflowConfig) -> CliResult<Self> {
        match (config.notifications.sink, &config.notifications.path) {
            (NotificationSinkKind::Stderr, _) => Ok(Self::Stderr(StderrNotificationSink)),
            (NotificationSinkKind::Noop, _) => Ok(Self::Noop(NoopNotificationSink)),
            (NotificationSinkKind::File, Some(path)) => {
                let sink = FileNotificationSink::new(path).map_err(|err| {
                    CliError::new(format!(
                        "failed to open notification log {}: {err}",
                        path.display()
                    ))
                })?;
                Ok(Self::File(sink))
            }
            (NotificationSinkKind::File, None) => {
                Err(CliError::new("file sink selected without a path".to_string()))
            }
        }
    }
}

impl NotificationSink for CliSink {
    fn dispatch(&self, event: &NotificationEvent) -> Result<(), DispatchError> {
        match self {
            Self::Stderr(sink) => sink.dispatch(event),
            Self::File(sink) => sink.dispatch(event),
            Self::Noop(sink) => sink.dispatch(event),
        }
    }
}

// ============================================================================
// SECTION: Directory
// ============================================================================

/// Loads the org snapshot named by `[directory] path`, or an empty directory.
pub(crate) fn load_directory(config: &LedgerflowConfig) -> CliResult<InMemoryDirectory> {
    let Some(path) = config.directory.path.as_deref() else {
        return Ok(InMemoryDirectory::default());
    };
    read_directory(path)
}

/// Reads and validates a JSON directory snapshot.
fn read_directory(path: &Path) -> CliResult<InMemoryDirectory> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES).map_err(|err| {
        CliError::new(format!("failed to read directory {}: {err}", path.display()))
    })?;
    let directory = InMemoryDirectory::from_json(&bytes).map_err(|err| {
        CliError::new(format!("invalid directory {}: {err}", path.display()))
    })?;
    info!(path = %path.display(), users = directory.user_count(), "directory loaded");
    Ok(directory)
}

// ============================================================================
// SECTION: Engines
// ============================================================================

/// Workflow engine over the configured backend.
pub(crate) type CliWorkflowEngine =
    WorkflowEngine<CliStore, InMemoryDirectory, CliSink, SystemClock>;

/// Output-value engine over the configured backend.
pub(crate) type CliOutputValueEngine =
    OutputValueEngine<CliStore, InMemoryDirectory, CliSink, SystemClock>;

/// Builds the workflow engine from config.
pub(crate) fn workflow_engine(config: &LedgerflowConfig) -> CliResult<CliWorkflowEngine> {
    Ok(WorkflowEngine::new(
        CliStore::open(config)?,
        load_directory(config)?,
        CliSink::open(config)?,
        SystemClock,
        config.workflow_config(),
    ))
}

/// Builds the output-value engine from config.
pub(crate) fn output_value_engine(config: &LedgerflowConfig) -> CliResult<CliOutputValueEngine> {
    Ok(OutputValueEngine::new(
        CliStore::open(config)?,
        load_directory(config)?,
        CliSink::open(config)?,
        SystemClock,
    ))
}
