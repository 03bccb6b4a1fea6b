// crates/ledgerflow-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Ledgerflow Store
// Description: Durable workflow and output-value tables backed by SQLite.
// Purpose: Persist templates, instances, records, and output-value rows.
// Dependencies: ledgerflow-core, bigdecimal, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteStore`] implements [`WorkflowStore`] and [`OutputValueStore`] on a
//! single `SQLite` connection. Each unit of work opens an `IMMEDIATE`
//! transaction, so writers are serialized by the database lock and the
//! engines get the per-instance and per-slot exclusion they expect.
//!
//! Relational keys live in columns; nested template structures (approver
//! bindings, routing tables, predicates) are stored as JSON text. Decimals
//! are stored as text to keep their scale. Two partial unique indexes back
//! the engine invariants: one open instance per template code and target,
//! and one non-voided output-value record per project and event.
//!
//! Database contents are untrusted: unknown labels or malformed JSON fail
//! closed with [`StoreError::Corrupt`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;

use bigdecimal::BigDecimal;
use ledgerflow_core::ApprovalInstance;
use ledgerflow_core::ApprovalMode;
use ledgerflow_core::ApprovalNode;
use ledgerflow_core::ApprovalRecord;
use ledgerflow_core::BaseAmountType;
use ledgerflow_core::ContentTypeCode;
use ledgerflow_core::Event;
use ledgerflow_core::EventId;
use ledgerflow_core::EventPath;
use ledgerflow_core::EventSpec;
use ledgerflow_core::InstanceId;
use ledgerflow_core::InstanceStatus;
use ledgerflow_core::Milestone;
use ledgerflow_core::MilestoneId;
use ledgerflow_core::MilestoneNode;
use ledgerflow_core::MilestoneSpec;
use ledgerflow_core::NewInstance;
use ledgerflow_core::NewOutputValueRecord;
use ledgerflow_core::NewRecord;
use ledgerflow_core::NodeId;
use ledgerflow_core::NodeSpec;
use ledgerflow_core::NodeType;
use ledgerflow_core::OutputValueRecord;
use ledgerflow_core::OutputValueRecordId;
use ledgerflow_core::OutputValueStore;
use ledgerflow_core::OutputValueTx;
use ledgerflow_core::ProjectId;
use ledgerflow_core::RecordId;
use ledgerflow_core::RecordKind;
use ledgerflow_core::RecordResult;
use ledgerflow_core::RecordStatus;
use ledgerflow_core::RoleCode;
use ledgerflow_core::Stage;
use ledgerflow_core::StageId;
use ledgerflow_core::StageNode;
use ledgerflow_core::StageSpec;
use ledgerflow_core::StoreError;
use ledgerflow_core::TargetRef;
use ledgerflow_core::TemplateCode;
use ledgerflow_core::TemplateId;
use ledgerflow_core::TemplatePolicy;
use ledgerflow_core::TemplateSpec;
use ledgerflow_core::TemplateStatus;
use ledgerflow_core::TimeoutAction;
use ledgerflow_core::Timestamp;
use ledgerflow_core::UserId;
use ledgerflow_core::WorkflowStore;
use ledgerflow_core::WorkflowTemplate;
use ledgerflow_core::WorkflowTx;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Params;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Instance columns in read order.
const INSTANCE_COLUMNS: &str = "id, instance_number, template_id, template_code, content_type, \
                                object_id, status, current_node_id, applicant_id, apply_time, \
                                apply_comment, completed_time, final_comment, flag_json, \
                                created_at, updated_at";
/// Record columns in read order.
const RECORD_COLUMNS: &str = "id, instance_id, node_id, approver_id, kind, result, comment, \
                              transferred_to, transferred_from, transfer_hops, system_decided, \
                              created_at, due_at, approval_time, last_reminder_at";
/// Template header columns in read order.
const TEMPLATE_COLUMNS: &str = "id, code, name, description, category, status, allow_withdraw, \
                                allow_reject, allow_transfer, default_timeout_hours, \
                                timeout_action, content_types_json, form_filter_json, \
                                sub_workflow_trigger_json, created_at, updated_at";
/// Node columns in read order.
const NODE_COLUMNS: &str = "id, template_id, sequence, name, node_type, approvers_json, \
                            approval_mode, condition_json, is_required, can_reject, \
                            can_transfer, timeout_hours";
/// Stage columns in read order.
const STAGE_COLUMNS: &str = "id, code, name, position, stage_percentage, base_amount_type, active";
/// Milestone columns in read order.
const MILESTONE_COLUMNS: &str =
    "id, stage_id, code, name, position, milestone_percentage, base_amount_type, active";
/// Event columns in read order.
const EVENT_COLUMNS: &str = "id, milestone_id, code, name, position, event_percentage, \
                             responsible_role_code, trigger_condition, active";
/// Output-value record columns in read order.
const OUTPUT_COLUMNS: &str = "id, project_id, stage_id, stage_code, milestone_id, event_id, \
                              event_code, responsible_user, base_amount, base_amount_type, \
                              stage_percentage, milestone_percentage, event_percentage, \
                              calculated_value, status, confirmed_by, confirmed_at, void_reason, \
                              created_at, updated_at";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with default pragmas for `path`.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Write violated a uniqueness constraint.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Stored data failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Classifies a driver error; unique and primary-key violations are conflicts.
fn classify(err: &rusqlite::Error) -> SqliteStoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = err
        && matches!(
            failure.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
    {
        return SqliteStoreError::Conflict(err.to_string());
    }
    SqliteStoreError::Db(err.to_string())
}

/// Maps a driver error into the shared store error.
#[allow(clippy::needless_pass_by_value, reason = "Used as a map_err adapter.")]
fn db(err: rusqlite::Error) -> StoreError {
    StoreError::from(classify(&err))
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed Ledgerflow store.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Every unit of work is one `IMMEDIATE` transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
    /// Resolved configuration.
    config: SqliteStoreConfig,
}

impl SqliteStore {
    /// Opens (or creates) the database and validates its schema version.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the database
    /// cannot be opened, or the stored schema version is unknown.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        tracing::info!(
            path = %config.path.display(),
            journal_mode = config.journal_mode.pragma_value(),
            "sqlite store opened"
        );
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            config,
        })
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Runs `work` inside an immediate transaction, committing on `Ok`.
    fn transact<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut SqliteTx<'_>) -> Result<R, E>,
    {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::Store("sqlite connection mutex poisoned".to_string()))?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db)?;
        let result = work(&mut SqliteTx {
            conn: &tx,
        })?;
        tx.commit().map_err(db)?;
        Ok(result)
    }
}

impl WorkflowStore for SqliteStore {
    fn workflow_transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn WorkflowTx) -> Result<R, E>,
    {
        self.transact(|tx| work(tx))
    }
}

impl OutputValueStore for SqliteStore {
    fn output_value_transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn OutputValueTx) -> Result<R, E>,
    {
        self.transact(|tx| work(tx))
    }
}

/// Transaction handle bound to an open `SQLite` transaction.
struct SqliteTx<'a> {
    /// Connection inside the active transaction.
    conn: &'a Connection,
}

// ============================================================================
// SECTION: Workflow Tables
// ============================================================================

impl SqliteTx<'_> {
    /// Loads template headers matching `sql` and attaches their live nodes.
    fn templates(&self, sql: &str, params: impl Params) -> Result<Vec<WorkflowTemplate>, StoreError> {
        let rows = query_rows(self.conn, sql, params, TemplateRow::read)?;
        rows.into_iter()
            .map(|row| {
                let nodes = self.live_nodes(TemplateId::new(row.id))?;
                row.into_template(nodes)
            })
            .collect()
    }

    /// Live nodes of a template ordered by sequence.
    fn live_nodes(&self, template_id: TemplateId) -> Result<Vec<ApprovalNode>, StoreError> {
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM workflow_approval_node
             WHERE template_id = ?1 AND retired = 0 ORDER BY sequence"
        );
        query_rows(self.conn, &sql, params![template_id.get()], NodeRow::read)?
            .into_iter()
            .map(NodeRow::into_node)
            .collect()
    }

    /// Inserts live nodes for a template.
    fn insert_nodes(
        &self,
        template_id: TemplateId,
        nodes: &[NodeSpec],
    ) -> Result<Vec<ApprovalNode>, StoreError> {
        let mut inserted = Vec::with_capacity(nodes.len());
        for spec in nodes {
            self.conn
                .execute(
                    "INSERT INTO workflow_approval_node (
                        template_id, sequence, name, node_type, approvers_json, approval_mode,
                        condition_json, is_required, can_reject, can_transfer, timeout_hours,
                        retired
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)",
                    params![
                        template_id.get(),
                        i64::from(spec.sequence),
                        spec.name,
                        spec.node_type.as_str(),
                        to_json_opt(spec.approvers.as_ref())?,
                        spec.approval_mode.as_str(),
                        to_json_opt(spec.condition.as_ref())?,
                        spec.is_required,
                        spec.can_reject,
                        spec.can_transfer,
                        spec.timeout_hours.map(i64::from),
                    ],
                )
                .map_err(db)?;
            let id = NodeId::new(self.conn.last_insert_rowid());
            inserted.push(ApprovalNode::from_spec(id, template_id, spec));
        }
        Ok(inserted)
    }

    /// Loads instances matching `sql`.
    fn instances(&self, sql: &str, params: impl Params) -> Result<Vec<ApprovalInstance>, StoreError> {
        query_rows(self.conn, sql, params, InstanceRow::read)?
            .into_iter()
            .map(InstanceRow::into_instance)
            .collect()
    }

    /// Loads records matching `sql`.
    fn records(&self, sql: &str, params: impl Params) -> Result<Vec<ApprovalRecord>, StoreError> {
        query_rows(self.conn, sql, params, RecordRow::read)?
            .into_iter()
            .map(RecordRow::into_record)
            .collect()
    }

    /// Returns true when a row with `id` exists in `table`.
    fn row_exists(&self, table: &str, id: i64) -> Result<bool, StoreError> {
        let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
        let found: Option<i64> =
            self.conn.query_row(&sql, params![id], |row| row.get(0)).optional().map_err(db)?;
        Ok(found.is_some())
    }

    /// Runs a count query.
    fn count(&self, sql: &str, params: impl Params) -> Result<u64, StoreError> {
        let count: i64 = self.conn.query_row(sql, params, |row| row.get(0)).map_err(db)?;
        u64::try_from(count).map_err(|_| StoreError::Corrupt(format!("negative row count {count}")))
    }
}

impl WorkflowTx for SqliteTx<'_> {
    fn template_by_code(
        &mut self,
        code: &TemplateCode,
    ) -> Result<Option<WorkflowTemplate>, StoreError> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM workflow_template WHERE code = ?1");
        Ok(self.templates(&sql, params![code.as_str()])?.into_iter().next())
    }

    fn template_by_id(&mut self, id: TemplateId) -> Result<Option<WorkflowTemplate>, StoreError> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM workflow_template WHERE id = ?1");
        Ok(self.templates(&sql, params![id.get()])?.into_iter().next())
    }

    fn list_templates(
        &mut self,
        status: Option<TemplateStatus>,
    ) -> Result<Vec<WorkflowTemplate>, StoreError> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM workflow_template
             WHERE (?1 IS NULL OR status = ?1) ORDER BY code"
        );
        self.templates(&sql, params![status.map(TemplateStatus::as_str)])
    }

    fn insert_template(
        &mut self,
        spec: &TemplateSpec,
        status: TemplateStatus,
        now: Timestamp,
    ) -> Result<WorkflowTemplate, StoreError> {
        self.conn
            .execute(
                "INSERT INTO workflow_template (
                    code, name, description, category, status, allow_withdraw, allow_reject,
                    allow_transfer, default_timeout_hours, timeout_action, content_types_json,
                    form_filter_json, sub_workflow_trigger_json, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                params![
                    spec.code.as_str(),
                    spec.name,
                    spec.description,
                    spec.category,
                    status.as_str(),
                    spec.policy.allow_withdraw,
                    spec.policy.allow_reject,
                    spec.policy.allow_transfer,
                    spec.default_timeout_hours.map(i64::from),
                    spec.timeout_action.as_str(),
                    to_json(&spec.applicable_content_types)?,
                    to_json_opt(spec.form_filter.as_ref())?,
                    to_json_opt(spec.sub_workflow_trigger.as_ref())?,
                    now.as_unix_millis(),
                ],
            )
            .map_err(db)?;
        let id = TemplateId::new(self.conn.last_insert_rowid());
        let nodes = self.insert_nodes(id, &spec.nodes)?;
        Ok(WorkflowTemplate {
            id,
            code: spec.code.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            category: spec.category.clone(),
            status,
            policy: spec.policy,
            default_timeout_hours: spec.default_timeout_hours,
            timeout_action: spec.timeout_action,
            applicable_content_types: spec.applicable_content_types.clone(),
            form_filter: spec.form_filter.clone(),
            sub_workflow_trigger: spec.sub_workflow_trigger.clone(),
            nodes,
            created_at: now,
            updated_at: now,
        })
    }

    fn update_template(&mut self, template: &WorkflowTemplate) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE workflow_template SET
                    name = ?2, description = ?3, category = ?4, status = ?5,
                    allow_withdraw = ?6, allow_reject = ?7, allow_transfer = ?8,
                    default_timeout_hours = ?9, timeout_action = ?10, content_types_json = ?11,
                    form_filter_json = ?12, sub_workflow_trigger_json = ?13, updated_at = ?14
                 WHERE id = ?1",
                params![
                    template.id.get(),
                    template.name,
                    template.description,
                    template.category,
                    template.status.as_str(),
                    template.policy.allow_withdraw,
                    template.policy.allow_reject,
                    template.policy.allow_transfer,
                    template.default_timeout_hours.map(i64::from),
                    template.timeout_action.as_str(),
                    to_json(&template.applicable_content_types)?,
                    to_json_opt(template.form_filter.as_ref())?,
                    to_json_opt(template.sub_workflow_trigger.as_ref())?,
                    template.updated_at.as_unix_millis(),
                ],
            )
            .map_err(db)?;
        if changed == 0 {
            return Err(StoreError::Invalid(format!("template {} not found", template.id)));
        }
        Ok(())
    }

    fn replace_template_nodes(
        &mut self,
        template_id: TemplateId,
        nodes: &[NodeSpec],
    ) -> Result<Vec<ApprovalNode>, StoreError> {
        if !self.row_exists("workflow_template", template_id.get())? {
            return Err(StoreError::Invalid(format!("template {template_id} not found")));
        }
        // Old nodes stay behind as retired rows so closed history keeps its references.
        self.conn
            .execute(
                "UPDATE workflow_approval_node SET retired = 1
                 WHERE template_id = ?1 AND retired = 0",
                params![template_id.get()],
            )
            .map_err(db)?;
        self.insert_nodes(template_id, nodes)
    }

    fn lock_instance(&mut self, id: InstanceId) -> Result<Option<ApprovalInstance>, StoreError> {
        let sql = format!("SELECT {INSTANCE_COLUMNS} FROM workflow_approval_instance WHERE id = ?1");
        Ok(self.instances(&sql, params![id.get()])?.into_iter().next())
    }

    fn insert_instance(&mut self, new: NewInstance) -> Result<ApprovalInstance, StoreError> {
        let mut instance = ApprovalInstance::from_new(InstanceId::new(0), new);
        self.conn
            .execute(
                "INSERT INTO workflow_approval_instance (
                    instance_number, template_id, template_code, content_type, object_id, status,
                    current_node_id, applicant_id, apply_time, apply_comment, completed_time,
                    final_comment, flag_json, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL, NULL, ?11, ?12)",
                params![
                    instance.instance_number,
                    instance.template_id.get(),
                    instance.template_code.as_str(),
                    instance.target.kind.as_str(),
                    instance.target.id,
                    instance.status.as_str(),
                    instance.current_node.map(NodeId::get),
                    instance.applicant.get(),
                    instance.apply_time.as_unix_millis(),
                    instance.apply_comment,
                    instance.created_at.as_unix_millis(),
                    instance.updated_at.as_unix_millis(),
                ],
            )
            .map_err(db)?;
        instance.id = InstanceId::new(self.conn.last_insert_rowid());
        Ok(instance)
    }

    fn update_instance(&mut self, instance: &ApprovalInstance) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE workflow_approval_instance SET
                    status = ?2, current_node_id = ?3, apply_comment = ?4, completed_time = ?5,
                    final_comment = ?6, flag_json = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    instance.id.get(),
                    instance.status.as_str(),
                    instance.current_node.map(NodeId::get),
                    instance.apply_comment,
                    instance.completed_time.map(Timestamp::as_unix_millis),
                    instance.final_comment,
                    to_json_opt(instance.flag.as_ref())?,
                    instance.updated_at.as_unix_millis(),
                ],
            )
            .map_err(db)?;
        if changed == 0 {
            return Err(StoreError::Invalid(format!("instance {} not found", instance.id)));
        }
        Ok(())
    }

    fn open_instances_for(
        &mut self,
        code: &TemplateCode,
        target: &TargetRef,
    ) -> Result<Vec<ApprovalInstance>, StoreError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_approval_instance
             WHERE template_code = ?1 AND content_type = ?2 AND object_id = ?3
               AND status IN (?4, ?5)
             ORDER BY id"
        );
        self.instances(&sql, params![
            code.as_str(),
            target.kind.as_str(),
            target.id,
            InstanceStatus::Draft.as_str(),
            InstanceStatus::Pending.as_str(),
        ])
    }

    fn instances_for_target(
        &mut self,
        target: &TargetRef,
    ) -> Result<Vec<ApprovalInstance>, StoreError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_approval_instance
             WHERE content_type = ?1 AND object_id = ?2 ORDER BY id"
        );
        self.instances(&sql, params![target.kind.as_str(), target.id])
    }

    fn count_instances_with_prefix(&mut self, prefix: &str) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(*) FROM workflow_approval_instance
             WHERE substr(instance_number, 1, length(?1)) = ?1",
            params![prefix],
        )
    }

    fn count_open_instances(&mut self, template_id: TemplateId) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(*) FROM workflow_approval_instance
             WHERE template_id = ?1 AND status IN (?2, ?3)",
            params![
                template_id.get(),
                InstanceStatus::Draft.as_str(),
                InstanceStatus::Pending.as_str()
            ],
        )
    }

    fn pending_instances_for(
        &mut self,
        approver: UserId,
    ) -> Result<Vec<ApprovalInstance>, StoreError> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM workflow_approval_instance AS i
             WHERE i.status IN (?2, ?3)
               AND EXISTS (
                   SELECT 1 FROM workflow_approval_record AS r
                   WHERE r.instance_id = i.id AND r.approver_id = ?1 AND r.result = ?4
               )
             ORDER BY i.apply_time, i.id"
        );
        self.instances(&sql, params![
            approver.get(),
            InstanceStatus::Draft.as_str(),
            InstanceStatus::Pending.as_str(),
            RecordResult::Pending.as_str(),
        ])
    }

    fn insert_record(&mut self, new: NewRecord) -> Result<ApprovalRecord, StoreError> {
        if !self.row_exists("workflow_approval_instance", new.instance_id.get())? {
            return Err(StoreError::Invalid(format!("instance {} not found", new.instance_id)));
        }
        let mut record = ApprovalRecord::from_new(RecordId::new(0), new);
        self.conn
            .execute(
                "INSERT INTO workflow_approval_record (
                    instance_id, node_id, approver_id, kind, result, comment, transferred_to,
                    transferred_from, transfer_hops, system_decided, created_at, due_at,
                    approval_time, last_reminder_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9, ?10, ?11, ?12, NULL)",
                params![
                    record.instance_id.get(),
                    record.node_id.get(),
                    record.approver.map(UserId::get),
                    record.kind.as_str(),
                    record.result.as_str(),
                    record.comment,
                    record.transferred_from.map(RecordId::get),
                    i64::from(record.transfer_hops),
                    record.system_decided,
                    record.created_at.as_unix_millis(),
                    record.due_at.map(Timestamp::as_unix_millis),
                    record.approval_time.map(Timestamp::as_unix_millis),
                ],
            )
            .map_err(db)?;
        record.id = RecordId::new(self.conn.last_insert_rowid());
        Ok(record)
    }

    fn update_record(&mut self, record: &ApprovalRecord) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE workflow_approval_record SET
                    approver_id = ?2, result = ?3, comment = ?4, transferred_to = ?5,
                    system_decided = ?6, due_at = ?7, approval_time = ?8, last_reminder_at = ?9
                 WHERE id = ?1",
                params![
                    record.id.get(),
                    record.approver.map(UserId::get),
                    record.result.as_str(),
                    record.comment,
                    record.transferred_to.map(UserId::get),
                    record.system_decided,
                    record.due_at.map(Timestamp::as_unix_millis),
                    record.approval_time.map(Timestamp::as_unix_millis),
                    record.last_reminder_at.map(Timestamp::as_unix_millis),
                ],
            )
            .map_err(db)?;
        if changed == 0 {
            return Err(StoreError::Invalid(format!("record {} not found", record.id)));
        }
        Ok(())
    }

    fn records_for_instance(
        &mut self,
        instance_id: InstanceId,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM workflow_approval_record WHERE instance_id = ?1 ORDER BY id"
        );
        self.records(&sql, params![instance_id.get()])
    }

    fn overdue_records(
        &mut self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM workflow_approval_record
             WHERE result = ?1 AND last_reminder_at IS NULL
               AND due_at IS NOT NULL AND due_at <= ?2
             ORDER BY due_at, id LIMIT ?3"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.records(&sql, params![RecordResult::Pending.as_str(), now.as_unix_millis(), limit])
    }
}

// ============================================================================
// SECTION: Output-Value Tables
// ============================================================================

impl SqliteTx<'_> {
    /// Loads one stage by id.
    fn stage(&self, id: StageId) -> Result<Option<Stage>, StoreError> {
        let sql = format!("SELECT {STAGE_COLUMNS} FROM output_value_stage WHERE id = ?1");
        self.conn
            .query_row(&sql, params![id.get()], StageRow::read)
            .optional()
            .map_err(db)?
            .map(StageRow::into_stage)
            .transpose()
    }

    /// Loads one milestone by id.
    fn milestone(&self, id: MilestoneId) -> Result<Option<Milestone>, StoreError> {
        let sql = format!("SELECT {MILESTONE_COLUMNS} FROM output_value_milestone WHERE id = ?1");
        self.conn
            .query_row(&sql, params![id.get()], MilestoneRow::read)
            .optional()
            .map_err(db)?
            .map(MilestoneRow::into_milestone)
            .transpose()
    }

    /// Loads one event by an arbitrary key column.
    fn event_where(&self, column: &str, value: &str) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM output_value_event WHERE {column} = ?1");
        self.conn
            .query_row(&sql, params![value], EventRow::read)
            .optional()
            .map_err(db)?
            .map(EventRow::into_event)
            .transpose()
    }

    /// Resolves an event's ancestors.
    fn event_path(&self, event: Event) -> Result<EventPath, StoreError> {
        let milestone = self.milestone(event.milestone_id)?.ok_or_else(|| {
            StoreError::Corrupt(format!("event {} has no milestone", event.code))
        })?;
        let stage = self.stage(milestone.stage_id)?.ok_or_else(|| {
            StoreError::Corrupt(format!("milestone {} has no stage", milestone.code))
        })?;
        Ok(EventPath {
            stage,
            milestone,
            event,
        })
    }

    /// Loads output-value records matching `sql`.
    fn output_records(
        &self,
        sql: &str,
        params: impl Params,
    ) -> Result<Vec<OutputValueRecord>, StoreError> {
        query_rows(self.conn, sql, params, OutputRow::read)?
            .into_iter()
            .map(OutputRow::into_record)
            .collect()
    }

    /// Looks up a row id by a text key.
    fn id_where(&self, sql: &str, params: impl Params) -> Result<Option<i64>, StoreError> {
        self.conn.query_row(sql, params, |row| row.get(0)).optional().map_err(db)
    }
}

impl OutputValueTx for SqliteTx<'_> {
    fn upsert_stage(&mut self, spec: &StageSpec) -> Result<Stage, StoreError> {
        let existing =
            self.id_where("SELECT id FROM output_value_stage WHERE code = ?1", params![spec.code])?;
        let percentage = spec.stage_percentage.to_string();
        let id = if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE output_value_stage SET
                        name = ?2, position = ?3, stage_percentage = ?4, base_amount_type = ?5,
                        active = ?6
                     WHERE id = ?1",
                    params![
                        id,
                        spec.name,
                        i64::from(spec.position),
                        percentage,
                        spec.base_amount_type.as_str(),
                        spec.active,
                    ],
                )
                .map_err(db)?;
            id
        } else {
            self.conn
                .execute(
                    "INSERT INTO output_value_stage (
                        code, name, position, stage_percentage, base_amount_type, active
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        spec.code,
                        spec.name,
                        i64::from(spec.position),
                        percentage,
                        spec.base_amount_type.as_str(),
                        spec.active,
                    ],
                )
                .map_err(db)?;
            self.conn.last_insert_rowid()
        };
        Ok(Stage {
            id: StageId::new(id),
            code: spec.code.clone(),
            name: spec.name.clone(),
            position: spec.position,
            stage_percentage: spec.stage_percentage.clone(),
            base_amount_type: spec.base_amount_type,
            active: spec.active,
        })
    }

    fn upsert_milestone(
        &mut self,
        stage_id: StageId,
        spec: &MilestoneSpec,
    ) -> Result<Milestone, StoreError> {
        if !self.row_exists("output_value_stage", stage_id.get())? {
            return Err(StoreError::Invalid(format!("stage {stage_id} not found")));
        }
        let existing = self.id_where(
            "SELECT id FROM output_value_milestone WHERE stage_id = ?1 AND code = ?2",
            params![stage_id.get(), spec.code],
        )?;
        let percentage = spec.milestone_percentage.to_string();
        let base = spec.base_amount_type.map(BaseAmountType::as_str);
        let id = if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE output_value_milestone SET
                        name = ?2, position = ?3, milestone_percentage = ?4,
                        base_amount_type = ?5, active = ?6
                     WHERE id = ?1",
                    params![id, spec.name, i64::from(spec.position), percentage, base, spec.active],
                )
                .map_err(db)?;
            id
        } else {
            self.conn
                .execute(
                    "INSERT INTO output_value_milestone (
                        stage_id, code, name, position, milestone_percentage, base_amount_type,
                        active
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        stage_id.get(),
                        spec.code,
                        spec.name,
                        i64::from(spec.position),
                        percentage,
                        base,
                        spec.active,
                    ],
                )
                .map_err(db)?;
            self.conn.last_insert_rowid()
        };
        Ok(Milestone {
            id: MilestoneId::new(id),
            stage_id,
            code: spec.code.clone(),
            name: spec.name.clone(),
            position: spec.position,
            milestone_percentage: spec.milestone_percentage.clone(),
            base_amount_type: spec.base_amount_type,
            active: spec.active,
        })
    }

    fn upsert_event(
        &mut self,
        milestone_id: MilestoneId,
        spec: &EventSpec,
    ) -> Result<Event, StoreError> {
        if !self.row_exists("output_value_milestone", milestone_id.get())? {
            return Err(StoreError::Invalid(format!("milestone {milestone_id} not found")));
        }
        if let Some(trigger) = &spec.trigger_condition {
            let taken = self.count(
                "SELECT COUNT(*) FROM output_value_event
                 WHERE trigger_condition = ?1 AND code <> ?2",
                params![trigger, spec.code],
            )?;
            if taken > 0 {
                return Err(StoreError::Conflict(format!("trigger condition {trigger} exists")));
            }
        }
        let existing =
            self.id_where("SELECT id FROM output_value_event WHERE code = ?1", params![spec.code])?;
        let percentage = spec.event_percentage.to_string();
        let id = if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE output_value_event SET
                        milestone_id = ?2, name = ?3, position = ?4, event_percentage = ?5,
                        responsible_role_code = ?6, trigger_condition = ?7, active = ?8
                     WHERE id = ?1",
                    params![
                        id,
                        milestone_id.get(),
                        spec.name,
                        i64::from(spec.position),
                        percentage,
                        spec.responsible_role_code.as_str(),
                        spec.trigger_condition,
                        spec.active,
                    ],
                )
                .map_err(db)?;
            id
        } else {
            self.conn
                .execute(
                    "INSERT INTO output_value_event (
                        milestone_id, code, name, position, event_percentage,
                        responsible_role_code, trigger_condition, active
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        milestone_id.get(),
                        spec.code,
                        spec.name,
                        i64::from(spec.position),
                        percentage,
                        spec.responsible_role_code.as_str(),
                        spec.trigger_condition,
                        spec.active,
                    ],
                )
                .map_err(db)?;
            self.conn.last_insert_rowid()
        };
        Ok(Event {
            id: EventId::new(id),
            milestone_id,
            code: spec.code.clone(),
            name: spec.name.clone(),
            position: spec.position,
            event_percentage: spec.event_percentage.clone(),
            responsible_role_code: spec.responsible_role_code.clone(),
            trigger_condition: spec.trigger_condition.clone(),
            active: spec.active,
        })
    }

    fn catalog(&mut self) -> Result<Vec<StageNode>, StoreError> {
        let stages = query_rows(
            self.conn,
            &format!("SELECT {STAGE_COLUMNS} FROM output_value_stage ORDER BY position, id"),
            [],
            StageRow::read,
        )?;
        let milestones = query_rows(
            self.conn,
            &format!("SELECT {MILESTONE_COLUMNS} FROM output_value_milestone ORDER BY position, id"),
            [],
            MilestoneRow::read,
        )?
        .into_iter()
        .map(MilestoneRow::into_milestone)
        .collect::<Result<Vec<_>, _>>()?;
        let events = query_rows(
            self.conn,
            &format!("SELECT {EVENT_COLUMNS} FROM output_value_event ORDER BY position, id"),
            [],
            EventRow::read,
        )?
        .into_iter()
        .map(EventRow::into_event)
        .collect::<Result<Vec<_>, _>>()?;

        stages
            .into_iter()
            .map(|row| {
                let stage = row.into_stage()?;
                let milestones = milestones
                    .iter()
                    .filter(|milestone| milestone.stage_id == stage.id)
                    .map(|milestone| MilestoneNode {
                        milestone: milestone.clone(),
                        events: events
                            .iter()
                            .filter(|event| event.milestone_id == milestone.id)
                            .cloned()
                            .collect(),
                    })
                    .collect();
                Ok(StageNode {
                    stage,
                    milestones,
                })
            })
            .collect()
    }

    fn event_by_code(&mut self, code: &str) -> Result<Option<EventPath>, StoreError> {
        self.event_where("code", code)?.map(|event| self.event_path(event)).transpose()
    }

    fn event_by_trigger(&mut self, trigger: &str) -> Result<Option<EventPath>, StoreError> {
        self.event_where("trigger_condition", trigger)?
            .map(|event| self.event_path(event))
            .transpose()
    }

    fn set_event_active(&mut self, code: &str, active: bool) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("UPDATE output_value_event SET active = ?2 WHERE code = ?1", params![
                code, active
            ])
            .map_err(db)?;
        Ok(changed > 0)
    }

    fn active_record_for(
        &mut self,
        project_id: ProjectId,
        event_id: EventId,
    ) -> Result<Option<OutputValueRecord>, StoreError> {
        let sql = format!(
            "SELECT {OUTPUT_COLUMNS} FROM output_value_record
             WHERE project_id = ?1 AND event_id = ?2 AND status <> ?3"
        );
        Ok(self
            .output_records(&sql, params![
                project_id.get(),
                event_id.get(),
                RecordStatus::Voided.as_str()
            ])?
            .into_iter()
            .next())
    }

    fn insert_output_record(
        &mut self,
        new: NewOutputValueRecord,
    ) -> Result<OutputValueRecord, StoreError> {
        if self.active_record_for(new.project_id, new.event_id)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "project {} already holds a record for event {}",
                new.project_id, new.event_code
            )));
        }
        let mut record = OutputValueRecord::from_new(OutputValueRecordId::new(0), new);
        self.conn
            .execute(
                "INSERT INTO output_value_record (
                    project_id, stage_id, stage_code, milestone_id, event_id, event_code,
                    responsible_user, base_amount, base_amount_type, stage_percentage,
                    milestone_percentage, event_percentage, calculated_value, status,
                    confirmed_by, confirmed_at, void_reason, created_at, updated_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    NULL, NULL, NULL, ?15, ?16
                )",
                params![
                    record.project_id.get(),
                    record.stage_id.get(),
                    record.stage_code,
                    record.milestone_id.get(),
                    record.event_id.get(),
                    record.event_code,
                    record.responsible_user.get(),
                    record.base_amount.to_string(),
                    record.base_amount_type.as_str(),
                    record.stage_percentage.to_string(),
                    record.milestone_percentage.to_string(),
                    record.event_percentage.to_string(),
                    record.calculated_value.to_string(),
                    record.status.as_str(),
                    record.created_at.as_unix_millis(),
                    record.updated_at.as_unix_millis(),
                ],
            )
            .map_err(db)?;
        record.id = OutputValueRecordId::new(self.conn.last_insert_rowid());
        Ok(record)
    }

    fn update_output_record(&mut self, record: &OutputValueRecord) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE output_value_record SET
                    status = ?2, confirmed_by = ?3, confirmed_at = ?4, void_reason = ?5,
                    updated_at = ?6
                 WHERE id = ?1",
                params![
                    record.id.get(),
                    record.status.as_str(),
                    record.confirmed_by.map(UserId::get),
                    record.confirmed_at.map(Timestamp::as_unix_millis),
                    record.void_reason,
                    record.updated_at.as_unix_millis(),
                ],
            )
            .map_err(db)?;
        if changed == 0 {
            return Err(StoreError::Invalid(format!("output record {} not found", record.id)));
        }
        Ok(())
    }

    fn output_record(
        &mut self,
        id: OutputValueRecordId,
    ) -> Result<Option<OutputValueRecord>, StoreError> {
        let sql = format!("SELECT {OUTPUT_COLUMNS} FROM output_value_record WHERE id = ?1");
        Ok(self.output_records(&sql, params![id.get()])?.into_iter().next())
    }

    fn records_for_project(
        &mut self,
        project_id: ProjectId,
    ) -> Result<Vec<OutputValueRecord>, StoreError> {
        let sql = format!(
            "SELECT {OUTPUT_COLUMNS} FROM output_value_record WHERE project_id = ?1 ORDER BY id"
        );
        self.output_records(&sql, params![project_id.get()])
    }

    fn records_for_user(&mut self, user: UserId) -> Result<Vec<OutputValueRecord>, StoreError> {
        let sql = format!(
            "SELECT {OUTPUT_COLUMNS} FROM output_value_record
             WHERE responsible_user = ?1 ORDER BY id"
        );
        self.output_records(&sql, params![user.get()])
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Raw template header row.
struct TemplateRow {
    /// Row id.
    id: i64,
    /// Template code.
    code: String,
    /// Display name.
    name: String,
    /// Description.
    description: String,
    /// Category.
    category: String,
    /// Status label.
    status: String,
    /// Withdraw policy flag.
    allow_withdraw: bool,
    /// Reject policy flag.
    allow_reject: bool,
    /// Transfer policy flag.
    allow_transfer: bool,
    /// Default timeout hours.
    default_timeout_hours: Option<i64>,
    /// Timeout action label.
    timeout_action: String,
    /// Applicable content types as JSON.
    content_types_json: String,
    /// Form filter predicate as JSON.
    form_filter_json: Option<String>,
    /// Sub-workflow trigger predicate as JSON.
    sub_workflow_trigger_json: Option<String>,
    /// Creation time (ms).
    created_at: i64,
    /// Last update time (ms).
    updated_at: i64,
}

impl TemplateRow {
    /// Reads a row selected with [`TEMPLATE_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            status: row.get(5)?,
            allow_withdraw: row.get(6)?,
            allow_reject: row.get(7)?,
            allow_transfer: row.get(8)?,
            default_timeout_hours: row.get(9)?,
            timeout_action: row.get(10)?,
            content_types_json: row.get(11)?,
            form_filter_json: row.get(12)?,
            sub_workflow_trigger_json: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    /// Decodes the row and attaches nodes.
    fn into_template(self, nodes: Vec<ApprovalNode>) -> Result<WorkflowTemplate, StoreError> {
        Ok(WorkflowTemplate {
            id: TemplateId::new(self.id),
            code: TemplateCode::new(self.code),
            name: self.name,
            description: self.description,
            category: self.category,
            status: parse_label("template status", &self.status, TemplateStatus::from_label)?,
            policy: TemplatePolicy {
                allow_withdraw: self.allow_withdraw,
                allow_reject: self.allow_reject,
                allow_transfer: self.allow_transfer,
            },
            default_timeout_hours: self
                .default_timeout_hours
                .map(|hours| to_u32("default_timeout_hours", hours))
                .transpose()?,
            timeout_action: parse_label(
                "timeout action",
                &self.timeout_action,
                TimeoutAction::from_label,
            )?,
            applicable_content_types: from_json::<Vec<ContentTypeCode>>(
                "content_types_json",
                &self.content_types_json,
            )?,
            form_filter: from_json_opt("form_filter_json", self.form_filter_json.as_deref())?,
            sub_workflow_trigger: from_json_opt(
                "sub_workflow_trigger_json",
                self.sub_workflow_trigger_json.as_deref(),
            )?,
            nodes,
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
        })
    }
}

/// Raw approval node row.
struct NodeRow {
    /// Row id.
    id: i64,
    /// Owning template.
    template_id: i64,
    /// Sequence within the template.
    sequence: i64,
    /// Display name.
    name: String,
    /// Node type label.
    node_type: String,
    /// Approver binding as JSON.
    approvers_json: Option<String>,
    /// Approval mode label.
    approval_mode: String,
    /// Routing table as JSON.
    condition_json: Option<String>,
    /// Required flag.
    is_required: bool,
    /// Reject permission.
    can_reject: bool,
    /// Transfer permission.
    can_transfer: bool,
    /// Timeout override.
    timeout_hours: Option<i64>,
}

impl NodeRow {
    /// Reads a row selected with [`NODE_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            template_id: row.get(1)?,
            sequence: row.get(2)?,
            name: row.get(3)?,
            node_type: row.get(4)?,
            approvers_json: row.get(5)?,
            approval_mode: row.get(6)?,
            condition_json: row.get(7)?,
            is_required: row.get(8)?,
            can_reject: row.get(9)?,
            can_transfer: row.get(10)?,
            timeout_hours: row.get(11)?,
        })
    }

    /// Decodes the row.
    fn into_node(self) -> Result<ApprovalNode, StoreError> {
        Ok(ApprovalNode {
            id: NodeId::new(self.id),
            template_id: TemplateId::new(self.template_id),
            sequence: to_u32("sequence", self.sequence)?,
            name: self.name,
            node_type: parse_label("node type", &self.node_type, NodeType::from_label)?,
            approvers: from_json_opt("approvers_json", self.approvers_json.as_deref())?,
            approval_mode: parse_label(
                "approval mode",
                &self.approval_mode,
                ApprovalMode::from_label,
            )?,
            condition: from_json_opt("condition_json", self.condition_json.as_deref())?,
            is_required: self.is_required,
            can_reject: self.can_reject,
            can_transfer: self.can_transfer,
            timeout_hours: self
                .timeout_hours
                .map(|hours| to_u32("timeout_hours", hours))
                .transpose()?,
        })
    }
}

/// Raw approval instance row.
struct InstanceRow {
    /// Row id.
    id: i64,
    /// Human-readable number.
    instance_number: String,
    /// Template row id.
    template_id: i64,
    /// Template code.
    template_code: String,
    /// Target content type.
    content_type: String,
    /// Target row id.
    object_id: i64,
    /// Status label.
    status: String,
    /// Current node.
    current_node: Option<i64>,
    /// Applicant user.
    applicant: i64,
    /// Submission time (ms).
    apply_time: i64,
    /// Applicant comment.
    apply_comment: String,
    /// Completion time (ms).
    completed_time: Option<i64>,
    /// Closing comment.
    final_comment: Option<String>,
    /// Admin flag as JSON.
    flag_json: Option<String>,
    /// Creation time (ms).
    created_at: i64,
    /// Last update time (ms).
    updated_at: i64,
}

impl InstanceRow {
    /// Reads a row selected with [`INSTANCE_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            instance_number: row.get(1)?,
            template_id: row.get(2)?,
            template_code: row.get(3)?,
            content_type: row.get(4)?,
            object_id: row.get(5)?,
            status: row.get(6)?,
            current_node: row.get(7)?,
            applicant: row.get(8)?,
            apply_time: row.get(9)?,
            apply_comment: row.get(10)?,
            completed_time: row.get(11)?,
            final_comment: row.get(12)?,
            flag_json: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    /// Decodes the row.
    fn into_instance(self) -> Result<ApprovalInstance, StoreError> {
        Ok(ApprovalInstance {
            id: InstanceId::new(self.id),
            instance_number: self.instance_number,
            template_id: TemplateId::new(self.template_id),
            template_code: TemplateCode::new(self.template_code),
            target: TargetRef::new(ContentTypeCode::new(self.content_type), self.object_id),
            status: parse_label("instance status", &self.status, InstanceStatus::from_label)?,
            current_node: self.current_node.map(NodeId::new),
            applicant: UserId::new(self.applicant),
            apply_time: Timestamp::from_unix_millis(self.apply_time),
            apply_comment: self.apply_comment,
            completed_time: self.completed_time.map(Timestamp::from_unix_millis),
            final_comment: self.final_comment,
            flag: from_json_opt("flag_json", self.flag_json.as_deref())?,
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
        })
    }
}

/// Raw approval record row.
struct RecordRow {
    /// Row id.
    id: i64,
    /// Owning instance.
    instance_id: i64,
    /// Node the record belongs to.
    node_id: i64,
    /// Approver, absent for system records.
    approver: Option<i64>,
    /// Kind label.
    kind: String,
    /// Result label.
    result: String,
    /// Comment.
    comment: String,
    /// Transfer recipient.
    transferred_to: Option<i64>,
    /// Source record of a transfer.
    transferred_from: Option<i64>,
    /// Transfer chain length.
    transfer_hops: i64,
    /// System-made decision flag.
    system_decided: bool,
    /// Creation time (ms).
    created_at: i64,
    /// Deadline (ms).
    due_at: Option<i64>,
    /// Decision time (ms).
    approval_time: Option<i64>,
    /// Reminder time (ms).
    last_reminder_at: Option<i64>,
}

impl RecordRow {
    /// Reads a row selected with [`RECORD_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            instance_id: row.get(1)?,
            node_id: row.get(2)?,
            approver: row.get(3)?,
            kind: row.get(4)?,
            result: row.get(5)?,
            comment: row.get(6)?,
            transferred_to: row.get(7)?,
            transferred_from: row.get(8)?,
            transfer_hops: row.get(9)?,
            system_decided: row.get(10)?,
            created_at: row.get(11)?,
            due_at: row.get(12)?,
            approval_time: row.get(13)?,
            last_reminder_at: row.get(14)?,
        })
    }

    /// Decodes the row.
    fn into_record(self) -> Result<ApprovalRecord, StoreError> {
        Ok(ApprovalRecord {
            id: RecordId::new(self.id),
            instance_id: InstanceId::new(self.instance_id),
            node_id: NodeId::new(self.node_id),
            approver: self.approver.map(UserId::new),
            kind: parse_label("record kind", &self.kind, RecordKind::from_label)?,
            result: parse_label("record result", &self.result, RecordResult::from_label)?,
            comment: self.comment,
            transferred_to: self.transferred_to.map(UserId::new),
            transferred_from: self.transferred_from.map(RecordId::new),
            transfer_hops: to_u32("transfer_hops", self.transfer_hops)?,
            system_decided: self.system_decided,
            created_at: Timestamp::from_unix_millis(self.created_at),
            due_at: self.due_at.map(Timestamp::from_unix_millis),
            approval_time: self.approval_time.map(Timestamp::from_unix_millis),
            last_reminder_at: self.last_reminder_at.map(Timestamp::from_unix_millis),
        })
    }
}

/// Raw stage row.
struct StageRow {
    /// Row id.
    id: i64,
    /// Stage code.
    code: String,
    /// Display name.
    name: String,
    /// Ordering position.
    position: i64,
    /// Percentage as decimal text.
    percentage: String,
    /// Base amount label.
    base_amount_type: String,
    /// Active flag.
    active: bool,
}

impl StageRow {
    /// Reads a row selected with [`STAGE_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            position: row.get(3)?,
            percentage: row.get(4)?,
            base_amount_type: row.get(5)?,
            active: row.get(6)?,
        })
    }

    /// Decodes the row.
    fn into_stage(self) -> Result<Stage, StoreError> {
        Ok(Stage {
            id: StageId::new(self.id),
            code: self.code,
            name: self.name,
            position: to_u32("position", self.position)?,
            stage_percentage: parse_decimal("stage_percentage", &self.percentage)?,
            base_amount_type: parse_label(
                "base amount type",
                &self.base_amount_type,
                BaseAmountType::from_label,
            )?,
            active: self.active,
        })
    }
}

/// Raw milestone row.
struct MilestoneRow {
    /// Row id.
    id: i64,
    /// Parent stage.
    stage_id: i64,
    /// Milestone code.
    code: String,
    /// Display name.
    name: String,
    /// Ordering position.
    position: i64,
    /// Percentage as decimal text.
    percentage: String,
    /// Base amount override label.
    base_amount_type: Option<String>,
    /// Active flag.
    active: bool,
}

impl MilestoneRow {
    /// Reads a row selected with [`MILESTONE_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            stage_id: row.get(1)?,
            code: row.get(2)?,
            name: row.get(3)?,
            position: row.get(4)?,
            percentage: row.get(5)?,
            base_amount_type: row.get(6)?,
            active: row.get(7)?,
        })
    }

    /// Decodes the row.
    fn into_milestone(self) -> Result<Milestone, StoreError> {
        Ok(Milestone {
            id: MilestoneId::new(self.id),
            stage_id: StageId::new(self.stage_id),
            code: self.code,
            name: self.name,
            position: to_u32("position", self.position)?,
            milestone_percentage: parse_decimal("milestone_percentage", &self.percentage)?,
            base_amount_type: self
                .base_amount_type
                .as_deref()
                .map(|label| parse_label("base amount type", label, BaseAmountType::from_label))
                .transpose()?,
            active: self.active,
        })
    }
}

/// Raw event row.
struct EventRow {
    /// Row id.
    id: i64,
    /// Parent milestone.
    milestone_id: i64,
    /// Event code.
    code: String,
    /// Display name.
    name: String,
    /// Ordering position.
    position: i64,
    /// Percentage as decimal text.
    percentage: String,
    /// Responsible role code.
    responsible_role_code: String,
    /// Trigger string.
    trigger_condition: Option<String>,
    /// Active flag.
    active: bool,
}

impl EventRow {
    /// Reads a row selected with [`EVENT_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            milestone_id: row.get(1)?,
            code: row.get(2)?,
            name: row.get(3)?,
            position: row.get(4)?,
            percentage: row.get(5)?,
            responsible_role_code: row.get(6)?,
            trigger_condition: row.get(7)?,
            active: row.get(8)?,
        })
    }

    /// Decodes the row.
    fn into_event(self) -> Result<Event, StoreError> {
        Ok(Event {
            id: EventId::new(self.id),
            milestone_id: MilestoneId::new(self.milestone_id),
            code: self.code,
            name: self.name,
            position: to_u32("position", self.position)?,
            event_percentage: parse_decimal("event_percentage", &self.percentage)?,
            responsible_role_code: RoleCode::new(self.responsible_role_code),
            trigger_condition: self.trigger_condition,
            active: self.active,
        })
    }
}

/// Raw output-value record row.
struct OutputRow {
    /// Row id.
    id: i64,
    /// Project.
    project_id: i64,
    /// Stage snapshot.
    stage_id: i64,
    /// Stage code snapshot.
    stage_code: String,
    /// Milestone snapshot.
    milestone_id: i64,
    /// Event.
    event_id: i64,
    /// Event code snapshot.
    event_code: String,
    /// Credited user.
    responsible_user: i64,
    /// Base amount text.
    base_amount: String,
    /// Base amount label.
    base_amount_type: String,
    /// Stage percentage text.
    stage_percentage: String,
    /// Milestone percentage text.
    milestone_percentage: String,
    /// Event percentage text.
    event_percentage: String,
    /// Calculated value text.
    calculated_value: String,
    /// Status label.
    status: String,
    /// Confirming user.
    confirmed_by: Option<i64>,
    /// Confirmation time (ms).
    confirmed_at: Option<i64>,
    /// Void reason.
    void_reason: Option<String>,
    /// Creation time (ms).
    created_at: i64,
    /// Last update time (ms).
    updated_at: i64,
}

impl OutputRow {
    /// Reads a row selected with [`OUTPUT_COLUMNS`].
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            stage_id: row.get(2)?,
            stage_code: row.get(3)?,
            milestone_id: row.get(4)?,
            event_id: row.get(5)?,
            event_code: row.get(6)?,
            responsible_user: row.get(7)?,
            base_amount: row.get(8)?,
            base_amount_type: row.get(9)?,
            stage_percentage: row.get(10)?,
            milestone_percentage: row.get(11)?,
            event_percentage: row.get(12)?,
            calculated_value: row.get(13)?,
            status: row.get(14)?,
            confirmed_by: row.get(15)?,
            confirmed_at: row.get(16)?,
            void_reason: row.get(17)?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
        })
    }

    /// Decodes the row.
    fn into_record(self) -> Result<OutputValueRecord, StoreError> {
        Ok(OutputValueRecord {
            id: OutputValueRecordId::new(self.id),
            project_id: ProjectId::new(self.project_id),
            stage_id: StageId::new(self.stage_id),
            stage_code: self.stage_code,
            milestone_id: MilestoneId::new(self.milestone_id),
            event_id: EventId::new(self.event_id),
            event_code: self.event_code,
            responsible_user: UserId::new(self.responsible_user),
            base_amount: parse_decimal("base_amount", &self.base_amount)?,
            base_amount_type: parse_label(
                "base amount type",
                &self.base_amount_type,
                BaseAmountType::from_label,
            )?,
            stage_percentage: parse_decimal("stage_percentage", &self.stage_percentage)?,
            milestone_percentage: parse_decimal("milestone_percentage", &self.milestone_percentage)?,
            event_percentage: parse_decimal("event_percentage", &self.event_percentage)?,
            calculated_value: parse_decimal("calculated_value", &self.calculated_value)?,
            status: parse_label("output record status", &self.status, RecordStatus::from_label)?,
            confirmed_by: self.confirmed_by.map(UserId::new),
            confirmed_at: self.confirmed_at.map(Timestamp::from_unix_millis),
            void_reason: self.void_reason,
            created_at: Timestamp::from_unix_millis(self.created_at),
            updated_at: Timestamp::from_unix_millis(self.updated_at),
        })
    }
}

// ============================================================================
// SECTION: Value Helpers
// ============================================================================

/// Runs a query and collects its rows.
fn query_rows<T, P, F>(
    conn: &Connection,
    sql: &str,
    params: P,
    read: F,
) -> Result<Vec<T>, StoreError>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut statement = conn.prepare_cached(sql).map_err(db)?;
    let rows = statement.query_map(params, read).map_err(db)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(db)
}

/// Parses a stored label, failing closed on unknown values.
fn parse_label<T>(kind: &str, raw: &str, parse: fn(&str) -> Option<T>) -> Result<T, StoreError> {
    parse(raw).ok_or_else(|| StoreError::Corrupt(format!("unknown {kind} label: {raw}")))
}

/// Parses a stored decimal.
fn parse_decimal(column: &str, raw: &str) -> Result<BigDecimal, StoreError> {
    BigDecimal::from_str(raw)
        .map_err(|err| StoreError::Corrupt(format!("{column} is not a decimal: {err}")))
}

/// Narrows a stored integer.
fn to_u32(column: &str, raw: i64) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {raw}")))
}

/// Encodes a value as JSON text.
fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::Invalid(err.to_string()))
}

/// Encodes an optional value as JSON text.
fn to_json_opt<T: Serialize>(value: Option<&T>) -> Result<Option<String>, StoreError> {
    value.map(to_json).transpose()
}

/// Decodes JSON text.
fn from_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::Corrupt(format!("{column} failed to decode: {err}")))
}

/// Decodes optional JSON text.
fn from_json_opt<T: DeserializeOwned>(
    column: &str,
    raw: Option<&str>,
) -> Result<Option<T>, StoreError> {
    raw.map(|raw| from_json(column, raw)).transpose()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    let overlong = path
        .components()
        .any(|component| component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH);
    if overlong {
        return Err(SqliteStoreError::Invalid(
            "store path contains an overlong component".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    let pragmas = format!(
        "PRAGMA foreign_keys = ON; PRAGMA journal_mode = {}; PRAGMA synchronous = {};",
        config.journal_mode.pragma_value(),
        config.sync_mode.pragma_value()
    );
    connection.execute_batch(&pragmas).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(SCHEMA_SQL).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tracing::debug!(version = SCHEMA_VERSION, "sqlite schema created");
        }
        Some(SCHEMA_VERSION) => {}
        Some(found) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "expected schema version {SCHEMA_VERSION}, found {found}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Schema for a fresh database.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS workflow_template (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    allow_withdraw INTEGER NOT NULL,
    allow_reject INTEGER NOT NULL,
    allow_transfer INTEGER NOT NULL,
    default_timeout_hours INTEGER,
    timeout_action TEXT NOT NULL,
    content_types_json TEXT NOT NULL,
    form_filter_json TEXT,
    sub_workflow_trigger_json TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workflow_template_status ON workflow_template (status);
CREATE TABLE IF NOT EXISTS workflow_approval_node (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    template_id INTEGER NOT NULL REFERENCES workflow_template (id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    name TEXT NOT NULL,
    node_type TEXT NOT NULL,
    approvers_json TEXT,
    approval_mode TEXT NOT NULL,
    condition_json TEXT,
    is_required INTEGER NOT NULL,
    can_reject INTEGER NOT NULL,
    can_transfer INTEGER NOT NULL,
    timeout_hours INTEGER,
    retired INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_workflow_node_live_sequence
    ON workflow_approval_node (template_id, sequence) WHERE retired = 0;
CREATE TABLE IF NOT EXISTS workflow_approval_instance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_number TEXT NOT NULL UNIQUE,
    template_id INTEGER NOT NULL REFERENCES workflow_template (id),
    template_code TEXT NOT NULL,
    content_type TEXT NOT NULL,
    object_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    current_node_id INTEGER REFERENCES workflow_approval_node (id),
    applicant_id INTEGER NOT NULL,
    apply_time INTEGER NOT NULL,
    apply_comment TEXT NOT NULL,
    completed_time INTEGER,
    final_comment TEXT,
    flag_json TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workflow_instance_target
    ON workflow_approval_instance (content_type, object_id);
CREATE INDEX IF NOT EXISTS idx_workflow_instance_status
    ON workflow_approval_instance (status);
CREATE UNIQUE INDEX IF NOT EXISTS uq_workflow_instance_open
    ON workflow_approval_instance (template_code, content_type, object_id)
    WHERE status IN ('draft', 'pending');
CREATE TABLE IF NOT EXISTS workflow_approval_record (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id INTEGER NOT NULL REFERENCES workflow_approval_instance (id),
    node_id INTEGER NOT NULL REFERENCES workflow_approval_node (id),
    approver_id INTEGER,
    kind TEXT NOT NULL,
    result TEXT NOT NULL,
    comment TEXT NOT NULL,
    transferred_to INTEGER,
    transferred_from INTEGER REFERENCES workflow_approval_record (id),
    transfer_hops INTEGER NOT NULL,
    system_decided INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    due_at INTEGER,
    approval_time INTEGER,
    last_reminder_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_workflow_record_instance
    ON workflow_approval_record (instance_id);
CREATE INDEX IF NOT EXISTS idx_workflow_record_approver
    ON workflow_approval_record (approver_id, result);
CREATE INDEX IF NOT EXISTS idx_workflow_record_due
    ON workflow_approval_record (result, due_at);
CREATE TABLE IF NOT EXISTS output_value_stage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    stage_percentage TEXT NOT NULL,
    base_amount_type TEXT NOT NULL,
    active INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS output_value_milestone (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stage_id INTEGER NOT NULL REFERENCES output_value_stage (id),
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    milestone_percentage TEXT NOT NULL,
    base_amount_type TEXT,
    active INTEGER NOT NULL,
    UNIQUE (stage_id, code)
);
CREATE TABLE IF NOT EXISTS output_value_event (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    milestone_id INTEGER NOT NULL REFERENCES output_value_milestone (id),
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    event_percentage TEXT NOT NULL,
    responsible_role_code TEXT NOT NULL,
    trigger_condition TEXT UNIQUE,
    active INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS output_value_record (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    stage_id INTEGER NOT NULL REFERENCES output_value_stage (id),
    stage_code TEXT NOT NULL,
    milestone_id INTEGER NOT NULL REFERENCES output_value_milestone (id),
    event_id INTEGER NOT NULL REFERENCES output_value_event (id),
    event_code TEXT NOT NULL,
    responsible_user INTEGER NOT NULL,
    base_amount TEXT NOT NULL,
    base_amount_type TEXT NOT NULL,
    stage_percentage TEXT NOT NULL,
    milestone_percentage TEXT NOT NULL,
    event_percentage TEXT NOT NULL,
    calculated_value TEXT NOT NULL,
    status TEXT NOT NULL,
    confirmed_by INTEGER,
    confirmed_at INTEGER,
    void_reason TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_output_value_record_project
    ON output_value_record (project_id);
CREATE INDEX IF NOT EXISTS idx_output_value_record_user
    ON output_value_record (responsible_user);
CREATE UNIQUE INDEX IF NOT EXISTS uq_output_value_record_slot
    ON output_value_record (project_id, event_id) WHERE status <> 'voided';
";
