// crates/ledgerflow-core/src/interfaces/mod.rs
// ============================================================================
// Module: Ledgerflow Interfaces
// Description: Backend-agnostic seams for storage, directory, dispatch, and time.
// Purpose: Define the contracts the workflow and output-value engines run against.
// Dependencies: crate::core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Engines never talk to a database, an org chart, a clock, or a delivery
//! channel directly. They run against the traits in this module:
//!
//! - [`WorkflowStore`] and [`OutputValueStore`] open a unit of work. The closure
//!   receives a transaction handle; returning `Ok` commits, returning `Err`
//!   rolls back. Implementations serialize transactions that write, which
//!   gives the per-instance and per-slot mutual exclusion the engines rely on.
//! - [`Directory`] reads users, departments, and roles.
//! - [`NotificationSink`] receives events after commit.
//! - [`Clock`] supplies the current instant.
//!
//! Business modules plug in through [`TerminalCallback`], [`ConditionAccessor`],
//! [`CustomResolver`], and [`RoleResolver`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::ApprovalInstance;
use crate::core::ApprovalNode;
use crate::core::ApprovalRecord;
use crate::core::Department;
use crate::core::DepartmentId;
use crate::core::Event;
use crate::core::EventId;
use crate::core::EventPath;
use crate::core::EventSpec;
use crate::core::InstanceId;
use crate::core::InstanceStatus;
use crate::core::Milestone;
use crate::core::MilestoneId;
use crate::core::MilestoneSpec;
use crate::core::NewInstance;
use crate::core::NewOutputValueRecord;
use crate::core::NewRecord;
use crate::core::NodeSpec;
use crate::core::NotificationEvent;
use crate::core::OutputValueRecord;
use crate::core::OutputValueRecordId;
use crate::core::ProjectId;
use crate::core::ProjectView;
use crate::core::Role;
use crate::core::RoleCode;
use crate::core::Stage;
use crate::core::StageId;
use crate::core::StageNode;
use crate::core::StageSpec;
use crate::core::TargetRef;
use crate::core::TemplateCode;
use crate::core::TemplateId;
use crate::core::TemplateSpec;
use crate::core::TemplateStatus;
use crate::core::Timestamp;
use crate::core::User;
use crate::core::UserId;
use crate::core::WorkflowTemplate;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Storage errors shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Write violated a uniqueness constraint.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Workflow Store
// ============================================================================

/// Transaction handle for workflow rows.
///
/// Every method runs inside the enclosing unit of work.
pub trait WorkflowTx {
    /// Loads a template by code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn template_by_code(&mut self, code: &TemplateCode)
    -> Result<Option<WorkflowTemplate>, StoreError>;

    /// Loads a template by row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn template_by_id(&mut self, id: TemplateId) -> Result<Option<WorkflowTemplate>, StoreError>;

    /// Lists templates, optionally filtered by status, ordered by code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_templates(
        &mut self,
        status: Option<TemplateStatus>,
    ) -> Result<Vec<WorkflowTemplate>, StoreError>;

    /// Inserts a template and its nodes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the code exists.
    fn insert_template(
        &mut self,
        spec: &TemplateSpec,
        status: TemplateStatus,
        now: Timestamp,
    ) -> Result<WorkflowTemplate, StoreError>;

    /// Updates template header fields; nodes are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_template(&mut self, template: &WorkflowTemplate) -> Result<(), StoreError>;

    /// Replaces every node of a template.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn replace_template_nodes(
        &mut self,
        template_id: TemplateId,
        nodes: &[NodeSpec],
    ) -> Result<Vec<ApprovalNode>, StoreError>;

    /// Loads an instance for update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn lock_instance(&mut self, id: InstanceId) -> Result<Option<ApprovalInstance>, StoreError>;

    /// Inserts an instance in `pending` status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when an open instance already exists
    /// for the template code and target or the instance number is taken.
    fn insert_instance(&mut self, new: NewInstance) -> Result<ApprovalInstance, StoreError>;

    /// Writes every mutable instance field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_instance(&mut self, instance: &ApprovalInstance) -> Result<(), StoreError>;

    /// Open (`draft`/`pending`) instances of a template code on a target.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn open_instances_for(
        &mut self,
        code: &TemplateCode,
        target: &TargetRef,
    ) -> Result<Vec<ApprovalInstance>, StoreError>;

    /// Every instance bound to a target, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn instances_for_target(
        &mut self,
        target: &TargetRef,
    ) -> Result<Vec<ApprovalInstance>, StoreError>;

    /// Counts instances whose number starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn count_instances_with_prefix(&mut self, prefix: &str) -> Result<u64, StoreError>;

    /// Counts open instances of a template.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn count_open_instances(&mut self, template_id: TemplateId) -> Result<u64, StoreError>;

    /// Instances with a pending record for the approver, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn pending_instances_for(
        &mut self,
        approver: UserId,
    ) -> Result<Vec<ApprovalInstance>, StoreError>;

    /// Inserts an approval record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_record(&mut self, new: NewRecord) -> Result<ApprovalRecord, StoreError>;

    /// Writes every mutable record field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_record(&mut self, record: &ApprovalRecord) -> Result<(), StoreError>;

    /// Records of an instance ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn records_for_instance(
        &mut self,
        instance_id: InstanceId,
    ) -> Result<Vec<ApprovalRecord>, StoreError>;

    /// Pending records due at or before `now` that the sweeper has not yet
    /// acted on, earliest deadline first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn overdue_records(
        &mut self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<ApprovalRecord>, StoreError>;
}

/// Store that opens workflow units of work.
pub trait WorkflowStore {
    /// Runs `work` in one transaction; `Ok` commits and `Err` rolls back.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a [`StoreError`] converted into `E` when
    /// the transaction cannot begin or commit.
    fn workflow_transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn WorkflowTx) -> Result<R, E>;
}

// ============================================================================
// SECTION: Output-Value Store
// ============================================================================

/// Transaction handle for output-value rows.
pub trait OutputValueTx {
    /// Inserts or updates a stage by code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_stage(&mut self, spec: &StageSpec) -> Result<Stage, StoreError>;

    /// Inserts or updates a milestone by (stage, code).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_milestone(
        &mut self,
        stage_id: StageId,
        spec: &MilestoneSpec,
    ) -> Result<Milestone, StoreError>;

    /// Inserts or updates an event by code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_event(
        &mut self,
        milestone_id: MilestoneId,
        spec: &EventSpec,
    ) -> Result<Event, StoreError>;

    /// Returns the catalog ordered by position at every level.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn catalog(&mut self) -> Result<Vec<StageNode>, StoreError>;

    /// Loads an event and its ancestors by event code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn event_by_code(&mut self, code: &str) -> Result<Option<EventPath>, StoreError>;

    /// Loads an event and its ancestors by trigger condition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn event_by_trigger(&mut self, trigger: &str) -> Result<Option<EventPath>, StoreError>;

    /// Sets an event's active flag; returns false when the code is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn set_event_active(&mut self, code: &str, active: bool) -> Result<bool, StoreError>;

    /// Non-voided record for the (project, event) slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn active_record_for(
        &mut self,
        project_id: ProjectId,
        event_id: EventId,
    ) -> Result<Option<OutputValueRecord>, StoreError>;

    /// Inserts a record in `calculated` status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the slot already holds a
    /// non-voided record.
    fn insert_output_record(
        &mut self,
        new: NewOutputValueRecord,
    ) -> Result<OutputValueRecord, StoreError>;

    /// Writes status, confirmation, and void fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_output_record(&mut self, record: &OutputValueRecord) -> Result<(), StoreError>;

    /// Loads a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn output_record(
        &mut self,
        id: OutputValueRecordId,
    ) -> Result<Option<OutputValueRecord>, StoreError>;

    /// Every record of a project ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn records_for_project(
        &mut self,
        project_id: ProjectId,
    ) -> Result<Vec<OutputValueRecord>, StoreError>;

    /// Every record credited to a user ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn records_for_user(&mut self, user: UserId) -> Result<Vec<OutputValueRecord>, StoreError>;
}

/// Store that opens output-value units of work.
pub trait OutputValueStore {
    /// Runs `work` in one transaction; `Ok` commits and `Err` rolls back.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a [`StoreError`] converted into `E`.
    fn output_value_transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn OutputValueTx) -> Result<R, E>;
}

// ============================================================================
// SECTION: Directory
// ============================================================================

/// Directory lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Backing directory failed.
    #[error("directory error: {0}")]
    Backend(String),
    /// Directory snapshot is inconsistent.
    #[error("directory invalid: {0}")]
    Invalid(String),
}

/// Read access to users, departments, and roles.
pub trait Directory {
    /// Looks up a user.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the lookup fails.
    fn user(&self, id: UserId) -> Result<Option<User>, DirectoryError>;

    /// Looks up a department.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the lookup fails.
    fn department(&self, id: DepartmentId) -> Result<Option<Department>, DirectoryError>;

    /// Looks up a role.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the lookup fails.
    fn role(&self, code: &RoleCode) -> Result<Option<Role>, DirectoryError>;

    /// Users holding a role, ordered by id; inactive users included.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the lookup fails.
    fn users_with_role(&self, code: &RoleCode) -> Result<Vec<User>, DirectoryError>;

    /// Users in a department, ordered by id; inactive users included.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the lookup fails.
    fn users_in_department(&self, id: DepartmentId) -> Result<Vec<User>, DirectoryError>;
}

// ============================================================================
// SECTION: Notification Sink
// ============================================================================

/// Notification dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Delivery failed.
    #[error("notification dispatch failed: {0}")]
    DispatchFailed(String),
}

/// Consumer of engine events; delivery mechanics live behind it.
pub trait NotificationSink {
    /// Delivers one event. Callers log failures and continue.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when delivery fails.
    fn dispatch(&self, event: &NotificationEvent) -> Result<(), DispatchError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current instant.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

// ============================================================================
// SECTION: Business Extension Points
// ============================================================================

/// Failure reported by business-module code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    /// Builds a callback error from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Post-decision hook owned by the business module of a content type.
///
/// Runs inside the terminal transition's transaction; an error rolls the
/// transition back. Implementations must not call back into the engine.
pub trait TerminalCallback: Send + Sync {
    /// Handles a terminal transition.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError`] to abort the transition.
    fn on_terminal(
        &self,
        instance: &ApprovalInstance,
        status: InstanceStatus,
    ) -> Result<(), CallbackError>;
}

impl<F> TerminalCallback for F
where
    F: Fn(&ApprovalInstance, InstanceStatus) -> Result<(), CallbackError> + Send + Sync,
{
    fn on_terminal(
        &self,
        instance: &ApprovalInstance,
        status: InstanceStatus,
    ) -> Result<(), CallbackError> {
        self(instance, status)
    }
}

/// Exposes a business record's fields to condition predicates.
pub trait ConditionAccessor: Send + Sync {
    /// Returns the record as a plain JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError`] when the record cannot be read.
    fn context(&self, target: &TargetRef) -> Result<Value, CallbackError>;
}

impl<F> ConditionAccessor for F
where
    F: Fn(&TargetRef) -> Result<Value, CallbackError> + Send + Sync,
{
    fn context(&self, target: &TargetRef) -> Result<Value, CallbackError> {
        self(target)
    }
}

/// Named approver resolver for `custom` approval nodes.
pub trait CustomResolver: Send + Sync {
    /// Produces candidate approvers for a node.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError`] when resolution fails.
    fn resolve(
        &self,
        instance: &ApprovalInstance,
        node: &ApprovalNode,
    ) -> Result<Vec<UserId>, CallbackError>;
}

impl<F> CustomResolver for F
where
    F: Fn(&ApprovalInstance, &ApprovalNode) -> Result<Vec<UserId>, CallbackError> + Send + Sync,
{
    fn resolve(
        &self,
        instance: &ApprovalInstance,
        node: &ApprovalNode,
    ) -> Result<Vec<UserId>, CallbackError> {
        self(instance, node)
    }
}

/// Strategy resolving an output-value responsible role to a user.
pub trait RoleResolver: Send + Sync {
    /// Returns the responsible user, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory lookup fails.
    fn resolve(
        &self,
        project: &ProjectView,
        role: &RoleCode,
        directory: &dyn Directory,
    ) -> Result<Option<UserId>, DirectoryError>;
}

impl<F> RoleResolver for F
where
    F: Fn(&ProjectView, &RoleCode, &dyn Directory) -> Result<Option<UserId>, DirectoryError>
        + Send
        + Sync,
{
    fn resolve(
        &self,
        project: &ProjectView,
        role: &RoleCode,
        directory: &dyn Directory,
    ) -> Result<Option<UserId>, DirectoryError> {
        self(project, role, directory)
    }
}
