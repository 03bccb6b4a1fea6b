// crates/ledgerflow-core/src/runtime/engine.rs
// ============================================================================
// Module: Ledgerflow Workflow Engine
// Description: Template lifecycle, instance advancement, and approver actions.
// Purpose: Drive approval instances from submission to a terminal status.
// Dependencies: crate::{core, interfaces, runtime}, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`WorkflowEngine`] is the single execution path for approval workflows.
//! Every operation runs in one store unit of work: the instance row is read
//! first, every record write and the terminal callback happen inside the same
//! transaction, and notifications are dispatched only after commit.
//!
//! Advancement walks nodes by sequence. Start nodes pass through, condition
//! nodes jump to a routed later node, approval nodes resolve approvers and
//! wait, and the end node approves the instance. A condition that matches no
//! branch leaves the instance flagged on that node for an administrator.
//!
//! Security posture: actors are identified by the caller; the engine checks
//! that an acting user owns a pending record and that privileged operations
//! hold the matching permission code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::core::ApprovalInstance;
use crate::core::ApprovalNode;
use crate::core::ApprovalRecord;
use crate::core::ContentTypeCode;
use crate::core::InstanceFlag;
use crate::core::InstanceId;
use crate::core::InstanceStatus;
use crate::core::NewInstance;
use crate::core::NewRecord;
use crate::core::NodeSpec;
use crate::core::NodeType;
use crate::core::NotificationEvent;
use crate::core::NotificationType;
use crate::core::PermissionCode;
use crate::core::RecordResult;
use crate::core::SpecError;
use crate::core::TargetRef;
use crate::core::TemplateCode;
use crate::core::TemplateSpec;
use crate::core::TemplateStatus;
use crate::core::TimeoutAction;
use crate::core::Timestamp;
use crate::core::UserId;
use crate::core::WorkflowTemplate;
use crate::core::permissions::INSTANCE_CANCEL;
use crate::core::permissions::INSTANCE_MANAGE;
use crate::core::permissions::TEMPLATE_MANAGE;
use crate::core::validate_nodes;
use crate::interfaces::Clock;
use crate::interfaces::ConditionAccessor;
use crate::interfaces::CustomResolver;
use crate::interfaces::Directory;
use crate::interfaces::DirectoryError;
use crate::interfaces::NotificationSink;
use crate::interfaces::StoreError;
use crate::interfaces::TerminalCallback;
use crate::interfaces::WorkflowStore;
use crate::interfaces::WorkflowTx;
use crate::runtime::guard::PermissionGuard;
use crate::runtime::guard::Principal;
use crate::runtime::modes::NodeVerdict;
use crate::runtime::modes::node_verdict;
use crate::runtime::registry::WorkflowRegistry;
use crate::runtime::resolver::ApproverResolver;
use crate::runtime::resolver::department_leader;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default transfer chain limit.
pub const DEFAULT_MAX_TRANSFER_HOPS: u32 = 5;
/// Default number of parent departments searched for a leader.
pub const DEFAULT_MANAGER_WALK_UP_HOPS: u32 = 3;
/// Default instance number prefix.
pub const DEFAULT_INSTANCE_NUMBER_PREFIX: &str = "AP";

/// Workflow engine limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Maximum transfers along one record chain.
    pub max_transfer_hops: u32,
    /// Maximum parent departments visited when resolving a manager.
    pub manager_walk_up_hops: u32,
    /// Prefix of generated instance numbers.
    pub instance_number_prefix: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_transfer_hops: DEFAULT_MAX_TRANSFER_HOPS,
            manager_walk_up_hops: DEFAULT_MANAGER_WALK_UP_HOPS,
            instance_number_prefix: DEFAULT_INSTANCE_NUMBER_PREFIX.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Action an actor takes on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Approve the actor's pending record.
    Approve {
        /// Decision comment.
        #[serde(default)]
        comment: String,
    },
    /// Reject the actor's pending record, terminating the instance.
    Reject {
        /// Decision comment.
        #[serde(default)]
        comment: String,
    },
    /// Hand the actor's pending record to another user.
    Transfer {
        /// Recipient.
        to: UserId,
        /// Transfer comment.
        #[serde(default)]
        comment: String,
    },
    /// Withdraw the instance; applicant only.
    Withdraw,
    /// Force-cancel the instance; requires the cancel permission.
    Cancel {
        /// Mandatory reason.
        reason: String,
    },
}

impl Action {
    /// Stable action label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Approve {
                ..
            } => "approve",
            Self::Reject {
                ..
            } => "reject",
            Self::Transfer {
                ..
            } => "transfer",
            Self::Withdraw => "withdraw",
            Self::Cancel {
                ..
            } => "cancel",
        }
    }
}

/// Cosmetic template fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDetails {
    /// Display name.
    pub name: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Category.
    pub category: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Workflow engine errors, named by condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// No template carries the code.
    #[error("template not found: {0}")]
    TemplateNotFound(TemplateCode),
    /// Template exists but is not active.
    #[error("template is not active: {0}")]
    TemplateInactive(TemplateCode),
    /// Active templates cannot be re-registered.
    #[error("template is active and cannot be replaced: {0}")]
    TemplateActive(TemplateCode),
    /// Structural edits are blocked while instances are open.
    #[error("template {code} has {open} open instances; publish a new code instead")]
    StructureLocked {
        /// Template code.
        code: TemplateCode,
        /// Open instance count.
        open: u64,
    },
    /// Template failed validation.
    #[error("invalid template: {0}")]
    InvalidTemplate(#[from] SpecError),
    /// Another open instance exists for the template and target.
    #[error("an open {template} instance already exists for {target}")]
    ConcurrentInstance {
        /// Template code.
        template: TemplateCode,
        /// Bound record.
        target: TargetRef,
    },
    /// A required approval node resolved no approvers.
    #[error("no approvers could be resolved for required node {sequence}")]
    ApproverNotResolvable {
        /// Node sequence.
        sequence: u32,
    },
    /// The actor's record or the instance is already decided.
    #[error("instance {0} no longer awaits this decision")]
    NodeAlreadyResolved(InstanceId),
    /// A condition node matched no branch; the instance is flagged.
    #[error("condition node {sequence} of instance {instance_id} matched no branch")]
    ConditionUnmatched {
        /// Flagged instance.
        instance_id: InstanceId,
        /// Condition node sequence.
        sequence: u32,
    },
    /// The transfer would exceed the chain limit.
    #[error("transfer chain limit of {max} reached")]
    TransferChainExceeded {
        /// Configured limit.
        max: u32,
    },
    /// Policy or state blocks withdrawal.
    #[error("withdrawal not allowed: {0}")]
    WithdrawalNotAllowed(String),
    /// Actor lacks the required grant or record.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Business code failed; the transition was rolled back.
    #[error("business callback failed for instance {instance_id}: {message}")]
    BusinessCallbackFailed {
        /// Affected instance.
        instance_id: InstanceId,
        /// Failure message.
        message: String,
    },
    /// A custom approver resolver failed; the transition was rolled back.
    #[error("custom resolver {tag} failed: {message}")]
    ResolverFailed {
        /// Resolver tag.
        tag: String,
        /// Failure message.
        message: String,
    },
    /// Instance id unknown.
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),
    /// User unknown or inactive.
    #[error("unknown or inactive user: {0}")]
    UnknownUser(UserId),
    /// Node or template policy forbids the action.
    #[error("action not allowed: {0}")]
    ActionNotAllowed(String),
    /// Request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Directory lookup failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

// ============================================================================
// SECTION: Internal State
// ============================================================================

/// Where advancement stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    /// Waiting on approvers.
    Waiting,
    /// Instance reached a terminal status.
    Terminal,
    /// Condition node matched no branch.
    Stuck {
        /// Condition node sequence.
        sequence: u32,
    },
}

/// Result of one unit of work.
struct Step<T> {
    /// Value returned to the caller.
    value: T,
    /// Instance the work touched.
    instance_id: InstanceId,
    /// Where advancement stopped.
    progress: Progress,
}

/// Transaction handle, clock reading, and pending notifications.
struct WorkUnit<'t> {
    /// Open transaction.
    tx: &'t mut dyn WorkflowTx,
    /// Time of the operation.
    now: Timestamp,
    /// Events dispatched after commit.
    events: Vec<NotificationEvent>,
}

/// A decision applied to a pending record.
struct Decision<'c> {
    /// Approve when true, reject otherwise.
    approve: bool,
    /// Decision comment.
    comment: &'c str,
    /// Made by the sweeper.
    system: bool,
}

/// A record handoff to another user.
struct Handoff<'c> {
    /// Recipient.
    to: UserId,
    /// Handoff comment.
    comment: &'c str,
    /// Made by the sweeper.
    system: bool,
}

/// What the sweeper did with one overdue record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeoutOutcome {
    /// Record was already handled.
    Skipped,
    /// Reminder emitted.
    Notified,
    /// System approval synthesized.
    AutoApproved,
    /// System rejection synthesized.
    AutoRejected,
    /// Record transferred to a leader.
    Escalated,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Approval workflow engine.
pub struct WorkflowEngine<S, D, N, C> {
    /// Workflow store.
    store: S,
    /// Org directory.
    directory: D,
    /// Notification sink.
    sink: N,
    /// Time source.
    clock: C,
    /// Business registrations.
    registry: WorkflowRegistry,
    /// Permission checks.
    guard: PermissionGuard,
    /// Engine limits.
    config: WorkflowConfig,
}

impl<S, D, N, C> WorkflowEngine<S, D, N, C>
where
    S: WorkflowStore,
    D: Directory,
    N: NotificationSink,
    C: Clock,
{
    /// Creates an engine with an empty registry and the built-in permission catalog.
    #[must_use]
    pub fn new(store: S, directory: D, sink: N, clock: C, config: WorkflowConfig) -> Self {
        Self {
            store,
            directory,
            sink,
            clock,
            registry: WorkflowRegistry::new(),
            guard: PermissionGuard::default(),
            config,
        }
    }

    /// Replaces the permission guard.
    #[must_use]
    pub fn with_guard(mut self, guard: PermissionGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Replaces the business registry.
    #[must_use]
    pub fn with_registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers a terminal callback for a content type and template code.
    pub fn register_callback(
        &mut self,
        content_type: impl Into<ContentTypeCode>,
        template_code: impl Into<TemplateCode>,
        callback: impl TerminalCallback + 'static,
    ) {
        self.registry.register_callback(content_type, template_code, callback);
    }

    /// Registers the condition accessor for a content type.
    pub fn register_condition_accessor(
        &mut self,
        content_type: impl Into<ContentTypeCode>,
        accessor: impl ConditionAccessor + 'static,
    ) {
        self.registry.register_condition_accessor(content_type, accessor);
    }

    /// Registers a custom approver resolver under a tag.
    pub fn register_custom_resolver(
        &mut self,
        tag: impl Into<String>,
        resolver: impl CustomResolver + 'static,
    ) {
        self.registry.register_custom_resolver(tag, resolver);
    }

    /// Returns the store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the directory.
    #[must_use]
    pub const fn directory(&self) -> &D {
        &self.directory
    }

    /// Returns the engine limits.
    #[must_use]
    pub const fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Returns the current time from the engine clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ------------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------------

    /// Persists a template as a draft, or replaces an existing draft or
    /// inactive template with the same code.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidTemplate`] on validation failure,
    /// [`WorkflowError::TemplateActive`] when the code is active, and
    /// [`WorkflowError::StructureLocked`] when an inactive template still has
    /// open instances.
    pub fn register_template(
        &self,
        principal: Principal,
        spec: &TemplateSpec,
    ) -> Result<WorkflowTemplate, WorkflowError> {
        self.authorize(principal, TEMPLATE_MANAGE)?;
        spec.validate()?;
        let now = self.clock.now();
        let template: Result<WorkflowTemplate, WorkflowError> =
            self.store.workflow_transaction(|tx| {
                let Some(existing) = tx.template_by_code(&spec.code)? else {
                    return Ok(tx.insert_template(spec, TemplateStatus::Draft, now)?);
                };
                if existing.is_active() {
                    return Err(WorkflowError::TemplateActive(spec.code.clone()));
                }
                let open = tx.count_open_instances(existing.id)?;
                if open > 0 {
                    return Err(WorkflowError::StructureLocked {
                        code: spec.code.clone(),
                        open,
                    });
                }
                let updated = WorkflowTemplate {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    category: spec.category.clone(),
                    policy: spec.policy,
                    default_timeout_hours: spec.default_timeout_hours,
                    timeout_action: spec.timeout_action,
                    applicable_content_types: spec.applicable_content_types.clone(),
                    form_filter: spec.form_filter.clone(),
                    sub_workflow_trigger: spec.sub_workflow_trigger.clone(),
                    updated_at: now,
                    ..existing
                };
                tx.update_template(&updated)?;
                let nodes = tx.replace_template_nodes(updated.id, &spec.nodes)?;
                Ok(WorkflowTemplate {
                    nodes,
                    ..updated
                })
            });
        let template = template?;
        info!(template = %template.code, status = %template.status, "template registered");
        Ok(template)
    }

    /// Makes a template consumable by new instances.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::TemplateNotFound`] or
    /// [`WorkflowError::InvalidTemplate`].
    pub fn activate_template(
        &self,
        principal: Principal,
        code: &TemplateCode,
    ) -> Result<WorkflowTemplate, WorkflowError> {
        self.set_template_status(principal, code, TemplateStatus::Active)
    }

    /// Retires a template; open instances continue.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::TemplateNotFound`].
    pub fn deactivate_template(
        &self,
        principal: Principal,
        code: &TemplateCode,
    ) -> Result<WorkflowTemplate, WorkflowError> {
        self.set_template_status(principal, code, TemplateStatus::Inactive)
    }

    /// Edits cosmetic template fields; allowed in every status.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::TemplateNotFound`] or
    /// [`WorkflowError::InvalidRequest`] for an empty name.
    pub fn update_template_details(
        &self,
        principal: Principal,
        code: &TemplateCode,
        details: &TemplateDetails,
    ) -> Result<WorkflowTemplate, WorkflowError> {
        self.authorize(principal, TEMPLATE_MANAGE)?;
        if details.name.as_ref().is_some_and(|name| name.trim().is_empty()) {
            return Err(WorkflowError::InvalidRequest("template name must not be empty".to_string()));
        }
        let now = self.clock.now();
        self.store.workflow_transaction(|tx| {
            let mut template = tx
                .template_by_code(code)?
                .ok_or_else(|| WorkflowError::TemplateNotFound(code.clone()))?;
            if let Some(name) = &details.name {
                template.name.clone_from(name);
            }
            if let Some(description) = &details.description {
                template.description.clone_from(description);
            }
            if let Some(category) = &details.category {
                template.category.clone_from(category);
            }
            template.updated_at = now;
            tx.update_template(&template)?;
            Ok(template)
        })
    }

    /// Replaces a template's node list.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::StructureLocked`] while any instance of the
    /// template is open, and [`WorkflowError::InvalidTemplate`] when the new
    /// nodes fail validation.
    pub fn replace_template_nodes(
        &self,
        principal: Principal,
        code: &TemplateCode,
        nodes: &[NodeSpec],
    ) -> Result<WorkflowTemplate, WorkflowError> {
        self.authorize(principal, TEMPLATE_MANAGE)?;
        validate_nodes(nodes)?;
        let now = self.clock.now();
        self.store.workflow_transaction(|tx| {
            let mut template = tx
                .template_by_code(code)?
                .ok_or_else(|| WorkflowError::TemplateNotFound(code.clone()))?;
            let open = tx.count_open_instances(template.id)?;
            if open > 0 {
                return Err(WorkflowError::StructureLocked {
                    code: code.clone(),
                    open,
                });
            }
            template.nodes = tx.replace_template_nodes(template.id, nodes)?;
            template.updated_at = now;
            tx.update_template(&template)?;
            Ok(template)
        })
    }

    /// Loads a template in any status.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::TemplateNotFound`].
    pub fn template(&self, code: &TemplateCode) -> Result<WorkflowTemplate, WorkflowError> {
        self.store.workflow_transaction(|tx| {
            tx.template_by_code(code)?.ok_or_else(|| WorkflowError::TemplateNotFound(code.clone()))
        })
    }

    /// Loads an active template.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::TemplateNotFound`] when the code is missing or
    /// not active.
    pub fn get_active_template(&self, code: &TemplateCode) -> Result<WorkflowTemplate, WorkflowError> {
        let template = self.template(code)?;
        if template.is_active() {
            Ok(template)
        } else {
            Err(WorkflowError::TemplateNotFound(code.clone()))
        }
    }

    /// Lists templates, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] when the read fails.
    pub fn list_templates(
        &self,
        status: Option<TemplateStatus>,
    ) -> Result<Vec<WorkflowTemplate>, WorkflowError> {
        self.store.workflow_transaction(|tx| Ok(tx.list_templates(status)?))
    }

    /// Active templates bound to a content type whose form filter holds.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] when the read fails.
    pub fn list_templates_for(
        &self,
        content_type: &ContentTypeCode,
        filter_context: &Value,
    ) -> Result<Vec<WorkflowTemplate>, WorkflowError> {
        let templates = self.list_templates(Some(TemplateStatus::Active))?;
        Ok(templates
            .into_iter()
            .filter(|template| template.is_applicable(content_type, filter_context))
            .collect())
    }

    /// Moves a template to `status`.
    fn set_template_status(
        &self,
        principal: Principal,
        code: &TemplateCode,
        status: TemplateStatus,
    ) -> Result<WorkflowTemplate, WorkflowError> {
        self.authorize(principal, TEMPLATE_MANAGE)?;
        let now = self.clock.now();
        let template: Result<WorkflowTemplate, WorkflowError> =
            self.store.workflow_transaction(|tx| {
                let mut template = tx
                    .template_by_code(code)?
                    .ok_or_else(|| WorkflowError::TemplateNotFound(code.clone()))?;
                if template.status == status {
                    return Ok(template);
                }
                if status == TemplateStatus::Active {
                    template.to_spec().validate()?;
                }
                template.status = status;
                template.updated_at = now;
                tx.update_template(&template)?;
                Ok(template)
            });
        let template = template?;
        info!(template = %template.code, status = %template.status, "template status changed");
        Ok(template)
    }

    // ------------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------------

    /// Starts an approval instance and advances it to its first wait point.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::TemplateInactive`],
    /// [`WorkflowError::ConcurrentInstance`],
    /// [`WorkflowError::ApproverNotResolvable`],
    /// [`WorkflowError::ResolverFailed`], or
    /// [`WorkflowError::ConditionUnmatched`] (the flagged instance is kept).
    pub fn start_instance(
        &self,
        template_code: &TemplateCode,
        target: TargetRef,
        applicant: UserId,
        apply_comment: &str,
    ) -> Result<ApprovalInstance, WorkflowError> {
        self.directory
            .user(applicant)?
            .filter(|user| user.active)
            .ok_or(WorkflowError::UnknownUser(applicant))?;
        let now = self.clock.now();
        let instance = self.execute(now, false, |unit| {
            let template = unit
                .tx
                .template_by_code(template_code)?
                .ok_or_else(|| WorkflowError::TemplateNotFound(template_code.clone()))?;
            if !template.is_active() {
                return Err(WorkflowError::TemplateInactive(template_code.clone()));
            }
            if !template.applicable_content_types.contains(&target.kind) {
                return Err(WorkflowError::InvalidRequest(format!(
                    "template {template_code} does not apply to {}",
                    target.kind
                )));
            }
            let concurrent = || WorkflowError::ConcurrentInstance {
                template: template_code.clone(),
                target: target.clone(),
            };
            if !unit.tx.open_instances_for(template_code, &target)?.is_empty() {
                return Err(concurrent());
            }
            let start = template
                .start_node()
                .ok_or_else(|| corrupt(format!("template {template_code} has no start node")))?;
            let instance_number =
                next_instance_number(unit.tx, &self.config.instance_number_prefix, unit.now)?;
            let mut instance = unit
                .tx
                .insert_instance(NewInstance {
                    instance_number,
                    template_id: template.id,
                    template_code: template.code.clone(),
                    target: target.clone(),
                    current_node: Some(start.id),
                    applicant,
                    apply_comment: apply_comment.to_string(),
                    now: unit.now,
                })
                .map_err(|err| match err {
                    StoreError::Conflict(_) => concurrent(),
                    other => WorkflowError::Store(other),
                })?;
            info!(
                instance_id = %instance.id,
                instance_number = %instance.instance_number,
                template = %template.code,
                target = %instance.target,
                "approval instance started"
            );
            let progress = self.advance_from(unit, &template, &mut instance, start, None)?;
            Ok(Step {
                instance_id: instance.id,
                value: instance,
                progress,
            })
        })?;
        Ok(instance)
    }

    /// Applies an actor's action to an instance.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NodeAlreadyResolved`] for late actions,
    /// [`WorkflowError::PermissionDenied`] when the actor has no part in the
    /// instance, and the policy errors of each action.
    pub fn act(
        &self,
        instance_id: InstanceId,
        actor: UserId,
        action: &Action,
    ) -> Result<ApprovalInstance, WorkflowError> {
        let now = self.clock.now();
        self.execute(now, true, |unit| {
            let mut instance = unit
                .tx
                .lock_instance(instance_id)?
                .ok_or(WorkflowError::InstanceNotFound(instance_id))?;
            let template = load_template_of(unit.tx, &instance)?;
            let progress = match action {
                Action::Withdraw => self.withdraw(unit, &template, &mut instance, actor)?,
                Action::Cancel {
                    reason,
                } => self.cancel(unit, &mut instance, actor, reason)?,
                Action::Approve {
                    comment,
                } => {
                    let record = actor_record(unit.tx, &instance, actor)?;
                    let decision = Decision {
                        approve: true,
                        comment,
                        system: false,
                    };
                    self.decide(unit, &template, &mut instance, record, &decision)?
                }
                Action::Reject {
                    comment,
                } => {
                    let record = actor_record(unit.tx, &instance, actor)?;
                    let node = node_of(&template, &record)?;
                    if !node.can_reject || !template.policy.allow_reject {
                        return Err(WorkflowError::ActionNotAllowed(format!(
                            "node {} does not allow rejection",
                            node.sequence
                        )));
                    }
                    let decision = Decision {
                        approve: false,
                        comment,
                        system: false,
                    };
                    self.decide(unit, &template, &mut instance, record, &decision)?
                }
                Action::Transfer {
                    to,
                    comment,
                } => {
                    let record = actor_record(unit.tx, &instance, actor)?;
                    let node = node_of(&template, &record)?;
                    if !node.can_transfer || !template.policy.allow_transfer {
                        return Err(WorkflowError::ActionNotAllowed(format!(
                            "node {} does not allow transfer",
                            node.sequence
                        )));
                    }
                    let handoff = Handoff {
                        to: *to,
                        comment,
                        system: false,
                    };
                    self.transfer(unit, &template, &mut instance, record, &handoff)?;
                    Progress::Waiting
                }
            };
            debug!(instance_id = %instance.id, actor = %actor, action = action.label(), "action applied");
            Ok(Step {
                instance_id: instance.id,
                value: instance,
                progress,
            })
        })
    }

    /// Open instances holding a pending record for the user.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] when the read fails.
    pub fn list_pending_for(&self, user: UserId) -> Result<Vec<ApprovalInstance>, WorkflowError> {
        self.store.workflow_transaction(|tx| Ok(tx.pending_instances_for(user)?))
    }

    /// Every instance bound to a business record, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] when the read fails.
    pub fn get_history(&self, target: &TargetRef) -> Result<Vec<ApprovalInstance>, WorkflowError> {
        self.store.workflow_transaction(|tx| Ok(tx.instances_for_target(target)?))
    }

    /// Loads an instance.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InstanceNotFound`].
    pub fn instance(&self, id: InstanceId) -> Result<ApprovalInstance, WorkflowError> {
        self.store.workflow_transaction(|tx| {
            tx.lock_instance(id)?.ok_or(WorkflowError::InstanceNotFound(id))
        })
    }

    /// Records of an instance ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] when the read fails.
    pub fn records(&self, id: InstanceId) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        self.store.workflow_transaction(|tx| Ok(tx.records_for_instance(id)?))
    }

    /// Re-evaluates a condition node that previously matched no branch.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::PermissionDenied`] without the manage grant,
    /// [`WorkflowError::ActionNotAllowed`] when the instance is not stuck on a
    /// condition, and [`WorkflowError::ConditionUnmatched`] when it still is.
    pub fn retry_advance(
        &self,
        principal: Principal,
        instance_id: InstanceId,
    ) -> Result<ApprovalInstance, WorkflowError> {
        self.authorize(principal, INSTANCE_MANAGE)?;
        let now = self.clock.now();
        self.execute(now, true, |unit| {
            let mut instance = unit
                .tx
                .lock_instance(instance_id)?
                .ok_or(WorkflowError::InstanceNotFound(instance_id))?;
            if !instance.status.is_open()
                || !matches!(instance.flag, Some(InstanceFlag::ConditionUnmatched { .. }))
            {
                return Err(WorkflowError::ActionNotAllowed(format!(
                    "instance {instance_id} is not waiting on a condition"
                )));
            }
            let template = load_template_of(unit.tx, &instance)?;
            let node = instance
                .current_node
                .and_then(|id| template.node(id))
                .ok_or_else(|| corrupt(format!("instance {instance_id} has no current node")))?;
            instance.flag = None;
            info!(instance_id = %instance.id, node = node.sequence, "retrying condition");
            let progress = self.advance_from(unit, &template, &mut instance, node, None)?;
            Ok(Step {
                instance_id: instance.id,
                value: instance,
                progress,
            })
        })
    }

    /// Clears an administrator flag without advancing.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::PermissionDenied`] without the manage grant.
    pub fn clear_flag(
        &self,
        principal: Principal,
        instance_id: InstanceId,
    ) -> Result<ApprovalInstance, WorkflowError> {
        self.authorize(principal, INSTANCE_MANAGE)?;
        let now = self.clock.now();
        self.store.workflow_transaction(|tx| {
            let mut instance =
                tx.lock_instance(instance_id)?.ok_or(WorkflowError::InstanceNotFound(instance_id))?;
            if instance.flag.take().is_some() {
                instance.updated_at = now;
                tx.update_instance(&instance)?;
            }
            Ok(instance)
        })
    }

    // ------------------------------------------------------------------------
    // Timeouts
    // ------------------------------------------------------------------------

    /// Pending records due at `now`, earliest first.
    pub(crate) fn overdue_records(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        self.store.workflow_transaction(|tx| Ok(tx.overdue_records(now, limit)?))
    }

    /// Applies the template's timeout action to one overdue record.
    pub(crate) fn apply_timeout(
        &self,
        candidate: &ApprovalRecord,
        now: Timestamp,
    ) -> Result<TimeoutOutcome, WorkflowError> {
        self.execute(now, true, |unit| {
            let mut instance = unit
                .tx
                .lock_instance(candidate.instance_id)?
                .ok_or(WorkflowError::InstanceNotFound(candidate.instance_id))?;
            let skipped = Step {
                value: TimeoutOutcome::Skipped,
                instance_id: instance.id,
                progress: Progress::Waiting,
            };
            let Some(mut record) = unit
                .tx
                .records_for_instance(instance.id)?
                .into_iter()
                .find(|record| record.id == candidate.id)
            else {
                return Ok(skipped);
            };
            if !record.is_pending() || record.last_reminder_at.is_some() {
                return Ok(skipped);
            }
            if instance.status.is_terminal() {
                record.last_reminder_at = Some(unit.now);
                unit.tx.update_record(&record)?;
                return Ok(skipped);
            }
            let template = load_template_of(unit.tx, &instance)?;
            warn!(
                instance_id = %instance.id,
                record_id = %record.id,
                action = %template.timeout_action,
                "approval record timed out"
            );
            let (value, progress) = match template.timeout_action {
                TimeoutAction::Notify => {
                    self.remind(unit, &instance, record)?;
                    (TimeoutOutcome::Notified, Progress::Waiting)
                }
                TimeoutAction::AutoApprove => {
                    let decision = Decision {
                        approve: true,
                        comment: "approved automatically after timeout",
                        system: true,
                    };
                    let progress = self.decide(unit, &template, &mut instance, record, &decision)?;
                    (TimeoutOutcome::AutoApproved, progress)
                }
                TimeoutAction::AutoReject => {
                    let decision = Decision {
                        approve: false,
                        comment: "rejected automatically after timeout",
                        system: true,
                    };
                    let progress = self.decide(unit, &template, &mut instance, record, &decision)?;
                    (TimeoutOutcome::AutoRejected, progress)
                }
                TimeoutAction::Escalate => match self.escalation_target(&record)? {
                    Some(leader) => {
                        let approver = record.approver;
                        let handoff = Handoff {
                            to: leader,
                            comment: "escalated after timeout",
                            system: true,
                        };
                        self.transfer(unit, &template, &mut instance, record, &handoff)?;
                        unit.events.push(NotificationEvent::for_instance(
                            NotificationType::Timeout,
                            instance.id,
                            approver.into_iter().chain([leader]).collect(),
                            instance.target.clone(),
                            unit.now,
                            json!({"action": "escalate", "instance_number": instance.instance_number}),
                        ));
                        (TimeoutOutcome::Escalated, Progress::Waiting)
                    }
                    None => {
                        self.remind(unit, &instance, record)?;
                        (TimeoutOutcome::Notified, Progress::Waiting)
                    }
                },
            };
            Ok(Step {
                value,
                instance_id: instance.id,
                progress,
            })
        })
    }

    /// Leader above the record's approver, when the chain allows another hop.
    fn escalation_target(&self, record: &ApprovalRecord) -> Result<Option<UserId>, WorkflowError> {
        if record.transfer_hops + 1 > self.config.max_transfer_hops {
            return Ok(None);
        }
        let Some(approver) = record.approver else {
            return Ok(None);
        };
        let Some(user) = self.directory.user(approver)? else {
            return Ok(None);
        };
        Ok(department_leader(
            &self.directory,
            &user,
            self.config.manager_walk_up_hops,
            Some(approver),
        )?)
    }

    /// Marks a record reminded and emits a timeout event.
    fn remind(
        &self,
        unit: &mut WorkUnit<'_>,
        instance: &ApprovalInstance,
        mut record: ApprovalRecord,
    ) -> Result<(), WorkflowError> {
        record.last_reminder_at = Some(unit.now);
        unit.tx.update_record(&record)?;
        unit.events.push(NotificationEvent::for_instance(
            NotificationType::Timeout,
            instance.id,
            record.approver.into_iter().collect(),
            instance.target.clone(),
            unit.now,
            json!({"action": "notify", "record_id": record.id, "instance_number": instance.instance_number}),
        ));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Unit-of-work plumbing
    // ------------------------------------------------------------------------

    /// Runs one unit of work, dispatches its events after commit, and flags
    /// the instance when a business callback aborted the transition.
    fn execute<T, F>(&self, now: Timestamp, flag_on_failure: bool, work: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut WorkUnit<'_>) -> Result<Step<T>, WorkflowError>,
    {
        let result: Result<(Step<T>, Vec<NotificationEvent>), WorkflowError> =
            self.store.workflow_transaction(|tx| {
                let mut unit = WorkUnit {
                    tx,
                    now,
                    events: Vec::new(),
                };
                let step = work(&mut unit)?;
                Ok((step, unit.events))
            });
        match result {
            Ok((step, events)) => {
                self.dispatch_all(&events);
                if let Progress::Stuck {
                    sequence,
                } = step.progress
                {
                    return Err(WorkflowError::ConditionUnmatched {
                        instance_id: step.instance_id,
                        sequence,
                    });
                }
                Ok(step.value)
            }
            Err(WorkflowError::BusinessCallbackFailed {
                instance_id,
                message,
            }) => {
                if flag_on_failure {
                    self.flag_callback_failure(instance_id, &message, now);
                }
                Err(WorkflowError::BusinessCallbackFailed {
                    instance_id,
                    message,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Records a callback failure on the instance in its own transaction.
    fn flag_callback_failure(&self, instance_id: InstanceId, message: &str, now: Timestamp) {
        let flagged: Result<bool, WorkflowError> = self.store.workflow_transaction(|tx| {
            let Some(mut instance) = tx.lock_instance(instance_id)? else {
                return Ok(false);
            };
            instance.flag = Some(InstanceFlag::CallbackFailed {
                message: message.to_string(),
            });
            instance.updated_at = now;
            tx.update_instance(&instance)?;
            Ok(true)
        });
        match flagged {
            Ok(true) => warn!(instance_id = %instance_id, error = message, "instance flagged after callback failure"),
            Ok(false) => {}
            Err(err) => warn!(instance_id = %instance_id, error = %err, "failed to flag instance"),
        }
    }

    /// Delivers events; failures are logged and never fail the operation.
    fn dispatch_all(&self, events: &[NotificationEvent]) {
        for event in events {
            if let Err(err) = self.sink.dispatch(event) {
                warn!(event = %event.event_type, error = %err, "notification dispatch failed");
            }
        }
    }

    /// Checks a principal's grant.
    fn authorize(&self, principal: Principal, code: &str) -> Result<(), WorkflowError> {
        let code = PermissionCode::new(code);
        if self.guard.authorizes(&self.directory, principal, &code)? {
            Ok(())
        } else {
            Err(WorkflowError::PermissionDenied(format!("{code} is required")))
        }
    }

    // ------------------------------------------------------------------------
    // Advancement
    // ------------------------------------------------------------------------

    /// Walks nodes from `from` until the instance waits, terminates, or sticks.
    fn advance_from(
        &self,
        unit: &mut WorkUnit<'_>,
        template: &WorkflowTemplate,
        instance: &mut ApprovalInstance,
        from: &ApprovalNode,
        final_comment: Option<&str>,
    ) -> Result<Progress, WorkflowError> {
        let mut node = from;
        for _ in 0..=template.nodes.len() {
            instance.current_node = Some(node.id);
            match node.node_type {
                NodeType::Start => node = successor(template, node)?,
                NodeType::End => {
                    return self.finish(
                        unit,
                        instance,
                        InstanceStatus::Approved,
                        final_comment.map(str::to_string),
                    );
                }
                NodeType::Condition => {
                    let routing = node.condition.as_ref().ok_or_else(|| {
                        corrupt(format!("condition node {} has no routing", node.sequence))
                    })?;
                    let context = self.condition_context(instance)?;
                    if let Some(decision) = routing.route(&context) {
                        debug!(
                            instance_id = %instance.id,
                            node = node.sequence,
                            branch = %decision.branch,
                            next = decision.sequence,
                            "condition routed"
                        );
                        node = template
                            .node_at(decision.sequence)
                            .filter(|next| next.sequence > node.sequence)
                            .ok_or_else(|| {
                                corrupt(format!(
                                    "condition node {} routes to missing node {}",
                                    node.sequence, decision.sequence
                                ))
                            })?;
                    } else {
                        instance.flag = Some(InstanceFlag::ConditionUnmatched {
                            node_sequence: node.sequence,
                        });
                        instance.updated_at = unit.now;
                        unit.tx.update_instance(instance)?;
                        warn!(instance_id = %instance.id, node = node.sequence, "condition matched no branch; instance flagged");
                        return Ok(Progress::Stuck {
                            sequence: node.sequence,
                        });
                    }
                }
                NodeType::Parallel => {
                    return Err(WorkflowError::InvalidTemplate(SpecError::UnsupportedNodeType {
                        sequence: node.sequence,
                        node_type: NodeType::Parallel,
                    }));
                }
                NodeType::Approval => {
                    let resolver = ApproverResolver::new(
                        &self.directory,
                        &self.registry,
                        self.config.manager_walk_up_hops,
                    );
                    let approvers = resolver.resolve(instance, node)?;
                    if approvers.is_empty() {
                        if node.is_required {
                            return Err(WorkflowError::ApproverNotResolvable {
                                sequence: node.sequence,
                            });
                        }
                        let at = decision_time(unit.tx, instance.id, unit.now)?;
                        unit.tx.insert_record(NewRecord::system_approval(
                            instance.id,
                            node.id,
                            "skipped: no approvers resolved",
                            at,
                        ))?;
                        info!(instance_id = %instance.id, node = node.sequence, "optional node auto-skipped");
                        node = successor(template, node)?;
                        continue;
                    }
                    let due_at = template.effective_timeout_hours(node).map(|hours| unit.now.plus_hours(hours));
                    for approver in &approvers {
                        unit.tx.insert_record(NewRecord::pending(
                            instance.id,
                            node.id,
                            *approver,
                            unit.now,
                            due_at,
                        ))?;
                    }
                    instance.updated_at = unit.now;
                    unit.tx.update_instance(instance)?;
                    unit.events.push(NotificationEvent::for_instance(
                        NotificationType::ActionRequired,
                        instance.id,
                        approvers,
                        instance.target.clone(),
                        unit.now,
                        json!({
                            "instance_number": instance.instance_number,
                            "template": instance.template_code,
                            "node": node.name,
                            "sequence": node.sequence,
                        }),
                    ));
                    return Ok(Progress::Waiting);
                }
            }
        }
        Err(corrupt(format!("template {} does not reach an end node", template.code)))
    }

    /// Applies an approve or reject decision to a pending record.
    fn decide(
        &self,
        unit: &mut WorkUnit<'_>,
        template: &WorkflowTemplate,
        instance: &mut ApprovalInstance,
        mut record: ApprovalRecord,
        decision: &Decision<'_>,
    ) -> Result<Progress, WorkflowError> {
        record.result =
            if decision.approve { RecordResult::Approved } else { RecordResult::Rejected };
        decision.comment.clone_into(&mut record.comment);
        record.approval_time = Some(decision_time(unit.tx, instance.id, unit.now)?);
        record.system_decided = decision.system;
        if decision.system {
            record.last_reminder_at = Some(unit.now);
        }
        unit.tx.update_record(&record)?;

        let node = node_of(template, &record)?;
        let results: Vec<RecordResult> = unit
            .tx
            .records_for_instance(instance.id)?
            .iter()
            .filter(|candidate| candidate.node_id == node.id)
            .map(|candidate| candidate.result)
            .collect();
        match node_verdict(node.approval_mode, &results) {
            NodeVerdict::Waiting => {
                instance.updated_at = unit.now;
                unit.tx.update_instance(instance)?;
                Ok(Progress::Waiting)
            }
            NodeVerdict::Rejected => self.finish(
                unit,
                instance,
                InstanceStatus::Rejected,
                Some(decision.comment.to_string()),
            ),
            NodeVerdict::Approved => {
                void_pending(unit, instance.id)?;
                debug!(instance_id = %instance.id, node = node.sequence, "approval node satisfied");
                let next = successor(template, node)?;
                self.advance_from(unit, template, instance, next, Some(decision.comment))
            }
        }
    }

    /// Hands a pending record to another user on the same node.
    fn transfer(
        &self,
        unit: &mut WorkUnit<'_>,
        template: &WorkflowTemplate,
        instance: &mut ApprovalInstance,
        mut record: ApprovalRecord,
        handoff: &Handoff<'_>,
    ) -> Result<(), WorkflowError> {
        let hops = record.transfer_hops + 1;
        if hops > self.config.max_transfer_hops {
            return Err(WorkflowError::TransferChainExceeded {
                max: self.config.max_transfer_hops,
            });
        }
        if record.approver == Some(handoff.to) {
            return Err(WorkflowError::InvalidRequest("cannot transfer to oneself".to_string()));
        }
        if !self.directory.user(handoff.to)?.is_some_and(|user| user.active) {
            return Err(WorkflowError::UnknownUser(handoff.to));
        }
        let already_pending = unit.tx.records_for_instance(instance.id)?.iter().any(|candidate| {
            candidate.node_id == record.node_id
                && candidate.approver == Some(handoff.to)
                && candidate.is_pending()
        });
        if already_pending {
            return Err(WorkflowError::InvalidRequest(format!(
                "user {} already has a pending record on this node",
                handoff.to
            )));
        }

        record.result = RecordResult::Transferred;
        record.transferred_to = Some(handoff.to);
        handoff.comment.clone_into(&mut record.comment);
        record.approval_time = Some(decision_time(unit.tx, instance.id, unit.now)?);
        record.system_decided = handoff.system;
        if handoff.system {
            record.last_reminder_at = Some(unit.now);
        }
        unit.tx.update_record(&record)?;

        let node = node_of(template, &record)?;
        let due_at = template.effective_timeout_hours(node).map(|hours| unit.now.plus_hours(hours));
        let successor = unit.tx.insert_record(NewRecord {
            transferred_from: Some(record.id),
            transfer_hops: hops,
            ..NewRecord::pending(instance.id, node.id, handoff.to, unit.now, due_at)
        })?;
        instance.updated_at = unit.now;
        unit.tx.update_instance(instance)?;
        info!(
            instance_id = %instance.id,
            from_record = %record.id,
            to_record = %successor.id,
            to = %handoff.to,
            hops,
            "approval record transferred"
        );
        unit.events.push(NotificationEvent::for_instance(
            NotificationType::ActionRequired,
            instance.id,
            vec![handoff.to],
            instance.target.clone(),
            unit.now,
            json!({
                "instance_number": instance.instance_number,
                "template": instance.template_code,
                "node": node.name,
                "sequence": node.sequence,
                "transferred_from": record.approver,
            }),
        ));
        Ok(())
    }

    /// Applicant withdrawal.
    fn withdraw(
        &self,
        unit: &mut WorkUnit<'_>,
        template: &WorkflowTemplate,
        instance: &mut ApprovalInstance,
        actor: UserId,
    ) -> Result<Progress, WorkflowError> {
        if actor != instance.applicant {
            return Err(WorkflowError::PermissionDenied(
                "only the applicant may withdraw".to_string(),
            ));
        }
        if instance.status != InstanceStatus::Pending {
            return Err(WorkflowError::WithdrawalNotAllowed(format!(
                "instance is {}",
                instance.status
            )));
        }
        if !template.policy.allow_withdraw {
            return Err(WorkflowError::WithdrawalNotAllowed(
                "template does not allow withdrawal".to_string(),
            ));
        }
        if unit.tx.records_for_instance(instance.id)?.iter().any(ApprovalRecord::is_human_approval) {
            return Err(WorkflowError::WithdrawalNotAllowed(
                "an approver has already approved".to_string(),
            ));
        }
        self.finish(unit, instance, InstanceStatus::Withdrawn, None)
    }

    /// Supervisor cancellation.
    fn cancel(
        &self,
        unit: &mut WorkUnit<'_>,
        instance: &mut ApprovalInstance,
        actor: UserId,
        reason: &str,
    ) -> Result<Progress, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::InvalidRequest("a cancellation reason is required".to_string()));
        }
        self.authorize(Principal::User(actor), INSTANCE_CANCEL)?;
        if instance.status.is_terminal() {
            return Err(WorkflowError::ActionNotAllowed(format!("instance is {}", instance.status)));
        }
        self.finish(unit, instance, InstanceStatus::Cancelled, Some(reason.to_string()))
    }

    /// Terminal transition: voids pending records, runs the business
    /// callback, and queues the completion event.
    fn finish(
        &self,
        unit: &mut WorkUnit<'_>,
        instance: &mut ApprovalInstance,
        status: InstanceStatus,
        final_comment: Option<String>,
    ) -> Result<Progress, WorkflowError> {
        void_pending(unit, instance.id)?;
        instance.status = status;
        instance.completed_time = Some(unit.now);
        instance.final_comment = final_comment;
        instance.flag = None;
        instance.updated_at = unit.now;
        unit.tx.update_instance(instance)?;
        if let Some(callback) = self.registry.callback(&instance.target.kind, &instance.template_code) {
            callback.on_terminal(instance, status).map_err(|err| {
                WorkflowError::BusinessCallbackFailed {
                    instance_id: instance.id,
                    message: err.to_string(),
                }
            })?;
        }
        info!(
            instance_id = %instance.id,
            template = %instance.template_code,
            target = %instance.target,
            status = %status,
            "approval instance completed"
        );
        unit.events.push(NotificationEvent::for_instance(
            NotificationType::Completed,
            instance.id,
            vec![instance.applicant],
            instance.target.clone(),
            unit.now,
            json!({
                "instance_number": instance.instance_number,
                "template": instance.template_code,
                "status": status,
            }),
        ));
        Ok(Progress::Terminal)
    }

    /// Context walked by condition predicates.
    fn condition_context(&self, instance: &ApprovalInstance) -> Result<Value, WorkflowError> {
        let target = match self.registry.accessor(&instance.target.kind) {
            Some(accessor) => accessor.context(&instance.target).map_err(|err| {
                WorkflowError::BusinessCallbackFailed {
                    instance_id: instance.id,
                    message: err.to_string(),
                }
            })?,
            None => Value::Null,
        };
        let applicant = self.directory.user(instance.applicant)?.map_or(Value::Null, |user| {
            json!({
                "id": user.id,
                "name": user.name,
                "department": user.department,
                "roles": user.roles,
            })
        });
        Ok(json!({
            "target": target,
            "applicant": applicant,
            "instance": {
                "id": instance.id,
                "instance_number": instance.instance_number,
                "template_code": instance.template_code,
                "apply_comment": instance.apply_comment,
                "target_kind": instance.target.kind,
                "target_id": instance.target.id,
            },
        }))
    }
}

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Builds a store corruption error.
fn corrupt(message: String) -> WorkflowError {
    WorkflowError::Store(StoreError::Corrupt(message))
}

/// Loads the template an instance runs on.
fn load_template_of(
    tx: &mut dyn WorkflowTx,
    instance: &ApprovalInstance,
) -> Result<WorkflowTemplate, WorkflowError> {
    tx.template_by_id(instance.template_id)?.ok_or_else(|| {
        corrupt(format!("instance {} references missing template {}", instance.id, instance.template_id))
    })
}

/// Node a record belongs to.
fn node_of<'t>(
    template: &'t WorkflowTemplate,
    record: &ApprovalRecord,
) -> Result<&'t ApprovalNode, WorkflowError> {
    template
        .node(record.node_id)
        .ok_or_else(|| corrupt(format!("record {} references missing node {}", record.id, record.node_id)))
}

/// Node following `node` by sequence.
fn successor<'t>(
    template: &'t WorkflowTemplate,
    node: &ApprovalNode,
) -> Result<&'t ApprovalNode, WorkflowError> {
    template
        .next_after(node.sequence)
        .ok_or_else(|| corrupt(format!("node {} has no successor", node.sequence)))
}

/// The actor's pending record on the instance.
fn actor_record(
    tx: &mut dyn WorkflowTx,
    instance: &ApprovalInstance,
    actor: UserId,
) -> Result<ApprovalRecord, WorkflowError> {
    if instance.status.is_terminal() {
        return Err(WorkflowError::NodeAlreadyResolved(instance.id));
    }
    let records = tx.records_for_instance(instance.id)?;
    if let Some(record) = records.iter().find(|record| {
        record.approver == Some(actor)
            && record.is_pending()
            && Some(record.node_id) == instance.current_node
    }) {
        return Ok(record.clone());
    }
    if records.iter().any(|record| record.approver == Some(actor)) {
        Err(WorkflowError::NodeAlreadyResolved(instance.id))
    } else {
        Err(WorkflowError::PermissionDenied(format!(
            "user {actor} has no pending record on instance {}",
            instance.id
        )))
    }
}

/// Marks every pending record of the instance withdrawn.
fn void_pending(unit: &mut WorkUnit<'_>, instance_id: InstanceId) -> Result<(), WorkflowError> {
    for mut record in unit.tx.records_for_instance(instance_id)? {
        if record.is_pending() {
            record.result = RecordResult::Withdrawn;
            unit.tx.update_record(&record)?;
        }
    }
    Ok(())
}

/// Decision time strictly after every earlier decision on the instance.
fn decision_time(
    tx: &mut dyn WorkflowTx,
    instance_id: InstanceId,
    now: Timestamp,
) -> Result<Timestamp, WorkflowError> {
    let latest = tx.records_for_instance(instance_id)?.iter().filter_map(|record| record.approval_time).max();
    Ok(latest.map_or(now, |previous| now.strictly_after(previous)))
}

/// Allocates `<prefix><yyyymmddhhmmss><seq:04>`.
fn next_instance_number(
    tx: &mut dyn WorkflowTx,
    prefix: &str,
    now: Timestamp,
) -> Result<String, StoreError> {
    let stem = format!("{prefix}{}", now.compact_stamp());
    let sequence = tx.count_instances_with_prefix(&stem)? + 1;
    Ok(format!("{stem}{sequence:04}"))
}
