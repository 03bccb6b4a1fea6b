// crates/ledgerflow-core/src/core/template.rs
// ============================================================================
// Module: Ledgerflow Workflow Templates
// Description: Workflow template and approval node definitions.
// Purpose: Describe authored approval flows and validate their structure.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A [`WorkflowTemplate`] is an ordered list of [`ApprovalNode`]s with policy
//! flags and timeout defaults. Authors submit a [`TemplateSpec`]; storage
//! assigns row ids and timestamps. [`TemplateSpec::validate`] enforces the
//! structural rules the engine relies on:
//!
//! - exactly one `start` node carrying the minimum sequence,
//! - at least one `end` node and an `end` node last,
//! - strictly increasing sequences,
//! - approval nodes with a usable approver binding,
//! - condition routes that jump forward to existing nodes.
//!
//! Parallel nodes are not executed by this engine and fail validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::condition::ConditionError;
use crate::core::condition::ConditionRouting;
use crate::core::condition::Predicate;
use crate::core::identifiers::ContentTypeCode;
use crate::core::identifiers::DepartmentId;
use crate::core::identifiers::IdentifierError;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RoleCode;
use crate::core::identifiers::TemplateCode;
use crate::core::identifiers::TemplateId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Declares a snake-case label enum with `as_str` and `from_label`.
macro_rules! label_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Returns the stable storage label.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Parses a storage label.
            #[must_use]
            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use label_enum;

label_enum!(
    /// Template lifecycle status.
    TemplateStatus {
        /// Authored, not yet consumable.
        Draft => "draft",
        /// Consumable by new instances.
        Active => "active",
        /// Retired; existing instances continue.
        Inactive => "inactive",
    }
);

label_enum!(
    /// Action the sweeper takes on an overdue pending record.
    TimeoutAction {
        /// Synthesize a system approval.
        AutoApprove => "auto_approve",
        /// Synthesize a system rejection.
        AutoReject => "auto_reject",
        /// Emit a reminder event.
        Notify => "notify",
        /// Transfer to the approver's department leader.
        Escalate => "escalate",
    }
);

label_enum!(
    /// Node kind.
    NodeType {
        /// Entry node.
        Start => "start",
        /// Human approval step.
        Approval => "approval",
        /// Branch on a predicate.
        Condition => "condition",
        /// Parallel fork; rejected by validation.
        Parallel => "parallel",
        /// Terminal node.
        End => "end",
    }
);

label_enum!(
    /// Approver resolution strategy for an approval node.
    ApproverType {
        /// Explicit users.
        User => "user",
        /// Active users holding any bound role.
        Role => "role",
        /// Active users in any bound department.
        Department => "department",
        /// Leader of the applicant's department.
        DepartmentManager => "department_manager",
        /// The applicant.
        Creator => "creator",
        /// Leader of the applicant's department.
        CreatorManager => "creator_manager",
        /// Registered named resolver.
        Custom => "custom",
    }
);

label_enum!(
    /// How approver results combine into a node decision.
    ApprovalMode {
        /// One approval completes the node.
        Single => "single",
        /// One approval completes the node.
        Any => "any",
        /// Every approver must approve.
        All => "all",
        /// Strictly more than half must approve.
        Majority => "majority",
    }
);

/// Serde default for template timeout actions.
const fn default_timeout_action() -> TimeoutAction {
    TimeoutAction::Notify
}

/// Serde default for approval modes.
const fn default_approval_mode() -> ApprovalMode {
    ApprovalMode::Single
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Template and catalog authoring errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// Identifier failed validation.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    /// Template declares no nodes.
    #[error("template declares no nodes")]
    NoNodes,
    /// Template does not have exactly one start node.
    #[error("template must have exactly one start node, found {0}")]
    StartCount(usize),
    /// Start node is not the first node.
    #[error("start node must carry the minimum sequence")]
    StartNotFirst,
    /// Template has no end node.
    #[error("template must have at least one end node")]
    MissingEnd,
    /// Last node is not an end node.
    #[error("node {0} has no reachable successor")]
    NoSuccessor(u32),
    /// Sequence values are not strictly increasing.
    #[error("node sequence {current} does not follow {previous}")]
    SequenceOrder {
        /// Preceding sequence.
        previous: u32,
        /// Offending sequence.
        current: u32,
    },
    /// Node type is not supported by the engine.
    #[error("node {sequence} uses unsupported type {node_type}")]
    UnsupportedNodeType {
        /// Node sequence.
        sequence: u32,
        /// Node type.
        node_type: NodeType,
    },
    /// Approval node lacks a usable binding.
    #[error("approval node {0} has no approver binding")]
    MissingApprovers(u32),
    /// Condition node lacks routing.
    #[error("condition node {0} has no condition expression")]
    MissingCondition(u32),
    /// Condition expression failed to parse.
    #[error("condition node {sequence}: {source}")]
    Condition {
        /// Node sequence.
        sequence: u32,
        /// Parse failure.
        #[source]
        source: ConditionError,
    },
    /// Condition route points at a missing or earlier node.
    #[error("condition node {sequence} routes to {target}, which is not a later node")]
    InvalidRoute {
        /// Condition node sequence.
        sequence: u32,
        /// Route target sequence.
        target: u32,
    },
    /// Template lists no applicable content types.
    #[error("template lists no applicable content types")]
    NoContentTypes,
    /// Free-text field was empty.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    /// Catalog or template value out of range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// Authoring document could not be decoded.
    #[error("invalid document: {0}")]
    Decode(String),
    /// Duplicate code within a catalog.
    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

// ============================================================================
// SECTION: Approver Binding
// ============================================================================

/// Approver binding for an approval node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverBinding {
    /// Resolution strategy.
    pub approver_type: ApproverType,
    /// Explicit users for [`ApproverType::User`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserId>,
    /// Role codes for [`ApproverType::Role`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleCode>,
    /// Departments for [`ApproverType::Department`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub departments: Vec<DepartmentId>,
    /// Resolver tag for [`ApproverType::Custom`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_tag: Option<String>,
}

impl ApproverBinding {
    /// Binding to explicit users.
    #[must_use]
    pub fn users(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            users: users.into_iter().collect(),
            ..Self::of(ApproverType::User)
        }
    }

    /// Binding to role holders.
    #[must_use]
    pub fn roles(roles: impl IntoIterator<Item = RoleCode>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            ..Self::of(ApproverType::Role)
        }
    }

    /// Binding to department members.
    #[must_use]
    pub fn departments(departments: impl IntoIterator<Item = DepartmentId>) -> Self {
        Self {
            departments: departments.into_iter().collect(),
            ..Self::of(ApproverType::Department)
        }
    }

    /// Binding to a custom resolver.
    #[must_use]
    pub fn custom(tag: impl Into<String>) -> Self {
        Self {
            custom_tag: Some(tag.into()),
            ..Self::of(ApproverType::Custom)
        }
    }

    /// Binding with no explicit values.
    #[must_use]
    pub const fn of(approver_type: ApproverType) -> Self {
        Self {
            approver_type,
            users: Vec::new(),
            roles: Vec::new(),
            departments: Vec::new(),
            custom_tag: None,
        }
    }

    /// Returns true when the binding carries what its strategy needs.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        match self.approver_type {
            ApproverType::User => !self.users.is_empty(),
            ApproverType::Role => !self.roles.is_empty(),
            ApproverType::Department => !self.departments.is_empty(),
            ApproverType::Custom => self.custom_tag.as_deref().is_some_and(|tag| !tag.is_empty()),
            ApproverType::DepartmentManager
            | ApproverType::Creator
            | ApproverType::CreatorManager => true,
        }
    }
}

// ============================================================================
// SECTION: Authoring Specs
// ============================================================================

/// Template policy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePolicy {
    /// Applicant may withdraw before any approval.
    #[serde(default = "default_true")]
    pub allow_withdraw: bool,
    /// Approvers may reject.
    #[serde(default = "default_true")]
    pub allow_reject: bool,
    /// Approvers may transfer.
    #[serde(default = "default_true")]
    pub allow_transfer: bool,
}

impl Default for TemplatePolicy {
    fn default() -> Self {
        Self {
            allow_withdraw: true,
            allow_reject: true,
            allow_transfer: true,
        }
    }
}

/// Authored node definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Sequence within the template.
    pub sequence: u32,
    /// Display name.
    pub name: String,
    /// Node kind.
    pub node_type: NodeType,
    /// Approver binding for approval nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approvers: Option<ApproverBinding>,
    /// Approval mode for approval nodes.
    #[serde(default = "default_approval_mode")]
    pub approval_mode: ApprovalMode,
    /// Routing for condition nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionRouting>,
    /// Whether an empty approver set blocks the flow.
    #[serde(default = "default_true")]
    pub is_required: bool,
    /// Whether approvers on this node may reject.
    #[serde(default = "default_true")]
    pub can_reject: bool,
    /// Whether approvers on this node may transfer.
    #[serde(default = "default_true")]
    pub can_transfer: bool,
    /// Per-node timeout override in hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_hours: Option<u32>,
}

impl NodeSpec {
    /// Node spec with defaults for the given type.
    #[must_use]
    pub fn new(sequence: u32, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            sequence,
            name: name.into(),
            node_type,
            approvers: None,
            approval_mode: ApprovalMode::Single,
            condition: None,
            is_required: true,
            can_reject: true,
            can_transfer: true,
            timeout_hours: None,
        }
    }

    /// Start node.
    #[must_use]
    pub fn start(sequence: u32) -> Self {
        Self::new(sequence, "start", NodeType::Start)
    }

    /// End node.
    #[must_use]
    pub fn end(sequence: u32) -> Self {
        Self::new(sequence, "end", NodeType::End)
    }

    /// Approval node.
    #[must_use]
    pub fn approval(
        sequence: u32,
        name: impl Into<String>,
        approvers: ApproverBinding,
        mode: ApprovalMode,
    ) -> Self {
        Self {
            approvers: Some(approvers),
            approval_mode: mode,
            ..Self::new(sequence, name, NodeType::Approval)
        }
    }

    /// Condition node.
    #[must_use]
    pub fn condition(sequence: u32, name: impl Into<String>, routing: ConditionRouting) -> Self {
        Self {
            condition: Some(routing),
            ..Self::new(sequence, name, NodeType::Condition)
        }
    }
}

/// Authored template definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Unique template code.
    pub code: TemplateCode,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Grouping category.
    #[serde(default)]
    pub category: String,
    /// Policy flags.
    #[serde(default)]
    pub policy: TemplatePolicy,
    /// Default timeout in hours for approval nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_hours: Option<u32>,
    /// Action taken when a pending record times out.
    #[serde(default = "default_timeout_action")]
    pub timeout_action: TimeoutAction,
    /// Content types this template can bind to.
    pub applicable_content_types: Vec<ContentTypeCode>,
    /// Predicate over a caller-supplied form context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_filter: Option<Predicate>,
    /// Predicate deciding whether a sub-workflow applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_workflow_trigger: Option<Predicate>,
    /// Ordered node definitions.
    pub nodes: Vec<NodeSpec>,
}

impl TemplateSpec {
    /// Parses and validates a template spec from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when the JSON cannot be decoded or fails validation.
    pub fn from_json(json: &Value) -> Result<Self, SpecError> {
        let spec: Self =
            serde_json::from_value(json.clone()).map_err(|err| SpecError::Decode(err.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validates template-level fields and node structure.
    ///
    /// # Errors
    ///
    /// Returns the first [`SpecError`] encountered.
    pub fn validate(&self) -> Result<(), SpecError> {
        TemplateCode::parse(self.code.as_str())?;
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyField("name"));
        }
        if self.applicable_content_types.is_empty() {
            return Err(SpecError::NoContentTypes);
        }
        for kind in &self.applicable_content_types {
            ContentTypeCode::parse(kind.as_str())?;
        }
        if self.default_timeout_hours == Some(0) {
            return Err(SpecError::OutOfRange {
                field: "default_timeout_hours",
                value: "0".to_string(),
            });
        }
        validate_nodes(&self.nodes)
    }
}

/// Validates node structure independent of template fields.
///
/// # Errors
///
/// Returns the first structural [`SpecError`].
pub fn validate_nodes(nodes: &[NodeSpec]) -> Result<(), SpecError> {
    let first = nodes.first().ok_or(SpecError::NoNodes)?;
    for pair in nodes.windows(2) {
        if pair[1].sequence <= pair[0].sequence {
            return Err(SpecError::SequenceOrder {
                previous: pair[0].sequence,
                current: pair[1].sequence,
            });
        }
    }
    let starts = nodes.iter().filter(|node| node.node_type == NodeType::Start).count();
    if starts != 1 {
        return Err(SpecError::StartCount(starts));
    }
    if first.node_type != NodeType::Start {
        return Err(SpecError::StartNotFirst);
    }
    if !nodes.iter().any(|node| node.node_type == NodeType::End) {
        return Err(SpecError::MissingEnd);
    }
    if let Some(last) = nodes.last()
        && last.node_type != NodeType::End
    {
        return Err(SpecError::NoSuccessor(last.sequence));
    }

    let sequences: BTreeSet<u32> = nodes.iter().map(|node| node.sequence).collect();
    for node in nodes {
        match node.node_type {
            NodeType::Parallel => {
                return Err(SpecError::UnsupportedNodeType {
                    sequence: node.sequence,
                    node_type: node.node_type,
                });
            }
            NodeType::Approval => {
                if !node.approvers.as_ref().is_some_and(ApproverBinding::is_usable) {
                    return Err(SpecError::MissingApprovers(node.sequence));
                }
            }
            NodeType::Condition => {
                let routing =
                    node.condition.as_ref().ok_or(SpecError::MissingCondition(node.sequence))?;
                routing.validate().map_err(|source| SpecError::Condition {
                    sequence: node.sequence,
                    source,
                })?;
                for target in routing.targets() {
                    if target <= node.sequence || !sequences.contains(&target) {
                        return Err(SpecError::InvalidRoute {
                            sequence: node.sequence,
                            target,
                        });
                    }
                }
            }
            NodeType::Start | NodeType::End => {}
        }
        if node.timeout_hours == Some(0) {
            return Err(SpecError::OutOfRange {
                field: "timeout_hours",
                value: "0".to_string(),
            });
        }
    }
    Ok(())
}

/// Serde default for policy flags.
const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Stored Template
// ============================================================================

/// Stored approval node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalNode {
    /// Node row id.
    pub id: NodeId,
    /// Owning template.
    pub template_id: TemplateId,
    /// Sequence within the template.
    pub sequence: u32,
    /// Display name.
    pub name: String,
    /// Node kind.
    pub node_type: NodeType,
    /// Approver binding for approval nodes.
    pub approvers: Option<ApproverBinding>,
    /// Approval mode.
    pub approval_mode: ApprovalMode,
    /// Routing for condition nodes.
    pub condition: Option<ConditionRouting>,
    /// Whether an empty approver set blocks the flow.
    pub is_required: bool,
    /// Whether approvers may reject.
    pub can_reject: bool,
    /// Whether approvers may transfer.
    pub can_transfer: bool,
    /// Per-node timeout override in hours.
    pub timeout_hours: Option<u32>,
}

impl ApprovalNode {
    /// Builds a stored node from its spec.
    #[must_use]
    pub fn from_spec(id: NodeId, template_id: TemplateId, spec: &NodeSpec) -> Self {
        Self {
            id,
            template_id,
            sequence: spec.sequence,
            name: spec.name.clone(),
            node_type: spec.node_type,
            approvers: spec.approvers.clone(),
            approval_mode: spec.approval_mode,
            condition: spec.condition.clone(),
            is_required: spec.is_required,
            can_reject: spec.can_reject,
            can_transfer: spec.can_transfer,
            timeout_hours: spec.timeout_hours,
        }
    }

    /// Returns the authoring form of the node.
    #[must_use]
    pub fn to_spec(&self) -> NodeSpec {
        NodeSpec {
            sequence: self.sequence,
            name: self.name.clone(),
            node_type: self.node_type,
            approvers: self.approvers.clone(),
            approval_mode: self.approval_mode,
            condition: self.condition.clone(),
            is_required: self.is_required,
            can_reject: self.can_reject,
            can_transfer: self.can_transfer,
            timeout_hours: self.timeout_hours,
        }
    }
}

/// Stored workflow template.
///
/// # Invariants
/// - `nodes` is sorted by strictly increasing sequence and passed
///   [`validate_nodes`] when written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Template row id.
    pub id: TemplateId,
    /// Unique template code.
    pub code: TemplateCode,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Grouping category.
    pub category: String,
    /// Lifecycle status.
    pub status: TemplateStatus,
    /// Policy flags.
    pub policy: TemplatePolicy,
    /// Default timeout in hours.
    pub default_timeout_hours: Option<u32>,
    /// Timeout action.
    pub timeout_action: TimeoutAction,
    /// Content types this template binds to.
    pub applicable_content_types: Vec<ContentTypeCode>,
    /// Form filter predicate.
    pub form_filter: Option<Predicate>,
    /// Sub-workflow trigger predicate.
    pub sub_workflow_trigger: Option<Predicate>,
    /// Ordered nodes.
    pub nodes: Vec<ApprovalNode>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

impl WorkflowTemplate {
    /// Returns the start node.
    #[must_use]
    pub fn start_node(&self) -> Option<&ApprovalNode> {
        self.nodes.iter().find(|node| node.node_type == NodeType::Start)
    }

    /// Finds a node by row id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ApprovalNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Finds a node by sequence.
    #[must_use]
    pub fn node_at(&self, sequence: u32) -> Option<&ApprovalNode> {
        self.nodes.iter().find(|node| node.sequence == sequence)
    }

    /// Returns the node following `sequence` in order.
    #[must_use]
    pub fn next_after(&self, sequence: u32) -> Option<&ApprovalNode> {
        self.nodes.iter().filter(|node| node.sequence > sequence).min_by_key(|node| node.sequence)
    }

    /// Returns true when the template is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TemplateStatus::Active
    }

    /// Returns true when the template binds to the content type and its form
    /// filter holds for the context.
    #[must_use]
    pub fn is_applicable(&self, kind: &ContentTypeCode, filter_context: &Value) -> bool {
        self.applicable_content_types.contains(kind)
            && self.form_filter.as_ref().is_none_or(|filter| filter.evaluate(filter_context))
    }

    /// Returns true when the sub-workflow trigger is declared and holds.
    #[must_use]
    pub fn sub_workflow_applies(&self, context: &Value) -> bool {
        self.sub_workflow_trigger.as_ref().is_some_and(|trigger| trigger.evaluate(context))
    }

    /// Effective timeout for a node: its override, else the template default.
    #[must_use]
    pub fn effective_timeout_hours(&self, node: &ApprovalNode) -> Option<u32> {
        node.timeout_hours.or(self.default_timeout_hours)
    }

    /// Returns the authoring form of the template.
    #[must_use]
    pub fn to_spec(&self) -> TemplateSpec {
        TemplateSpec {
            code: self.code.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            policy: self.policy,
            default_timeout_hours: self.default_timeout_hours,
            timeout_action: self.timeout_action,
            applicable_content_types: self.applicable_content_types.clone(),
            form_filter: self.form_filter.clone(),
            sub_workflow_trigger: self.sub_workflow_trigger.clone(),
            nodes: self.nodes.iter().map(ApprovalNode::to_spec).collect(),
        }
    }
}
