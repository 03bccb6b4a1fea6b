// crates/ledgerflow-core/src/core/instance.rs
// ============================================================================
// Module: Ledgerflow Approval Instances
// Description: Approval instance and approval record state.
// Purpose: Capture running and terminated workflow executions and decisions.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`ApprovalInstance`] binds one template to one business record and moves
//! through `pending` to a terminal status. Each approver's decision on a node
//! is an [`ApprovalRecord`]. Records are append-only per instance: once the
//! instance is terminal no record is added.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::InstanceId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RecordId;
use crate::core::identifiers::TemplateCode;
use crate::core::identifiers::TemplateId;
use crate::core::identifiers::UserId;
use crate::core::target::TargetRef;
use crate::core::template::label_enum;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status Enumerations
// ============================================================================

label_enum!(
    /// Approval instance status.
    InstanceStatus {
        /// Created but not submitted.
        Draft => "draft",
        /// Awaiting approver action.
        Pending => "pending",
        /// Completed with approval.
        Approved => "approved",
        /// Completed with rejection.
        Rejected => "rejected",
        /// Withdrawn by the applicant.
        Withdrawn => "withdrawn",
        /// Force-cancelled by a supervisor.
        Cancelled => "cancelled",
    }
);

impl InstanceStatus {
    /// Returns true for `approved`, `rejected`, `withdrawn`, and `cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_open()
    }

    /// Returns true for `draft` and `pending`.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Draft | Self::Pending)
    }
}

label_enum!(
    /// Approval record result.
    RecordResult {
        /// Awaiting the approver.
        Pending => "pending",
        /// Approved.
        Approved => "approved",
        /// Rejected.
        Rejected => "rejected",
        /// Handed to another user.
        Transferred => "transferred",
        /// Voided without a decision.
        Withdrawn => "withdrawn",
    }
);

label_enum!(
    /// Who produced an approval record.
    RecordKind {
        /// A resolved human approver.
        Approver => "approver",
        /// The engine, for auto-skipped nodes.
        System => "system",
    }
);

// ============================================================================
// SECTION: Admin Flags
// ============================================================================

/// Condition requiring administrator intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstanceFlag {
    /// A condition node matched no branch and declared no default.
    ConditionUnmatched {
        /// Sequence of the stuck condition node.
        node_sequence: u32,
    },
    /// A terminal callback failed; the transition was rolled back.
    CallbackFailed {
        /// Callback failure message.
        message: String,
    },
}

// ============================================================================
// SECTION: Instance
// ============================================================================

/// Approval instance.
///
/// # Invariants
/// - `current_node`, when set, is a node of the instance's template.
/// - At most one open instance exists per template code and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalInstance {
    /// Row id.
    pub id: InstanceId,
    /// Unique, time-prefixed instance number.
    pub instance_number: String,
    /// Template row id.
    pub template_id: TemplateId,
    /// Template code, the concurrency key.
    pub template_code: TemplateCode,
    /// Bound business record.
    pub target: TargetRef,
    /// Lifecycle status.
    pub status: InstanceStatus,
    /// Node the instance is waiting on or finished at.
    pub current_node: Option<NodeId>,
    /// Applicant user.
    pub applicant: UserId,
    /// Submission time.
    pub apply_time: Timestamp,
    /// Applicant comment.
    pub apply_comment: String,
    /// Terminal transition time.
    pub completed_time: Option<Timestamp>,
    /// Comment recorded with the terminal transition.
    pub final_comment: Option<String>,
    /// Administrator flag, if any.
    pub flag: Option<InstanceFlag>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

/// Instance fields supplied on insert; storage assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInstance {
    /// Unique instance number.
    pub instance_number: String,
    /// Template row id.
    pub template_id: TemplateId,
    /// Template code.
    pub template_code: TemplateCode,
    /// Bound business record.
    pub target: TargetRef,
    /// Initial node.
    pub current_node: Option<NodeId>,
    /// Applicant user.
    pub applicant: UserId,
    /// Applicant comment.
    pub apply_comment: String,
    /// Submission time.
    pub now: Timestamp,
}

impl ApprovalInstance {
    /// Materializes an inserted instance in `pending` status.
    #[must_use]
    pub fn from_new(id: InstanceId, new: NewInstance) -> Self {
        Self {
            id,
            instance_number: new.instance_number,
            template_id: new.template_id,
            template_code: new.template_code,
            target: new.target,
            status: InstanceStatus::Pending,
            current_node: new.current_node,
            applicant: new.applicant,
            apply_time: new.now,
            apply_comment: new.apply_comment,
            completed_time: None,
            final_comment: None,
            flag: None,
            created_at: new.now,
            updated_at: new.now,
        }
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// One approver's decision on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Row id.
    pub id: RecordId,
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Node decided on.
    pub node_id: NodeId,
    /// Approver; `None` for engine-produced records.
    pub approver: Option<UserId>,
    /// Record producer.
    pub kind: RecordKind,
    /// Decision.
    pub result: RecordResult,
    /// Decision comment.
    pub comment: String,
    /// Transfer recipient when `result` is `transferred`.
    pub transferred_to: Option<UserId>,
    /// Record this one was transferred from.
    pub transferred_from: Option<RecordId>,
    /// Transfers in this record's chain so far.
    pub transfer_hops: u32,
    /// Whether the sweeper made the decision.
    pub system_decided: bool,
    /// Creation time; timeouts count from here.
    pub created_at: Timestamp,
    /// Time after which the sweeper acts, when a timeout applies.
    pub due_at: Option<Timestamp>,
    /// Decision time.
    pub approval_time: Option<Timestamp>,
    /// Last sweeper action time.
    pub last_reminder_at: Option<Timestamp>,
}

/// Record fields supplied on insert; storage assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    /// Owning instance.
    pub instance_id: InstanceId,
    /// Node decided on.
    pub node_id: NodeId,
    /// Approver.
    pub approver: Option<UserId>,
    /// Producer.
    pub kind: RecordKind,
    /// Initial result.
    pub result: RecordResult,
    /// Initial comment.
    pub comment: String,
    /// Origin record for transfers.
    pub transferred_from: Option<RecordId>,
    /// Transfer hop count.
    pub transfer_hops: u32,
    /// Creation time.
    pub created_at: Timestamp,
    /// Timeout deadline.
    pub due_at: Option<Timestamp>,
    /// Decision time for records created already decided.
    pub approval_time: Option<Timestamp>,
}

impl NewRecord {
    /// Pending record for a resolved approver.
    #[must_use]
    pub fn pending(
        instance_id: InstanceId,
        node_id: NodeId,
        approver: UserId,
        created_at: Timestamp,
        due_at: Option<Timestamp>,
    ) -> Self {
        Self {
            instance_id,
            node_id,
            approver: Some(approver),
            kind: RecordKind::Approver,
            result: RecordResult::Pending,
            comment: String::new(),
            transferred_from: None,
            transfer_hops: 0,
            created_at,
            due_at,
            approval_time: None,
        }
    }

    /// Engine-made approval for an optional node that resolved nobody.
    #[must_use]
    pub fn system_approval(
        instance_id: InstanceId,
        node_id: NodeId,
        comment: impl Into<String>,
        at: Timestamp,
    ) -> Self {
        Self {
            instance_id,
            node_id,
            approver: None,
            kind: RecordKind::System,
            result: RecordResult::Approved,
            comment: comment.into(),
            transferred_from: None,
            transfer_hops: 0,
            created_at: at,
            due_at: None,
            approval_time: Some(at),
        }
    }
}

impl ApprovalRecord {
    /// Materializes an inserted record.
    #[must_use]
    pub fn from_new(id: RecordId, new: NewRecord) -> Self {
        Self {
            id,
            instance_id: new.instance_id,
            node_id: new.node_id,
            approver: new.approver,
            kind: new.kind,
            result: new.result,
            comment: new.comment,
            transferred_to: None,
            transferred_from: new.transferred_from,
            transfer_hops: new.transfer_hops,
            system_decided: false,
            created_at: new.created_at,
            due_at: new.due_at,
            approval_time: new.approval_time,
            last_reminder_at: None,
        }
    }

    /// Returns true while the record awaits a decision.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.result == RecordResult::Pending
    }

    /// Returns true when a human approver approved.
    #[must_use]
    pub fn is_human_approval(&self) -> bool {
        self.kind == RecordKind::Approver && self.result == RecordResult::Approved
    }
}
