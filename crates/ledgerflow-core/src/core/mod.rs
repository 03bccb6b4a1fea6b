// crates/ledgerflow-core/src/core/mod.rs
// ============================================================================
// Module: Ledgerflow Core Types
// Description: Canonical workflow, org, and output-value data structures.
// Purpose: Provide stable, serializable types shared by engines and stores.
// Dependencies: bigdecimal, serde, serde_json, time
// ============================================================================

//! ## Overview
//! Core types describe templates, instances, records, the org read model, the
//! permission catalog, and the output-value catalog. Stores persist these
//! types verbatim and engines operate on them; no I/O happens here.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod condition;
pub mod events;
pub mod identifiers;
pub mod instance;
pub mod org;
pub mod output_value;
pub mod permissions;
pub mod target;
pub mod template;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use condition::BranchRule;
pub use condition::ConditionError;
pub use condition::ConditionRouting;
pub use condition::Operator;
pub use condition::Predicate;
pub use condition::RouteDecision;
pub use events::EventSubject;
pub use events::NotificationEvent;
pub use events::NotificationType;
pub use identifiers::ContentTypeCode;
pub use identifiers::DepartmentId;
pub use identifiers::EventId;
pub use identifiers::IdentifierError;
pub use identifiers::InstanceId;
pub use identifiers::MilestoneId;
pub use identifiers::NodeId;
pub use identifiers::OutputValueRecordId;
pub use identifiers::PermissionCode;
pub use identifiers::ProjectId;
pub use identifiers::RecordId;
pub use identifiers::RoleCode;
pub use identifiers::StageId;
pub use identifiers::TemplateCode;
pub use identifiers::TemplateId;
pub use identifiers::UserId;
pub use instance::ApprovalInstance;
pub use instance::ApprovalRecord;
pub use instance::InstanceFlag;
pub use instance::InstanceStatus;
pub use instance::NewInstance;
pub use instance::NewRecord;
pub use instance::RecordKind;
pub use instance::RecordResult;
pub use org::Department;
pub use org::Role;
pub use org::User;
pub use output_value::BaseAmountType;
pub use output_value::CatalogSpec;
pub use output_value::Event;
pub use output_value::EventPath;
pub use output_value::EventSpec;
pub use output_value::Milestone;
pub use output_value::MilestoneNode;
pub use output_value::MilestoneSpec;
pub use output_value::NewOutputValueRecord;
pub use output_value::OutputValueRecord;
pub use output_value::ProjectSummary;
pub use output_value::ProjectTotal;
pub use output_value::ProjectView;
pub use output_value::RecordEventOptions;
pub use output_value::RecordOutcome;
pub use output_value::RecordStatus;
pub use output_value::SettlementFigures;
pub use output_value::SkipReason;
pub use output_value::Stage;
pub use output_value::StageNode;
pub use output_value::StageSpec;
pub use output_value::StageTotal;
pub use output_value::StatusTotals;
pub use output_value::TeamMember;
pub use output_value::UserSummary;
pub use output_value::UserTotal;
pub use output_value::calculate_value;
pub use permissions::PermissionCatalog;
pub use permissions::PermissionEntry;
pub use permissions::PermissionError;
pub use target::TargetRef;
pub use template::ApprovalMode;
pub use template::ApprovalNode;
pub use template::ApproverBinding;
pub use template::ApproverType;
pub use template::NodeSpec;
pub use template::NodeType;
pub use template::SpecError;
pub use template::TemplatePolicy;
pub use template::TemplateSpec;
pub use template::TemplateStatus;
pub use template::TimeoutAction;
pub use template::WorkflowTemplate;
pub use template::validate_nodes;
pub use time::DateRange;
pub use time::Timestamp;
