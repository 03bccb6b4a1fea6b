// crates/ledgerflow-core/tests/common/mod.rs
// ============================================================================
// Module: Shared Test Fixtures
// Description: Org directory, engine harness, and template builders.
// ============================================================================
//! ## Overview
//! Fixtures shared by the workflow and output-value integration tests. The
//! org chart is small and fixed so scenarios can name users by constant.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Shared helpers are used by a subset of test binaries."
)]

use std::sync::Arc;
use std::sync::Mutex;

use ledgerflow_core::ApprovalInstance;
use ledgerflow_core::CallbackError;
use ledgerflow_core::ContentTypeCode;
use ledgerflow_core::InMemoryDirectory;
use ledgerflow_core::InMemoryNotificationSink;
use ledgerflow_core::InMemoryStore;
use ledgerflow_core::InstanceStatus;
use ledgerflow_core::ManualClock;
use ledgerflow_core::NodeSpec;
use ledgerflow_core::Principal;
use ledgerflow_core::TargetRef;
use ledgerflow_core::TemplateCode;
use ledgerflow_core::TemplatePolicy;
use ledgerflow_core::TemplateSpec;
use ledgerflow_core::TimeoutAction;
use ledgerflow_core::Timestamp;
use ledgerflow_core::UserId;
use ledgerflow_core::WorkflowConfig;
use ledgerflow_core::WorkflowEngine;
use ledgerflow_core::WorkflowTemplate;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Org Chart
// ============================================================================

/// Administrator holding every built-in permission; leads headquarters.
pub const ADMIN: UserId = UserId::new(1);
/// Engineering department leader.
pub const ENG_LEAD: UserId = UserId::new(2);
/// Engineer submitting requests.
pub const APPLICANT: UserId = UserId::new(3);
/// Finance approvers.
pub const FINANCE_A: UserId = UserId::new(7);
pub const FINANCE_B: UserId = UserId::new(8);
pub const FINANCE_C: UserId = UserId::new(12);
pub const FINANCE_D: UserId = UserId::new(13);
/// Inactive finance user.
pub const RETIRED: UserId = UserId::new(9);
/// Operations user without a department leader.
pub const OPS: UserId = UserId::new(10);
/// Plain headquarters staff.
pub const STAFF: UserId = UserId::new(11);

/// 2026-01-01T00:00:00Z.
pub const START_MILLIS: i64 = 1_767_225_600_000;

/// Builds the fixed org directory.
pub fn directory() -> InMemoryDirectory {
    directory_from(&directory_snapshot())
}

/// Builds a directory from a snapshot document.
pub fn directory_from(snapshot: &Value) -> InMemoryDirectory {
    InMemoryDirectory::from_json(snapshot.to_string().as_bytes()).unwrap()
}

/// The fixed org chart as a snapshot document.
pub fn directory_snapshot() -> Value {
    json!({
        "departments": [
            {"id": 1, "code": "HQ", "name": "Headquarters", "leader": 1},
            {"id": 2, "code": "ENG", "name": "Engineering", "parent": 1, "leader": 2},
            {"id": 3, "code": "OPS", "name": "Operations", "parent": 1}
        ],
        "roles": [
            {
                "code": "admin",
                "name": "Administrator",
                "permissions": [
                    "workflow.template.manage",
                    "workflow.instance.cancel",
                    "workflow.instance.manage",
                    "output_value.record.confirm",
                    "output_value.record.void",
                    "output_value.catalog.manage"
                ]
            },
            {"code": "finance", "name": "Finance"},
            {"code": "cost_manager", "name": "Cost manager"}
        ],
        "users": [
            {"id": 1, "name": "Ada", "department": 1, "roles": ["admin"]},
            {"id": 2, "name": "Grace", "department": 2},
            {"id": 3, "name": "Linus", "department": 2},
            {"id": 7, "name": "Fiona", "department": 1, "roles": ["finance"]},
            {"id": 8, "name": "Felix", "department": 1, "roles": ["finance"]},
            {"id": 9, "name": "Otto", "department": 1, "roles": ["finance"], "active": false},
            {"id": 10, "name": "Olga", "department": 3, "roles": ["cost_manager"]},
            {"id": 11, "name": "Sam", "department": 1},
            {"id": 12, "name": "Farah", "department": 1, "roles": ["finance"]},
            {"id": 13, "name": "Fergus", "department": 1, "roles": ["finance"]}
        ]
    })
}

// ============================================================================
// SECTION: Engine Harness
// ============================================================================

/// Engine type used by the integration tests.
pub type TestEngine =
    WorkflowEngine<InMemoryStore, InMemoryDirectory, InMemoryNotificationSink, ManualClock>;

/// Engine plus handles to its shared store, sink, and clock.
pub struct Harness {
    pub engine: TestEngine,
    pub store: InMemoryStore,
    pub sink: InMemoryNotificationSink,
    pub clock: ManualClock,
}

/// Harness with default limits.
pub fn harness() -> Harness {
    harness_with(WorkflowConfig::default())
}

/// Harness with explicit limits.
pub fn harness_with(config: WorkflowConfig) -> Harness {
    harness_on(directory(), config)
}

/// Harness over a caller-supplied directory.
pub fn harness_on(directory: InMemoryDirectory, config: WorkflowConfig) -> Harness {
    let store = InMemoryStore::new();
    let sink = InMemoryNotificationSink::new();
    let clock = ManualClock::new(Timestamp::from_unix_millis(START_MILLIS));
    let engine = WorkflowEngine::new(store.clone(), directory, sink.clone(), clock.clone(), config);
    Harness {
        engine,
        store,
        sink,
        clock,
    }
}

/// Terminal callback invocations captured as `(instance id, status)`.
pub type CallbackLog = Arc<Mutex<Vec<(i64, InstanceStatus)>>>;

/// Registers a recording callback for `contract` instances of `code`.
pub fn record_callbacks(engine: &mut TestEngine, code: &str) -> CallbackLog {
    let log: CallbackLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    engine.register_callback(
        "contract",
        code,
        move |instance: &ApprovalInstance,
              status: InstanceStatus|
              -> Result<(), CallbackError> {
            sink.lock().unwrap().push((instance.id.get(), status));
            Ok(())
        },
    );
    log
}

// ============================================================================
// SECTION: Templates
// ============================================================================

/// Contract record reference.
pub fn contract(id: i64) -> TargetRef {
    TargetRef::new("contract", id)
}

/// Template spec bound to contracts.
pub fn template(code: &str, nodes: Vec<NodeSpec>) -> TemplateSpec {
    TemplateSpec {
        code: TemplateCode::new(code),
        name: format!("{code} template"),
        description: String::new(),
        category: "contracts".to_string(),
        policy: TemplatePolicy::default(),
        default_timeout_hours: None,
        timeout_action: TimeoutAction::Notify,
        applicable_content_types: vec![ContentTypeCode::new("contract")],
        form_filter: None,
        sub_workflow_trigger: None,
        nodes,
    }
}

/// Registers and activates a template as the system principal.
pub fn publish(engine: &TestEngine, spec: &TemplateSpec) -> WorkflowTemplate {
    engine.register_template(Principal::System, spec).unwrap();
    engine.activate_template(Principal::System, &spec.code).unwrap()
}
