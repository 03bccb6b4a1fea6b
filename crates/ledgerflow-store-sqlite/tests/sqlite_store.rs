// crates/ledgerflow-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Integrity Tests
// Description: Path safety, schema versioning, uniqueness, and decoding.
// Purpose: Validate the durable store against the same rules as the in-memory store.
// ============================================================================

//! ## Overview
//! Store-level tests that drive the transaction handles directly:
//! - Path safety checks (empty path, directory rejection)
//! - Schema version validation on reopen
//! - Open-instance and output-value slot uniqueness
//! - Rollback on failed units of work
//! - Fail-closed decoding of tampered rows

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
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use ledgerflow_core::ApprovalInstance;
use ledgerflow_core::ApprovalMode;
use ledgerflow_core::ApproverBinding;
use ledgerflow_core::BaseAmountType;
use ledgerflow_core::ContentTypeCode;
use ledgerflow_core::EventId;
use ledgerflow_core::EventSpec;
use ledgerflow_core::InstanceFlag;
use ledgerflow_core::InstanceStatus;
use ledgerflow_core::MilestoneSpec;
use ledgerflow_core::NewInstance;
use ledgerflow_core::NewOutputValueRecord;
use ledgerflow_core::NewRecord;
use ledgerflow_core::NodeSpec;
use ledgerflow_core::OutputValueRecord;
use ledgerflow_core::OutputValueStore;
use ledgerflow_core::ProjectId;
use ledgerflow_core::RecordStatus;
use ledgerflow_core::RoleCode;
use ledgerflow_core::StageSpec;
use ledgerflow_core::StoreError;
use ledgerflow_core::TargetRef;
use ledgerflow_core::TemplateCode;
use ledgerflow_core::TemplatePolicy;
use ledgerflow_core::TemplateSpec;
use ledgerflow_core::TemplateStatus;
use ledgerflow_core::TimeoutAction;
use ledgerflow_core::Timestamp;
use ledgerflow_core::UserId;
use ledgerflow_core::WorkflowStore;
use ledgerflow_core::WorkflowTemplate;
use ledgerflow_store_sqlite::SqliteStore;
use ledgerflow_store_sqlite::SqliteStoreConfig;
use ledgerflow_store_sqlite::SqliteStoreError;
use ledgerflow_store_sqlite::SqliteStoreMode;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const NOW: Timestamp = Timestamp::from_unix_millis(1_767_225_600_000);

fn config_for_path(path: &Path) -> SqliteStoreConfig {
    SqliteStoreConfig {
        journal_mode: SqliteStoreMode::Delete,
        ..SqliteStoreConfig::for_path(path)
    }
}

fn open(dir: &TempDir) -> SqliteStore {
    SqliteStore::new(config_for_path(&dir.path().join("ledgerflow.db"))).unwrap()
}

fn decimal(text: &str) -> BigDecimal {
    BigDecimal::from_str(text).unwrap()
}

fn template_spec(code: &str) -> TemplateSpec {
    TemplateSpec {
        code: TemplateCode::new(code),
        name: "Contract review".to_string(),
        description: "Two-step review".to_string(),
        category: "contracts".to_string(),
        policy: TemplatePolicy {
            allow_withdraw: true,
            allow_reject: true,
            allow_transfer: false,
        },
        default_timeout_hours: Some(24),
        timeout_action: TimeoutAction::Escalate,
        applicable_content_types: vec![ContentTypeCode::new("contract")],
        form_filter: None,
        sub_workflow_trigger: None,
        nodes: vec![
            NodeSpec::start(1),
            NodeSpec::approval(
                2,
                "finance",
                ApproverBinding::users([UserId::new(7), UserId::new(8)]),
                ApprovalMode::All,
            ),
            NodeSpec::end(3),
        ],
    }
}

fn insert_template(store: &SqliteStore, code: &str) -> WorkflowTemplate {
    let spec = template_spec(code);
    store
        .workflow_transaction(|tx| tx.insert_template(&spec, TemplateStatus::Active, NOW))
        .unwrap()
}

fn new_instance(template: &WorkflowTemplate, number: &str, object_id: i64) -> NewInstance {
    NewInstance {
        instance_number: number.to_string(),
        template_id: template.id,
        template_code: template.code.clone(),
        target: TargetRef::new("contract", object_id),
        current_node: template.node_at(2).map(|node| node.id),
        applicant: UserId::new(3),
        apply_comment: "please review".to_string(),
        now: NOW,
    }
}

fn insert_instance(store: &SqliteStore, new: NewInstance) -> Result<ApprovalInstance, StoreError> {
    store.workflow_transaction(|tx| tx.insert_instance(new))
}

fn catalog_stage() -> StageSpec {
    StageSpec {
        code: "contract".to_string(),
        name: "Contract".to_string(),
        position: 1,
        stage_percentage: decimal("1.00"),
        base_amount_type: BaseAmountType::ContractAmount,
        active: true,
        milestones: vec![MilestoneSpec {
            code: "settlement".to_string(),
            name: "Settlement".to_string(),
            position: 1,
            milestone_percentage: decimal("0.30"),
            base_amount_type: Some(BaseAmountType::SettlementAmount),
            active: true,
            events: vec![EventSpec {
                code: "settlement_audited".to_string(),
                name: "Settlement audited".to_string(),
                position: 1,
                event_percentage: decimal("1.00"),
                responsible_role_code: RoleCode::new("cost_manager"),
                trigger_condition: Some("settlement.audited".to_string()),
                active: true,
            }],
        }],
    }
}

fn load_catalog(store: &SqliteStore) -> EventId {
    let stage = catalog_stage();
    store
        .output_value_transaction(|tx| {
            let stored = tx.upsert_stage(&stage)?;
            let milestone = tx.upsert_milestone(stored.id, &stage.milestones[0])?;
            let event = tx.upsert_event(milestone.id, &stage.milestones[0].events[0])?;
            Ok::<_, StoreError>(event.id)
        })
        .unwrap()
}

fn new_output_record(store: &SqliteStore, project: i64) -> NewOutputValueRecord {
    let path = store
        .output_value_transaction(|tx| tx.event_by_code("settlement_audited"))
        .unwrap()
        .unwrap();
    NewOutputValueRecord {
        project_id: ProjectId::new(project),
        stage_id: path.stage.id,
        stage_code: path.stage.code.clone(),
        milestone_id: path.milestone.id,
        event_id: path.event.id,
        event_code: path.event.code.clone(),
        responsible_user: UserId::new(10),
        base_amount: decimal("600000"),
        base_amount_type: BaseAmountType::SettlementAmount,
        stage_percentage: decimal("1.00"),
        milestone_percentage: decimal("0.30"),
        event_percentage: decimal("1.00"),
        calculated_value: decimal("180000.00"),
        now: NOW,
    }
}

fn insert_output(
    store: &SqliteStore,
    new: NewOutputValueRecord,
) -> Result<OutputValueRecord, StoreError> {
    store.output_value_transaction(|tx| tx.insert_output_record(new))
}

// ============================================================================
// SECTION: Path And Schema
// ============================================================================

#[test]
fn sqlite_store_rejects_empty_path() {
    let err = SqliteStore::new(config_for_path(Path::new(""))).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_rejects_directory_path() {
    let dir = TempDir::new().unwrap();
    let err = SqliteStore::new(config_for_path(dir.path())).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("data").join("ledgerflow.db");
    SqliteStore::new(config_for_path(&path)).unwrap();
    assert!(path.exists());
}

#[test]
fn sqlite_store_rejects_unknown_schema_version() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledgerflow.db");
    drop(SqliteStore::new(config_for_path(&path)).unwrap());

    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = ?1", params![99]).unwrap();
    drop(connection);

    let err = SqliteStore::new(config_for_path(&path)).unwrap_err();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn sqlite_store_reopen_preserves_templates() {
    let dir = TempDir::new().unwrap();
    let inserted = insert_template(&open(&dir), "contract_review");

    let reopened = open(&dir);
    let loaded = reopened
        .workflow_transaction(|tx| tx.template_by_code(&TemplateCode::new("contract_review")))
        .unwrap()
        .unwrap();
    assert_eq!(loaded, inserted);
    assert!(!loaded.policy.allow_transfer);
    assert_eq!(loaded.timeout_action, TimeoutAction::Escalate);
    let approvers = loaded.node_at(2).and_then(|node| node.approvers.clone()).unwrap();
    assert_eq!(approvers.users, vec![UserId::new(7), UserId::new(8)]);
}

// ============================================================================
// SECTION: Workflow Tables
// ============================================================================

#[test]
fn sqlite_store_enforces_one_open_instance_per_target() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let template = insert_template(&store, "contract_review");

    let first = insert_instance(&store, new_instance(&template, "AP1", 100)).unwrap();
    let duplicate = insert_instance(&store, new_instance(&template, "AP2", 100)).unwrap_err();
    assert!(matches!(duplicate, StoreError::Conflict(_)));
    let reused_number = insert_instance(&store, new_instance(&template, "AP1", 101)).unwrap_err();
    assert!(matches!(reused_number, StoreError::Conflict(_)));

    let closed = ApprovalInstance {
        status: InstanceStatus::Approved,
        completed_time: Some(NOW),
        ..first
    };
    store.workflow_transaction(|tx| tx.update_instance(&closed)).unwrap();
    insert_instance(&store, new_instance(&template, "AP3", 100)).unwrap();

    let count = store
        .workflow_transaction(|tx| tx.count_instances_with_prefix("AP"))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn sqlite_store_rolls_back_failed_units_of_work() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let template = insert_template(&store, "contract_review");

    let result: Result<(), StoreError> = store.workflow_transaction(|tx| {
        tx.insert_instance(new_instance(&template, "AP1", 100))?;
        Err(StoreError::Invalid("abort".to_string()))
    });
    assert!(result.is_err());
    let open_count = store
        .workflow_transaction(|tx| tx.count_open_instances(template.id))
        .unwrap();
    assert_eq!(open_count, 0);
}

#[test]
fn sqlite_store_round_trips_records_and_flags() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let template = insert_template(&store, "contract_review");
    let node = template.node_at(2).unwrap().id;
    let instance = insert_instance(&store, new_instance(&template, "AP1", 100)).unwrap();

    let record = store
        .workflow_transaction(|tx| {
            tx.insert_record(NewRecord::pending(
                instance.id,
                node,
                UserId::new(7),
                NOW,
                Some(NOW.plus_hours(24)),
            ))
        })
        .unwrap();
    let flagged = ApprovalInstance {
        flag: Some(InstanceFlag::CallbackFailed {
            message: "ledger offline".to_string(),
        }),
        ..instance.clone()
    };
    store.workflow_transaction(|tx| tx.update_instance(&flagged)).unwrap();

    let (loaded, records, pending, overdue) = store
        .workflow_transaction(|tx| {
            Ok::<_, StoreError>((
                tx.lock_instance(instance.id)?,
                tx.records_for_instance(instance.id)?,
                tx.pending_instances_for(UserId::new(7))?,
                tx.overdue_records(NOW.plus_hours(25), 10)?,
            ))
        })
        .unwrap();
    assert_eq!(loaded, Some(flagged));
    assert_eq!(records, vec![record.clone()]);
    assert_eq!(pending.len(), 1);
    assert_eq!(overdue, vec![record]);
}

#[test]
fn sqlite_store_retires_replaced_nodes() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let template = insert_template(&store, "contract_review");
    let old_node = template.node_at(2).unwrap().id;
    let instance = insert_instance(&store, new_instance(&template, "AP1", 100)).unwrap();
    store
        .workflow_transaction(|tx| {
            tx.insert_record(NewRecord::pending(instance.id, old_node, UserId::new(7), NOW, None))
        })
        .unwrap();

    let replacement = vec![NodeSpec::start(1), NodeSpec::end(2)];
    let (nodes, reloaded, history) = store
        .workflow_transaction(|tx| {
            let nodes = tx.replace_template_nodes(template.id, &replacement)?;
            Ok::<_, StoreError>((
                nodes,
                tx.template_by_id(template.id)?,
                tx.records_for_instance(instance.id)?,
            ))
        })
        .unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(reloaded.unwrap().nodes, nodes);
    assert_eq!(history[0].node_id, old_node);
}

#[test]
fn sqlite_store_fails_closed_on_unknown_labels() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledgerflow.db");
    let store = SqliteStore::new(config_for_path(&path)).unwrap();
    insert_template(&store, "contract_review");
    drop(store);

    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE workflow_template SET status = 'bogus'", params![]).unwrap();
    drop(connection);

    let store = SqliteStore::new(config_for_path(&path)).unwrap();
    let err = store
        .workflow_transaction(|tx| tx.list_templates(None))
        .unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

// ============================================================================
// SECTION: Output-Value Tables
// ============================================================================

#[test]
fn sqlite_store_upserts_catalog_by_code() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let first = load_catalog(&store);
    let second = load_catalog(&store);
    assert_eq!(first, second);

    let catalog = store
        .output_value_transaction(|tx| tx.catalog())
        .unwrap();
    assert_eq!(catalog.len(), 1);
    let milestone = &catalog[0].milestones[0];
    assert_eq!(milestone.milestone.milestone_percentage, decimal("0.30"));
    assert_eq!(milestone.milestone.base_amount_type, Some(BaseAmountType::SettlementAmount));
    assert_eq!(milestone.events.len(), 1);

    let by_trigger = store
        .output_value_transaction(|tx| tx.event_by_trigger("settlement.audited"))
        .unwrap()
        .unwrap();
    assert_eq!(by_trigger.event.id, first);
    assert_eq!(by_trigger.stage.code, "contract");
}

#[test]
fn sqlite_store_rejects_duplicate_trigger() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    load_catalog(&store);

    let stage = catalog_stage();
    let clash = EventSpec {
        code: "settlement_paid".to_string(),
        ..stage.milestones[0].events[0].clone()
    };
    let err = store
        .output_value_transaction(|tx| {
            let stored = tx.upsert_stage(&stage)?;
            let milestone = tx.upsert_milestone(stored.id, &stage.milestones[0])?;
            tx.upsert_event(milestone.id, &clash)
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn sqlite_store_keeps_one_live_record_per_slot() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    load_catalog(&store);

    let first = insert_output(&store, new_output_record(&store, 1)).unwrap();
    assert_eq!(first.calculated_value, decimal("180000.00"));
    let duplicate = insert_output(&store, new_output_record(&store, 1)).unwrap_err();
    assert!(matches!(duplicate, StoreError::Conflict(_)));
    insert_output(&store, new_output_record(&store, 2)).unwrap();

    let voided = OutputValueRecord {
        status: RecordStatus::Voided,
        void_reason: Some("recalculated".to_string()),
        ..first.clone()
    };
    store
        .output_value_transaction(|tx| tx.update_output_record(&voided))
        .unwrap();
    let replacement = insert_output(&store, new_output_record(&store, 1)).unwrap();
    assert_ne!(replacement.id, first.id);

    let (project_records, user_records) = store
        .output_value_transaction(|tx| {
            Ok::<_, StoreError>((
                tx.records_for_project(ProjectId::new(1))?,
                tx.records_for_user(UserId::new(10))?,
            ))
        })
        .unwrap();
    assert_eq!(project_records.len(), 2);
    assert_eq!(project_records[0], voided);
    assert_eq!(user_records.len(), 3);
}

#[test]
fn sqlite_store_toggles_events() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    load_catalog(&store);

    let (known, unknown, path) = store
        .output_value_transaction(|tx| {
            Ok::<_, StoreError>((
                tx.set_event_active("settlement_audited", false)?,
                tx.set_event_active("missing", false)?,
                tx.event_by_code("settlement_audited")?,
            ))
        })
        .unwrap();
    assert!(known);
    assert!(!unknown);
    assert!(!path.unwrap().event.active);
}
