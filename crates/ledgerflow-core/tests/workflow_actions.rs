// crates/ledgerflow-core/tests/workflow_actions.rs
// ============================================================================
// Module: Workflow Action Tests
// Description: Start, approve, reject, transfer, withdraw, and cancel flows.
// ============================================================================
//! ## Overview
//! Drives approval instances through the in-memory engine and checks status,
//! records, callbacks, and notifications after every action.

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

mod common;

use common::ADMIN;
use common::APPLICANT;
use common::ENG_LEAD;
use common::FINANCE_A;
use common::FINANCE_B;
use common::FINANCE_C;
use common::FINANCE_D;
use common::RETIRED;
use common::STAFF;
use common::contract;
use common::directory_from;
use common::directory_snapshot;
use common::harness;
use common::harness_on;
use common::harness_with;
use common::publish;
use common::record_callbacks;
use common::template;
use ledgerflow_core::Action;
use ledgerflow_core::ApprovalInstance;
use ledgerflow_core::ApprovalMode;
use ledgerflow_core::ApprovalNode;
use ledgerflow_core::ApproverBinding;
use ledgerflow_core::ApproverType;
use ledgerflow_core::CallbackError;
use ledgerflow_core::InstanceFlag;
use ledgerflow_core::InstanceStatus;
use ledgerflow_core::NodeSpec;
use ledgerflow_core::NotificationType;
use ledgerflow_core::RecordKind;
use ledgerflow_core::RecordResult;
use ledgerflow_core::RoleCode;
use ledgerflow_core::WorkflowConfig;
use ledgerflow_core::UserId;
use ledgerflow_core::WorkflowError;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn single_approver_nodes(approver: ledgerflow_core::UserId) -> Vec<NodeSpec> {
    vec![
        NodeSpec::start(1),
        NodeSpec::approval(2, "legal review", ApproverBinding::users([approver]), ApprovalMode::Single),
        NodeSpec::end(3),
    ]
}

fn approve(comment: &str) -> Action {
    Action::Approve {
        comment: comment.to_string(),
    }
}

fn reject(comment: &str) -> Action {
    Action::Reject {
        comment: comment.to_string(),
    }
}

fn transfer(to: ledgerflow_core::UserId, comment: &str) -> Action {
    Action::Transfer {
        to,
        comment: comment.to_string(),
    }
}

// ============================================================================
// SECTION: Happy Paths
// ============================================================================

#[test]
fn single_approver_approval_completes_instance_and_fires_callback_once() {
    let mut h = harness();
    let calls = record_callbacks(&mut h.engine, "contract_review");
    let spec = template("contract_review", single_approver_nodes(FINANCE_A));
    let published = publish(&h.engine, &spec);

    let instance = h.engine.start_instance(&spec.code, contract(100), APPLICANT, "review").unwrap();
    assert_eq!(instance.status, InstanceStatus::Pending);
    assert_eq!(instance.current_node, published.node_at(2).map(|node| node.id));
    assert_eq!(instance.instance_number, "AP202601010000000001");
    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].approver, Some(FINANCE_A));
    assert_eq!(records[0].result, RecordResult::Pending);

    h.clock.advance_millis(1_000);
    let done = h.engine.act(instance.id, FINANCE_A, &approve("ok")).unwrap();
    assert_eq!(done.status, InstanceStatus::Approved);
    assert_eq!(done.current_node, published.node_at(3).map(|node| node.id));
    assert_eq!(done.final_comment.as_deref(), Some("ok"));
    assert!(done.completed_time.is_some());

    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result, RecordResult::Approved);
    assert_eq!(records[0].comment, "ok");
    assert_eq!(*calls.lock().unwrap(), vec![(instance.id.get(), InstanceStatus::Approved)]);

    let kinds: Vec<NotificationType> = h.sink.events().iter().map(|event| event.event_type).collect();
    assert_eq!(kinds, vec![NotificationType::ActionRequired, NotificationType::Completed]);
    let completed = &h.sink.events()[1];
    assert_eq!(completed.actors, vec![APPLICANT]);
}

#[test]
fn majority_node_terminates_on_first_rejection_and_voids_remaining_records() {
    let mut h = harness();
    let calls = record_callbacks(&mut h.engine, "budget_vote");
    let nodes = vec![
        NodeSpec::start(1),
        NodeSpec::approval(
            2,
            "finance board",
            ApproverBinding::roles([RoleCode::new("finance")]),
            ApprovalMode::Majority,
        ),
        NodeSpec::end(3),
    ];
    let spec = template("budget_vote", nodes);
    publish(&h.engine, &spec);

    let instance = h.engine.start_instance(&spec.code, contract(7), APPLICANT, "").unwrap();
    let approvers: Vec<_> =
        h.engine.records(instance.id).unwrap().iter().filter_map(|record| record.approver).collect();
    assert_eq!(approvers, vec![FINANCE_A, FINANCE_B, FINANCE_C, FINANCE_D]);
    assert!(!approvers.contains(&RETIRED));

    h.engine.act(instance.id, FINANCE_A, &approve("yes")).unwrap();
    let after_two = h.engine.act(instance.id, FINANCE_B, &approve("yes")).unwrap();
    assert_eq!(after_two.status, InstanceStatus::Pending);

    let rejected = h.engine.act(instance.id, FINANCE_C, &reject("over budget")).unwrap();
    assert_eq!(rejected.status, InstanceStatus::Rejected);
    assert_eq!(rejected.final_comment.as_deref(), Some("over budget"));

    let records = h.engine.records(instance.id).unwrap();
    let fourth = records.iter().find(|record| record.approver == Some(FINANCE_D)).unwrap();
    assert_eq!(fourth.result, RecordResult::Withdrawn);
    assert_eq!(*calls.lock().unwrap(), vec![(instance.id.get(), InstanceStatus::Rejected)]);
}

#[test]
fn all_mode_waits_for_every_approver_and_orders_decision_times() {
    let h = harness();
    let nodes = vec![
        NodeSpec::start(1),
        NodeSpec::approval(
            2,
            "dual control",
            ApproverBinding::users([FINANCE_A, FINANCE_B]),
            ApprovalMode::All,
        ),
        NodeSpec::end(3),
    ];
    let spec = template("dual_control", nodes);
    publish(&h.engine, &spec);

    let instance = h.engine.start_instance(&spec.code, contract(1), APPLICANT, "").unwrap();
    let first = h.engine.act(instance.id, FINANCE_A, &approve("a")).unwrap();
    assert_eq!(first.status, InstanceStatus::Pending);
    // Same clock reading for both decisions.
    let second = h.engine.act(instance.id, FINANCE_B, &approve("b")).unwrap();
    assert_eq!(second.status, InstanceStatus::Approved);

    let times: Vec<_> = h
        .engine
        .records(instance.id)
        .unwrap()
        .iter()
        .filter_map(|record| record.approval_time)
        .collect();
    assert_eq!(times.len(), 2);
    assert!(times[1] > times[0]);
}

#[test]
fn sequential_nodes_advance_one_after_another() {
    let h = harness();
    let nodes = vec![
        NodeSpec::start(1),
        NodeSpec::approval(
            2,
            "manager",
            ApproverBinding::of(ApproverType::DepartmentManager),
            ApprovalMode::Single,
        ),
        NodeSpec::approval(3, "finance", ApproverBinding::users([FINANCE_A]), ApprovalMode::Single),
        NodeSpec::end(4),
    ];
    let spec = template("two_step", nodes);
    let published = publish(&h.engine, &spec);

    let instance = h.engine.start_instance(&spec.code, contract(2), APPLICANT, "").unwrap();
    let pending = h.engine.list_pending_for(ENG_LEAD).unwrap();
    assert_eq!(pending.iter().map(|found| found.id).collect::<Vec<_>>(), vec![instance.id]);
    assert!(h.engine.list_pending_for(FINANCE_A).unwrap().is_empty());

    let moved = h.engine.act(instance.id, ENG_LEAD, &approve("fine")).unwrap();
    assert_eq!(moved.current_node, published.node_at(3).map(|node| node.id));
    assert_eq!(h.engine.list_pending_for(FINANCE_A).unwrap().len(), 1);

    let done = h.engine.act(instance.id, FINANCE_A, &approve("paid")).unwrap();
    assert_eq!(done.status, InstanceStatus::Approved);
}

#[test]
fn optional_node_without_approvers_is_skipped_with_system_record() {
    let h = harness();
    let mut optional = NodeSpec::approval(
        2,
        "retired reviewer",
        ApproverBinding::users([RETIRED]),
        ApprovalMode::Single,
    );
    optional.is_required = false;
    let nodes = vec![
        NodeSpec::start(1),
        optional,
        NodeSpec::approval(3, "finance", ApproverBinding::users([FINANCE_A]), ApprovalMode::Single),
        NodeSpec::end(4),
    ];
    let spec = template("optional_skip", nodes);
    let published = publish(&h.engine, &spec);

    let instance = h.engine.start_instance(&spec.code, contract(3), APPLICANT, "").unwrap();
    assert_eq!(instance.current_node, published.node_at(3).map(|node| node.id));
    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, RecordKind::System);
    assert_eq!(records[0].result, RecordResult::Approved);
    assert_eq!(records[0].approver, None);
}

#[test]
fn required_node_without_approvers_aborts_start() {
    let h = harness();
    let spec = template("nobody_home", single_approver_nodes(RETIRED));
    publish(&h.engine, &spec);

    let err = h.engine.start_instance(&spec.code, contract(4), APPLICANT, "").unwrap_err();
    assert_eq!(
        err,
        WorkflowError::ApproverNotResolvable {
            sequence: 2
        }
    );
    assert!(h.engine.get_history(&contract(4)).unwrap().is_empty());
}

#[test]
fn failing_custom_resolver_aborts_start_even_on_optional_node() {
    let mut h = harness();
    h.engine.register_custom_resolver(
        "legal_pool",
        |_: &ApprovalInstance, _: &ApprovalNode| -> Result<Vec<UserId>, CallbackError> {
            Err(CallbackError::new("legal service unavailable"))
        },
    );
    let mut optional = NodeSpec::approval(
        2,
        "legal pool",
        ApproverBinding::custom("legal_pool"),
        ApprovalMode::Single,
    );
    optional.is_required = false;
    let nodes = vec![
        NodeSpec::start(1),
        optional,
        NodeSpec::approval(3, "finance", ApproverBinding::users([FINANCE_A]), ApprovalMode::Single),
        NodeSpec::end(4),
    ];
    let spec = template("legal_pool_review", nodes);
    publish(&h.engine, &spec);

    let err = h.engine.start_instance(&spec.code, contract(5), APPLICANT, "").unwrap_err();
    assert_eq!(
        err,
        WorkflowError::ResolverFailed {
            tag: "legal_pool".to_string(),
            message: "legal service unavailable".to_string(),
        }
    );
    assert!(h.engine.get_history(&contract(5)).unwrap().is_empty());
    assert!(h.sink.events().is_empty());
}

#[test]
fn inactive_role_contributes_no_approvers() {
    let mut snapshot = directory_snapshot();
    snapshot["roles"][1]["active"] = false.into();
    let h = harness_on(directory_from(&snapshot), WorkflowConfig::default());
    let nodes = vec![
        NodeSpec::start(1),
        NodeSpec::approval(
            2,
            "finance",
            ApproverBinding::roles([RoleCode::new("finance")]),
            ApprovalMode::Any,
        ),
        NodeSpec::end(3),
    ];
    let spec = template("finance_by_role", nodes);
    publish(&h.engine, &spec);

    let err = h.engine.start_instance(&spec.code, contract(6), APPLICANT, "").unwrap_err();
    assert_eq!(
        err,
        WorkflowError::ApproverNotResolvable {
            sequence: 2
        }
    );
    assert!(h.engine.list_pending_for(FINANCE_A).unwrap().is_empty());
}

#[test]
fn inactive_applicant_cannot_start_instances() {
    let h = harness();
    let spec = template("retired_applicant", single_approver_nodes(FINANCE_A));
    publish(&h.engine, &spec);

    let err = h.engine.start_instance(&spec.code, contract(7), RETIRED, "").unwrap_err();
    assert_eq!(err, WorkflowError::UnknownUser(RETIRED));
    assert!(h.engine.get_history(&contract(7)).unwrap().is_empty());
}

// ============================================================================
// SECTION: Transfers
// ============================================================================

#[test]
fn transfer_hands_record_to_recipient_who_can_complete() {
    let h = harness();
    let spec = template("transfer_flow", single_approver_nodes(FINANCE_A));
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(5), APPLICANT, "").unwrap();

    h.engine.act(instance.id, FINANCE_A, &transfer(FINANCE_B, "vacation")).unwrap();
    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].result, RecordResult::Transferred);
    assert_eq!(records[0].transferred_to, Some(FINANCE_B));
    assert_eq!(records[0].comment, "vacation");
    assert_eq!(records[1].approver, Some(FINANCE_B));
    assert_eq!(records[1].result, RecordResult::Pending);
    assert_eq!(records[1].transferred_from, Some(records[0].id));
    assert_eq!(records[1].transfer_hops, 1);
    assert_eq!(records[1].node_id, records[0].node_id);

    let stale = h.engine.act(instance.id, FINANCE_A, &approve("back")).unwrap_err();
    assert_eq!(stale, WorkflowError::NodeAlreadyResolved(instance.id));

    let done = h.engine.act(instance.id, FINANCE_B, &approve("covered")).unwrap();
    assert_eq!(done.status, InstanceStatus::Approved);
}

#[test]
fn transfer_chain_is_bounded() {
    let h = harness_with(WorkflowConfig {
        max_transfer_hops: 2,
        ..WorkflowConfig::default()
    });
    let spec = template("bounded_transfer", single_approver_nodes(FINANCE_A));
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(6), APPLICANT, "").unwrap();

    h.engine.act(instance.id, FINANCE_A, &transfer(FINANCE_B, "one")).unwrap();
    h.engine.act(instance.id, FINANCE_B, &transfer(FINANCE_C, "two")).unwrap();
    let err = h.engine.act(instance.id, FINANCE_C, &transfer(FINANCE_D, "three")).unwrap_err();
    assert_eq!(
        err,
        WorkflowError::TransferChainExceeded {
            max: 2
        }
    );
    let pending: Vec<_> = h
        .engine
        .records(instance.id)
        .unwrap()
        .into_iter()
        .filter(|record| record.is_pending())
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].approver, Some(FINANCE_C));
}

#[test]
fn transfer_rejects_inactive_and_duplicate_recipients() {
    let h = harness();
    let nodes = vec![
        NodeSpec::start(1),
        NodeSpec::approval(2, "pair", ApproverBinding::users([FINANCE_A, FINANCE_B]), ApprovalMode::All),
        NodeSpec::end(3),
    ];
    let spec = template("transfer_guards", nodes);
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(8), APPLICANT, "").unwrap();

    let inactive = h.engine.act(instance.id, FINANCE_A, &transfer(RETIRED, "")).unwrap_err();
    assert_eq!(inactive, WorkflowError::UnknownUser(RETIRED));
    let duplicate = h.engine.act(instance.id, FINANCE_A, &transfer(FINANCE_B, "")).unwrap_err();
    assert!(matches!(duplicate, WorkflowError::InvalidRequest(_)));
    let own = h.engine.act(instance.id, FINANCE_A, &transfer(FINANCE_A, "")).unwrap_err();
    assert!(matches!(own, WorkflowError::InvalidRequest(_)));
}

// ============================================================================
// SECTION: Policy Guards
// ============================================================================

#[test]
fn node_policy_blocks_reject_and_transfer() {
    let h = harness();
    let mut strict = NodeSpec::approval(2, "strict", ApproverBinding::users([FINANCE_A]), ApprovalMode::Single);
    strict.can_reject = false;
    strict.can_transfer = false;
    let spec = template("strict_node", vec![NodeSpec::start(1), strict, NodeSpec::end(3)]);
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(9), APPLICANT, "").unwrap();

    let err = h.engine.act(instance.id, FINANCE_A, &reject("no")).unwrap_err();
    assert!(matches!(err, WorkflowError::ActionNotAllowed(_)));
    let err = h.engine.act(instance.id, FINANCE_A, &transfer(FINANCE_B, "")).unwrap_err();
    assert!(matches!(err, WorkflowError::ActionNotAllowed(_)));
}

#[test]
fn outsiders_and_late_actors_are_refused() {
    let h = harness();
    let spec = template("late_actor", single_approver_nodes(FINANCE_A));
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(10), APPLICANT, "").unwrap();

    let outsider = h.engine.act(instance.id, STAFF, &approve("me too")).unwrap_err();
    assert!(matches!(outsider, WorkflowError::PermissionDenied(_)));

    h.engine.act(instance.id, FINANCE_A, &approve("done")).unwrap();
    let late = h.engine.act(instance.id, FINANCE_A, &approve("again")).unwrap_err();
    assert_eq!(late, WorkflowError::NodeAlreadyResolved(instance.id));
    assert_eq!(h.engine.records(instance.id).unwrap().len(), 1);
}

#[test]
fn second_open_instance_for_same_target_is_refused() {
    let h = harness();
    let spec = template("one_at_a_time", single_approver_nodes(FINANCE_A));
    publish(&h.engine, &spec);
    let first = h.engine.start_instance(&spec.code, contract(11), APPLICANT, "").unwrap();

    let err = h.engine.start_instance(&spec.code, contract(11), APPLICANT, "").unwrap_err();
    assert!(matches!(err, WorkflowError::ConcurrentInstance { .. }));
    h.engine.start_instance(&spec.code, contract(12), APPLICANT, "").unwrap();

    h.engine.act(first.id, FINANCE_A, &approve("ok")).unwrap();
    let again = h.engine.start_instance(&spec.code, contract(11), APPLICANT, "").unwrap();
    assert_eq!(again.instance_number, "AP202601010000000003");
    let history: Vec<InstanceStatus> =
        h.engine.get_history(&contract(11)).unwrap().iter().map(|found| found.status).collect();
    assert_eq!(history, vec![InstanceStatus::Approved, InstanceStatus::Pending]);
}

#[test]
fn inactive_template_cannot_start_instances() {
    let h = harness();
    let spec = template("drafted", single_approver_nodes(FINANCE_A));
    h.engine.register_template(ledgerflow_core::Principal::System, &spec).unwrap();
    let err = h.engine.start_instance(&spec.code, contract(13), APPLICANT, "").unwrap_err();
    assert_eq!(err, WorkflowError::TemplateInactive(spec.code.clone()));
}

// ============================================================================
// SECTION: Withdraw and Cancel
// ============================================================================

#[test]
fn applicant_may_withdraw_before_any_approval() {
    let h = harness();
    let spec = template("withdrawable", single_approver_nodes(FINANCE_A));
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(20), APPLICANT, "").unwrap();

    let err = h.engine.act(instance.id, FINANCE_A, &Action::Withdraw).unwrap_err();
    assert!(matches!(err, WorkflowError::PermissionDenied(_)));

    let withdrawn = h.engine.act(instance.id, APPLICANT, &Action::Withdraw).unwrap();
    assert_eq!(withdrawn.status, InstanceStatus::Withdrawn);
    let records = h.engine.records(instance.id).unwrap();
    assert!(records.iter().all(|record| record.result == RecordResult::Withdrawn));
}

#[test]
fn withdrawal_is_blocked_after_a_human_approval() {
    let h = harness();
    let nodes = vec![
        NodeSpec::start(1),
        NodeSpec::approval(2, "first", ApproverBinding::users([FINANCE_A]), ApprovalMode::Single),
        NodeSpec::approval(3, "second", ApproverBinding::users([FINANCE_B]), ApprovalMode::Single),
        NodeSpec::end(4),
    ];
    let spec = template("sticky", nodes);
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(21), APPLICANT, "").unwrap();
    h.engine.act(instance.id, FINANCE_A, &approve("ok")).unwrap();

    let err = h.engine.act(instance.id, APPLICANT, &Action::Withdraw).unwrap_err();
    assert!(matches!(err, WorkflowError::WithdrawalNotAllowed(_)));
}

#[test]
fn cancel_requires_permission_and_reason() {
    let h = harness();
    let spec = template("cancellable", single_approver_nodes(FINANCE_A));
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(22), APPLICANT, "").unwrap();

    let missing_reason = h
        .engine
        .act(
            instance.id,
            ADMIN,
            &Action::Cancel {
                reason: "  ".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(missing_reason, WorkflowError::InvalidRequest(_)));

    let cancel = Action::Cancel {
        reason: "contract withdrawn by client".to_string(),
    };
    let denied = h.engine.act(instance.id, STAFF, &cancel).unwrap_err();
    assert!(matches!(denied, WorkflowError::PermissionDenied(_)));

    let cancelled = h.engine.act(instance.id, ADMIN, &cancel).unwrap();
    assert_eq!(cancelled.status, InstanceStatus::Cancelled);
    assert_eq!(cancelled.final_comment.as_deref(), Some("contract withdrawn by client"));
    let again = h.engine.act(instance.id, ADMIN, &cancel).unwrap_err();
    assert!(matches!(again, WorkflowError::ActionNotAllowed(_)));
}

// ============================================================================
// SECTION: Callbacks
// ============================================================================

#[test]
fn failing_callback_rolls_back_and_flags_instance() {
    let mut h = harness();
    h.engine.register_callback(
        "contract",
        "fragile",
        |_: &ApprovalInstance, _: InstanceStatus| -> Result<(), CallbackError> {
            Err(CallbackError::new("ledger offline"))
        },
    );
    let spec = template("fragile", single_approver_nodes(FINANCE_A));
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(30), APPLICANT, "").unwrap();

    let err = h.engine.act(instance.id, FINANCE_A, &approve("ok")).unwrap_err();
    assert_eq!(
        err,
        WorkflowError::BusinessCallbackFailed {
            instance_id: instance.id,
            message: "ledger offline".to_string(),
        }
    );
    let reloaded = h.engine.instance(instance.id).unwrap();
    assert_eq!(reloaded.status, InstanceStatus::Pending);
    assert_eq!(
        reloaded.flag,
        Some(InstanceFlag::CallbackFailed {
            message: "ledger offline".to_string(),
        })
    );
    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records[0].result, RecordResult::Pending);

    let cleared = h.engine.clear_flag(ledgerflow_core::Principal::User(ADMIN), instance.id).unwrap();
    assert_eq!(cleared.flag, None);
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[test]
fn concurrent_approvals_on_single_node_resolve_once() {
    let h = harness();
    let nodes = vec![
        NodeSpec::start(1),
        NodeSpec::approval(2, "either", ApproverBinding::users([FINANCE_A, FINANCE_B]), ApprovalMode::Single),
        NodeSpec::end(3),
    ];
    let spec = template("race", nodes);
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(40), APPLICANT, "").unwrap();

    let engine = &h.engine;
    let results: Vec<Result<ApprovalInstance, WorkflowError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = [FINANCE_A, FINANCE_B]
            .into_iter()
            .map(|actor| scope.spawn(move || engine.act(instance.id, actor, &approve("mine"))))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(failure, WorkflowError::NodeAlreadyResolved(instance.id));

    let records = h.engine.records(instance.id).unwrap();
    let approved = records.iter().filter(|record| record.result == RecordResult::Approved).count();
    assert_eq!(approved, 1);
    assert_eq!(h.engine.instance(instance.id).unwrap().status, InstanceStatus::Approved);
}
