// crates/ledgerflow-core/tests/sweeper.rs
// ============================================================================
// Module: Timeout Sweeper Tests
// Description: Reminder, auto-decision, and escalation handling of overdue records.
// ============================================================================
//! ## Overview
//! Each test publishes a template with a short timeout, advances the manual
//! clock past the due time, and runs one sweep.

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
use common::FINANCE_A;
use common::Harness;
use common::OPS;
use common::contract;
use common::harness;
use common::publish;
use common::record_callbacks;
use common::template;
use ledgerflow_core::ApprovalInstance;
use ledgerflow_core::ApprovalMode;
use ledgerflow_core::ApproverBinding;
use ledgerflow_core::InstanceStatus;
use ledgerflow_core::NodeSpec;
use ledgerflow_core::NotificationType;
use ledgerflow_core::RecordKind;
use ledgerflow_core::RecordResult;
use ledgerflow_core::SweepReport;
use ledgerflow_core::SweeperConfig;
use ledgerflow_core::TimeoutAction;
use ledgerflow_core::TimeoutSweeper;
use ledgerflow_core::UserId;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Publishes a one-approver template with a two-hour timeout and starts it.
fn start_timed(h: &Harness, code: &str, approver: UserId, action: TimeoutAction) -> ApprovalInstance {
    let mut spec = template(code, vec![
        NodeSpec::start(1),
        NodeSpec::approval(2, "review", ApproverBinding::users([approver]), ApprovalMode::Single),
        NodeSpec::end(3),
    ]);
    spec.default_timeout_hours = Some(2);
    spec.timeout_action = action;
    publish(&h.engine, &spec);
    h.engine.start_instance(&spec.code, contract(1), APPLICANT, "").unwrap()
}

fn sweep(h: &Harness) -> SweepReport {
    TimeoutSweeper::new(&h.engine, SweeperConfig::default()).run_once().unwrap()
}

fn timeout_events(h: &Harness) -> usize {
    h.sink.events().iter().filter(|event| event.event_type == NotificationType::Timeout).count()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn nothing_is_due_before_the_deadline() {
    let h = harness();
    start_timed(&h, "patient", FINANCE_A, TimeoutAction::Notify);
    h.clock.advance_hours(1);
    assert_eq!(sweep(&h), SweepReport::default());
}

#[test]
fn notify_reminds_once_per_record() {
    let h = harness();
    let instance = start_timed(&h, "reminder", FINANCE_A, TimeoutAction::Notify);
    h.clock.advance_hours(3);

    let first = sweep(&h);
    assert_eq!(first.scanned, 1);
    assert_eq!(first.notified, 1);
    assert_eq!(timeout_events(&h), 1);
    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records[0].result, RecordResult::Pending);
    assert!(records[0].last_reminder_at.is_some());

    h.clock.advance_hours(5);
    let second = sweep(&h);
    assert_eq!(second.scanned, 0);
    assert_eq!(timeout_events(&h), 1);
}

#[test]
fn auto_approve_completes_instance_with_system_decision() {
    let mut h = harness();
    let calls = record_callbacks(&mut h.engine, "auto_yes");
    let instance = start_timed(&h, "auto_yes", FINANCE_A, TimeoutAction::AutoApprove);
    h.clock.advance_hours(2);

    let report = sweep(&h);
    assert_eq!(report.auto_approved, 1);
    let done = h.engine.instance(instance.id).unwrap();
    assert_eq!(done.status, InstanceStatus::Approved);
    let record = &h.engine.records(instance.id).unwrap()[0];
    assert_eq!(record.result, RecordResult::Approved);
    assert!(record.system_decided);
    assert_eq!(record.kind, RecordKind::Approver);
    assert_eq!(*calls.lock().unwrap(), vec![(instance.id.get(), InstanceStatus::Approved)]);
}

#[test]
fn auto_reject_terminates_instance() {
    let h = harness();
    let instance = start_timed(&h, "auto_no", FINANCE_A, TimeoutAction::AutoReject);
    h.clock.advance_hours(2);

    let report = sweep(&h);
    assert_eq!(report.auto_rejected, 1);
    assert_eq!(h.engine.instance(instance.id).unwrap().status, InstanceStatus::Rejected);
}

#[test]
fn escalate_transfers_to_department_leader() {
    let h = harness();
    let instance = start_timed(&h, "escalating", FINANCE_A, TimeoutAction::Escalate);
    h.clock.advance_hours(2);

    let report = sweep(&h);
    assert_eq!(report.escalated, 1);
    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].result, RecordResult::Transferred);
    assert!(records[0].system_decided);
    assert_eq!(records[1].approver, Some(ADMIN));
    assert_eq!(records[1].transfer_hops, 1);
    assert_eq!(h.engine.list_pending_for(ADMIN).unwrap().len(), 1);
    assert_eq!(timeout_events(&h), 1);
}

#[test]
fn escalation_walks_up_past_leaderless_departments() {
    let h = harness();
    let instance = start_timed(&h, "walk_up", OPS, TimeoutAction::Escalate);
    h.clock.advance_hours(2);

    assert_eq!(sweep(&h).escalated, 1);
    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records[1].approver, Some(ADMIN));
}

#[test]
fn escalation_without_a_leader_falls_back_to_reminder() {
    let h = harness();
    let instance = start_timed(&h, "top_of_chain", ADMIN, TimeoutAction::Escalate);
    h.clock.advance_hours(2);

    let report = sweep(&h);
    assert_eq!(report.escalated, 0);
    assert_eq!(report.notified, 1);
    let records = h.engine.records(instance.id).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].is_pending());
}

#[test]
fn per_run_limit_caps_the_scan() {
    let h = harness();
    let mut spec = template("bulk", vec![
        NodeSpec::start(1),
        NodeSpec::approval(2, "review", ApproverBinding::users([FINANCE_A]), ApprovalMode::Single),
        NodeSpec::end(3),
    ]);
    spec.default_timeout_hours = Some(1);
    publish(&h.engine, &spec);
    for id in 1..=3 {
        h.engine.start_instance(&spec.code, contract(id), APPLICANT, "").unwrap();
    }
    h.clock.advance_hours(2);

    let sweeper = TimeoutSweeper::new(&h.engine, SweeperConfig {
        max_records_per_run: 2,
    });
    assert_eq!(sweeper.run_once().unwrap().notified, 2);
    assert_eq!(sweeper.run_once().unwrap().notified, 1);
    assert_eq!(sweeper.run_once().unwrap().scanned, 0);
}
