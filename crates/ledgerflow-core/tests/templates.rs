// crates/ledgerflow-core/tests/templates.rs
// ============================================================================
// Module: Template Lifecycle Tests
// Description: Registration, activation, structure locks, and lookup.
// ============================================================================
//! ## Overview
//! Exercises template management through the engine, including the guard on
//! template edits and the lock on structure while instances are open.

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
use common::FINANCE_B;
use common::STAFF;
use common::contract;
use common::harness;
use common::publish;
use common::template;
use ledgerflow_core::Action;
use ledgerflow_core::ApprovalMode;
use ledgerflow_core::ApproverBinding;
use ledgerflow_core::ContentTypeCode;
use ledgerflow_core::InstanceStatus;
use ledgerflow_core::NodeSpec;
use ledgerflow_core::NodeType;
use ledgerflow_core::Predicate;
use ledgerflow_core::Principal;
use ledgerflow_core::SpecError;
use ledgerflow_core::TemplateCode;
use ledgerflow_core::TemplateDetails;
use ledgerflow_core::TemplateStatus;
use ledgerflow_core::WorkflowError;
use serde_json::json;

fn nodes_for(approver: ledgerflow_core::UserId) -> Vec<NodeSpec> {
    vec![
        NodeSpec::start(1),
        NodeSpec::approval(2, "review", ApproverBinding::users([approver]), ApprovalMode::Single),
        NodeSpec::end(3),
    ]
}

#[test]
fn template_management_requires_grant() {
    let h = harness();
    let spec = template("guarded", nodes_for(FINANCE_A));

    let denied = h.engine.register_template(Principal::User(STAFF), &spec).unwrap_err();
    assert!(matches!(denied, WorkflowError::PermissionDenied(_)));

    let draft = h.engine.register_template(Principal::User(ADMIN), &spec).unwrap();
    assert_eq!(draft.status, TemplateStatus::Draft);
    assert_eq!(draft.nodes.len(), 3);

    let denied = h.engine.activate_template(Principal::User(STAFF), &spec.code).unwrap_err();
    assert!(matches!(denied, WorkflowError::PermissionDenied(_)));
    let active = h.engine.activate_template(Principal::User(ADMIN), &spec.code).unwrap();
    assert_eq!(active.status, TemplateStatus::Active);
}

#[test]
fn invalid_structures_are_rejected_before_storage() {
    let h = harness();
    let no_end = template("no_end", vec![NodeSpec::start(1), NodeSpec::approval(
        2,
        "review",
        ApproverBinding::users([FINANCE_A]),
        ApprovalMode::Single,
    )]);
    let err = h.engine.register_template(Principal::System, &no_end).unwrap_err();
    assert_eq!(err, WorkflowError::InvalidTemplate(SpecError::MissingEnd));

    let parallel = template("parallel", vec![
        NodeSpec::start(1),
        NodeSpec::new(2, "fan out", NodeType::Parallel),
        NodeSpec::end(3),
    ]);
    let err = h.engine.register_template(Principal::System, &parallel).unwrap_err();
    assert_eq!(
        err,
        WorkflowError::InvalidTemplate(SpecError::UnsupportedNodeType {
            sequence: 2,
            node_type: NodeType::Parallel,
        })
    );
    assert!(h.engine.list_templates(None).unwrap().is_empty());
}

#[test]
fn active_template_cannot_be_reregistered() {
    let h = harness();
    let spec = template("stable", nodes_for(FINANCE_A));
    publish(&h.engine, &spec);

    let err = h.engine.register_template(Principal::System, &spec).unwrap_err();
    assert_eq!(err, WorkflowError::TemplateActive(spec.code.clone()));
}

#[test]
fn open_instances_lock_structure_but_not_details() {
    let h = harness();
    let spec = template("locked", nodes_for(FINANCE_A));
    publish(&h.engine, &spec);
    let instance = h.engine.start_instance(&spec.code, contract(1), APPLICANT, "").unwrap();

    let inactive = h.engine.deactivate_template(Principal::System, &spec.code).unwrap();
    assert_eq!(inactive.status, TemplateStatus::Inactive);

    let replacement = template("locked", nodes_for(FINANCE_B));
    let err = h.engine.register_template(Principal::System, &replacement).unwrap_err();
    assert_eq!(
        err,
        WorkflowError::StructureLocked {
            code: spec.code.clone(),
            open: 1,
        }
    );
    let err = h.engine.replace_template_nodes(Principal::System, &spec.code, &replacement.nodes).unwrap_err();
    assert!(matches!(err, WorkflowError::StructureLocked { open: 1, .. }));

    let renamed = h
        .engine
        .update_template_details(Principal::System, &spec.code, &TemplateDetails {
            name: Some("Locked contract review".to_string()),
            description: None,
            category: Some("legal".to_string()),
        })
        .unwrap();
    assert_eq!(renamed.name, "Locked contract review");
    assert_eq!(renamed.category, "legal");

    // The open instance keeps running on a retired template.
    let done = h.engine.act(instance.id, FINANCE_A, &Action::Approve {
        comment: String::new(),
    });
    assert_eq!(done.unwrap().status, InstanceStatus::Approved);

    let rebuilt = h.engine.replace_template_nodes(Principal::System, &spec.code, &replacement.nodes).unwrap();
    let approvers = rebuilt.node_at(2).and_then(|node| node.approvers.clone()).unwrap();
    assert_eq!(approvers.users, vec![FINANCE_B]);
}

#[test]
fn node_replacement_is_validated_before_storage() {
    let h = harness();
    let spec = template("rebuilt", nodes_for(FINANCE_A));
    h.engine.register_template(Principal::System, &spec).unwrap();

    let mut headless = nodes_for(FINANCE_B);
    headless.remove(0);
    let err = h.engine.replace_template_nodes(Principal::System, &spec.code, &headless).unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTemplate(_)));

    let stored = h.engine.template(&spec.code).unwrap();
    let approvers = stored.node_at(2).and_then(|node| node.approvers.clone()).unwrap();
    assert_eq!(approvers.users, vec![FINANCE_A]);
}

#[test]
fn blank_template_name_is_refused() {
    let h = harness();
    let spec = template("named", nodes_for(FINANCE_A));
    publish(&h.engine, &spec);
    let err = h
        .engine
        .update_template_details(Principal::System, &spec.code, &TemplateDetails {
            name: Some("   ".to_string()),
            description: None,
            category: None,
        })
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidRequest(_)));
}

#[test]
fn lookups_respect_status_and_form_filter() {
    let h = harness();
    let general = template("general", nodes_for(FINANCE_A));
    let mut large = template("large_only", nodes_for(FINANCE_B));
    large.form_filter =
        Some(Predicate::parse(&json!({"field": "amount", "op": ">=", "value": 1000})).unwrap());
    let draft = template("still_draft", nodes_for(FINANCE_A));
    publish(&h.engine, &general);
    publish(&h.engine, &large);
    h.engine.register_template(Principal::System, &draft).unwrap();

    let missing = h.engine.get_active_template(&TemplateCode::new("nope")).unwrap_err();
    assert_eq!(missing, WorkflowError::TemplateNotFound(TemplateCode::new("nope")));
    let not_active = h.engine.get_active_template(&draft.code).unwrap_err();
    assert_eq!(not_active, WorkflowError::TemplateNotFound(draft.code.clone()));
    assert_eq!(h.engine.get_active_template(&general.code).unwrap().code, general.code);

    assert_eq!(h.engine.list_templates(None).unwrap().len(), 3);
    assert_eq!(h.engine.list_templates(Some(TemplateStatus::Active)).unwrap().len(), 2);

    let contract_type = ContentTypeCode::new("contract");
    let codes = |amount: i64| -> Vec<TemplateCode> {
        h.engine
            .list_templates_for(&contract_type, &json!({"amount": amount}))
            .unwrap()
            .into_iter()
            .map(|found| found.code)
            .collect()
    };
    assert_eq!(codes(10), vec![general.code.clone()]);
    assert_eq!(codes(5_000), vec![general.code.clone(), large.code.clone()]);
    assert!(
        h.engine
            .list_templates_for(&ContentTypeCode::new("invoice"), &json!({}))
            .unwrap()
            .is_empty()
    );
}
