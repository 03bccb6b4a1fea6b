// crates/ledgerflow-core/src/runtime/modes.rs
// ============================================================================
// Module: Ledgerflow Approval Modes
// Description: Node completion reducers over approval record results.
// Purpose: Decide whether an approval node is satisfied, rejected, or waiting.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Each approval mode is a pure reducer over the results of a node's live
//! records. Transferred and withdrawn records are not live: a transfer hands
//! the vote to its successor record, and withdrawn records never vote.
//!
//! Rejection short-circuits before any mode is consulted, so one rejection
//! resolves the node as rejected in every mode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::ApprovalMode;
use crate::core::RecordResult;

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// Completion state of an approval node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeVerdict {
    /// More decisions are needed.
    Waiting,
    /// The node is satisfied.
    Approved,
    /// The node, and therefore the instance, is rejected.
    Rejected,
}

/// Reduces record results to a node verdict.
#[must_use]
pub fn node_verdict(mode: ApprovalMode, results: &[RecordResult]) -> NodeVerdict {
    let live: Vec<RecordResult> = results
        .iter()
        .copied()
        .filter(|result| {
            matches!(result, RecordResult::Pending | RecordResult::Approved | RecordResult::Rejected)
        })
        .collect();
    if live.contains(&RecordResult::Rejected) {
        return NodeVerdict::Rejected;
    }
    let approved = live.iter().filter(|result| **result == RecordResult::Approved).count();
    let satisfied = match mode {
        ApprovalMode::Single | ApprovalMode::Any => approved > 0,
        ApprovalMode::All => !live.is_empty() && approved == live.len(),
        ApprovalMode::Majority => approved * 2 > live.len(),
    };
    if satisfied { NodeVerdict::Approved } else { NodeVerdict::Waiting }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
