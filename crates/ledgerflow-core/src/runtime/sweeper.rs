// crates/ledgerflow-core/src/runtime/sweeper.rs
// ============================================================================
// Module: Ledgerflow Timeout Sweeper
// Description: Periodic scan applying template timeout actions.
// Purpose: Remind, auto-decide, or escalate approval records past their deadline.
// Dependencies: crate::{core, interfaces, runtime}, serde, tracing
// ============================================================================

//! ## Overview
//! A sweep reads overdue pending records once, earliest deadline first, then
//! handles each record in its own unit of work. A failure on one record is
//! counted and logged; the sweep continues with the next record. Each handled
//! record is stamped so later sweeps skip it; an escalated record hands off to
//! a fresh record that carries its own deadline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::interfaces::Clock;
use crate::interfaces::Directory;
use crate::interfaces::NotificationSink;
use crate::interfaces::WorkflowStore;
use crate::runtime::engine::TimeoutOutcome;
use crate::runtime::engine::WorkflowEngine;
use crate::runtime::engine::WorkflowError;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default per-run record cap.
pub const DEFAULT_MAX_RECORDS_PER_RUN: usize = 200;

/// Sweeper limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Maximum records handled in one run.
    pub max_records_per_run: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            max_records_per_run: DEFAULT_MAX_RECORDS_PER_RUN,
        }
    }
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Overdue records read.
    pub scanned: usize,
    /// Reminders emitted.
    pub notified: usize,
    /// Records approved by the system.
    pub auto_approved: usize,
    /// Records rejected by the system.
    pub auto_rejected: usize,
    /// Records escalated to a leader.
    pub escalated: usize,
    /// Records already handled by someone else.
    pub skipped: usize,
    /// Records whose handling failed.
    pub failed: usize,
}

// ============================================================================
// SECTION: Sweeper
// ============================================================================

/// Applies timeout actions through a workflow engine.
pub struct TimeoutSweeper<'a, S, D, N, C> {
    /// Engine whose records are swept.
    engine: &'a WorkflowEngine<S, D, N, C>,
    /// Sweeper limits.
    config: SweeperConfig,
}

impl<'a, S, D, N, C> TimeoutSweeper<'a, S, D, N, C>
where
    S: WorkflowStore,
    D: Directory,
    N: NotificationSink,
    C: Clock,
{
    /// Creates a sweeper over an engine.
    #[must_use]
    pub const fn new(engine: &'a WorkflowEngine<S, D, N, C>, config: SweeperConfig) -> Self {
        Self {
            engine,
            config,
        }
    }

    /// Runs one sweep at the engine clock's current time.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] only when the overdue scan itself fails;
    /// per-record failures are counted in the report.
    pub fn run_once(&self) -> Result<SweepReport, WorkflowError> {
        let now = self.engine.now();
        let candidates = self.engine.overdue_records(now, self.config.max_records_per_run)?;
        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };
        for candidate in &candidates {
            match self.engine.apply_timeout(candidate, now) {
                Ok(TimeoutOutcome::Notified) => report.notified += 1,
                Ok(TimeoutOutcome::AutoApproved) => report.auto_approved += 1,
                Ok(TimeoutOutcome::AutoRejected) => report.auto_rejected += 1,
                Ok(TimeoutOutcome::Escalated) => report.escalated += 1,
                Ok(TimeoutOutcome::Skipped) => report.skipped += 1,
                // The decision committed; only the follow-on condition stuck.
                Err(WorkflowError::ConditionUnmatched {
                    ..
                }) => report.auto_approved += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        record_id = %candidate.id,
                        instance_id = %candidate.instance_id,
                        error = %err,
                        "timeout handling failed"
                    );
                }
            }
        }
        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                notified = report.notified,
                auto_approved = report.auto_approved,
                auto_rejected = report.auto_rejected,
                escalated = report.escalated,
                failed = report.failed,
                "timeout sweep finished"
            );
        }
        Ok(report)
    }
}
