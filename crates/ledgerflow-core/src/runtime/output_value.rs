// crates/ledgerflow-core/src/runtime/output_value.rs
// ============================================================================
// Module: Ledgerflow Output-Value Engine
// Description: Catalog maintenance, event recording, and summarization.
// Purpose: Turn project business events into auditable output-value records.
// Dependencies: crate::{core, interfaces, runtime}, bigdecimal, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! Business modules call [`OutputValueEngine::record_event`] optimistically
//! whenever something happens on a project. The engine looks the event up by
//! code (then by trigger condition), reads the effective base amount, resolves
//! the responsible user, and writes at most one non-voided record per
//! `(project, event)` slot. Anything that prevents recording is a skip reason
//! logged at warn level, never an error.
//!
//! Records capture percentages and the base amount by value, so catalog edits
//! never change history.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use bigdecimal::Zero;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::core::CatalogSpec;
use crate::core::DateRange;
use crate::core::EventId;
use crate::core::NewOutputValueRecord;
use crate::core::NotificationEvent;
use crate::core::OutputValueRecord;
use crate::core::OutputValueRecordId;
use crate::core::PermissionCode;
use crate::core::ProjectId;
use crate::core::ProjectSummary;
use crate::core::ProjectView;
use crate::core::RecordEventOptions;
use crate::core::RecordOutcome;
use crate::core::RecordStatus;
use crate::core::RoleCode;
use crate::core::SettlementFigures;
use crate::core::SkipReason;
use crate::core::SpecError;
use crate::core::StageNode;
use crate::core::UserId;
use crate::core::UserSummary;
use crate::core::permissions::CATALOG_MANAGE;
use crate::core::permissions::RECORD_CONFIRM;
use crate::core::permissions::RECORD_VOID;
use crate::interfaces::Clock;
use crate::interfaces::Directory;
use crate::interfaces::DirectoryError;
use crate::interfaces::NotificationSink;
use crate::interfaces::OutputValueStore;
use crate::interfaces::OutputValueTx;
use crate::interfaces::RoleResolver;
use crate::interfaces::StoreError;
use crate::runtime::guard::PermissionGuard;
use crate::runtime::guard::Principal;
use crate::runtime::roles::RoleResolverRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Output-value engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputValueError {
    /// Catalog failed validation.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(#[from] SpecError),
    /// Event code unknown.
    #[error("event not found: {0}")]
    EventNotFound(String),
    /// Record id unknown.
    #[error("output-value record not found: {0}")]
    RecordNotFound(OutputValueRecordId),
    /// Status change not permitted from the current status.
    #[error("record {record_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Record id.
        record_id: OutputValueRecordId,
        /// Current status.
        from: RecordStatus,
        /// Requested status.
        to: RecordStatus,
    },
    /// Request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Actor lacks the required grant.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Directory lookup failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Output-value calculation engine.
pub struct OutputValueEngine<S, D, N, C> {
    /// Output-value store.
    store: S,
    /// Org directory.
    directory: D,
    /// Notification sink.
    sink: N,
    /// Time source.
    clock: C,
    /// Responsible-role strategies.
    roles: RoleResolverRegistry,
    /// Permission checks.
    guard: PermissionGuard,
}

impl<S, D, N, C> OutputValueEngine<S, D, N, C>
where
    S: OutputValueStore,
    D: Directory,
    N: NotificationSink,
    C: Clock,
{
    /// Creates an engine with the default role table.
    #[must_use]
    pub fn new(store: S, directory: D, sink: N, clock: C) -> Self {
        Self {
            store,
            directory,
            sink,
            clock,
            roles: RoleResolverRegistry::with_defaults(),
            guard: PermissionGuard::default(),
        }
    }

    /// Replaces the permission guard.
    #[must_use]
    pub fn with_guard(mut self, guard: PermissionGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Registers or replaces a responsible-role strategy.
    pub fn register_role_resolver(
        &mut self,
        role: impl Into<RoleCode>,
        resolver: impl RoleResolver + 'static,
    ) {
        self.roles.register(role.into(), resolver);
    }

    /// Returns the responsible-role strategies.
    #[must_use]
    pub const fn roles(&self) -> &RoleResolverRegistry {
        &self.roles
    }

    /// Returns the store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------------

    /// Validates and upserts a catalog tree by code in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::InvalidCatalog`] on validation failure and
    /// [`OutputValueError::PermissionDenied`] without the catalog grant.
    pub fn load_catalog(
        &self,
        principal: Principal,
        spec: &CatalogSpec,
    ) -> Result<Vec<StageNode>, OutputValueError> {
        self.authorize(principal, CATALOG_MANAGE)?;
        spec.validate()?;
        let catalog: Result<Vec<StageNode>, OutputValueError> =
            self.store.output_value_transaction(|tx| {
                for stage_spec in &spec.stages {
                    let stage = tx.upsert_stage(stage_spec)?;
                    for milestone_spec in &stage_spec.milestones {
                        let milestone = tx.upsert_milestone(stage.id, milestone_spec)?;
                        for event_spec in &milestone_spec.events {
                            tx.upsert_event(milestone.id, event_spec)?;
                        }
                    }
                }
                Ok(tx.catalog()?)
            });
        let catalog = catalog?;
        info!(stages = catalog.len(), "output-value catalog loaded");
        Ok(catalog)
    }

    /// Returns the catalog ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::Store`] when the read fails.
    pub fn catalog(&self) -> Result<Vec<StageNode>, OutputValueError> {
        self.store.output_value_transaction(|tx| Ok(tx.catalog()?))
    }

    /// Enables or disables an event.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::EventNotFound`] for unknown codes.
    pub fn set_event_active(
        &self,
        principal: Principal,
        code: &str,
        active: bool,
    ) -> Result<(), OutputValueError> {
        self.authorize(principal, CATALOG_MANAGE)?;
        self.store.output_value_transaction(|tx| {
            if tx.set_event_active(code, active)? {
                Ok(())
            } else {
                Err(OutputValueError::EventNotFound(code.to_string()))
            }
        })?;
        info!(event = code, active, "output-value event toggled");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    /// Evaluates a business event and reports what happened.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::Store`] or [`OutputValueError::Directory`]
    /// when infrastructure fails; skips are reported in the outcome.
    pub fn evaluate_event(
        &self,
        project: &ProjectView,
        event_code: &str,
        options: &RecordEventOptions,
    ) -> Result<RecordOutcome, OutputValueError> {
        let now = self.clock.now();
        let outcome: Result<RecordOutcome, OutputValueError> =
            self.store.output_value_transaction(|tx| {
                let path = match tx.event_by_code(event_code)? {
                    Some(path) => Some(path),
                    None => match &options.trigger_condition {
                        Some(trigger) => tx.event_by_trigger(trigger)?,
                        None => None,
                    },
                };
                let Some(path) = path else {
                    return Ok(RecordOutcome::Skipped(SkipReason::EventNotFound {
                        key: options.trigger_condition.clone().unwrap_or_else(|| event_code.to_string()),
                    }));
                };
                if !path.is_active() {
                    return Ok(RecordOutcome::Skipped(SkipReason::EventInactive {
                        event_code: path.event.code,
                    }));
                }
                let base_amount_type = path.effective_base_type();
                let Some(base_amount) =
                    project.amount(base_amount_type).filter(|amount| **amount > BigDecimal::zero())
                else {
                    return Ok(RecordOutcome::Skipped(SkipReason::BaseAmountMissing {
                        base_amount_type,
                    }));
                };
                let responsible = match options.override_responsible {
                    Some(user) => Some(user),
                    None => self.roles.resolve(
                        project,
                        &path.event.responsible_role_code,
                        &self.directory,
                    )?,
                };
                let Some(responsible) = responsible else {
                    return Ok(RecordOutcome::Skipped(SkipReason::ResponsibleUnresolved {
                        role_code: path.event.responsible_role_code,
                    }));
                };
                if let Some(existing) = tx.active_record_for(project.id, path.event.id)? {
                    return Ok(RecordOutcome::Existing(existing));
                }
                let new = NewOutputValueRecord::capture(
                    project.id,
                    &path,
                    responsible,
                    base_amount.clone(),
                    now,
                );
                match tx.insert_output_record(new) {
                    Ok(record) => Ok(RecordOutcome::Created(record)),
                    Err(StoreError::Conflict(_)) => existing_or_conflict(tx, project.id, &path.event.code, path.event.id),
                    Err(err) => Err(err.into()),
                }
            });
        let outcome = outcome?;
        match &outcome {
            RecordOutcome::Created(record) => {
                info!(
                    record_id = %record.id,
                    project_id = %record.project_id,
                    event = %record.event_code,
                    value = %record.calculated_value,
                    "output-value recorded"
                );
                let event = NotificationEvent::for_output_record(
                    record.id,
                    vec![record.responsible_user],
                    now,
                    json!({
                        "project_id": record.project_id,
                        "event_code": record.event_code,
                        "calculated_value": record.calculated_value.to_string(),
                    }),
                );
                if let Err(err) = self.sink.dispatch(&event) {
                    warn!(record_id = %record.id, error = %err, "notification dispatch failed");
                }
            }
            RecordOutcome::Existing(record) => {
                info!(record_id = %record.id, event = %record.event_code, "output-value already recorded");
            }
            RecordOutcome::Skipped(reason) => {
                warn!(project_id = %project.id, event = event_code, reason = reason.label(), "output-value event skipped");
            }
        }
        Ok(outcome)
    }

    /// Records a business event; `None` when the event was skipped.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError`] only for infrastructure failures.
    pub fn record_event(
        &self,
        project: &ProjectView,
        event_code: &str,
        options: &RecordEventOptions,
    ) -> Result<Option<OutputValueRecord>, OutputValueError> {
        Ok(self.evaluate_event(project, event_code, options)?.into_record())
    }

    /// Moves a record from `calculated` to `confirmed`.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::InvalidTransition`] from any other status.
    pub fn confirm_record(
        &self,
        id: OutputValueRecordId,
        principal: Principal,
    ) -> Result<OutputValueRecord, OutputValueError> {
        self.authorize(principal, RECORD_CONFIRM)?;
        let now = self.clock.now();
        let record = self.transition(id, RecordStatus::Confirmed, |record| {
            record.confirmed_by = principal.user();
            record.confirmed_at = Some(now);
            record.updated_at = now;
        })?;
        info!(record_id = %record.id, "output-value record confirmed");
        Ok(record)
    }

    /// Voids a calculated or confirmed record, freeing its slot.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::InvalidRequest`] without a reason and
    /// [`OutputValueError::InvalidTransition`] for voided records.
    pub fn void_record(
        &self,
        id: OutputValueRecordId,
        principal: Principal,
        reason: &str,
    ) -> Result<OutputValueRecord, OutputValueError> {
        self.authorize(principal, RECORD_VOID)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OutputValueError::InvalidRequest("a void reason is required".to_string()));
        }
        let now = self.clock.now();
        let record = self.transition(id, RecordStatus::Voided, |record| {
            record.void_reason = Some(reason.to_string());
            record.updated_at = now;
        })?;
        info!(record_id = %record.id, reason, "output-value record voided");
        Ok(record)
    }

    /// Loads a record.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::RecordNotFound`].
    pub fn record(&self, id: OutputValueRecordId) -> Result<OutputValueRecord, OutputValueError> {
        self.store.output_value_transaction(|tx| {
            tx.output_record(id)?.ok_or(OutputValueError::RecordNotFound(id))
        })
    }

    // ------------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------------

    /// Project totals by stage and responsible user.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::Store`] when the read fails.
    pub fn project_summary(&self, project_id: ProjectId) -> Result<ProjectSummary, OutputValueError> {
        let records = self.project_records(project_id)?;
        Ok(ProjectSummary::from_records(project_id, &records))
    }

    /// User totals across projects within a creation-time range.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::Store`] when the read fails.
    pub fn user_summary(
        &self,
        user: UserId,
        range: DateRange,
    ) -> Result<UserSummary, OutputValueError> {
        let records: Vec<OutputValueRecord> =
            self.store.output_value_transaction(|tx| -> Result<_, OutputValueError> {
                Ok(tx.records_for_user(user)?)
            })?;
        Ok(UserSummary::from_records(user, range, &records))
    }

    /// Total, confirmed total, and count for settlement.
    ///
    /// # Errors
    ///
    /// Returns [`OutputValueError::Store`] when the read fails.
    pub fn project_for_settlement(
        &self,
        project_id: ProjectId,
    ) -> Result<SettlementFigures, OutputValueError> {
        let summary = self.project_summary(project_id)?;
        Ok(SettlementFigures::from(&summary.totals))
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Every record of a project.
    fn project_records(&self, project_id: ProjectId) -> Result<Vec<OutputValueRecord>, OutputValueError> {
        self.store.output_value_transaction(|tx| Ok(tx.records_for_project(project_id)?))
    }

    /// Applies a status transition after checking it is allowed.
    fn transition<F>(
        &self,
        id: OutputValueRecordId,
        to: RecordStatus,
        apply: F,
    ) -> Result<OutputValueRecord, OutputValueError>
    where
        F: FnOnce(&mut OutputValueRecord),
    {
        self.store.output_value_transaction(|tx| {
            let mut record = tx.output_record(id)?.ok_or(OutputValueError::RecordNotFound(id))?;
            let allowed = match to {
                RecordStatus::Confirmed => record.status == RecordStatus::Calculated,
                RecordStatus::Voided => record.status != RecordStatus::Voided,
                RecordStatus::Calculated => false,
            };
            if !allowed {
                return Err(OutputValueError::InvalidTransition {
                    record_id: id,
                    from: record.status,
                    to,
                });
            }
            record.status = to;
            apply(&mut record);
            tx.update_output_record(&record)?;
            Ok(record)
        })
    }

    /// Checks a principal's grant.
    fn authorize(&self, principal: Principal, code: &str) -> Result<(), OutputValueError> {
        let code = PermissionCode::new(code);
        if self.guard.authorizes(&self.directory, principal, &code)? {
            Ok(())
        } else {
            Err(OutputValueError::PermissionDenied(format!("{code} is required")))
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves an insert conflict to the record that won the slot.
fn existing_or_conflict(
    tx: &mut dyn OutputValueTx,
    project_id: ProjectId,
    event_code: &str,
    event_id: EventId,
) -> Result<RecordOutcome, OutputValueError> {
    tx.active_record_for(project_id, event_id)?.map(RecordOutcome::Existing).ok_or_else(|| {
        OutputValueError::Store(StoreError::Conflict(format!(
            "slot for project {project_id} event {event_code} is contended"
        )))
    })
}
