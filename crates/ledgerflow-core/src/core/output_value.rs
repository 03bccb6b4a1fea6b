// crates/ledgerflow-core/src/core/output_value.rs
// ============================================================================
// Module: Ledgerflow Output-Value Model
// Description: Stage, milestone, event catalog and output-value records.
// Purpose: Describe how a project's value is allocated and what was recognized.
// Dependencies: bigdecimal, serde
// ============================================================================

//! ## Overview
//! The catalog is a three-level tree: stages own milestones, milestones own
//! events. Each level carries a percentage; a recognized event's value is
//! `base × stage% × milestone% × event%` rounded to cents with banker's
//! rounding. Percentages within a parent are not required to sum to one.
//!
//! Records capture the percentages and base amount by value so later catalog
//! edits never rewrite history.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use bigdecimal::BigDecimal;
use bigdecimal::RoundingMode;
use bigdecimal::Zero;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EventId;
use crate::core::identifiers::MilestoneId;
use crate::core::identifiers::OutputValueRecordId;
use crate::core::identifiers::ProjectId;
use crate::core::identifiers::RoleCode;
use crate::core::identifiers::StageId;
use crate::core::identifiers::UserId;
use crate::core::template::SpecError;
use crate::core::template::label_enum;
use crate::core::time::DateRange;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

label_enum!(
    /// Project-level monetary figure feeding an allocation.
    BaseAmountType {
        /// Amount at registration.
        RegistrationAmount => "registration_amount",
        /// Intention amount.
        IntentionAmount => "intention_amount",
        /// Signed contract amount.
        ContractAmount => "contract_amount",
        /// Settled amount.
        SettlementAmount => "settlement_amount",
        /// Received payment amount.
        PaymentAmount => "payment_amount",
    }
);

label_enum!(
    /// Output-value record status.
    RecordStatus {
        /// Computed, awaiting confirmation.
        Calculated => "calculated",
        /// Confirmed for settlement.
        Confirmed => "confirmed",
        /// Voided; frees the idempotency key.
        Voided => "voided",
    }
);

/// Decimal places kept on calculated values.
pub const VALUE_SCALE: i64 = 2;

/// Computes `base × stage × milestone × event` rounded half-to-even to cents.
#[must_use]
pub fn calculate_value(
    base: &BigDecimal,
    stage_percentage: &BigDecimal,
    milestone_percentage: &BigDecimal,
    event_percentage: &BigDecimal,
) -> BigDecimal {
    let raw = base * stage_percentage * milestone_percentage * event_percentage;
    raw.with_scale_round(VALUE_SCALE, RoundingMode::HalfEven)
}

// ============================================================================
// SECTION: Catalog Rows
// ============================================================================

/// Output-value stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Row id.
    pub id: StageId,
    /// Unique code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Ordering position.
    pub position: u32,
    /// Share of project value attributed to the stage.
    pub stage_percentage: BigDecimal,
    /// Base amount used unless a milestone overrides it.
    pub base_amount_type: BaseAmountType,
    /// Whether the stage is active.
    pub active: bool,
}

/// Output-value milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Row id.
    pub id: MilestoneId,
    /// Owning stage.
    pub stage_id: StageId,
    /// Code, unique within the stage.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Ordering position.
    pub position: u32,
    /// Share of the stage.
    pub milestone_percentage: BigDecimal,
    /// Base amount override.
    pub base_amount_type: Option<BaseAmountType>,
    /// Whether the milestone is active.
    pub active: bool,
}

/// Output-value event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Row id.
    pub id: EventId,
    /// Owning milestone.
    pub milestone_id: MilestoneId,
    /// Globally unique code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Ordering position.
    pub position: u32,
    /// Share of the milestone.
    pub event_percentage: BigDecimal,
    /// Role credited with the event.
    pub responsible_role_code: RoleCode,
    /// Business-event identifier that also selects this event.
    pub trigger_condition: Option<String>,
    /// Whether the event is active.
    pub active: bool,
}

/// Event with its ancestors, as needed for a calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPath {
    /// Owning stage.
    pub stage: Stage,
    /// Owning milestone.
    pub milestone: Milestone,
    /// The event.
    pub event: Event,
}

impl EventPath {
    /// Milestone override, else the stage default.
    #[must_use]
    pub fn effective_base_type(&self) -> BaseAmountType {
        self.milestone.base_amount_type.unwrap_or(self.stage.base_amount_type)
    }

    /// True when the event and all ancestors are active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.stage.active && self.milestone.active && self.event.active
    }
}

// ============================================================================
// SECTION: Catalog Authoring
// ============================================================================

/// Authored event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSpec {
    /// Globally unique code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Ordering position.
    #[serde(default)]
    pub position: u32,
    /// Share of the milestone in `[0, 1]`.
    pub event_percentage: BigDecimal,
    /// Credited role.
    pub responsible_role_code: RoleCode,
    /// Optional business-event identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_condition: Option<String>,
    /// Whether the event is active.
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Authored milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneSpec {
    /// Code, unique within the stage.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Ordering position.
    #[serde(default)]
    pub position: u32,
    /// Share of the stage in `[0, 1]`.
    pub milestone_percentage: BigDecimal,
    /// Base amount override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_amount_type: Option<BaseAmountType>,
    /// Whether the milestone is active.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Child events.
    #[serde(default)]
    pub events: Vec<EventSpec>,
}

/// Authored stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Unique code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Ordering position.
    #[serde(default)]
    pub position: u32,
    /// Share of project value in `[0, 1]`.
    pub stage_percentage: BigDecimal,
    /// Default base amount.
    pub base_amount_type: BaseAmountType,
    /// Whether the stage is active.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Child milestones.
    #[serde(default)]
    pub milestones: Vec<MilestoneSpec>,
}

/// Authored catalog tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSpec {
    /// Stages in authoring order.
    pub stages: Vec<StageSpec>,
}

impl CatalogSpec {
    /// Validates codes, names, and percentage ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`SpecError`] found.
    pub fn validate(&self) -> Result<(), SpecError> {
        let mut stage_codes = BTreeSet::new();
        let mut event_codes = BTreeSet::new();
        let mut triggers = BTreeSet::new();
        for stage in &self.stages {
            require_text("stage code", &stage.code)?;
            require_text("stage name", &stage.name)?;
            require_fraction("stage_percentage", &stage.stage_percentage)?;
            if !stage_codes.insert(stage.code.as_str()) {
                return Err(SpecError::DuplicateCode(stage.code.clone()));
            }
            let mut milestone_codes = BTreeSet::new();
            for milestone in &stage.milestones {
                require_text("milestone code", &milestone.code)?;
                require_text("milestone name", &milestone.name)?;
                require_fraction("milestone_percentage", &milestone.milestone_percentage)?;
                if !milestone_codes.insert(milestone.code.as_str()) {
                    return Err(SpecError::DuplicateCode(format!(
                        "{}.{}",
                        stage.code, milestone.code
                    )));
                }
                for event in &milestone.events {
                    require_text("event code", &event.code)?;
                    require_text("event name", &event.name)?;
                    require_fraction("event_percentage", &event.event_percentage)?;
                    RoleCode::parse(event.responsible_role_code.as_str())?;
                    if !event_codes.insert(event.code.as_str()) {
                        return Err(SpecError::DuplicateCode(event.code.clone()));
                    }
                    if let Some(trigger) = &event.trigger_condition {
                        require_text("trigger_condition", trigger)?;
                        if !triggers.insert(trigger.as_str()) {
                            return Err(SpecError::DuplicateCode(trigger.clone()));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Rejects blank text.
fn require_text(field: &'static str, value: &str) -> Result<(), SpecError> {
    if value.trim().is_empty() { Err(SpecError::EmptyField(field)) } else { Ok(()) }
}

/// Rejects percentages outside `[0, 1]`.
fn require_fraction(field: &'static str, value: &BigDecimal) -> Result<(), SpecError> {
    if value < &BigDecimal::zero() || value > &BigDecimal::from(1) {
        return Err(SpecError::OutOfRange {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Serde default for active flags.
const fn default_active() -> bool {
    true
}

/// Milestone with its events, as returned by catalog reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneNode {
    /// Milestone row.
    pub milestone: Milestone,
    /// Events ordered by position.
    pub events: Vec<Event>,
}

/// Stage with its milestones, as returned by catalog reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageNode {
    /// Stage row.
    pub stage: Stage,
    /// Milestones ordered by position.
    pub milestones: Vec<MilestoneNode>,
}

// ============================================================================
// SECTION: Project Read Model
// ============================================================================

/// Team membership entry on a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    /// Member user.
    pub user: UserId,
    /// Team role code.
    pub role_code: RoleCode,
    /// Whether the membership is active.
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Project as seen by the output-value calculator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectView {
    /// Project id.
    pub id: ProjectId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Current amounts keyed by base amount type.
    #[serde(default)]
    pub amounts: BTreeMap<BaseAmountType, BigDecimal>,
    /// Project manager.
    #[serde(default)]
    pub project_manager: Option<UserId>,
    /// Business manager.
    #[serde(default)]
    pub business_manager: Option<UserId>,
    /// Team membership.
    #[serde(default)]
    pub team: Vec<TeamMember>,
}

impl ProjectView {
    /// Returns the amount for a base type when recorded.
    #[must_use]
    pub fn amount(&self, kind: BaseAmountType) -> Option<&BigDecimal> {
        self.amounts.get(&kind)
    }

    /// Returns the first active team member with the role.
    #[must_use]
    pub fn first_team_member(&self, role: &RoleCode) -> Option<UserId> {
        self.team.iter().find(|member| member.active && &member.role_code == role).map(|m| m.user)
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Recognized output value for one (project, event) pair.
///
/// # Invariants
/// - At most one non-voided record exists per `(project_id, event_id)`.
/// - `calculated_value` equals [`calculate_value`] over the captured figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputValueRecord {
    /// Row id.
    pub id: OutputValueRecordId,
    /// Project credited.
    pub project_id: ProjectId,
    /// Stage at write time.
    pub stage_id: StageId,
    /// Stage code at write time.
    pub stage_code: String,
    /// Milestone at write time.
    pub milestone_id: MilestoneId,
    /// Event recognized.
    pub event_id: EventId,
    /// Event code at write time.
    pub event_code: String,
    /// User credited.
    pub responsible_user: UserId,
    /// Captured base amount.
    pub base_amount: BigDecimal,
    /// Captured base amount type.
    pub base_amount_type: BaseAmountType,
    /// Captured stage percentage.
    pub stage_percentage: BigDecimal,
    /// Captured milestone percentage.
    pub milestone_percentage: BigDecimal,
    /// Captured event percentage.
    pub event_percentage: BigDecimal,
    /// Recognized value.
    pub calculated_value: BigDecimal,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// Confirming user.
    pub confirmed_by: Option<UserId>,
    /// Confirmation time.
    pub confirmed_at: Option<Timestamp>,
    /// Void reason.
    pub void_reason: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

/// Record fields supplied on insert; storage assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutputValueRecord {
    /// Project credited.
    pub project_id: ProjectId,
    /// Event path captured.
    pub stage_id: StageId,
    /// Stage code.
    pub stage_code: String,
    /// Milestone.
    pub milestone_id: MilestoneId,
    /// Event.
    pub event_id: EventId,
    /// Event code.
    pub event_code: String,
    /// User credited.
    pub responsible_user: UserId,
    /// Base amount.
    pub base_amount: BigDecimal,
    /// Base amount type.
    pub base_amount_type: BaseAmountType,
    /// Stage percentage.
    pub stage_percentage: BigDecimal,
    /// Milestone percentage.
    pub milestone_percentage: BigDecimal,
    /// Event percentage.
    pub event_percentage: BigDecimal,
    /// Recognized value.
    pub calculated_value: BigDecimal,
    /// Creation time.
    pub now: Timestamp,
}

impl NewOutputValueRecord {
    /// Captures an event path and base amount, computing the value.
    #[must_use]
    pub fn capture(
        project_id: ProjectId,
        path: &EventPath,
        responsible_user: UserId,
        base_amount: BigDecimal,
        now: Timestamp,
    ) -> Self {
        let calculated_value = calculate_value(
            &base_amount,
            &path.stage.stage_percentage,
            &path.milestone.milestone_percentage,
            &path.event.event_percentage,
        );
        Self {
            project_id,
            stage_id: path.stage.id,
            stage_code: path.stage.code.clone(),
            milestone_id: path.milestone.id,
            event_id: path.event.id,
            event_code: path.event.code.clone(),
            responsible_user,
            base_amount,
            base_amount_type: path.effective_base_type(),
            stage_percentage: path.stage.stage_percentage.clone(),
            milestone_percentage: path.milestone.milestone_percentage.clone(),
            event_percentage: path.event.event_percentage.clone(),
            calculated_value,
            now,
        }
    }
}

impl OutputValueRecord {
    /// Materializes an inserted record in `calculated` status.
    #[must_use]
    pub fn from_new(id: OutputValueRecordId, new: NewOutputValueRecord) -> Self {
        Self {
            id,
            project_id: new.project_id,
            stage_id: new.stage_id,
            stage_code: new.stage_code,
            milestone_id: new.milestone_id,
            event_id: new.event_id,
            event_code: new.event_code,
            responsible_user: new.responsible_user,
            base_amount: new.base_amount,
            base_amount_type: new.base_amount_type,
            stage_percentage: new.stage_percentage,
            milestone_percentage: new.milestone_percentage,
            event_percentage: new.event_percentage,
            calculated_value: new.calculated_value,
            status: RecordStatus::Calculated,
            confirmed_by: None,
            confirmed_at: None,
            void_reason: None,
            created_at: new.now,
            updated_at: new.now,
        }
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Reason an event produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// No event matched the code or trigger.
    EventNotFound {
        /// Lookup key.
        key: String,
    },
    /// The event or an ancestor is inactive.
    EventInactive {
        /// Event code.
        event_code: String,
    },
    /// The project's base amount is absent or not positive.
    BaseAmountMissing {
        /// Base amount type consulted.
        base_amount_type: BaseAmountType,
    },
    /// No responsible user could be resolved.
    ResponsibleUnresolved {
        /// Role code consulted.
        role_code: RoleCode,
    },
}

impl SkipReason {
    /// Stable snake-case label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::EventNotFound {
                ..
            } => "event_not_found",
            Self::EventInactive {
                ..
            } => "event_inactive",
            Self::BaseAmountMissing {
                ..
            } => "base_amount_missing",
            Self::ResponsibleUnresolved {
                ..
            } => "responsible_unresolved",
        }
    }
}

/// Result of evaluating a business event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new record was written.
    Created(OutputValueRecord),
    /// A non-voided record already existed.
    Existing(OutputValueRecord),
    /// Nothing to do.
    Skipped(SkipReason),
}

impl RecordOutcome {
    /// Returns the record for created and existing outcomes.
    #[must_use]
    pub fn into_record(self) -> Option<OutputValueRecord> {
        match self {
            Self::Created(record) | Self::Existing(record) => Some(record),
            Self::Skipped(_) => None,
        }
    }
}

/// Optional inputs to event recording.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordEventOptions {
    /// Business-event identifier used when the code misses.
    pub trigger_condition: Option<String>,
    /// Responsible user overriding role resolution.
    pub override_responsible: Option<UserId>,
}

// ============================================================================
// SECTION: Summaries
// ============================================================================

/// Total attributed to one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTotal {
    /// Stage id.
    pub stage_id: StageId,
    /// Stage code.
    pub stage_code: String,
    /// Sum of calculated values.
    pub total: BigDecimal,
    /// Record count.
    pub count: u64,
}

/// Total attributed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserTotal {
    /// Responsible user.
    pub user: UserId,
    /// Sum of calculated values.
    pub total: BigDecimal,
    /// Record count.
    pub count: u64,
}

/// Total attributed to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTotal {
    /// Project id.
    pub project_id: ProjectId,
    /// Sum of calculated values.
    pub total: BigDecimal,
    /// Record count.
    pub count: u64,
}

/// Status-separated totals shared by summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    /// Sum over calculated and confirmed records.
    pub total: BigDecimal,
    /// Sum over calculated records.
    pub calculated: BigDecimal,
    /// Sum over confirmed records.
    pub confirmed: BigDecimal,
    /// Number of non-voided records.
    pub count: u64,
    /// Number of calculated records.
    pub calculated_count: u64,
    /// Number of confirmed records.
    pub confirmed_count: u64,
}

impl StatusTotals {
    /// Sums non-voided records.
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OutputValueRecord>) -> Self {
        let mut totals = Self {
            total: BigDecimal::zero(),
            calculated: BigDecimal::zero(),
            confirmed: BigDecimal::zero(),
            count: 0,
            calculated_count: 0,
            confirmed_count: 0,
        };
        for record in records {
            match record.status {
                RecordStatus::Calculated => {
                    totals.calculated += &record.calculated_value;
                    totals.calculated_count += 1;
                }
                RecordStatus::Confirmed => {
                    totals.confirmed += &record.calculated_value;
                    totals.confirmed_count += 1;
                }
                RecordStatus::Voided => continue,
            }
            totals.total += &record.calculated_value;
            totals.count += 1;
        }
        totals
    }
}

/// Aggregation over one project's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    /// Project id.
    pub project_id: ProjectId,
    /// Status-separated totals.
    pub totals: StatusTotals,
    /// Totals per stage, ordered by stage id.
    pub by_stage: Vec<StageTotal>,
    /// Totals per responsible user, ordered by user id.
    pub by_user: Vec<UserTotal>,
}

impl ProjectSummary {
    /// Builds a summary from a project's records; voided rows are ignored.
    #[must_use]
    pub fn from_records(project_id: ProjectId, records: &[OutputValueRecord]) -> Self {
        let live: Vec<&OutputValueRecord> =
            records.iter().filter(|record| record.status != RecordStatus::Voided).collect();
        let mut by_stage: BTreeMap<StageId, StageTotal> = BTreeMap::new();
        let mut by_user: BTreeMap<UserId, UserTotal> = BTreeMap::new();
        for record in &live {
            let stage = by_stage.entry(record.stage_id).or_insert_with(|| StageTotal {
                stage_id: record.stage_id,
                stage_code: record.stage_code.clone(),
                total: BigDecimal::zero(),
                count: 0,
            });
            stage.total += &record.calculated_value;
            stage.count += 1;
            let user = by_user.entry(record.responsible_user).or_insert_with(|| UserTotal {
                user: record.responsible_user,
                total: BigDecimal::zero(),
                count: 0,
            });
            user.total += &record.calculated_value;
            user.count += 1;
        }
        Self {
            project_id,
            totals: StatusTotals::from_records(live.iter().copied()),
            by_stage: by_stage.into_values().collect(),
            by_user: by_user.into_values().collect(),
        }
    }
}

/// Aggregation over one user's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    /// Responsible user.
    pub user: UserId,
    /// Range applied to record creation time.
    pub range: DateRange,
    /// Status-separated totals.
    pub totals: StatusTotals,
    /// Totals per project, ordered by project id.
    pub by_project: Vec<ProjectTotal>,
}

impl UserSummary {
    /// Builds a summary from a user's records, filtering by creation time.
    #[must_use]
    pub fn from_records(user: UserId, range: DateRange, records: &[OutputValueRecord]) -> Self {
        let live: Vec<&OutputValueRecord> = records
            .iter()
            .filter(|record| {
                record.responsible_user == user
                    && record.status != RecordStatus::Voided
                    && range.contains(record.created_at)
            })
            .collect();
        let mut by_project: BTreeMap<ProjectId, ProjectTotal> = BTreeMap::new();
        for record in &live {
            let entry = by_project.entry(record.project_id).or_insert_with(|| ProjectTotal {
                project_id: record.project_id,
                total: BigDecimal::zero(),
                count: 0,
            });
            entry.total += &record.calculated_value;
            entry.count += 1;
        }
        Self {
            user,
            range,
            totals: StatusTotals::from_records(live.iter().copied()),
            by_project: by_project.into_values().collect(),
        }
    }
}

/// Figures consumed by the settlement module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementFigures {
    /// Sum over non-voided records.
    pub total: BigDecimal,
    /// Sum over confirmed records.
    pub confirmed: BigDecimal,
    /// Number of non-voided records.
    pub count: u64,
}

impl From<&StatusTotals> for SettlementFigures {
    fn from(totals: &StatusTotals) -> Self {
        Self {
            total: totals.total.clone(),
            confirmed: totals.confirmed.clone(),
            count: totals.count,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
