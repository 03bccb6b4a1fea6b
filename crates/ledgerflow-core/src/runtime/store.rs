// crates/ledgerflow-core/src/runtime/store.rs
// ============================================================================
// Module: Ledgerflow In-Memory Store
// Description: In-memory workflow and output-value store for tests and embedding.
// Purpose: Provide a transactional store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryStore`] keeps every table in one mutex-protected state value. A
//! unit of work holds the mutex for its whole duration, runs against a copy of
//! the state, and swaps the copy in only when the closure returns `Ok`. That
//! gives serializable transactions with rollback on error, which is what the
//! engines rely on for per-instance and per-slot exclusion.
//!
//! Uniqueness rules mirror the durable store: one open instance per template
//! code and target, unique instance numbers, and one non-voided output-value
//! record per project and event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::ApprovalInstance;
use crate::core::ApprovalNode;
use crate::core::ApprovalRecord;
use crate::core::Event;
use crate::core::EventId;
use crate::core::EventPath;
use crate::core::EventSpec;
use crate::core::InstanceId;
use crate::core::Milestone;
use crate::core::MilestoneId;
use crate::core::MilestoneNode;
use crate::core::MilestoneSpec;
use crate::core::NewInstance;
use crate::core::NewOutputValueRecord;
use crate::core::NewRecord;
use crate::core::NodeId;
use crate::core::NodeSpec;
use crate::core::OutputValueRecord;
use crate::core::OutputValueRecordId;
use crate::core::ProjectId;
use crate::core::RecordId;
use crate::core::RecordStatus;
use crate::core::Stage;
use crate::core::StageId;
use crate::core::StageNode;
use crate::core::StageSpec;
use crate::core::TargetRef;
use crate::core::TemplateCode;
use crate::core::TemplateId;
use crate::core::TemplateSpec;
use crate::core::TemplateStatus;
use crate::core::Timestamp;
use crate::core::UserId;
use crate::core::WorkflowTemplate;
use crate::interfaces::OutputValueStore;
use crate::interfaces::OutputValueTx;
use crate::interfaces::StoreError;
use crate::interfaces::WorkflowStore;
use crate::interfaces::WorkflowTx;

// ============================================================================
// SECTION: State
// ============================================================================

/// Every table held by the in-memory store.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Last assigned row id, shared across tables.
    last_id: i64,
    /// Templates with their nodes.
    templates: BTreeMap<TemplateId, WorkflowTemplate>,
    /// Approval instances.
    instances: BTreeMap<InstanceId, ApprovalInstance>,
    /// Approval records.
    records: BTreeMap<RecordId, ApprovalRecord>,
    /// Output-value stages.
    stages: BTreeMap<StageId, Stage>,
    /// Output-value milestones.
    milestones: BTreeMap<MilestoneId, Milestone>,
    /// Output-value events.
    events: BTreeMap<EventId, Event>,
    /// Output-value records.
    output_records: BTreeMap<OutputValueRecordId, OutputValueRecord>,
}

impl MemoryState {
    /// Allocates the next row id.
    const fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    /// Builds template nodes with fresh ids.
    fn materialize_nodes(&mut self, template_id: TemplateId, nodes: &[NodeSpec]) -> Vec<ApprovalNode> {
        nodes
            .iter()
            .map(|spec| {
                let id = NodeId::new(self.next_id());
                ApprovalNode::from_spec(id, template_id, spec)
            })
            .collect()
    }

    /// Resolves an event's ancestors.
    fn event_path(&self, event: &Event) -> Result<EventPath, StoreError> {
        let milestone = self.milestones.get(&event.milestone_id).ok_or_else(|| {
            StoreError::Corrupt(format!("event {} has no milestone", event.code))
        })?;
        let stage = self.stages.get(&milestone.stage_id).ok_or_else(|| {
            StoreError::Corrupt(format!("milestone {} has no stage", milestone.code))
        })?;
        Ok(EventPath {
            stage: stage.clone(),
            milestone: milestone.clone(),
            event: event.clone(),
        })
    }
}

/// Transaction view over a working copy of the state.
struct MemoryTx<'a> {
    /// Working copy committed on success.
    state: &'a mut MemoryState,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-memory store implementing both engine stores.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    /// Committed state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` against a copy of the state, committing on `Ok`.
    fn transact<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut MemoryTx<'_>) -> Result<R, E>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("in-memory store mutex poisoned".to_string()))?;
        let mut working = guard.clone();
        let result = work(&mut MemoryTx {
            state: &mut working,
        })?;
        *guard = working;
        Ok(result)
    }
}

impl WorkflowStore for InMemoryStore {
    fn workflow_transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn WorkflowTx) -> Result<R, E>,
    {
        self.transact(|tx| work(tx))
    }
}

impl OutputValueStore for InMemoryStore {
    fn output_value_transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn OutputValueTx) -> Result<R, E>,
    {
        self.transact(|tx| work(tx))
    }
}

// ============================================================================
// SECTION: Workflow Tables
// ============================================================================

impl WorkflowTx for MemoryTx<'_> {
    fn template_by_code(
        &mut self,
        code: &TemplateCode,
    ) -> Result<Option<WorkflowTemplate>, StoreError> {
        Ok(self.state.templates.values().find(|template| &template.code == code).cloned())
    }

    fn template_by_id(&mut self, id: TemplateId) -> Result<Option<WorkflowTemplate>, StoreError> {
        Ok(self.state.templates.get(&id).cloned())
    }

    fn list_templates(
        &mut self,
        status: Option<TemplateStatus>,
    ) -> Result<Vec<WorkflowTemplate>, StoreError> {
        let mut templates: Vec<WorkflowTemplate> = self
            .state
            .templates
            .values()
            .filter(|template| status.is_none_or(|status| template.status == status))
            .cloned()
            .collect();
        templates.sort_by(|left, right| left.code.cmp(&right.code));
        Ok(templates)
    }

    fn insert_template(
        &mut self,
        spec: &TemplateSpec,
        status: TemplateStatus,
        now: Timestamp,
    ) -> Result<WorkflowTemplate, StoreError> {
        if self.state.templates.values().any(|template| template.code == spec.code) {
            return Err(StoreError::Conflict(format!("template code {} exists", spec.code)));
        }
        let id = TemplateId::new(self.state.next_id());
        let nodes = self.state.materialize_nodes(id, &spec.nodes);
        let template = WorkflowTemplate {
            id,
            code: spec.code.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            category: spec.category.clone(),
            status,
            policy: spec.policy,
            default_timeout_hours: spec.default_timeout_hours,
            timeout_action: spec.timeout_action,
            applicable_content_types: spec.applicable_content_types.clone(),
            form_filter: spec.form_filter.clone(),
            sub_workflow_trigger: spec.sub_workflow_trigger.clone(),
            nodes,
            created_at: now,
            updated_at: now,
        };
        self.state.templates.insert(id, template.clone());
        Ok(template)
    }

    fn update_template(&mut self, template: &WorkflowTemplate) -> Result<(), StoreError> {
        let stored = self
            .state
            .templates
            .get_mut(&template.id)
            .ok_or_else(|| StoreError::Invalid(format!("template {} not found", template.id)))?;
        let nodes = std::mem::take(&mut stored.nodes);
        *stored = WorkflowTemplate {
            nodes,
            ..template.clone()
        };
        Ok(())
    }

    fn replace_template_nodes(
        &mut self,
        template_id: TemplateId,
        nodes: &[NodeSpec],
    ) -> Result<Vec<ApprovalNode>, StoreError> {
        if !self.state.templates.contains_key(&template_id) {
            return Err(StoreError::Invalid(format!("template {template_id} not found")));
        }
        let materialized = self.state.materialize_nodes(template_id, nodes);
        if let Some(template) = self.state.templates.get_mut(&template_id) {
            template.nodes.clone_from(&materialized);
        }
        Ok(materialized)
    }

    fn lock_instance(&mut self, id: InstanceId) -> Result<Option<ApprovalInstance>, StoreError> {
        Ok(self.state.instances.get(&id).cloned())
    }

    fn insert_instance(&mut self, new: NewInstance) -> Result<ApprovalInstance, StoreError> {
        let open_exists = self.state.instances.values().any(|instance| {
            instance.status.is_open()
                && instance.template_code == new.template_code
                && instance.target == new.target
        });
        if open_exists {
            return Err(StoreError::Conflict(format!(
                "open instance of {} exists for {}",
                new.template_code, new.target
            )));
        }
        if self.state.instances.values().any(|instance| instance.instance_number == new.instance_number)
        {
            return Err(StoreError::Conflict(format!(
                "instance number {} exists",
                new.instance_number
            )));
        }
        let id = InstanceId::new(self.state.next_id());
        let instance = ApprovalInstance::from_new(id, new);
        self.state.instances.insert(id, instance.clone());
        Ok(instance)
    }

    fn update_instance(&mut self, instance: &ApprovalInstance) -> Result<(), StoreError> {
        let stored = self
            .state
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| StoreError::Invalid(format!("instance {} not found", instance.id)))?;
        *stored = instance.clone();
        Ok(())
    }

    fn open_instances_for(
        &mut self,
        code: &TemplateCode,
        target: &TargetRef,
    ) -> Result<Vec<ApprovalInstance>, StoreError> {
        Ok(self
            .state
            .instances
            .values()
            .filter(|instance| {
                instance.status.is_open() && &instance.template_code == code && &instance.target == target
            })
            .cloned()
            .collect())
    }

    fn instances_for_target(
        &mut self,
        target: &TargetRef,
    ) -> Result<Vec<ApprovalInstance>, StoreError> {
        Ok(self
            .state
            .instances
            .values()
            .filter(|instance| &instance.target == target)
            .cloned()
            .collect())
    }

    fn count_instances_with_prefix(&mut self, prefix: &str) -> Result<u64, StoreError> {
        let count = self
            .state
            .instances
            .values()
            .filter(|instance| instance.instance_number.starts_with(prefix))
            .count();
        Ok(count as u64)
    }

    fn count_open_instances(&mut self, template_id: TemplateId) -> Result<u64, StoreError> {
        let count = self
            .state
            .instances
            .values()
            .filter(|instance| instance.template_id == template_id && instance.status.is_open())
            .count();
        Ok(count as u64)
    }

    fn pending_instances_for(
        &mut self,
        approver: UserId,
    ) -> Result<Vec<ApprovalInstance>, StoreError> {
        let mut instances: Vec<ApprovalInstance> = self
            .state
            .instances
            .values()
            .filter(|instance| instance.status.is_open())
            .filter(|instance| {
                self.state.records.values().any(|record| {
                    record.instance_id == instance.id
                        && record.approver == Some(approver)
                        && record.is_pending()
                })
            })
            .cloned()
            .collect();
        instances.sort_by_key(|instance| (instance.apply_time, instance.id));
        Ok(instances)
    }

    fn insert_record(&mut self, new: NewRecord) -> Result<ApprovalRecord, StoreError> {
        if !self.state.instances.contains_key(&new.instance_id) {
            return Err(StoreError::Invalid(format!("instance {} not found", new.instance_id)));
        }
        let id = RecordId::new(self.state.next_id());
        let record = ApprovalRecord::from_new(id, new);
        self.state.records.insert(id, record.clone());
        Ok(record)
    }

    fn update_record(&mut self, record: &ApprovalRecord) -> Result<(), StoreError> {
        let stored = self
            .state
            .records
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::Invalid(format!("record {} not found", record.id)))?;
        *stored = record.clone();
        Ok(())
    }

    fn records_for_instance(
        &mut self,
        instance_id: InstanceId,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        Ok(self
            .state
            .records
            .values()
            .filter(|record| record.instance_id == instance_id)
            .cloned()
            .collect())
    }

    fn overdue_records(
        &mut self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        let mut overdue: Vec<ApprovalRecord> = self
            .state
            .records
            .values()
            .filter(|record| {
                record.is_pending()
                    && record.last_reminder_at.is_none()
                    && record.due_at.is_some_and(|due| due <= now)
            })
            .cloned()
            .collect();
        overdue.sort_by_key(|record| (record.due_at, record.id));
        overdue.truncate(limit);
        Ok(overdue)
    }
}

// ============================================================================
// SECTION: Output-Value Tables
// ============================================================================

impl OutputValueTx for MemoryTx<'_> {
    fn upsert_stage(&mut self, spec: &StageSpec) -> Result<Stage, StoreError> {
        let existing = self.state.stages.values().find(|stage| stage.code == spec.code).map(|stage| stage.id);
        let id = match existing {
            Some(id) => id,
            None => StageId::new(self.state.next_id()),
        };
        let stage = Stage {
            id,
            code: spec.code.clone(),
            name: spec.name.clone(),
            position: spec.position,
            stage_percentage: spec.stage_percentage.clone(),
            base_amount_type: spec.base_amount_type,
            active: spec.active,
        };
        self.state.stages.insert(id, stage.clone());
        Ok(stage)
    }

    fn upsert_milestone(
        &mut self,
        stage_id: StageId,
        spec: &MilestoneSpec,
    ) -> Result<Milestone, StoreError> {
        if !self.state.stages.contains_key(&stage_id) {
            return Err(StoreError::Invalid(format!("stage {stage_id} not found")));
        }
        let existing = self
            .state
            .milestones
            .values()
            .find(|milestone| milestone.stage_id == stage_id && milestone.code == spec.code)
            .map(|milestone| milestone.id);
        let id = match existing {
            Some(id) => id,
            None => MilestoneId::new(self.state.next_id()),
        };
        let milestone = Milestone {
            id,
            stage_id,
            code: spec.code.clone(),
            name: spec.name.clone(),
            position: spec.position,
            milestone_percentage: spec.milestone_percentage.clone(),
            base_amount_type: spec.base_amount_type,
            active: spec.active,
        };
        self.state.milestones.insert(id, milestone.clone());
        Ok(milestone)
    }

    fn upsert_event(
        &mut self,
        milestone_id: MilestoneId,
        spec: &EventSpec,
    ) -> Result<Event, StoreError> {
        if !self.state.milestones.contains_key(&milestone_id) {
            return Err(StoreError::Invalid(format!("milestone {milestone_id} not found")));
        }
        let existing =
            self.state.events.values().find(|event| event.code == spec.code).map(|event| event.id);
        if let Some(trigger) = &spec.trigger_condition
            && self.state.events.values().any(|event| {
                Some(event.id) != existing && event.trigger_condition.as_ref() == Some(trigger)
            })
        {
            return Err(StoreError::Conflict(format!("trigger condition {trigger} exists")));
        }
        let id = match existing {
            Some(id) => id,
            None => EventId::new(self.state.next_id()),
        };
        let event = Event {
            id,
            milestone_id,
            code: spec.code.clone(),
            name: spec.name.clone(),
            position: spec.position,
            event_percentage: spec.event_percentage.clone(),
            responsible_role_code: spec.responsible_role_code.clone(),
            trigger_condition: spec.trigger_condition.clone(),
            active: spec.active,
        };
        self.state.events.insert(id, event.clone());
        Ok(event)
    }

    fn catalog(&mut self) -> Result<Vec<StageNode>, StoreError> {
        let mut stages: Vec<&Stage> = self.state.stages.values().collect();
        stages.sort_by_key(|stage| (stage.position, stage.id));
        let nodes = stages
            .into_iter()
            .map(|stage| {
                let mut milestones: Vec<&Milestone> = self
                    .state
                    .milestones
                    .values()
                    .filter(|milestone| milestone.stage_id == stage.id)
                    .collect();
                milestones.sort_by_key(|milestone| (milestone.position, milestone.id));
                let milestones = milestones
                    .into_iter()
                    .map(|milestone| {
                        let mut events: Vec<Event> = self
                            .state
                            .events
                            .values()
                            .filter(|event| event.milestone_id == milestone.id)
                            .cloned()
                            .collect();
                        events.sort_by_key(|event| (event.position, event.id));
                        MilestoneNode {
                            milestone: milestone.clone(),
                            events,
                        }
                    })
                    .collect();
                StageNode {
                    stage: stage.clone(),
                    milestones,
                }
            })
            .collect();
        Ok(nodes)
    }

    fn event_by_code(&mut self, code: &str) -> Result<Option<EventPath>, StoreError> {
        self.state
            .events
            .values()
            .find(|event| event.code == code)
            .map(|event| self.state.event_path(event))
            .transpose()
    }

    fn event_by_trigger(&mut self, trigger: &str) -> Result<Option<EventPath>, StoreError> {
        self.state
            .events
            .values()
            .find(|event| event.trigger_condition.as_deref() == Some(trigger))
            .map(|event| self.state.event_path(event))
            .transpose()
    }

    fn set_event_active(&mut self, code: &str, active: bool) -> Result<bool, StoreError> {
        match self.state.events.values_mut().find(|event| event.code == code) {
            Some(event) => {
                event.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn active_record_for(
        &mut self,
        project_id: ProjectId,
        event_id: EventId,
    ) -> Result<Option<OutputValueRecord>, StoreError> {
        Ok(self
            .state
            .output_records
            .values()
            .find(|record| {
                record.project_id == project_id
                    && record.event_id == event_id
                    && record.status != RecordStatus::Voided
            })
            .cloned())
    }

    fn insert_output_record(
        &mut self,
        new: NewOutputValueRecord,
    ) -> Result<OutputValueRecord, StoreError> {
        if self.active_record_for(new.project_id, new.event_id)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "project {} already holds a record for event {}",
                new.project_id, new.event_code
            )));
        }
        let id = OutputValueRecordId::new(self.state.next_id());
        let record = OutputValueRecord::from_new(id, new);
        self.state.output_records.insert(id, record.clone());
        Ok(record)
    }

    fn update_output_record(&mut self, record: &OutputValueRecord) -> Result<(), StoreError> {
        let stored = self
            .state
            .output_records
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::Invalid(format!("output record {} not found", record.id)))?;
        *stored = record.clone();
        Ok(())
    }

    fn output_record(
        &mut self,
        id: OutputValueRecordId,
    ) -> Result<Option<OutputValueRecord>, StoreError> {
        Ok(self.state.output_records.get(&id).cloned())
    }

    fn records_for_project(
        &mut self,
        project_id: ProjectId,
    ) -> Result<Vec<OutputValueRecord>, StoreError> {
        Ok(self
            .state
            .output_records
            .values()
            .filter(|record| record.project_id == project_id)
            .cloned()
            .collect())
    }

    fn records_for_user(&mut self, user: UserId) -> Result<Vec<OutputValueRecord>, StoreError> {
        Ok(self
            .state
            .output_records
            .values()
            .filter(|record| record.responsible_user == user)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TemplateCode;

    fn new_instance(number: &str) -> NewInstance {
        NewInstance {
            instance_number: number.to_string(),
            template_id: TemplateId::new(1),
            template_code: TemplateCode::new("contract_review"),
            target: TargetRef::new("contract", 100),
            current_node: None,
            applicant: UserId::new(1),
            apply_comment: String::new(),
            now: Timestamp::EPOCH,
        }
    }

    #[test]
    fn failed_unit_of_work_rolls_back() {
        let store = InMemoryStore::new();
        let result: Result<(), StoreError> = store.workflow_transaction(|tx| {
            tx.insert_instance(new_instance("AP1"))?;
            Err(StoreError::Invalid("abort".to_string()))
        });
        assert!(result.is_err());
        let count = store
            .workflow_transaction(|tx| tx.count_instances_with_prefix("AP"))
            .unwrap_or(u64::MAX);
        assert_eq!(count, 0);
    }

    #[test]
    fn second_open_instance_conflicts() {
        let store = InMemoryStore::new();
        let first: Result<ApprovalInstance, StoreError> =
            store.workflow_transaction(|tx| tx.insert_instance(new_instance("AP1")));
        assert!(first.is_ok());
        let second: Result<ApprovalInstance, StoreError> =
            store.workflow_transaction(|tx| tx.insert_instance(new_instance("AP2")));
        assert!(matches!(second, Err(StoreError::Conflict(_))));
    }
}
