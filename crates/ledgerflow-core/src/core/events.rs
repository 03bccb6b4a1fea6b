// crates/ledgerflow-core/src/core/events.rs
// ============================================================================
// Module: Ledgerflow Notification Events
// Description: Event envelope emitted to notification sinks.
// Purpose: Give delivery adapters a stable, serializable shape.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Engines emit a [`NotificationEvent`] after a transaction commits. The
//! envelope names the event type, its subject, the users who should hear
//! about it, the bound business record, and a free-form context object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::InstanceId;
use crate::core::identifiers::OutputValueRecordId;
use crate::core::identifiers::UserId;
use crate::core::target::TargetRef;
use crate::core::template::label_enum;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Types
// ============================================================================

label_enum!(
    /// Notification event type; serialized in dotted form.
    NotificationType {
        /// Approvers have pending work.
        #[serde(rename = "approval.action_required")]
        ActionRequired => "approval.action_required",
        /// An instance reached a terminal status.
        #[serde(rename = "approval.completed")]
        Completed => "approval.completed",
        /// A pending record exceeded its timeout.
        #[serde(rename = "approval.timeout")]
        Timeout => "approval.timeout",
        /// An output-value record was written.
        #[serde(rename = "output_value.recorded")]
        OutputValueRecorded => "output_value.recorded",
    }
);

/// Subject the event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSubject {
    /// Approval instance.
    InstanceId(InstanceId),
    /// Output-value record.
    RecordId(OutputValueRecordId),
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Notification envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: NotificationType,
    /// Instance or record the event concerns.
    #[serde(flatten)]
    pub subject: EventSubject,
    /// Users to notify.
    pub actors: Vec<UserId>,
    /// Bound business record, when any.
    pub target: Option<TargetRef>,
    /// Emission time.
    pub timestamp: Timestamp,
    /// Free-form context.
    pub context: Value,
}

impl NotificationEvent {
    /// Envelope about an approval instance.
    #[must_use]
    pub fn for_instance(
        event_type: NotificationType,
        instance_id: InstanceId,
        actors: Vec<UserId>,
        target: TargetRef,
        timestamp: Timestamp,
        context: Value,
    ) -> Self {
        Self {
            event_type,
            subject: EventSubject::InstanceId(instance_id),
            actors,
            target: Some(target),
            timestamp,
            context,
        }
    }

    /// Envelope about an output-value record.
    #[must_use]
    pub fn for_output_record(
        record_id: OutputValueRecordId,
        actors: Vec<UserId>,
        timestamp: Timestamp,
        context: Value,
    ) -> Self {
        Self {
            event_type: NotificationType::OutputValueRecorded,
            subject: EventSubject::RecordId(record_id),
            actors,
            target: None,
            timestamp,
            context,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
