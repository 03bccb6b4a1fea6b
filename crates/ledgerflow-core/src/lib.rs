// crates/ledgerflow-core/src/lib.rs
// ============================================================================
// Module: Ledgerflow Core Library
// Description: Public API surface for the Ledgerflow engines.
// Purpose: Expose core types, interfaces, and the workflow and output-value runtimes.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Ledgerflow core hosts two engines. The approval workflow engine binds any
//! business record to a data-driven template and drives it through approval
//! nodes to a terminal status. The output-value engine turns business events
//! on a project into auditable revenue-recognition records.
//!
//! Both engines are backend-agnostic: storage, the org directory, time, and
//! notification delivery are reached through the traits in [`interfaces`].
//! An in-memory store and directory ship in [`runtime`] for tests and
//! embedded use.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::CallbackError;
pub use interfaces::Clock;
pub use interfaces::ConditionAccessor;
pub use interfaces::CustomResolver;
pub use interfaces::DispatchError;
pub use interfaces::Directory;
pub use interfaces::DirectoryError;
pub use interfaces::NotificationSink;
pub use interfaces::OutputValueStore;
pub use interfaces::OutputValueTx;
pub use interfaces::RoleResolver;
pub use interfaces::StoreError;
pub use interfaces::TerminalCallback;
pub use interfaces::WorkflowStore;
pub use interfaces::WorkflowTx;
pub use runtime::Action;
pub use runtime::DirectorySnapshot;
pub use runtime::FileNotificationSink;
pub use runtime::InMemoryDirectory;
pub use runtime::InMemoryNotificationSink;
pub use runtime::InMemoryStore;
pub use runtime::ManualClock;
pub use runtime::NoopNotificationSink;
pub use runtime::OutputValueEngine;
pub use runtime::OutputValueError;
pub use runtime::PermissionGuard;
pub use runtime::Principal;
pub use runtime::RoleResolverRegistry;
pub use runtime::StderrNotificationSink;
pub use runtime::SweepReport;
pub use runtime::SweeperConfig;
pub use runtime::SystemClock;
pub use runtime::TemplateDetails;
pub use runtime::TimeoutSweeper;
pub use runtime::WorkflowConfig;
pub use runtime::WorkflowEngine;
pub use runtime::WorkflowError;
pub use runtime::WorkflowRegistry;
