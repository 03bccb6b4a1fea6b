// crates/ledgerflow-core/src/runtime/mod.rs
// ============================================================================
// Module: Ledgerflow Runtime
// Description: Engines, resolvers, and in-memory adapters.
// Purpose: Execute approval workflows and output-value recording against the interfaces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime hosts the [`WorkflowEngine`], the [`TimeoutSweeper`], and the
//! [`OutputValueEngine`], plus the in-memory store, directory, clocks, and
//! notification sinks used by tests and embedded deployments.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod clock;
pub mod directory;
pub mod engine;
pub mod guard;
pub mod modes;
pub mod notify;
pub mod output_value;
pub mod registry;
pub mod resolver;
pub mod roles;
pub mod store;
pub mod sweeper;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clock::ManualClock;
pub use clock::SystemClock;
pub use directory::DirectorySnapshot;
pub use directory::InMemoryDirectory;
pub use engine::Action;
pub use engine::TemplateDetails;
pub use engine::WorkflowConfig;
pub use engine::WorkflowEngine;
pub use engine::WorkflowError;
pub use guard::PermissionGuard;
pub use guard::Principal;
pub use modes::NodeVerdict;
pub use modes::node_verdict;
pub use notify::FileNotificationSink;
pub use notify::InMemoryNotificationSink;
pub use notify::NoopNotificationSink;
pub use notify::StderrNotificationSink;
pub use output_value::OutputValueEngine;
pub use output_value::OutputValueError;
pub use registry::WorkflowRegistry;
pub use resolver::ApproverResolver;
pub use resolver::department_leader;
pub use roles::RoleResolverRegistry;
pub use store::InMemoryStore;
pub use sweeper::SweepReport;
pub use sweeper::SweeperConfig;
pub use sweeper::TimeoutSweeper;
