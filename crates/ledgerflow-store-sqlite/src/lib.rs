// crates/ledgerflow-store-sqlite/src/lib.rs
// ============================================================================
// Module: Ledgerflow SQLite Store Library
// Description: Public API surface for the durable Ledgerflow store.
// Purpose: Expose the SQLite-backed workflow and output-value store.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! Durable implementation of the Ledgerflow storage seams. One [`SqliteStore`]
//! serves both the workflow engine and the output-value engine; every unit of
//! work runs in an immediate `SQLite` transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SCHEMA_VERSION;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
