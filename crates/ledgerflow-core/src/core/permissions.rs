// crates/ledgerflow-core/src/core/permissions.rs
// ============================================================================
// Module: Ledgerflow Permission Catalog
// Description: Named permission codes and role-binding validation.
// Purpose: Give engine guards a closed vocabulary of privileged actions.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The permission catalog lists every permission code a role may carry.
//! Engines never consult it directly; guards resolve an actor's roles through
//! the directory and check the granted codes. [`PermissionCatalog::builtin`]
//! carries the codes the engines themselves require.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::IdentifierError;
use crate::core::identifiers::PermissionCode;
use crate::core::identifiers::RoleCode;
use crate::core::org::Role;

// ============================================================================
// SECTION: Built-in Codes
// ============================================================================

/// Manage workflow templates.
pub const TEMPLATE_MANAGE: &str = "workflow.template.manage";
/// Force-cancel a non-terminal approval instance.
pub const INSTANCE_CANCEL: &str = "workflow.instance.cancel";
/// Intervene on flagged approval instances.
pub const INSTANCE_MANAGE: &str = "workflow.instance.manage";
/// Confirm calculated output-value records.
pub const RECORD_CONFIRM: &str = "output_value.record.confirm";
/// Void output-value records.
pub const RECORD_VOID: &str = "output_value.record.void";
/// Maintain the output-value catalog.
pub const CATALOG_MANAGE: &str = "output_value.catalog.manage";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Permission catalog errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// Permission code has an invalid shape.
    #[error(transparent)]
    InvalidCode(#[from] IdentifierError),
    /// Permission code registered twice.
    #[error("duplicate permission code: {0}")]
    Duplicate(PermissionCode),
    /// Role references a code outside the catalog.
    #[error("role {role} grants unknown permission {code}")]
    UnknownPermission {
        /// Role carrying the code.
        role: RoleCode,
        /// Unknown permission code.
        code: PermissionCode,
    },
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Catalog entry for a permission code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// Permission code.
    pub code: PermissionCode,
    /// Human-readable module label.
    pub module_label: String,
    /// Action verb, the last code segment.
    pub action: String,
    /// Whether the permission is currently grantable.
    pub active: bool,
}

/// Closed set of known permission codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionCatalog {
    /// Entries keyed by code.
    entries: BTreeMap<PermissionCode, PermissionEntry>,
}

impl PermissionCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the codes the engines check.
    #[must_use]
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        for (code, label) in [
            (TEMPLATE_MANAGE, "Workflow"),
            (INSTANCE_CANCEL, "Workflow"),
            (INSTANCE_MANAGE, "Workflow"),
            (RECORD_CONFIRM, "Output value"),
            (RECORD_VOID, "Output value"),
            (CATALOG_MANAGE, "Output value"),
        ] {
            let code = PermissionCode::new(code);
            let entry = PermissionEntry {
                action: code.action().to_string(),
                code: code.clone(),
                module_label: label.to_string(),
                active: true,
            };
            entries.insert(code, entry);
        }
        Self {
            entries,
        }
    }

    /// Registers an additional permission code.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the code is malformed or already present.
    pub fn register(&mut self, code: &str, module_label: &str) -> Result<(), PermissionError> {
        let code = PermissionCode::parse(code)?;
        if self.entries.contains_key(&code) {
            return Err(PermissionError::Duplicate(code));
        }
        let entry = PermissionEntry {
            action: code.action().to_string(),
            code: code.clone(),
            module_label: module_label.to_string(),
            active: true,
        };
        self.entries.insert(code, entry);
        Ok(())
    }

    /// Returns the entry for a code.
    #[must_use]
    pub fn get(&self, code: &PermissionCode) -> Option<&PermissionEntry> {
        self.entries.get(code)
    }

    /// Iterates entries in code order.
    pub fn entries(&self) -> impl Iterator<Item = &PermissionEntry> {
        self.entries.values()
    }

    /// Checks that a role only grants catalogued codes.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::UnknownPermission`] for the first unknown code.
    pub fn validate_role(&self, role: &Role) -> Result<(), PermissionError> {
        for code in &role.permissions {
            if !self.entries.contains_key(code) {
                return Err(PermissionError::UnknownPermission {
                    role: role.code.clone(),
                    code: code.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns true when the code is catalogued and active.
    #[must_use]
    pub fn is_active(&self, code: &PermissionCode) -> bool {
        self.entries.get(code).is_some_and(|entry| entry.active)
    }

    /// Sets the active flag on a catalogued code; returns false when unknown.
    pub fn set_active(&mut self, code: &PermissionCode, active: bool) -> bool {
        match self.entries.get_mut(code) {
            Some(entry) => {
                entry.active = active;
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
