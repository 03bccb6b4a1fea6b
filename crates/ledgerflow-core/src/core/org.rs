// crates/ledgerflow-core/src/core/org.rs
// ============================================================================
// Module: Ledgerflow Organization Model
// Description: Users, departments, and roles read by approver resolution.
// Purpose: Define the minimal identity and org read model the engines consume.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The org model is a read model: Ledgerflow never mutates users, departments,
//! or roles. Department parents form a forest, each user belongs to at most one
//! department, and a department's leader acts as the supervisor of its members.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DepartmentId;
use crate::core::identifiers::PermissionCode;
use crate::core::identifiers::RoleCode;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Users
// ============================================================================

/// Directory user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Whether the user may be assigned work.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Owning department, if any.
    #[serde(default)]
    pub department: Option<DepartmentId>,
    /// Role codes held by the user.
    #[serde(default)]
    pub roles: BTreeSet<RoleCode>,
}

impl User {
    /// Returns true when the user holds the role.
    #[must_use]
    pub fn has_role(&self, role: &RoleCode) -> bool {
        self.roles.contains(role)
    }
}

// ============================================================================
// SECTION: Departments
// ============================================================================

/// Directory department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Department identifier.
    pub id: DepartmentId,
    /// Unique department code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Parent department; `None` for a root.
    #[serde(default)]
    pub parent: Option<DepartmentId>,
    /// Department leader, if assigned.
    #[serde(default)]
    pub leader: Option<UserId>,
    /// Whether the department is active.
    #[serde(default = "default_active")]
    pub active: bool,
}

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Directory role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role code.
    pub code: RoleCode,
    /// Display name.
    pub name: String,
    /// Permission codes granted by the role.
    #[serde(default)]
    pub permissions: BTreeSet<PermissionCode>,
    /// Whether the role currently grants anything.
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Serde default for `active` flags.
const fn default_active() -> bool {
    true
}
