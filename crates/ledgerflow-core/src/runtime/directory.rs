// crates/ledgerflow-core/src/runtime/directory.rs
// ============================================================================
// Module: Ledgerflow In-Memory Directory
// Description: Org directory built from a JSON snapshot.
// Purpose: Serve user, department, and role lookups without a backing service.
// Dependencies: crate::core, crate::interfaces, serde
// ============================================================================

//! ## Overview
//! A [`DirectorySnapshot`] lists users, departments, and roles. Building an
//! [`InMemoryDirectory`] validates the snapshot: codes and ids are unique,
//! department parents form a forest, and every department or role reference
//! resolves. Lookups are then infallible map reads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::Department;
use crate::core::DepartmentId;
use crate::core::PermissionCatalog;
use crate::core::Role;
use crate::core::RoleCode;
use crate::core::User;
use crate::core::UserId;
use crate::interfaces::Directory;
use crate::interfaces::DirectoryError;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Serializable org snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Users.
    #[serde(default)]
    pub users: Vec<User>,
    /// Departments.
    #[serde(default)]
    pub departments: Vec<Department>,
    /// Roles.
    #[serde(default)]
    pub roles: Vec<Role>,
}

// ============================================================================
// SECTION: Directory
// ============================================================================

/// Validated, read-only org directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    /// Users by id.
    users: BTreeMap<UserId, User>,
    /// Departments by id.
    departments: BTreeMap<DepartmentId, Department>,
    /// Roles by code.
    roles: BTreeMap<RoleCode, Role>,
}

impl InMemoryDirectory {
    /// Builds a directory from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Invalid`] when the snapshot is inconsistent.
    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Result<Self, DirectoryError> {
        let mut departments = BTreeMap::new();
        let mut department_codes = BTreeSet::new();
        for department in snapshot.departments {
            if !department_codes.insert(department.code.clone()) {
                return Err(invalid(format!("duplicate department code {}", department.code)));
            }
            let id = department.id;
            if departments.insert(id, department).is_some() {
                return Err(invalid(format!("duplicate department id {id}")));
            }
        }
        for department in departments.values() {
            if let Some(parent) = department.parent
                && !departments.contains_key(&parent)
            {
                return Err(invalid(format!(
                    "department {} references unknown parent {parent}",
                    department.id
                )));
            }
        }
        check_acyclic(&departments)?;

        let mut roles = BTreeMap::new();
        for role in snapshot.roles {
            let code = role.code.clone();
            if roles.insert(code.clone(), role).is_some() {
                return Err(invalid(format!("duplicate role code {code}")));
            }
        }

        let mut users = BTreeMap::new();
        for user in snapshot.users {
            if let Some(department) = user.department
                && !departments.contains_key(&department)
            {
                return Err(invalid(format!(
                    "user {} references unknown department {department}",
                    user.id
                )));
            }
            if let Some(role) = user.roles.iter().find(|role| !roles.contains_key(*role)) {
                return Err(invalid(format!("user {} references unknown role {role}", user.id)));
            }
            let id = user.id;
            if users.insert(id, user).is_some() {
                return Err(invalid(format!("duplicate user id {id}")));
            }
        }
        for department in departments.values() {
            if let Some(leader) = department.leader
                && !users.contains_key(&leader)
            {
                return Err(invalid(format!(
                    "department {} leader {leader} is not a known user",
                    department.id
                )));
            }
        }

        Ok(Self {
            users,
            departments,
            roles,
        })
    }

    /// Parses a JSON snapshot and builds a directory.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Invalid`] when the JSON or snapshot is invalid.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DirectoryError> {
        let snapshot: DirectorySnapshot =
            serde_json::from_slice(bytes).map_err(|err| invalid(err.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// Checks every role against a permission catalog.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Invalid`] naming the first offending role.
    pub fn validate_permissions(&self, catalog: &PermissionCatalog) -> Result<(), DirectoryError> {
        for role in self.roles.values() {
            catalog.validate_role(role).map_err(|err| invalid(err.to_string()))?;
        }
        Ok(())
    }

    /// Number of users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

/// Rejects cycles in the department parent graph.
fn check_acyclic(departments: &BTreeMap<DepartmentId, Department>) -> Result<(), DirectoryError> {
    for start in departments.keys() {
        let mut seen = BTreeSet::new();
        let mut current = Some(*start);
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(invalid(format!("department parent cycle through {id}")));
            }
            current = departments.get(&id).and_then(|department| department.parent);
        }
    }
    Ok(())
}

/// Builds an invalid-snapshot error.
fn invalid(message: String) -> DirectoryError {
    DirectoryError::Invalid(message)
}

impl Directory for InMemoryDirectory {
    fn user(&self, id: UserId) -> Result<Option<User>, DirectoryError> {
        Ok(self.users.get(&id).cloned())
    }

    fn department(&self, id: DepartmentId) -> Result<Option<Department>, DirectoryError> {
        Ok(self.departments.get(&id).cloned())
    }

    fn role(&self, code: &RoleCode) -> Result<Option<Role>, DirectoryError> {
        Ok(self.roles.get(code).cloned())
    }

    fn users_with_role(&self, code: &RoleCode) -> Result<Vec<User>, DirectoryError> {
        Ok(self.users.values().filter(|user| user.has_role(code)).cloned().collect())
    }

    fn users_in_department(&self, id: DepartmentId) -> Result<Vec<User>, DirectoryError> {
        Ok(self.users.values().filter(|user| user.department == Some(id)).cloned().collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn department(id: i64, parent: Option<i64>) -> Department {
        Department {
            id: DepartmentId::new(id),
            code: format!("d{id}"),
            name: format!("Dept {id}"),
            parent: parent.map(DepartmentId::new),
            leader: None,
            active: true,
        }
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let snapshot = DirectorySnapshot {
            departments: vec![department(1, Some(2)), department(2, Some(1))],
            ..DirectorySnapshot::default()
        };
        assert!(matches!(
            InMemoryDirectory::from_snapshot(snapshot),
            Err(DirectoryError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_role_reference_is_rejected() {
        let snapshot = DirectorySnapshot {
            users: vec![User {
                id: UserId::new(1),
                name: "a".to_string(),
                active: true,
                department: None,
                roles: BTreeSet::from([RoleCode::new("ghost")]),
            }],
            ..DirectorySnapshot::default()
        };
        assert!(InMemoryDirectory::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn forest_with_roots_is_accepted() {
        let snapshot = DirectorySnapshot {
            departments: vec![department(1, None), department(2, Some(1)), department(3, None)],
            ..DirectorySnapshot::default()
        };
        assert!(InMemoryDirectory::from_snapshot(snapshot).is_ok());
    }
}
