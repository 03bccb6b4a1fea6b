// crates/ledgerflow-core/src/runtime/roles.rs
// ============================================================================
// Module: Ledgerflow Responsible Role Resolution
// Description: Named strategies mapping responsible role codes to users.
// Purpose: Decide who is credited with an output-value record.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Each responsible role code maps to one [`RoleResolver`] strategy. The
//! default table reads project fields for manager roles, the project team for
//! engineering roles, and the directory for back-office roles. Business
//! modules may register additional codes or override defaults. Codes with no
//! strategy resolve to nobody.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::ProjectView;
use crate::core::RoleCode;
use crate::core::UserId;
use crate::interfaces::Directory;
use crate::interfaces::DirectoryError;
use crate::interfaces::RoleResolver;
use crate::runtime::resolver::active_role_holders;

// ============================================================================
// SECTION: Default Role Table
// ============================================================================

/// Roles read from project manager fields.
pub const PROJECT_FIELD_ROLES: [&str; 2] = ["business_manager", "project_manager"];
/// Roles read from the project team.
pub const TEAM_ROLES: [&str; 2] = ["professional_engineer", "professional_lead"];
/// Roles read from the directory.
pub const DIRECTORY_ROLES: [&str; 6] = [
    "technical_manager",
    "cost_manager",
    "cost_engineer",
    "cost_team",
    "admin_office",
    "finance_supervisor",
];

/// Reads the project's manager field matching the role.
fn project_field(
    project: &ProjectView,
    role: &RoleCode,
    _directory: &dyn Directory,
) -> Result<Option<UserId>, DirectoryError> {
    Ok(match role.as_str() {
        "business_manager" => project.business_manager,
        "project_manager" => project.project_manager,
        _ => None,
    })
}

/// First active team member holding the role.
fn team_member(
    project: &ProjectView,
    role: &RoleCode,
    _directory: &dyn Directory,
) -> Result<Option<UserId>, DirectoryError> {
    Ok(project.first_team_member(role))
}

/// First active directory user holding an active role.
fn directory_role(
    _project: &ProjectView,
    role: &RoleCode,
    directory: &dyn Directory,
) -> Result<Option<UserId>, DirectoryError> {
    Ok(active_role_holders(directory, role)?
        .into_iter()
        .find(|user| user.active)
        .map(|user| user.id))
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Responsible-role strategies keyed by role code.
#[derive(Clone, Default)]
pub struct RoleResolverRegistry {
    /// Strategies by role code.
    resolvers: BTreeMap<RoleCode, Arc<dyn RoleResolver>>,
}

impl fmt::Debug for RoleResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleResolverRegistry")
            .field("roles", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RoleResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the default role table.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for role in PROJECT_FIELD_ROLES {
            registry.register(RoleCode::new(role), project_field);
        }
        for role in TEAM_ROLES {
            registry.register(RoleCode::new(role), team_member);
        }
        for role in DIRECTORY_ROLES {
            registry.register(RoleCode::new(role), directory_role);
        }
        registry
    }

    /// Registers or replaces the strategy for a role code.
    pub fn register(&mut self, role: RoleCode, resolver: impl RoleResolver + 'static) {
        self.resolvers.insert(role, Arc::new(resolver));
    }

    /// Returns true when a strategy exists for the role code.
    #[must_use]
    pub fn contains(&self, role: &RoleCode) -> bool {
        self.resolvers.contains_key(role)
    }

    /// Resolves the responsible user; unknown role codes yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the strategy's lookup fails.
    pub fn resolve(
        &self,
        project: &ProjectView,
        role: &RoleCode,
        directory: &dyn Directory,
    ) -> Result<Option<UserId>, DirectoryError> {
        match self.resolvers.get(role) {
            Some(resolver) => resolver.resolve(project, role, directory),
            None => Ok(None),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::ProjectId;
    use crate::core::TeamMember;
    use crate::runtime::directory::DirectorySnapshot;
    use crate::runtime::directory::InMemoryDirectory;

    fn directory() -> InMemoryDirectory {
        let snapshot: DirectorySnapshot = serde_json::from_value(serde_json::json!({
            "roles": [{"code": "cost_manager", "name": "Cost manager"}],
            "users": [
                {"id": 1, "name": "Retired", "roles": ["cost_manager"], "active": false},
                {"id": 2, "name": "Current", "roles": ["cost_manager"]}
            ]
        }))
        .unwrap();
        InMemoryDirectory::from_snapshot(snapshot).unwrap()
    }

    fn project() -> ProjectView {
        ProjectView {
            id: ProjectId::new(1),
            name: "Bridge".to_string(),
            amounts: BTreeMap::new(),
            project_manager: Some(UserId::new(20)),
            business_manager: Some(UserId::new(21)),
            team: vec![
                TeamMember {
                    user: UserId::new(30),
                    role_code: RoleCode::new("professional_engineer"),
                    active: false,
                },
                TeamMember {
                    user: UserId::new(31),
                    role_code: RoleCode::new("professional_engineer"),
                    active: true,
                },
            ],
        }
    }

    #[test]
    fn default_table_covers_every_strategy() {
        let registry = RoleResolverRegistry::with_defaults();
        let directory = directory();
        let project = project();
        let resolve = |code: &str| registry.resolve(&project, &RoleCode::new(code), &directory).unwrap();
        assert_eq!(resolve("business_manager"), Some(UserId::new(21)));
        assert_eq!(resolve("project_manager"), Some(UserId::new(20)));
        assert_eq!(resolve("professional_engineer"), Some(UserId::new(31)));
        assert_eq!(resolve("professional_lead"), None);
        assert_eq!(resolve("cost_manager"), Some(UserId::new(2)));
        assert_eq!(resolve("finance_supervisor"), None);
        assert_eq!(resolve("unknown_role"), None);
    }

    #[test]
    fn inactive_directory_role_credits_nobody() {
        let snapshot: DirectorySnapshot = serde_json::from_value(serde_json::json!({
            "roles": [{"code": "cost_manager", "name": "Cost manager", "active": false}],
            "users": [{"id": 2, "name": "Current", "roles": ["cost_manager"]}]
        }))
        .unwrap();
        let directory = InMemoryDirectory::from_snapshot(snapshot).unwrap();
        let registry = RoleResolverRegistry::with_defaults();
        let resolved =
            registry.resolve(&project(), &RoleCode::new("cost_manager"), &directory).unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn registered_strategy_overrides_default() {
        let mut registry = RoleResolverRegistry::with_defaults();
        registry.register(
            RoleCode::new("project_manager"),
            |_: &ProjectView,
             _: &RoleCode,
             _: &dyn Directory|
             -> Result<Option<UserId>, DirectoryError> { Ok(Some(UserId::new(99))) },
        );
        let resolved =
            registry.resolve(&project(), &RoleCode::new("project_manager"), &directory()).unwrap();
        assert_eq!(resolved, Some(UserId::new(99)));
    }
}
