// crates/ledgerflow-core/src/runtime/resolver.rs
// ============================================================================
// Module: Ledgerflow Approver Resolution
// Description: Turns an approval node's binding into concrete approvers.
// Purpose: Resolve, de-duplicate, and filter the users who must act on a node.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Resolution follows the node's [`ApproverType`]. The output preserves first
//! occurrence order, contains each user once, and never contains an inactive
//! or unknown user. Manager lookups walk up the department tree from the
//! starting department, bounded by the configured hop count, until an active
//! leader is found.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use tracing::debug;
use tracing::warn;

use crate::core::ApprovalInstance;
use crate::core::ApprovalNode;
use crate::core::ApproverType;
use crate::core::RoleCode;
use crate::core::User;
use crate::core::UserId;
use crate::interfaces::Directory;
use crate::interfaces::DirectoryError;
use crate::runtime::engine::WorkflowError;
use crate::runtime::registry::WorkflowRegistry;

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Approver resolver bound to one directory and registry.
pub struct ApproverResolver<'a> {
    /// Org directory.
    directory: &'a dyn Directory,
    /// Business registrations for custom resolvers.
    registry: &'a WorkflowRegistry,
    /// Maximum parent departments visited when looking for a leader.
    walk_up_hops: u32,
}

impl<'a> ApproverResolver<'a> {
    /// Creates a resolver.
    #[must_use]
    pub const fn new(
        directory: &'a dyn Directory,
        registry: &'a WorkflowRegistry,
        walk_up_hops: u32,
    ) -> Self {
        Self {
            directory,
            registry,
            walk_up_hops,
        }
    }

    /// Resolves the approvers of a node for an instance.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Directory`] when a lookup fails and
    /// [`WorkflowError::ResolverFailed`] when a custom resolver errors.
    pub fn resolve(
        &self,
        instance: &ApprovalInstance,
        node: &ApprovalNode,
    ) -> Result<Vec<UserId>, WorkflowError> {
        let Some(binding) = &node.approvers else {
            return Ok(Vec::new());
        };
        let candidates: Vec<UserId> = match binding.approver_type {
            ApproverType::User => binding.users.clone(),
            ApproverType::Role => {
                let mut users = Vec::new();
                for role in &binding.roles {
                    users.extend(
                        active_role_holders(self.directory, role)?.iter().map(|user| user.id),
                    );
                }
                users
            }
            ApproverType::Department => {
                let mut users = Vec::new();
                for department in &binding.departments {
                    users.extend(
                        self.directory.users_in_department(*department)?.iter().map(|user| user.id),
                    );
                }
                users
            }
            ApproverType::DepartmentManager | ApproverType::CreatorManager => {
                match self.directory.user(instance.applicant)? {
                    Some(applicant) => {
                        department_leader(self.directory, &applicant, self.walk_up_hops, None)?
                            .into_iter()
                            .collect()
                    }
                    None => Vec::new(),
                }
            }
            ApproverType::Creator => vec![instance.applicant],
            ApproverType::Custom => {
                self.resolve_custom(instance, node, binding.custom_tag.as_deref())?
            }
        };
        let resolved = self.active_unique(candidates)?;
        debug!(
            instance_id = %instance.id,
            node = node.sequence,
            approvers = resolved.len(),
            "resolved node approvers"
        );
        Ok(resolved)
    }

    /// Calls the registered custom resolver; an unregistered tag resolves to nobody.
    fn resolve_custom(
        &self,
        instance: &ApprovalInstance,
        node: &ApprovalNode,
        tag: Option<&str>,
    ) -> Result<Vec<UserId>, WorkflowError> {
        let Some(tag) = tag else {
            return Ok(Vec::new());
        };
        let Some(resolver) = self.registry.custom_resolver(tag) else {
            warn!(tag, node = node.sequence, "no custom resolver registered");
            return Ok(Vec::new());
        };
        resolver.resolve(instance, node).map_err(|err| {
            warn!(tag, node = node.sequence, error = %err, "custom resolver failed");
            WorkflowError::ResolverFailed {
                tag: tag.to_string(),
                message: err.to_string(),
            }
        })
    }

    /// Keeps the first occurrence of each known, active user.
    fn active_unique(&self, candidates: Vec<UserId>) -> Result<Vec<UserId>, DirectoryError> {
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::new();
        for candidate in candidates {
            if !seen.insert(candidate) {
                continue;
            }
            if self.directory.user(candidate)?.is_some_and(|user| user.active) {
                resolved.push(candidate);
            }
        }
        Ok(resolved)
    }
}

// ============================================================================
// SECTION: Role Holders
// ============================================================================

/// Users holding a role; unknown or inactive roles have no holders.
///
/// # Errors
///
/// Returns [`DirectoryError`] when a lookup fails.
pub fn active_role_holders(
    directory: &dyn Directory,
    code: &RoleCode,
) -> Result<Vec<User>, DirectoryError> {
    if !directory.role(code)?.is_some_and(|role| role.active) {
        debug!(role = %code, "role unknown or inactive; no holders");
        return Ok(Vec::new());
    }
    directory.users_with_role(code)
}

// ============================================================================
// SECTION: Department Leaders
// ============================================================================

/// Finds the nearest active leader above a user, skipping `exclude`.
///
/// The user's own department is visited first, then up to `hops` parents.
///
/// # Errors
///
/// Returns [`DirectoryError`] when a lookup fails.
pub fn department_leader(
    directory: &dyn Directory,
    user: &User,
    hops: u32,
    exclude: Option<UserId>,
) -> Result<Option<UserId>, DirectoryError> {
    let mut current = user.department;
    for _ in 0..=hops {
        let Some(id) = current else {
            break;
        };
        let Some(department) = directory.department(id)? else {
            break;
        };
        if let Some(leader) = department.leader
            && Some(leader) != exclude
            && directory.user(leader)?.is_some_and(|candidate| candidate.active)
        {
            return Ok(Some(leader));
        }
        current = department.parent;
    }
    Ok(None)
}
