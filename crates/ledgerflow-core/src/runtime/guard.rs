// crates/ledgerflow-core/src/runtime/guard.rs
// ============================================================================
// Module: Ledgerflow Permission Guard
// Description: Resolves an actor's granted permission codes from the directory.
// Purpose: Answer privileged-action checks for engine entry points.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! A user is permitted a code when the user is active, holds an active role
//! granting the code, and the catalog lists the code as active. The
//! [`Principal::System`] principal stands for trusted operators such as the
//! CLI and is always permitted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::PermissionCatalog;
use crate::core::PermissionCode;
use crate::core::UserId;
use crate::interfaces::Directory;
use crate::interfaces::DirectoryError;

// ============================================================================
// SECTION: Principals
// ============================================================================

/// Caller of an administrative operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    /// Directory user, checked against role grants.
    User(UserId),
    /// Trusted operator process.
    System,
}

impl Principal {
    /// Returns the user id for user principals.
    #[must_use]
    pub const fn user(self) -> Option<UserId> {
        match self {
            Self::User(user) => Some(user),
            Self::System => None,
        }
    }
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Permission checker over a directory and catalog.
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    /// Known permission codes.
    catalog: PermissionCatalog,
}

impl Default for PermissionGuard {
    fn default() -> Self {
        Self::new(PermissionCatalog::builtin())
    }
}

impl PermissionGuard {
    /// Creates a guard over a catalog.
    #[must_use]
    pub const fn new(catalog: PermissionCatalog) -> Self {
        Self {
            catalog,
        }
    }

    /// Returns the catalog.
    #[must_use]
    pub const fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Returns true when the user is granted the code.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when a lookup fails.
    pub fn is_permitted(
        &self,
        directory: &dyn Directory,
        user: UserId,
        code: &PermissionCode,
    ) -> Result<bool, DirectoryError> {
        if !self.catalog.is_active(code) {
            return Ok(false);
        }
        let Some(user) = directory.user(user)? else {
            return Ok(false);
        };
        if !user.active {
            return Ok(false);
        }
        for role_code in &user.roles {
            if let Some(role) = directory.role(role_code)?
                && role.active
                && role.permissions.contains(code)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns true when the principal is granted the code.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when a lookup fails.
    pub fn authorizes(
        &self,
        directory: &dyn Directory,
        principal: Principal,
        code: &PermissionCode,
    ) -> Result<bool, DirectoryError> {
        match principal {
            Principal::System => Ok(true),
            Principal::User(user) => self.is_permitted(directory, user, code),
        }
    }
}
