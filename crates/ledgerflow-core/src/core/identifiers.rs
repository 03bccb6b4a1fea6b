// crates/ledgerflow-core/src/core/identifiers.rs
// ============================================================================
// Module: Ledgerflow Identifiers
// Description: Canonical identifiers for directory, workflow, and output-value rows.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Row identifiers are storage-assigned 64-bit integers wrapped in distinct
//! newtypes so a `UserId` can never be passed where a `RecordId` is expected.
//! Code identifiers (roles, content types, templates, permissions) are strings;
//! the constructors that accept untrusted input validate their shape, the
//! `new` constructors do not.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Code identifier was empty.
    #[error("{kind} must not be empty")]
    Empty {
        /// Identifier kind label.
        kind: &'static str,
    },
    /// Code identifier exceeded the maximum length.
    #[error("{kind} exceeds {max} characters")]
    TooLong {
        /// Identifier kind label.
        kind: &'static str,
        /// Maximum allowed length.
        max: usize,
    },
    /// Code identifier contained characters outside the allowed set.
    #[error("{kind} contains invalid characters: {value}")]
    InvalidCharacters {
        /// Identifier kind label.
        kind: &'static str,
        /// Offending value.
        value: String,
    },
    /// Permission code did not have two or three dotted segments.
    #[error("permission code must be module.action or module.entity.action: {0}")]
    PermissionShape(String),
}

/// Maximum length of any code identifier.
pub const MAX_CODE_LENGTH: usize = 64;

// ============================================================================
// SECTION: Row Identifiers
// ============================================================================

/// Declares an integer row identifier newtype.
macro_rules! row_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row identifier.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw row identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self::new(value)
            }
        }
    };
}

row_identifier!(
    /// Directory user identifier.
    UserId
);
row_identifier!(
    /// Directory department identifier.
    DepartmentId
);
row_identifier!(
    /// Workflow template row identifier.
    TemplateId
);
row_identifier!(
    /// Approval node row identifier.
    NodeId
);
row_identifier!(
    /// Approval instance row identifier.
    InstanceId
);
row_identifier!(
    /// Approval record row identifier.
    RecordId
);
row_identifier!(
    /// Project identifier owned by the project module.
    ProjectId
);
row_identifier!(
    /// Output-value stage row identifier.
    StageId
);
row_identifier!(
    /// Output-value milestone row identifier.
    MilestoneId
);
row_identifier!(
    /// Output-value event row identifier.
    EventId
);
row_identifier!(
    /// Output-value record row identifier.
    OutputValueRecordId
);

// ============================================================================
// SECTION: Code Identifiers
// ============================================================================

/// Declares a string code identifier newtype with shape validation.
macro_rules! code_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a code without validation.
            #[must_use]
            pub fn new(code: impl Into<String>) -> Self {
                Self(code.into())
            }

            /// Creates a code after validating its shape.
            ///
            /// # Errors
            ///
            /// Returns [`IdentifierError`] when the code is empty, too long, or
            /// contains characters outside `[a-z0-9_]`.
            pub fn parse(code: &str) -> Result<Self, IdentifierError> {
                validate_code($kind, code)?;
                Ok(Self(code.to_string()))
            }

            /// Returns the code as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

code_identifier!(
    /// Role code such as `project_manager` or `cost_engineer`.
    RoleCode,
    "role code"
);
code_identifier!(
    /// Business content-type code such as `contract` or `plan`.
    ContentTypeCode,
    "content type code"
);
code_identifier!(
    /// Workflow template code, unique across templates.
    TemplateCode,
    "template code"
);

/// Validates a lower snake-case code.
fn validate_code(kind: &'static str, code: &str) -> Result<(), IdentifierError> {
    if code.is_empty() {
        return Err(IdentifierError::Empty {
            kind,
        });
    }
    if code.len() > MAX_CODE_LENGTH {
        return Err(IdentifierError::TooLong {
            kind,
            max: MAX_CODE_LENGTH,
        });
    }
    if !code.bytes().all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'_')
    {
        return Err(IdentifierError::InvalidCharacters {
            kind,
            value: code.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Permission Codes
// ============================================================================

/// Permission code of the form `module.action` or `module.entity.action`.
///
/// # Invariants
/// - Values built with [`PermissionCode::parse`] have two or three non-empty
///   lower snake-case segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionCode(String);

impl PermissionCode {
    /// Creates a permission code without validation.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Parses and validates a permission code.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the code is not `module.action` or
    /// `module.entity.action`.
    pub fn parse(code: &str) -> Result<Self, IdentifierError> {
        let segments: Vec<&str> = code.split('.').collect();
        if !(2 ..= 3).contains(&segments.len()) {
            return Err(IdentifierError::PermissionShape(code.to_string()));
        }
        for segment in &segments {
            validate_code("permission segment", segment)
                .map_err(|_| IdentifierError::PermissionShape(code.to_string()))?;
        }
        Ok(Self(code.to_string()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the module segment.
    #[must_use]
    pub fn module(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// Returns the trailing action verb.
    #[must_use]
    pub fn action(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or_default()
    }
}

impl fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PermissionCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_code_accepts_two_and_three_segments() {
        assert!(PermissionCode::parse("workflow.cancel").is_ok());
        let code = PermissionCode::parse("workflow.instance.cancel");
        assert!(code.is_ok());
        if let Ok(code) = code {
            assert_eq!(code.module(), "workflow");
            assert_eq!(code.action(), "cancel");
        }
    }

    #[test]
    fn permission_code_rejects_bad_shapes() {
        assert!(PermissionCode::parse("workflow").is_err());
        assert!(PermissionCode::parse("a.b.c.d").is_err());
        assert!(PermissionCode::parse("workflow..cancel").is_err());
        assert!(PermissionCode::parse("Workflow.Cancel").is_err());
    }

    #[test]
    fn code_parse_rejects_uppercase_and_empty() {
        assert!(RoleCode::parse("project_manager").is_ok());
        assert!(RoleCode::parse("").is_err());
        assert!(TemplateCode::parse("Contract-Review").is_err());
    }
}
