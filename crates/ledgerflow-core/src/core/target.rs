// crates/ledgerflow-core/src/core/target.rs
// ============================================================================
// Module: Ledgerflow Business-Object References
// Description: Generic (content type, object id) addressing.
// Purpose: Bind workflow instances to business records without introspecting them.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`TargetRef`] names a business record by its content-type code and row id.
//! The workflow engine treats it as opaque; only registered condition accessors
//! and terminal callbacks know what lives behind it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ContentTypeCode;

// ============================================================================
// SECTION: Target Reference
// ============================================================================

/// Reference to a business record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetRef {
    /// Content-type code of the record.
    pub kind: ContentTypeCode,
    /// Row identifier owned by the business module.
    pub id: i64,
}

impl TargetRef {
    /// Builds a target reference.
    #[must_use]
    pub fn new(kind: impl Into<ContentTypeCode>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
