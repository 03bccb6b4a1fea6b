// crates/ledgerflow-core/src/runtime/registry.rs
// ============================================================================
// Module: Ledgerflow Workflow Registry
// Description: Business-module registrations consumed by the workflow engine.
// Purpose: Map content types, template codes, and tags to business callables.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Business modules register three kinds of callables:
//! - terminal callbacks keyed by `(content type, template code)`;
//! - condition accessors keyed by content type;
//! - custom approver resolvers keyed by tag.
//!
//! The engine stays kind-agnostic and only reaches business code through here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::ContentTypeCode;
use crate::core::TemplateCode;
use crate::interfaces::ConditionAccessor;
use crate::interfaces::CustomResolver;
use crate::interfaces::TerminalCallback;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registered business callables.
#[derive(Default, Clone)]
pub struct WorkflowRegistry {
    /// Terminal callbacks by content type and template code.
    callbacks: BTreeMap<(ContentTypeCode, TemplateCode), Arc<dyn TerminalCallback>>,
    /// Condition accessors by content type.
    accessors: BTreeMap<ContentTypeCode, Arc<dyn ConditionAccessor>>,
    /// Custom approver resolvers by tag.
    resolvers: BTreeMap<String, Arc<dyn CustomResolver>>,
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .field("accessors", &self.accessors.keys().collect::<Vec<_>>())
            .field("resolvers", &self.resolvers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl WorkflowRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the terminal callback for a content type and template code,
    /// replacing any earlier registration.
    pub fn register_callback(
        &mut self,
        content_type: impl Into<ContentTypeCode>,
        template_code: impl Into<TemplateCode>,
        callback: impl TerminalCallback + 'static,
    ) {
        self.callbacks.insert((content_type.into(), template_code.into()), Arc::new(callback));
    }

    /// Registers the condition accessor for a content type.
    pub fn register_condition_accessor(
        &mut self,
        content_type: impl Into<ContentTypeCode>,
        accessor: impl ConditionAccessor + 'static,
    ) {
        self.accessors.insert(content_type.into(), Arc::new(accessor));
    }

    /// Registers a custom approver resolver under a tag.
    pub fn register_custom_resolver(
        &mut self,
        tag: impl Into<String>,
        resolver: impl CustomResolver + 'static,
    ) {
        self.resolvers.insert(tag.into(), Arc::new(resolver));
    }

    /// Callback for a content type and template code.
    #[must_use]
    pub fn callback(
        &self,
        content_type: &ContentTypeCode,
        template_code: &TemplateCode,
    ) -> Option<&dyn TerminalCallback> {
        self.callbacks
            .get(&(content_type.clone(), template_code.clone()))
            .map(|callback| callback.as_ref())
    }

    /// Accessor for a content type.
    #[must_use]
    pub fn accessor(&self, content_type: &ContentTypeCode) -> Option<&dyn ConditionAccessor> {
        self.accessors.get(content_type).map(|accessor| accessor.as_ref())
    }

    /// Custom resolver for a tag.
    #[must_use]
    pub fn custom_resolver(&self, tag: &str) -> Option<&dyn CustomResolver> {
        self.resolvers.get(tag).map(|resolver| resolver.as_ref())
    }
}
