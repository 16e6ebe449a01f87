//! # Action Hooks
//!
//! Lifecycle callbacks invoked by the entity graph at fixed points.
//!
//! Handlers are registered per category in a `HookRegistry` that is built
//! once at start-up and owned by the graph. Dispatch resolves the entity's
//! kind against the registry; kinds without a handler go to the fallback.

use crate::{CategoryId, Entity, StoreError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// ACTIONHOOK TRAIT
// =============================================================================

/// Callbacks fired by the entity graph.
///
/// Every method defaults to a no-op. Hook failures are logged by the caller
/// and never roll back the store mutation that triggered them.
pub trait ActionHook: Send + Sync {
    /// After a resource or link has been stored.
    fn post_create(&self, entity: &Entity) -> Result<(), StoreError> {
        let _ = entity;
        Ok(())
    }

    /// After attributes have been merged into an entity.
    fn post_update(&self, entity: &Entity) -> Result<(), StoreError> {
        let _ = entity;
        Ok(())
    }

    /// Before an entity is removed.
    fn pre_delete(&self, entity: &Entity) -> Result<(), StoreError> {
        let _ = entity;
        Ok(())
    }

    /// After `mixin` has been attached to `entity`.
    fn mixin_added(&self, mixin: &CategoryId, entity: &Entity) -> Result<(), StoreError> {
        let _ = (mixin, entity);
        Ok(())
    }

    /// After `mixin` has been detached from `entity`.
    fn mixin_removed(&self, mixin: &CategoryId, entity: &Entity) -> Result<(), StoreError> {
        let _ = (mixin, entity);
        Ok(())
    }

    /// Run a named action against an entity.
    fn execute(
        &self,
        action: &str,
        attributes: &BTreeMap<String, String>,
        entity: &Entity,
    ) -> Result<(), StoreError> {
        let _ = (action, attributes, entity);
        Ok(())
    }
}

/// Handler that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl ActionHook for NoopHook {}

/// Handler that records every lifecycle event in the log.
#[derive(Debug, Clone)]
pub struct LoggingHook {
    label: String,
}

impl LoggingHook {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ActionHook for LoggingHook {
    fn post_create(&self, entity: &Entity) -> Result<(), StoreError> {
        tracing::info!(
            handler = %self.label,
            entity = %entity.id,
            kind = %entity.kind,
            source = ?entity.source(),
            target = ?entity.target(),
            "post create"
        );
        Ok(())
    }

    fn post_update(&self, entity: &Entity) -> Result<(), StoreError> {
        tracing::info!(handler = %self.label, entity = %entity.id, serial = entity.serial.value(), "post update");
        Ok(())
    }

    fn pre_delete(&self, entity: &Entity) -> Result<(), StoreError> {
        tracing::info!(handler = %self.label, entity = %entity.id, "pre delete");
        Ok(())
    }

    fn mixin_added(&self, mixin: &CategoryId, entity: &Entity) -> Result<(), StoreError> {
        tracing::info!(handler = %self.label, entity = %entity.id, mixin = %mixin, "mixin added");
        Ok(())
    }

    fn mixin_removed(&self, mixin: &CategoryId, entity: &Entity) -> Result<(), StoreError> {
        tracing::info!(handler = %self.label, entity = %entity.id, mixin = %mixin, "mixin removed");
        Ok(())
    }

    fn execute(
        &self,
        action: &str,
        attributes: &BTreeMap<String, String>,
        entity: &Entity,
    ) -> Result<(), StoreError> {
        tracing::info!(
            handler = %self.label,
            entity = %entity.id,
            action,
            attributes = attributes.len(),
            "execute action"
        );
        Ok(())
    }
}

// =============================================================================
// HOOK REGISTRY
// =============================================================================

/// Category -> handler dispatch table.
#[derive(Clone)]
pub struct HookRegistry {
    handlers: BTreeMap<CategoryId, Arc<dyn ActionHook>>,
    fallback: Arc<dyn ActionHook>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("categories", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NoopHook))
    }
}

impl HookRegistry {
    /// Create an empty registry with the given fallback handler.
    #[must_use]
    pub fn new(fallback: Arc<dyn ActionHook>) -> Self {
        Self {
            handlers: BTreeMap::new(),
            fallback,
        }
    }

    /// Register (or replace) the handler for a category.
    pub fn register(&mut self, category: CategoryId, handler: Arc<dyn ActionHook>) {
        self.handlers.insert(category, handler);
    }

    /// Builder-style `register`.
    #[must_use]
    pub fn with(mut self, category: CategoryId, handler: Arc<dyn ActionHook>) -> Self {
        self.register(category, handler);
        self
    }

    /// Whether a dedicated handler exists for the category.
    #[must_use]
    pub fn is_registered(&self, category: &CategoryId) -> bool {
        self.handlers.contains_key(category)
    }

    /// Registered categories, in order.
    pub fn categories(&self) -> impl Iterator<Item = &CategoryId> {
        self.handlers.keys()
    }

    /// Handler for a category, or the fallback.
    #[must_use]
    pub fn resolve(&self, category: &CategoryId) -> &dyn ActionHook {
        self.handlers
            .get(category)
            .map_or(self.fallback.as_ref(), |h| h.as_ref())
    }

    /// Handler for an entity, chosen by its kind.
    #[must_use]
    pub fn for_entity(&self, entity: &Entity) -> &dyn ActionHook {
        self.resolve(&entity.kind)
    }
}

/// Log a failed hook invocation without propagating it.
pub(crate) fn report(result: Result<(), StoreError>, point: &str, entity: &Entity) {
    if let Err(e) = result {
        tracing::warn!(entity = %entity.id, point, "action hook failed: {}", e);
    }
}

// =============================================================================
// TESTS
// =============================================================================
