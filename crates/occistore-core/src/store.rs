//! # Entity Storage
//!
//! Primitive table operations the entity graph is built on.
//!
//! This module defines the `EntityStore` trait and its in-memory
//! implementation. The graph semantics (overwrite, merge, cascade, hooks)
//! live in `graph.rs` and are written once against this trait, so the
//! persistent backend in `storage` shares them unchanged.

use crate::{CategoryId, Entity, EntityId, StoreError};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// ENTITYSTORE TRAIT
// =============================================================================

/// Storage for entities and the category index.
///
/// All fallible operations return `Result<T, StoreError>` to support both
/// in-memory and persistent storage backends uniformly.
pub trait EntityStore: Send + Sync + std::fmt::Debug {
    /// Lookup an entity by id. Returns an owned copy for storage compatibility.
    fn get(&self, id: &EntityId) -> Result<Option<Entity>, StoreError>;

    /// Check if an entity exists.
    fn contains(&self, id: &EntityId) -> Result<bool, StoreError>;

    /// Insert or replace an entity. Returns the previous value, if any.
    ///
    /// This does not touch the category index.
    fn put(&mut self, entity: Entity) -> Result<Option<Entity>, StoreError>;

    /// Remove an entity. Returns the removed value, if any.
    ///
    /// This does not touch the category index.
    fn remove(&mut self, id: &EntityId) -> Result<Option<Entity>, StoreError>;

    /// Add an entity to a category bucket.
    fn index_insert(&mut self, category: &CategoryId, id: &EntityId) -> Result<(), StoreError>;

    /// Remove an entity from a category bucket, dropping the bucket once empty.
    fn index_remove(&mut self, category: &CategoryId, id: &EntityId) -> Result<(), StoreError>;

    /// Members of a category bucket, ordered by id. Empty if the bucket is absent.
    fn members(&self, category: &CategoryId) -> Result<Vec<EntityId>, StoreError>;

    /// Check if a category bucket exists.
    fn has_category(&self, category: &CategoryId) -> Result<bool, StoreError>;

    /// All non-empty categories, in order.
    fn categories(&self) -> Result<Vec<CategoryId>, StoreError>;

    /// Total number of entities.
    fn entity_count(&self) -> Result<usize, StoreError>;

    /// Every entity, ordered by id.
    fn entities(&self) -> Result<Vec<Entity>, StoreError>;

    /// Start grouping writes. Until the matching `commit_batch`, writes are
    /// visible to this store's reads but not yet durable. Batches nest.
    ///
    /// Backends without transactions apply writes immediately.
    fn begin_batch(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Make every write since the outermost `begin_batch` durable at once.
    fn commit_batch(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Discard every write since the outermost `begin_batch`.
    fn abort_batch(&mut self) {}
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

/// In-memory entity storage.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Entity storage: id -> entity
    entities: BTreeMap<EntityId, Entity>,

    /// Category index: category -> member ids
    index: BTreeMap<CategoryId, BTreeSet<EntityId>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        Ok(self.entities.get(id).cloned())
    }

    fn contains(&self, id: &EntityId) -> Result<bool, StoreError> {
        Ok(self.entities.contains_key(id))
    }

    fn put(&mut self, entity: Entity) -> Result<Option<Entity>, StoreError> {
        Ok(self.entities.insert(entity.id.clone(), entity))
    }

    fn remove(&mut self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        Ok(self.entities.remove(id))
    }

    fn index_insert(&mut self, category: &CategoryId, id: &EntityId) -> Result<(), StoreError> {
        self.index
            .entry(category.clone())
            .or_default()
            .insert(id.clone());
        Ok(())
    }

    fn index_remove(&mut self, category: &CategoryId, id: &EntityId) -> Result<(), StoreError> {
        if let Some(bucket) = self.index.get_mut(category) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.index.remove(category);
            }
        }
        Ok(())
    }

    fn members(&self, category: &CategoryId) -> Result<Vec<EntityId>, StoreError> {
        Ok(self
            .index
            .get(category)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn has_category(&self, category: &CategoryId) -> Result<bool, StoreError> {
        Ok(self.index.contains_key(category))
    }

    fn categories(&self) -> Result<Vec<CategoryId>, StoreError> {
        Ok(self.index.keys().cloned().collect())
    }

    fn entity_count(&self) -> Result<usize, StoreError> {
        Ok(self.entities.len())
    }

    fn entities(&self) -> Result<Vec<Entity>, StoreError> {
        Ok(self.entities.values().cloned().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
