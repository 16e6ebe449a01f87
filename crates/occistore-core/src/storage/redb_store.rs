//! # redb-backed Entity Storage
//!
//! A disk-backed `EntityStore` using the redb embedded database.
//!
//! Writes are staged in memory and reach the database in one write
//! transaction when the outermost batch commits. A primitive called outside
//! any batch is its own batch. Reads see staged writes first, so the graph
//! semantics on top are identical to the in-memory backend.

use crate::store::EntityStore;
use crate::{CategoryId, Entity, EntityId, StoreError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Table for entities: id -> postcard-serialized Entity
const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");

/// Table for the category index: category -> postcard-serialized member ids
const CATEGORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("categories");

/// Writes waiting for the next commit.
#[derive(Debug, Default)]
struct Batch {
    depth: usize,
    /// id -> new value, `None` for a removal
    entities: BTreeMap<String, Option<Entity>>,
    /// category -> full member list, empty when the bucket goes away
    buckets: BTreeMap<String, Vec<String>>,
}

/// A disk-backed entity store.
pub struct RedbStore {
    db: Database,
    batch: Option<Batch>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("batch", &self.batch.as_ref().map(|b| b.depth))
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| StoreError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| StoreError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(ENTITIES)
                .map_err(|e| StoreError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(CATEGORIES)
                .map_err(|e| StoreError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| StoreError::IoError(e.to_string()))?;
        }

        tracing::debug!(path = %path.as_ref().display(), "opened redb entity store");
        Ok(Self { db, batch: None })
    }

    fn pending(&mut self) -> &mut Batch {
        self.batch.get_or_insert_with(Batch::default)
    }

    /// Run `op` inside a batch of its own, committing on success.
    fn staged<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.begin_batch()?;
        match op(self) {
            Ok(value) => {
                self.commit_batch()?;
                Ok(value)
            }
            Err(e) => {
                self.abort_batch();
                Err(e)
            }
        }
    }

    fn committed_entity(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        match table
            .get(id)
            .map_err(|e| StoreError::IoError(e.to_string()))?
        {
            Some(data) => {
                let entity: Entity = postcard::from_bytes(data.value())
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    fn read_members(&self, category: &CategoryId) -> Result<Option<Vec<String>>, StoreError> {
        if let Some(members) = self
            .batch
            .as_ref()
            .and_then(|b| b.buckets.get(category.as_str()))
        {
            return Ok((!members.is_empty()).then(|| members.clone()));
        }

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(CATEGORIES)
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        match table
            .get(category.as_str())
            .map_err(|e| StoreError::IoError(e.to_string()))?
        {
            Some(data) => {
                let members: Vec<String> = postcard::from_bytes(data.value())
                    .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
                Ok(Some(members))
            }
            None => Ok(None),
        }
    }

    /// Stage a read-modify-write of one category bucket.
    fn rewrite_bucket(
        &mut self,
        category: &CategoryId,
        change: impl FnOnce(&mut Vec<String>) -> bool,
    ) -> Result<(), StoreError> {
        self.staged(|store| {
            let mut members = store.read_members(category)?.unwrap_or_default();
            if change(&mut members) {
                store
                    .pending()
                    .buckets
                    .insert(category.as_str().to_string(), members);
            }
            Ok(())
        })
    }

    /// Apply a finished batch in one write transaction.
    fn write_batch(&self, batch: Batch) -> Result<(), StoreError> {
        if batch.entities.is_empty() && batch.buckets.is_empty() {
            return Ok(());
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        {
            let mut entities = write_txn
                .open_table(ENTITIES)
                .map_err(|e| StoreError::IoError(e.to_string()))?;
            for (id, value) in &batch.entities {
                match value {
                    Some(entity) => {
                        let bytes = postcard::to_allocvec(entity)
                            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
                        entities
                            .insert(id.as_str(), bytes.as_slice())
                            .map_err(|e| StoreError::IoError(e.to_string()))?;
                    }
                    None => {
                        entities
                            .remove(id.as_str())
                            .map_err(|e| StoreError::IoError(e.to_string()))?;
                    }
                }
            }

            let mut categories = write_txn
                .open_table(CATEGORIES)
                .map_err(|e| StoreError::IoError(e.to_string()))?;
            for (category, members) in &batch.buckets {
                if members.is_empty() {
                    categories
                        .remove(category.as_str())
                        .map_err(|e| StoreError::IoError(e.to_string()))?;
                } else {
                    let bytes = postcard::to_allocvec(members)
                        .map_err(|e| StoreError::SerializationError(e.to_string()))?;
                    categories
                        .insert(category.as_str(), bytes.as_slice())
                        .map_err(|e| StoreError::IoError(e.to_string()))?;
                }
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        tracing::debug!(
            entities = batch.entities.len(),
            buckets = batch.buckets.len(),
            "committed redb batch"
        );
        Ok(())
    }
}

impl EntityStore for RedbStore {
    fn get(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        if let Some(staged) = self
            .batch
            .as_ref()
            .and_then(|b| b.entities.get(id.as_str()))
        {
            return Ok(staged.clone());
        }
        self.committed_entity(id.as_str())
    }

    fn contains(&self, id: &EntityId) -> Result<bool, StoreError> {
        if let Some(staged) = self
            .batch
            .as_ref()
            .and_then(|b| b.entities.get(id.as_str()))
        {
            return Ok(staged.is_some());
        }

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(table
            .get(id.as_str())
            .map_err(|e| StoreError::IoError(e.to_string()))?
            .is_some())
    }

    fn put(&mut self, entity: Entity) -> Result<Option<Entity>, StoreError> {
        self.staged(|store| {
            let previous = store.get(&entity.id)?;
            let key = entity.id.as_str().to_string();
            store.pending().entities.insert(key, Some(entity));
            Ok(previous)
        })
    }

    fn remove(&mut self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.staged(|store| {
            let removed = store.get(id)?;
            if removed.is_some() {
                store
                    .pending()
                    .entities
                    .insert(id.as_str().to_string(), None);
            }
            Ok(removed)
        })
    }

    fn index_insert(&mut self, category: &CategoryId, id: &EntityId) -> Result<(), StoreError> {
        self.rewrite_bucket(category, |members| {
            match members.binary_search_by(|m| m.as_str().cmp(id.as_str())) {
                Ok(_) => false,
                Err(pos) => {
                    members.insert(pos, id.to_string());
                    true
                }
            }
        })
    }

    fn index_remove(&mut self, category: &CategoryId, id: &EntityId) -> Result<(), StoreError> {
        self.rewrite_bucket(category, |members| {
            match members.binary_search_by(|m| m.as_str().cmp(id.as_str())) {
                Ok(pos) => {
                    members.remove(pos);
                    true
                }
                Err(_) => false,
            }
        })
    }

    fn members(&self, category: &CategoryId) -> Result<Vec<EntityId>, StoreError> {
        Ok(self
            .read_members(category)?
            .unwrap_or_default()
            .into_iter()
            .map(EntityId)
            .collect())
    }

    fn has_category(&self, category: &CategoryId) -> Result<bool, StoreError> {
        Ok(self.read_members(category)?.is_some())
    }

    fn categories(&self) -> Result<Vec<CategoryId>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(CATEGORIES)
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        let mut names = BTreeSet::new();
        for entry in table
            .iter()
            .map_err(|e| StoreError::IoError(e.to_string()))?
        {
            let (key, _) = entry.map_err(|e| StoreError::IoError(e.to_string()))?;
            names.insert(key.value().to_string());
        }
        if let Some(batch) = &self.batch {
            for (category, members) in &batch.buckets {
                if members.is_empty() {
                    names.remove(category);
                } else {
                    names.insert(category.clone());
                }
            }
        }
        Ok(names.into_iter().map(CategoryId).collect())
    }

    fn entity_count(&self) -> Result<usize, StoreError> {
        if self.batch.as_ref().is_some_and(|b| !b.entities.is_empty()) {
            return Ok(self.entities()?.len());
        }

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        let count = table
            .len()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    fn entities(&self) -> Result<Vec<Entity>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(ENTITIES)
            .map_err(|e| StoreError::IoError(e.to_string()))?;

        let mut result = BTreeMap::new();
        for entry in table
            .iter()
            .map_err(|e| StoreError::IoError(e.to_string()))?
        {
            let (key, value) = entry.map_err(|e| StoreError::IoError(e.to_string()))?;
            let entity: Entity = postcard::from_bytes(value.value())
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
            result.insert(key.value().to_string(), entity);
        }
        if let Some(batch) = &self.batch {
            for (id, staged) in &batch.entities {
                match staged {
                    Some(entity) => result.insert(id.clone(), entity.clone()),
                    None => result.remove(id),
                };
            }
        }
        Ok(result.into_values().collect())
    }

    fn begin_batch(&mut self) -> Result<(), StoreError> {
        self.pending().depth += 1;
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), StoreError> {
        let Some(batch) = self.batch.as_mut() else {
            return Ok(());
        };
        batch.depth = batch.depth.saturating_sub(1);
        if batch.depth > 0 {
            return Ok(());
        }
        match self.batch.take() {
            Some(batch) => self.write_batch(batch),
            None => Ok(()),
        }
    }

    fn abort_batch(&mut self) {
        if let Some(batch) = self.batch.take() {
            tracing::debug!(
                entities = batch.entities.len(),
                buckets = batch.buckets.len(),
                "discarded staged redb writes"
            );
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
