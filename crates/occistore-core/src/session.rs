//! # Session Module
//!
//! A session pairs an `EntityGraph` with the `CursorRegistry` used by the
//! List/Next protocol calls.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryStore`, lost when the process exits
//! - `Persistent`: `RedbStore`, ACID storage in a single file

use crate::cursor::{CursorHandle, CursorRegistry};
use crate::graph::{EntityGraph, GraphConfig};
use crate::hooks::HookRegistry;
use crate::marshal::WireAttributes;
use crate::storage::RedbStore;
use crate::store::MemoryStore;
use crate::{CollectionItem, StoreError};
use std::path::Path;

/// Which storage a session was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory,
    /// Disk-backed store using redb.
    Persistent,
}

/// Entity graph plus open cursors.
#[derive(Debug)]
pub struct Session {
    graph: EntityGraph,
    cursors: CursorRegistry,
    backend: StorageBackend,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an empty in-memory session with no-op hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::in_memory(HookRegistry::default(), GraphConfig::default())
    }

    /// Create an empty in-memory session.
    #[must_use]
    pub fn in_memory(hooks: HookRegistry, config: GraphConfig) -> Self {
        Self {
            graph: EntityGraph::with_store(Box::new(MemoryStore::new()), hooks, config),
            cursors: CursorRegistry::new(),
            backend: StorageBackend::InMemory,
        }
    }

    /// Open (or create) a session backed by a redb file.
    pub fn with_redb(
        path: impl AsRef<Path>,
        hooks: HookRegistry,
        config: GraphConfig,
    ) -> Result<Self, StoreError> {
        let store = RedbStore::open(path)?;
        Ok(Self {
            graph: EntityGraph::with_store(Box::new(store), hooks, config),
            cursors: CursorRegistry::new(),
            backend: StorageBackend::Persistent,
        })
    }

    /// The storage backend in use.
    #[must_use]
    pub fn backend(&self) -> StorageBackend {
        self.backend
    }

    #[must_use]
    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut EntityGraph {
        &mut self.graph
    }

    #[must_use]
    pub fn cursors(&self) -> &CursorRegistry {
        &self.cursors
    }

    /// Materialize a listing into a new cursor.
    pub fn list(
        &self,
        category_or_id: &str,
        filters: Option<&WireAttributes>,
    ) -> Result<CursorHandle, StoreError> {
        let items = self.graph.list_items(category_or_id, filters)?;
        Ok(self.cursors.open(items))
    }

    /// Single-shot read of a cursor opened by `list`.
    pub fn next(
        &self,
        cursor_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<CollectionItem>, StoreError> {
        self.cursors.read(cursor_id, start, count)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{CategoryId, EntityId};
    use tempfile::tempdir;

    fn populate(session: &mut Session) {
        for id in ["vm1", "vm2", "vm3"] {
            session
                .graph_mut()
                .save_resource(
                    EntityId::new(id),
                    CategoryId::new("compute"),
                    vec![],
                    None,
                    "alice",
                )
                .expect("save");
        }
    }

    #[test]
    fn list_then_next_drains_once() {
        let mut session = Session::new();
        populate(&mut session);

        let handle = session.list("compute", None).expect("list");
        let items = session.next(&handle.cursor_id, 0, 0).expect("next");
        assert_eq!(items.len(), 3);
        assert!(session.next(&handle.cursor_id, 0, 0).expect("next").is_empty());
    }

    #[test]
    fn cursor_is_a_snapshot() {
        let mut session = Session::new();
        populate(&mut session);

        let handle = session.list("compute", None).expect("list");
        session.graph_mut().delete("vm1").expect("delete");

        assert_eq!(session.next(&handle.cursor_id, 0, 0).expect("next").len(), 3);
    }

    #[test]
    fn persistent_session_survives_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("occi.redb");

        {
            let mut session =
                Session::with_redb(&db_path, HookRegistry::default(), GraphConfig::default())
                    .expect("open");
            assert_eq!(session.backend(), StorageBackend::Persistent);
            populate(&mut session);
        }

        let session = Session::with_redb(&db_path, HookRegistry::default(), GraphConfig::default())
            .expect("reopen");
        let handle = session.list("compute", None).expect("list");
        assert_eq!(session.next(&handle.cursor_id, 0, 0).expect("next").len(), 3);
    }
}
