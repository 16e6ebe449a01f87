//! # Entity Graph
//!
//! The entity/link graph store: create, update, mixin association, lookup,
//! cascading delete and category listing.
//!
//! The graph owns an `EntityStore` backend and the `HookRegistry`. Every
//! operation is a finite synchronous mutation or lookup; callers that share
//! a graph across threads wrap it in a single lock.
//!
//! ## Lookup totality
//!
//! Absent ids never raise: `find` yields `None`, `load` yields an empty
//! descriptor, `update` echoes its input, `delete` does nothing. Mutation
//! safety (dangling link endpoints, unknown categories) is enforced.

use crate::hooks::{self, HookRegistry};
use crate::marshal::{Marshaller, WireAttributes};
use crate::store::{EntityStore, MemoryStore};
use crate::version::VersionTracker;
use crate::{
    CategoryId, CollectionItem, ENTITY_NODE_TAG, Entity, EntityDescriptor, EntityId, StoreError,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CONFIGURATION & RESULTS
// =============================================================================

/// Behavioural switches for the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphConfig {
    /// Refuse kinds that have no registered action handler.
    pub validate_categories: bool,
}

/// Full content of an entity as returned by `load`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEntity {
    pub id: EntityId,
    pub kind: CategoryId,
    pub mixins: Vec<CategoryId>,
    pub attributes: WireAttributes,
}

impl LoadedEntity {
    /// Descriptor for an id that is not stored.
    #[must_use]
    pub fn empty(id: EntityId) -> Self {
        Self {
            id,
            kind: CategoryId::new(""),
            mixins: Vec::new(),
            attributes: WireAttributes::new(),
        }
    }
}

/// Counts reported by `stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub entities: usize,
    pub resources: usize,
    pub links: usize,
    pub categories: usize,
}

// =============================================================================
// ENTITY GRAPH
// =============================================================================

/// The entity graph store.
#[derive(Debug)]
pub struct EntityGraph {
    store: Box<dyn EntityStore>,
    hooks: HookRegistry,
    config: GraphConfig,
}

impl Default for EntityGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityGraph {
    /// Create an empty in-memory graph with no-op hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(
            Box::new(MemoryStore::new()),
            HookRegistry::default(),
            GraphConfig::default(),
        )
    }

    /// Create a graph over an explicit backend, hook registry and config.
    #[must_use]
    pub fn with_store(
        store: Box<dyn EntityStore>,
        hooks: HookRegistry,
        config: GraphConfig,
    ) -> Self {
        Self {
            store,
            hooks,
            config,
        }
    }

    // -------------------------------------------------------------------------
    // CREATE
    // -------------------------------------------------------------------------

    /// Store version 1 of a resource, replacing any entity with the same id.
    pub fn save_resource(
        &mut self,
        id: EntityId,
        kind: CategoryId,
        mixins: Vec<CategoryId>,
        attributes: Option<&WireAttributes>,
        owner: &str,
    ) -> Result<EntityId, StoreError> {
        self.check_category(&kind)?;
        let decoded = Marshaller::decode(attributes);

        let mixins = mixin_set(&kind, mixins);
        let entity = Entity::resource(id.clone(), kind, mixins, decoded.attributes, owner);
        let entity = self.batched(|graph| graph.replace(entity))?;

        hooks::report(
            self.hooks.for_entity(&entity).post_create(&entity),
            "post_create",
            &entity,
        );
        Ok(id)
    }

    /// Store version 1 of a link, replacing any entity with the same id.
    ///
    /// Both endpoints must already be stored.
    pub fn save_link(
        &mut self,
        id: EntityId,
        kind: CategoryId,
        mixins: Vec<CategoryId>,
        source: EntityId,
        target: EntityId,
        attributes: Option<&WireAttributes>,
        owner: &str,
    ) -> Result<EntityId, StoreError> {
        self.check_category(&kind)?;
        for endpoint in [&source, &target] {
            if !self.store.contains(endpoint)? {
                return Err(StoreError::DanglingReference {
                    link: id.to_string(),
                    endpoint: endpoint.to_string(),
                });
            }
        }
        let decoded = Marshaller::decode(attributes);

        let mixins = mixin_set(&kind, mixins);
        let entity = Entity::link(
            id.clone(),
            kind,
            mixins,
            source.clone(),
            target,
            decoded.attributes,
            owner,
        );
        let entity = self.batched(|graph| {
            let entity = graph.replace(entity)?;
            graph.attach_to_source(&source, &entity.id)?;
            Ok(entity)
        })?;

        hooks::report(
            self.hooks.for_entity(&entity).post_create(&entity),
            "post_create",
            &entity,
        );
        Ok(id)
    }

    /// Write `entity` over whatever is stored under its id.
    ///
    /// The previous version leaves the category index and its source's
    /// back-references. Back-references pointing at this id are merged into
    /// the new version so links to it still cascade.
    fn replace(&mut self, mut entity: Entity) -> Result<Entity, StoreError> {
        if let Some(previous) = self.store.get(&entity.id)? {
            tracing::debug!(entity = %entity.id, "overwriting existing entity");
            for category in previous.categories() {
                self.store.index_remove(category, &previous.id)?;
            }
            if let Some(source) = previous.source() {
                self.detach_from_source(source, &previous.id)?;
            }
            entity.linked_from.extend(previous.linked_from);
        }

        for category in entity.categories() {
            self.store.index_insert(category, &entity.id)?;
        }
        self.store.put(entity.clone())?;
        Ok(entity)
    }

    /// Run `op` as one storage batch: committed on success, discarded on error.
    fn batched<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.store.begin_batch()?;
        match op(self) {
            Ok(value) => {
                self.store.commit_batch()?;
                Ok(value)
            }
            Err(e) => {
                self.store.abort_batch();
                Err(e)
            }
        }
    }

    fn check_category(&self, kind: &CategoryId) -> Result<(), StoreError> {
        if self.config.validate_categories && !self.hooks.is_registered(kind) {
            return Err(StoreError::UnknownCategory(kind.to_string()));
        }
        Ok(())
    }

    fn attach_to_source(&mut self, source: &EntityId, link: &EntityId) -> Result<(), StoreError> {
        if let Some(mut entity) = self.store.get(source)?
            && entity.linked_from.insert(link.clone())
        {
            self.store.put(entity)?;
        }
        Ok(())
    }

    fn detach_from_source(&mut self, source: &EntityId, link: &EntityId) -> Result<(), StoreError> {
        if let Some(mut entity) = self.store.get(source)?
            && entity.linked_from.remove(link)
        {
            self.store.put(entity)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // UPDATE
    // -------------------------------------------------------------------------

    /// Merge attributes into an existing entity.
    ///
    /// Returns the applied attributes re-encoded as strings. If `id` is not
    /// stored nothing happens and `attributes` is returned unchanged.
    pub fn update(
        &mut self,
        id: &EntityId,
        attributes: &WireAttributes,
    ) -> Result<WireAttributes, StoreError> {
        let Some(mut entity) = self.store.get(id)? else {
            tracing::info!(entity = %id, "update on missing entity ignored");
            return Ok(attributes.clone());
        };

        let decoded = Marshaller::decode(Some(attributes));
        entity.attributes.extend(decoded.attributes.clone());
        VersionTracker::bump(&mut entity);
        self.store.put(entity.clone())?;

        hooks::report(
            self.hooks.for_entity(&entity).post_update(&entity),
            "post_update",
            &entity,
        );
        Ok(Marshaller::encode(&decoded.attributes))
    }

    /// Attach `mixin` to every listed entity that does not carry it yet.
    ///
    /// Unknown ids are skipped, as are entities whose kind is `mixin`.
    pub fn save_mixin(&mut self, mixin: &CategoryId, entity_ids: &[EntityId]) -> Result<(), StoreError> {
        self.batched(|graph| {
            for id in entity_ids {
                let Some(mut entity) = graph.store.get(id)? else {
                    tracing::warn!(entity = %id, mixin = %mixin, "mixin target does not exist");
                    continue;
                };
                if entity.kind == *mixin {
                    tracing::debug!(entity = %id, mixin = %mixin, "mixin is the entity's kind");
                    continue;
                }
                if !entity.mixins.insert(mixin.clone()) {
                    continue;
                }

                VersionTracker::bump(&mut entity);
                graph.store.index_insert(mixin, id)?;
                graph.store.put(entity.clone())?;

                hooks::report(
                    graph.hooks.for_entity(&entity).mixin_added(mixin, &entity),
                    "mixin_added",
                    &entity,
                );
            }
            Ok(())
        })
    }

    /// Same as `save_mixin`.
    pub fn update_mixin(
        &mut self,
        mixin: &CategoryId,
        entity_ids: &[EntityId],
    ) -> Result<(), StoreError> {
        self.save_mixin(mixin, entity_ids)
    }

    /// Run a named action through the entity's handler.
    ///
    /// Returns `false` if the entity does not exist.
    pub fn execute_action(
        &self,
        id: &EntityId,
        action: &str,
        attributes: Option<&WireAttributes>,
    ) -> Result<bool, StoreError> {
        let Some(entity) = self.store.get(id)? else {
            return Ok(false);
        };
        let decoded = Marshaller::decode(attributes);
        self.hooks
            .for_entity(&entity)
            .execute(action, &decoded.attributes, &entity)?;
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // LOOKUP
    // -------------------------------------------------------------------------

    /// Descriptor of an entity, or `None` if it is not stored.
    pub fn find(&self, id: &EntityId) -> Result<Option<EntityDescriptor>, StoreError> {
        Ok(self.store.get(id)?.map(|entity| EntityDescriptor {
            node_type: ENTITY_NODE_TAG,
            etag: VersionTracker::compute_etag(&entity),
            id: entity.id,
            owner: entity.owner,
            serial: entity.serial,
        }))
    }

    /// Full content of an entity, or an empty descriptor if it is not stored.
    pub fn load(&self, id: &EntityId) -> Result<LoadedEntity, StoreError> {
        match self.store.get(id)? {
            Some(entity) => Ok(LoadedEntity {
                attributes: Marshaller::encode(&entity.attributes),
                id: entity.id,
                kind: entity.kind,
                mixins: entity.mixins.into_iter().collect(),
            }),
            None => {
                tracing::info!(entity = %id, "load of missing entity");
                Ok(LoadedEntity::empty(id.clone()))
            }
        }
    }

    /// Stored entity, if any.
    pub fn get(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.store.get(id)
    }

    /// Resolve a category (kind or mixin) to its members, falling back to a
    /// direct id lookup.
    ///
    /// `filters` is accepted for protocol compatibility and not applied.
    pub fn list_items(
        &self,
        category_or_id: &str,
        filters: Option<&WireAttributes>,
    ) -> Result<Vec<CollectionItem>, StoreError> {
        if filters.is_some_and(|f| !f.is_empty()) {
            tracing::debug!(collection = category_or_id, "list filters ignored");
        }

        let category = CategoryId::new(category_or_id);
        if self.store.has_category(&category)? {
            let mut items = Vec::new();
            for id in self.store.members(&category)? {
                if let Some(entity) = self.store.get(&id)? {
                    items.push(CollectionItem {
                        id: entity.id,
                        owner: entity.owner,
                    });
                }
            }
            return Ok(items);
        }

        Ok(self
            .store
            .get(&EntityId::new(category_or_id))?
            .map(|entity| CollectionItem {
                id: entity.id,
                owner: entity.owner,
            })
            .into_iter()
            .collect())
    }

    // -------------------------------------------------------------------------
    // DELETE
    // -------------------------------------------------------------------------

    /// Remove an entity together with every link that has it as source,
    /// or dissociate a mixin from all entities carrying it.
    ///
    /// Anything else is a no-op.
    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let entity_id = EntityId::new(id);
        if self.store.contains(&entity_id)? {
            let mut visited = BTreeSet::new();
            return self.batched(|graph| graph.delete_cascade(&entity_id, &mut visited));
        }

        let category = CategoryId::new(id);
        if self.store.has_category(&category)? {
            return self.batched(|graph| graph.dissociate_mixin(&category));
        }

        tracing::info!(entity = id, "delete of missing entity ignored");
        Ok(())
    }

    /// Depth-first removal: dependents go before the entity itself.
    ///
    /// `visited` stops the recursion on cyclic link graphs.
    fn delete_cascade(
        &mut self,
        id: &EntityId,
        visited: &mut BTreeSet<EntityId>,
    ) -> Result<(), StoreError> {
        if !visited.insert(id.clone()) {
            tracing::debug!(entity = %id, "cascade cycle, already removing");
            return Ok(());
        }
        let Some(entity) = self.store.get(id)? else {
            return Ok(());
        };

        for dependent in &entity.linked_from {
            tracing::debug!(entity = %id, link = %dependent, "cascading delete");
            self.delete_cascade(dependent, visited)?;
        }

        // Dependents rewrote our back-references; act on the current copy.
        let Some(entity) = self.store.get(id)? else {
            return Ok(());
        };
        hooks::report(
            self.hooks.for_entity(&entity).pre_delete(&entity),
            "pre_delete",
            &entity,
        );

        for category in entity.categories() {
            self.store.index_remove(category, id)?;
        }
        if let Some(source) = entity.source() {
            self.detach_from_source(source, id)?;
        }
        self.store.remove(id)?;
        Ok(())
    }

    fn dissociate_mixin(&mut self, mixin: &CategoryId) -> Result<(), StoreError> {
        for id in self.store.members(mixin)? {
            let Some(mut entity) = self.store.get(&id)? else {
                continue;
            };
            if !entity.mixins.remove(mixin) {
                continue;
            }

            VersionTracker::bump(&mut entity);
            if entity.kind != *mixin {
                self.store.index_remove(mixin, &id)?;
            }
            self.store.put(entity.clone())?;

            hooks::report(
                self.hooks.for_entity(&entity).mixin_removed(mixin, &entity),
                "mixin_removed",
                &entity,
            );
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // BULK ACCESS
    // -------------------------------------------------------------------------

    /// Every stored entity, ordered by id.
    pub fn entities(&self) -> Result<Vec<Entity>, StoreError> {
        self.store.entities()
    }

    /// Load entities verbatim (serials and back-references included).
    ///
    /// Entities already stored under the same ids are overwritten, keeping
    /// their back-references. Every restored link is re-attached to its
    /// source. Hooks are not fired.
    pub fn restore(&mut self, entities: Vec<Entity>) -> Result<usize, StoreError> {
        let count = entities.len();
        self.batched(|graph| {
            let mut links = Vec::new();
            for entity in entities {
                let entity = graph.replace(entity)?;
                if let Some(source) = entity.source() {
                    links.push((source.clone(), entity.id.clone()));
                }
            }
            for (source, link) in &links {
                graph.attach_to_source(source, link)?;
            }
            Ok(())
        })?;
        Ok(count)
    }

    /// Entity, link and category counts.
    pub fn stats(&self) -> Result<GraphStats, StoreError> {
        let entities = self.store.entities()?;
        let links = entities.iter().filter(|e| e.is_link()).count();
        Ok(GraphStats {
            entities: entities.len(),
            resources: entities.len().saturating_sub(links),
            links,
            categories: self.store.categories()?.len(),
        })
    }

    /// Number of stored entities.
    pub fn entity_count(&self) -> Result<usize, StoreError> {
        self.store.entity_count()
    }

    /// Raw attribute map of an entity, for callers that already hold strings.
    pub fn attributes(&self, id: &EntityId) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self
            .store
            .get(id)?
            .map(|e| e.attributes)
            .unwrap_or_default())
    }
}

/// Mixins of a new entity. The kind is never also a mixin.
fn mixin_set(kind: &CategoryId, mixins: Vec<CategoryId>) -> BTreeSet<CategoryId> {
    mixins.into_iter().filter(|m| m != kind).collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Serial;
    use crate::hooks::ActionHook;
    use crate::marshal::WireValue;
    use std::sync::{Arc, Mutex};

    fn wire(entries: Vec<(&str, WireValue)>) -> WireAttributes {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn add_resource(graph: &mut EntityGraph, id: &str, kind: &str) {
        graph
            .save_resource(EntityId::new(id), CategoryId::new(kind), vec![], None, "alice")
            .expect("save resource");
    }

    fn add_link(graph: &mut EntityGraph, id: &str, source: &str, target: &str) {
        graph
            .save_link(
                EntityId::new(id),
                CategoryId::new("networkinterface"),
                vec![],
                EntityId::new(source),
                EntityId::new(target),
                None,
                "alice",
            )
            .expect("save link");
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    impl ActionHook for Recorder {
        fn post_create(&self, entity: &Entity) -> Result<(), StoreError> {
            self.push(format!("create:{}", entity.id));
            Ok(())
        }

        fn post_update(&self, entity: &Entity) -> Result<(), StoreError> {
            self.push(format!("update:{}", entity.id));
            Ok(())
        }

        fn pre_delete(&self, entity: &Entity) -> Result<(), StoreError> {
            self.push(format!("delete:{}", entity.id));
            Ok(())
        }

        fn mixin_added(&self, mixin: &CategoryId, entity: &Entity) -> Result<(), StoreError> {
            self.push(format!("mixin+:{}:{}", mixin, entity.id));
            Ok(())
        }

        fn mixin_removed(&self, mixin: &CategoryId, entity: &Entity) -> Result<(), StoreError> {
            self.push(format!("mixin-:{}:{}", mixin, entity.id));
            Ok(())
        }
    }

    fn recorded_graph() -> (EntityGraph, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let graph = EntityGraph::with_store(
            Box::new(MemoryStore::new()),
            HookRegistry::new(recorder.clone()),
            GraphConfig::default(),
        );
        (graph, recorder)
    }

    #[test]
    fn save_then_load_widens_to_string() {
        let mut graph = EntityGraph::new();
        let attrs = wire(vec![("occi.compute.cores", WireValue::Int32(2))]);
        graph
            .save_resource(
                EntityId::new("r1"),
                CategoryId::new("compute"),
                vec![],
                Some(&attrs),
                "alice",
            )
            .expect("save");

        let loaded = graph.load(&EntityId::new("r1")).expect("load");
        assert_eq!(loaded.kind, CategoryId::new("compute"));
        assert_eq!(
            loaded.attributes.get("occi.compute.cores"),
            Some(&WireValue::String("2".to_string()))
        );
    }

    #[test]
    fn save_resource_overwrites_wholesale() {
        let mut graph = EntityGraph::new();
        let first = wire(vec![("a", WireValue::String("1".to_string()))]);
        let second = wire(vec![("b", WireValue::String("2".to_string()))]);
        let id = EntityId::new("r1");

        graph
            .save_resource(id.clone(), CategoryId::new("compute"), vec![], Some(&first), "alice")
            .expect("save");
        graph.update(&id, &first).expect("update");
        graph
            .save_resource(id.clone(), CategoryId::new("storage"), vec![], Some(&second), "bob")
            .expect("save");

        let entity = graph.get(&id).expect("get").expect("present");
        assert!(!entity.attributes.contains_key("a"));
        assert_eq!(entity.attributes["b"], "2");
        assert_eq!(entity.serial, Serial::INITIAL);
        assert_eq!(entity.owner, "bob");
        assert!(graph.list_items("compute", None).expect("list").is_empty());
        assert_eq!(graph.list_items("storage", None).expect("list").len(), 1);
    }

    #[test]
    fn save_link_rejects_missing_endpoints() {
        let mut graph = EntityGraph::new();
        let result = graph.save_link(
            EntityId::new("l1"),
            CategoryId::new("networkinterface"),
            vec![],
            EntityId::new("compute/vm1"),
            EntityId::new("network/net1"),
            None,
            "alice",
        );
        assert!(matches!(result, Err(StoreError::DanglingReference { .. })));
        assert!(graph.find(&EntityId::new("l1")).expect("find").is_none());
    }

    #[test]
    fn save_link_rejects_missing_target_only() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "vm1", "compute");
        let result = graph.save_link(
            EntityId::new("l1"),
            CategoryId::new("networkinterface"),
            vec![],
            EntityId::new("vm1"),
            EntityId::new("net1"),
            None,
            "alice",
        );
        assert_eq!(
            result,
            Err(StoreError::DanglingReference {
                link: "l1".to_string(),
                endpoint: "net1".to_string(),
            })
        );
    }

    #[test]
    fn save_link_registers_back_reference() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "vm1", "compute");
        add_resource(&mut graph, "net1", "network");
        add_link(&mut graph, "l1", "vm1", "net1");

        let vm = graph.get(&EntityId::new("vm1")).expect("get").expect("vm");
        assert!(vm.linked_from.contains(&EntityId::new("l1")));
        let net = graph.get(&EntityId::new("net1")).expect("get").expect("net");
        assert!(net.linked_from.is_empty());
    }

    #[test]
    fn update_merges_and_bumps() {
        let mut graph = EntityGraph::new();
        let id = EntityId::new("r1");
        let initial = wire(vec![
            ("keep", WireValue::String("k".to_string())),
            ("change", WireValue::String("old".to_string())),
        ]);
        graph
            .save_resource(id.clone(), CategoryId::new("compute"), vec![], Some(&initial), "alice")
            .expect("save");

        let echoed = graph
            .update(&id, &wire(vec![("change", WireValue::Boolean(true))]))
            .expect("update");
        assert_eq!(echoed.get("change"), Some(&WireValue::String("true".to_string())));

        let entity = graph.get(&id).expect("get").expect("present");
        assert_eq!(entity.attributes["keep"], "k");
        assert_eq!(entity.attributes["change"], "true");
        assert_eq!(entity.serial, Serial(2));
    }

    #[test]
    fn update_missing_echoes_input() {
        let mut graph = EntityGraph::new();
        let attrs = wire(vec![("x", WireValue::Int64(5))]);
        let echoed = graph.update(&EntityId::new("ghost"), &attrs).expect("update");
        assert_eq!(echoed, attrs);
        assert_eq!(graph.entity_count().expect("count"), 0);
    }

    #[test]
    fn save_mixin_adds_once() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "r1", "compute");
        let tag = CategoryId::new("gold");
        let ids = vec![EntityId::new("r1"), EntityId::new("ghost")];

        graph.save_mixin(&tag, &ids).expect("mixin");
        graph.update_mixin(&tag, &ids).expect("mixin again");

        let entity = graph.get(&EntityId::new("r1")).expect("get").expect("present");
        assert!(entity.mixins.contains(&tag));
        assert_eq!(entity.serial, Serial(2));
        assert_eq!(graph.list_items("gold", None).expect("list").len(), 1);
    }

    #[test]
    fn find_reports_serial_and_owner() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "r1", "compute");

        let found = graph.find(&EntityId::new("r1")).expect("find").expect("present");
        assert_eq!(found.node_type, ENTITY_NODE_TAG);
        assert_eq!(found.owner, "alice");
        assert_eq!(found.serial, Serial(1));
        assert!(!found.etag.is_empty());
        assert!(graph.find(&EntityId::new("nope")).expect("find").is_none());
    }

    #[test]
    fn load_missing_is_empty_descriptor() {
        let graph = EntityGraph::new();
        let loaded = graph.load(&EntityId::new("nope")).expect("load");
        assert_eq!(loaded, LoadedEntity::empty(EntityId::new("nope")));
    }

    #[test]
    fn delete_cascades_through_links() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "vm1", "compute");
        add_resource(&mut graph, "net1", "network");
        add_link(&mut graph, "l1", "vm1", "net1");
        add_link(&mut graph, "l2", "l1", "net1");

        graph.delete("vm1").expect("delete");

        for id in ["vm1", "l1", "l2"] {
            assert!(graph.find(&EntityId::new(id)).expect("find").is_none(), "{id}");
        }
        assert!(graph.find(&EntityId::new("net1")).expect("find").is_some());
        assert!(graph.list_items("compute", None).expect("list").is_empty());
        assert!(graph.list_items("networkinterface", None).expect("list").is_empty());
    }

    #[test]
    fn delete_link_clears_back_reference() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "vm1", "compute");
        add_resource(&mut graph, "net1", "network");
        add_link(&mut graph, "l1", "vm1", "net1");

        graph.delete("l1").expect("delete");

        let vm = graph.get(&EntityId::new("vm1")).expect("get").expect("vm");
        assert!(vm.linked_from.is_empty());
    }

    #[test]
    fn delete_missing_is_noop() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "r1", "compute");
        graph.delete("ghost").expect("delete");
        assert_eq!(graph.entity_count().expect("count"), 1);
    }

    #[test]
    fn delete_mixin_id_dissociates() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "r1", "compute");
        add_resource(&mut graph, "r2", "compute");
        let tag = CategoryId::new("gold");
        graph
            .save_mixin(&tag, &[EntityId::new("r1"), EntityId::new("r2")])
            .expect("mixin");

        graph.delete("gold").expect("delete");

        assert_eq!(graph.entity_count().expect("count"), 2);
        let r1 = graph.get(&EntityId::new("r1")).expect("get").expect("r1");
        assert!(r1.mixins.is_empty());
        assert_eq!(r1.serial, Serial(3));
        assert!(graph.list_items("gold", None).expect("list").is_empty());
    }

    #[test]
    fn delete_survives_link_cycle() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "a", "compute");
        add_resource(&mut graph, "b", "compute");
        add_link(&mut graph, "l1", "a", "b");
        // l2 starts at l1 and is then overwritten so that l1's own source
        // chain loops back through l2.
        add_link(&mut graph, "l2", "l1", "a");
        add_link(&mut graph, "l1", "l2", "b");

        graph.delete("l1").expect("delete");
        assert!(graph.find(&EntityId::new("l1")).expect("find").is_none());
        assert!(graph.find(&EntityId::new("l2")).expect("find").is_none());
    }

    #[test]
    fn list_falls_back_to_id() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "r1", "compute");

        let items = graph.list_items("r1", None).expect("list");
        assert_eq!(
            items,
            vec![CollectionItem {
                id: EntityId::new("r1"),
                owner: "alice".to_string(),
            }]
        );
        assert!(graph.list_items("unknown", None).expect("list").is_empty());
    }

    #[test]
    fn validation_refuses_unregistered_kind() {
        let hooks = HookRegistry::default().with(
            CategoryId::new("compute"),
            Arc::new(crate::hooks::LoggingHook::new("compute")),
        );
        let mut graph = EntityGraph::with_store(
            Box::new(MemoryStore::new()),
            hooks,
            GraphConfig {
                validate_categories: true,
            },
        );

        add_resource(&mut graph, "r1", "compute");
        let refused = graph.save_resource(
            EntityId::new("s1"),
            CategoryId::new("storage"),
            vec![],
            None,
            "alice",
        );
        assert_eq!(refused, Err(StoreError::UnknownCategory("storage".to_string())));
    }

    #[test]
    fn hooks_fire_in_lifecycle_order() {
        let (mut graph, recorder) = recorded_graph();
        add_resource(&mut graph, "vm1", "compute");
        add_resource(&mut graph, "net1", "network");
        add_link(&mut graph, "l1", "vm1", "net1");
        graph
            .update(&EntityId::new("vm1"), &WireAttributes::new())
            .expect("update");
        graph
            .save_mixin(&CategoryId::new("gold"), &[EntityId::new("vm1")])
            .expect("mixin");
        graph.delete("vm1").expect("delete");

        assert_eq!(
            recorder.events(),
            vec![
                "create:vm1",
                "create:net1",
                "create:l1",
                "update:vm1",
                "mixin+:gold:vm1",
                "delete:l1",
                "delete:vm1",
            ]
        );
    }

    #[test]
    fn restore_keeps_serials() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "r1", "compute");
        graph
            .update(&EntityId::new("r1"), &WireAttributes::new())
            .expect("update");
        let snapshot = graph.entities().expect("entities");

        let mut restored = EntityGraph::new();
        assert_eq!(restored.restore(snapshot).expect("restore"), 1);
        let found = restored.find(&EntityId::new("r1")).expect("find").expect("present");
        assert_eq!(found.serial, Serial(2));
        assert_eq!(restored.list_items("compute", None).expect("list").len(), 1);
    }

    #[test]
    fn stats_counts_variants() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "vm1", "compute");
        add_resource(&mut graph, "net1", "network");
        add_link(&mut graph, "l1", "vm1", "net1");

        let stats = graph.stats().expect("stats");
        assert_eq!(stats.entities, 3);
        assert_eq!(stats.resources, 2);
        assert_eq!(stats.links, 1);
        assert_eq!(stats.categories, 3);
    }

    #[test]
    fn save_mixin_naming_the_kind_is_ignored() {
        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "vm1", "compute");
        let compute = CategoryId::new("compute");

        graph
            .save_mixin(&compute, &[EntityId::new("vm1")])
            .expect("save mixin");
        let vm = graph.get(&EntityId::new("vm1")).expect("get").expect("present");
        assert!(vm.mixins.is_empty());
        assert_eq!(vm.serial, Serial::INITIAL);

        graph.delete("compute").expect("delete");
        assert_eq!(graph.list_items("compute", None).expect("list").len(), 1);
        assert!(graph.get(&EntityId::new("vm1")).expect("get").is_some());
    }

    #[test]
    fn kind_is_dropped_from_saved_mixins() {
        let mut graph = EntityGraph::new();
        graph
            .save_resource(
                EntityId::new("vm1"),
                CategoryId::new("compute"),
                vec![CategoryId::new("compute"), CategoryId::new("gold")],
                None,
                "alice",
            )
            .expect("save");

        let loaded = graph.load(&EntityId::new("vm1")).expect("load");
        assert_eq!(loaded.mixins, vec![CategoryId::new("gold")]);

        graph.delete("gold").expect("dissociate");
        assert_eq!(graph.list_items("compute", None).expect("list").len(), 1);
        assert!(!graph.store.has_category(&CategoryId::new("gold")).expect("has"));
    }

    #[test]
    fn restore_over_existing_entities_keeps_links_cascading() {
        let mut source = EntityGraph::new();
        add_resource(&mut source, "vm1", "compute");
        add_resource(&mut source, "net1", "network");
        add_link(&mut source, "l1", "vm1", "net1");
        let snapshot = source.entities().expect("entities");

        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "vm1", "compute");
        graph.restore(snapshot).expect("restore");

        let vm = graph.get(&EntityId::new("vm1")).expect("get").expect("present");
        assert!(vm.linked_from.contains(&EntityId::new("l1")));

        graph.delete("vm1").expect("delete");
        assert!(graph.get(&EntityId::new("l1")).expect("get").is_none());
        assert!(graph.get(&EntityId::new("net1")).expect("get").is_some());
    }

    #[test]
    fn restore_attaches_links_to_sources_outside_the_snapshot() {
        let mut source = EntityGraph::new();
        add_resource(&mut source, "vm1", "compute");
        add_resource(&mut source, "net1", "network");
        add_link(&mut source, "l1", "vm1", "net1");
        let links: Vec<Entity> = source
            .entities()
            .expect("entities")
            .into_iter()
            .filter(Entity::is_link)
            .collect();

        let mut graph = EntityGraph::new();
        add_resource(&mut graph, "vm1", "compute");
        add_resource(&mut graph, "net1", "network");
        graph.restore(links).expect("restore");

        graph.delete("vm1").expect("delete");
        assert!(graph.get(&EntityId::new("l1")).expect("get").is_none());
    }

    /// Memory store that records batch boundaries.
    #[derive(Debug, Default)]
    struct BatchLog {
        inner: MemoryStore,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl BatchLog {
        fn record(&self, event: &'static str) {
            self.log.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        }
    }

    impl EntityStore for BatchLog {
        fn get(&self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
            self.inner.get(id)
        }
        fn contains(&self, id: &EntityId) -> Result<bool, StoreError> {
            self.inner.contains(id)
        }
        fn put(&mut self, entity: Entity) -> Result<Option<Entity>, StoreError> {
            self.record("write");
            self.inner.put(entity)
        }
        fn remove(&mut self, id: &EntityId) -> Result<Option<Entity>, StoreError> {
            self.record("write");
            self.inner.remove(id)
        }
        fn index_insert(&mut self, category: &CategoryId, id: &EntityId) -> Result<(), StoreError> {
            self.record("write");
            self.inner.index_insert(category, id)
        }
        fn index_remove(&mut self, category: &CategoryId, id: &EntityId) -> Result<(), StoreError> {
            self.record("write");
            self.inner.index_remove(category, id)
        }
        fn members(&self, category: &CategoryId) -> Result<Vec<EntityId>, StoreError> {
            self.inner.members(category)
        }
        fn has_category(&self, category: &CategoryId) -> Result<bool, StoreError> {
            self.inner.has_category(category)
        }
        fn categories(&self) -> Result<Vec<CategoryId>, StoreError> {
            self.inner.categories()
        }
        fn entity_count(&self) -> Result<usize, StoreError> {
            self.inner.entity_count()
        }
        fn entities(&self) -> Result<Vec<Entity>, StoreError> {
            self.inner.entities()
        }
        fn begin_batch(&mut self) -> Result<(), StoreError> {
            self.record("begin");
            Ok(())
        }
        fn commit_batch(&mut self) -> Result<(), StoreError> {
            self.record("commit");
            Ok(())
        }
        fn abort_batch(&mut self) {
            self.record("abort");
        }
    }

    /// The log opens one batch and ends by committing it.
    fn single_batch(log: &[&str]) -> bool {
        log.first() == Some(&"begin")
            && log.last() == Some(&"commit")
            && log.iter().filter(|e| **e == "begin").count() == 1
    }

    #[test]
    fn each_mutation_is_one_storage_batch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = BatchLog {
            inner: MemoryStore::new(),
            log: log.clone(),
        };
        let mut graph =
            EntityGraph::with_store(Box::new(store), HookRegistry::default(), GraphConfig::default());
        let take = || std::mem::take(&mut *log.lock().unwrap_or_else(|e| e.into_inner()));

        add_resource(&mut graph, "vm1", "compute");
        assert!(single_batch(&take()));
        add_resource(&mut graph, "net1", "network");
        take();

        add_link(&mut graph, "l1", "vm1", "net1");
        assert!(single_batch(&take()));

        graph
            .save_mixin(&CategoryId::new("gold"), &[EntityId::new("vm1"), EntityId::new("net1")])
            .expect("save mixin");
        assert!(single_batch(&take()));

        graph.delete("vm1").expect("delete");
        let events = take();
        assert!(single_batch(&events));
        assert!(events.iter().filter(|e| **e == "write").count() > 3);
    }

    #[test]
    fn rejected_link_writes_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = BatchLog {
            inner: MemoryStore::new(),
            log: log.clone(),
        };
        let mut graph =
            EntityGraph::with_store(Box::new(store), HookRegistry::default(), GraphConfig::default());

        let result = graph.save_link(
            EntityId::new("l1"),
            CategoryId::new("networkinterface"),
            vec![],
            EntityId::new("vm1"),
            EntityId::new("net1"),
            None,
            "alice",
        );
        assert!(result.is_err());
        assert!(log.lock().unwrap_or_else(|e| e.into_inner()).is_empty());
    }
}
