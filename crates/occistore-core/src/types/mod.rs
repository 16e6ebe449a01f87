//! # Core Type Definitions
//!
//! This module contains the data model of the entity graph:
//! - Identifiers (`EntityId`, `CategoryId`)
//! - The `Entity` aggregate and its `EntityVariant` (resource or link)
//! - The per-entity version counter (`Serial`)
//! - Query result descriptors (`CollectionItem`, `EntityDescriptor`)
//! - Error types (`StoreError`)
//!
//! ## Ordering Guarantees
//!
//! All collections inside an entity are `BTreeMap`/`BTreeSet`, so the
//! serialized form of an entity is a pure function of its state. ETags
//! depend on this.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of an entity. Resources and links share one namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    /// Create a new entity identifier.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a category: a kind or a mixin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub String);

impl CategoryId {
    /// Create a new category identifier.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// SERIAL
// =============================================================================

/// Per-entity version counter.
///
/// Starts at 1 on creation and only ever moves forward, using saturating
/// arithmetic so it can never wrap back to a previously issued value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Serial(pub u64);

impl Serial {
    /// The serial of a freshly created entity.
    pub const INITIAL: Self = Self(1);

    /// Next serial, saturating at `u64::MAX`.
    #[must_use]
    pub const fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Get the raw serial value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::INITIAL
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// Resource or link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityVariant {
    /// A standalone managed object.
    Resource,
    /// A connection from `source` to `target`. Both are non-owning references.
    Link { source: EntityId, target: EntityId },
}

/// A node of the entity graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub variant: EntityVariant,
    /// Primary category. Exactly one per entity.
    pub kind: CategoryId,
    pub mixins: BTreeSet<CategoryId>,
    /// Attribute name -> canonical string value.
    pub attributes: BTreeMap<String, String>,
    /// Controlling principal. Never changes after creation.
    pub owner: String,
    pub serial: Serial,
    /// Links whose source is this entity. Maintained by the store.
    pub linked_from: BTreeSet<EntityId>,
}

impl Entity {
    /// Create a resource at serial 1.
    #[must_use]
    pub fn resource(
        id: EntityId,
        kind: CategoryId,
        mixins: BTreeSet<CategoryId>,
        attributes: BTreeMap<String, String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id,
            variant: EntityVariant::Resource,
            kind,
            mixins,
            attributes,
            owner: owner.into(),
            serial: Serial::INITIAL,
            linked_from: BTreeSet::new(),
        }
    }

    /// Create a link at serial 1.
    #[must_use]
    pub fn link(
        id: EntityId,
        kind: CategoryId,
        mixins: BTreeSet<CategoryId>,
        source: EntityId,
        target: EntityId,
        attributes: BTreeMap<String, String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id,
            variant: EntityVariant::Link { source, target },
            kind,
            mixins,
            attributes,
            owner: owner.into(),
            serial: Serial::INITIAL,
            linked_from: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn is_link(&self) -> bool {
        matches!(self.variant, EntityVariant::Link { .. })
    }

    /// Source of a link, `None` for resources.
    #[must_use]
    pub fn source(&self) -> Option<&EntityId> {
        match &self.variant {
            EntityVariant::Link { source, .. } => Some(source),
            EntityVariant::Resource => None,
        }
    }

    /// Target of a link, `None` for resources.
    #[must_use]
    pub fn target(&self) -> Option<&EntityId> {
        match &self.variant {
            EntityVariant::Link { target, .. } => Some(target),
            EntityVariant::Resource => None,
        }
    }

    /// The kind followed by every mixin, in order.
    pub fn categories(&self) -> impl Iterator<Item = &CategoryId> {
        std::iter::once(&self.kind).chain(self.mixins.iter())
    }
}

// =============================================================================
// QUERY RESULTS
// =============================================================================

/// One element of a collection listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: EntityId,
    pub owner: String,
}

/// Protocol tag for entity nodes in `Find` results.
pub const ENTITY_NODE_TAG: u8 = 0;

/// Result of a `Find`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub node_type: u8,
    pub id: EntityId,
    pub owner: String,
    pub serial: Serial,
    pub etag: String,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the entity store.
///
/// Lookups of absent ids are not errors; they yield empty results.
/// Only mutation safety and infrastructure failures surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No action handler is registered for the category.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// A link endpoint does not resolve to a stored entity.
    #[error("Dangling reference: link {link} points to missing entity {endpoint}")]
    DanglingReference { link: String, endpoint: String },

    /// A wire value carries a type tag the marshaller does not handle.
    #[error("Unsupported attribute type '{signature}' for key {key}")]
    UnsupportedAttributeType { key: String, signature: String },

    /// Pagination start lies beyond the materialized sequence.
    #[error("Index out of range: start {start} exceeds length {len}")]
    IndexOutOfRange { start: usize, len: usize },

    /// The ETag digest could not be computed.
    #[error("Digest unavailable: {0}")]
    DigestUnavailable(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_starts_at_one() {
        assert_eq!(Serial::default(), Serial(1));
        assert_eq!(Serial::INITIAL.value(), 1);
    }

    #[test]
    fn serial_saturating_increment() {
        assert_eq!(Serial(u64::MAX).increment(), Serial(u64::MAX));
        assert_eq!(Serial(4).increment(), Serial(5));
    }

    #[test]
    fn link_exposes_endpoints() {
        let link = Entity::link(
            EntityId::new("l1"),
            CategoryId::new("networkinterface"),
            BTreeSet::new(),
            EntityId::new("vm1"),
            EntityId::new("net1"),
            BTreeMap::new(),
            "alice",
        );
        assert!(link.is_link());
        assert_eq!(link.source(), Some(&EntityId::new("vm1")));
        assert_eq!(link.target(), Some(&EntityId::new("net1")));
    }

    #[test]
    fn resource_has_no_endpoints() {
        let resource = Entity::resource(
            EntityId::new("r1"),
            CategoryId::new("compute"),
            BTreeSet::new(),
            BTreeMap::new(),
            "alice",
        );
        assert!(!resource.is_link());
        assert!(resource.source().is_none());
        assert_eq!(resource.serial, Serial::INITIAL);
    }

    #[test]
    fn categories_lists_kind_first() {
        let mixins: BTreeSet<_> = [CategoryId::new("tag_b"), CategoryId::new("tag_a")]
            .into_iter()
            .collect();
        let resource = Entity::resource(
            EntityId::new("r1"),
            CategoryId::new("compute"),
            mixins,
            BTreeMap::new(),
            "alice",
        );
        let categories: Vec<_> = resource.categories().map(CategoryId::as_str).collect();
        assert_eq!(categories, vec!["compute", "tag_a", "tag_b"]);
    }
}
