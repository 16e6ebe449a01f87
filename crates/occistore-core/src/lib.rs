//! # occistore-core
//!
//! The entity/link graph store behind the occistore backend.
//!
//! Clients address typed, versioned entities (resources and the links
//! between them) by opaque ids and category ids. Attribute values arrive as
//! tagged wire values and are stored as canonical strings.
//!
//! ## Architectural Constraints
//!
//! - Synchronous: every operation is a finite graph mutation or lookup
//! - No async, no network dependencies
//! - Deterministic ordering: `BTreeMap`/`BTreeSet` throughout
//! - Side effects on providers only through the `ActionHook` registry

// =============================================================================
// MODULES
// =============================================================================

pub mod cursor;
pub mod formats;
pub mod graph;
pub mod hooks;
pub mod marshal;
pub mod primitives;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;
pub mod version;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    CategoryId, CollectionItem, ENTITY_NODE_TAG, Entity, EntityDescriptor, EntityId,
    EntityVariant, Serial, StoreError,
};

// =============================================================================
// RE-EXPORTS: Store
// =============================================================================

pub use cursor::{CursorHandle, CursorRegistry, IdGenerator};
pub use graph::{EntityGraph, GraphConfig, GraphStats, LoadedEntity};
pub use hooks::{ActionHook, HookRegistry, LoggingHook, NoopHook};
pub use marshal::{Decoded, Marshaller, WireAttributes, WireValue};
pub use session::{Session, StorageBackend};
pub use storage::RedbStore;
pub use store::{EntityStore, MemoryStore};
pub use version::VersionTracker;

// =============================================================================
// RE-EXPORTS: Formats
// =============================================================================

pub use formats::{SnapshotHeader, import_snapshot, snapshot_from_bytes, snapshot_to_bytes};
