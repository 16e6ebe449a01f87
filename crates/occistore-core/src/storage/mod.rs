//! # Persistent Storage
//!
//! Disk-backed implementations of `EntityStore`.

mod redb_store;

pub use redb_store::RedbStore;
