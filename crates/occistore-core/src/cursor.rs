//! # Collection Cursors
//!
//! Named, materialized snapshots of a listing.
//!
//! A cursor is opened over a fully evaluated sequence of collection items
//! and consumed with a single `read`: the first read removes the cursor
//! whatever range it asks for, and any later read with the same id yields
//! an empty sequence. Callers wanting another page open a new cursor.

use crate::primitives::CURSOR_PREFIX;
use crate::{CollectionItem, StoreError};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// ID GENERATOR
// =============================================================================

/// Process-wide unique number source.
///
/// Safe to share between threads; every call returns a distinct value.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next value.
    pub fn next_value(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Take the next value rendered with a prefix.
    pub fn next_id(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.next_value())
    }
}

// =============================================================================
// CURSOR REGISTRY
// =============================================================================

/// Handle returned when a cursor is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorHandle {
    pub cursor_id: String,
    /// Opaque value for client-side caching.
    pub serial: u64,
}

/// Open cursors, keyed by cursor id.
#[derive(Debug, Default)]
pub struct CursorRegistry {
    cursors: Mutex<BTreeMap<String, Vec<CollectionItem>>>,
    ids: IdGenerator,
}

impl CursorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a materialized sequence under a fresh cursor id.
    pub fn open(&self, items: Vec<CollectionItem>) -> CursorHandle {
        let cursor_id = self.ids.next_id(CURSOR_PREFIX);
        let serial = self.ids.next_value();
        tracing::debug!(cursor = %cursor_id, items = items.len(), "cursor opened");

        self.lock().insert(cursor_id.clone(), items);
        CursorHandle { cursor_id, serial }
    }

    /// Read `count` items from `start` and discard the cursor.
    ///
    /// A `count` of zero reads to the end. Unknown cursors read as empty.
    pub fn read(
        &self,
        cursor_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<CollectionItem>, StoreError> {
        let Some(mut items) = self.lock().remove(cursor_id) else {
            tracing::debug!(cursor = cursor_id, "read of unknown cursor");
            return Ok(Vec::new());
        };

        let len = items.len();
        if start > len {
            return Err(StoreError::IndexOutOfRange { start, len });
        }
        let end = if count == 0 {
            len
        } else {
            start.saturating_add(count).min(len)
        };

        items.truncate(end);
        Ok(items.split_off(start))
    }

    /// Number of cursors not yet read.
    pub fn open_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<CollectionItem>>> {
        self.cursors.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityId;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn items(n: usize) -> Vec<CollectionItem> {
        (0..n)
            .map(|i| CollectionItem {
                id: EntityId::new(format!("vm{i}")),
                owner: "alice".to_string(),
            })
            .collect()
    }

    #[test]
    fn cursor_ids_are_prefixed_and_unique() {
        let registry = CursorRegistry::new();
        let a = registry.open(items(1));
        let b = registry.open(items(1));
        assert!(a.cursor_id.starts_with(CURSOR_PREFIX));
        assert_ne!(a.cursor_id, b.cursor_id);
        assert_ne!(a.serial, b.serial);
    }

    #[test]
    fn full_read_then_empty() {
        let registry = CursorRegistry::new();
        let handle = registry.open(items(3));

        assert_eq!(registry.read(&handle.cursor_id, 0, 0).expect("read").len(), 3);
        assert!(registry.read(&handle.cursor_id, 0, 0).expect("read").is_empty());
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn partial_read_still_discards() {
        let registry = CursorRegistry::new();
        let handle = registry.open(items(5));

        let page = registry.read(&handle.cursor_id, 1, 2).expect("read");
        assert_eq!(
            page.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["vm1", "vm2"]
        );
        assert!(registry.read(&handle.cursor_id, 3, 0).expect("read").is_empty());
    }

    #[test]
    fn count_past_end_is_clamped() {
        let registry = CursorRegistry::new();
        let handle = registry.open(items(3));
        assert_eq!(registry.read(&handle.cursor_id, 2, 10).expect("read").len(), 1);
    }

    #[test]
    fn start_at_len_is_empty() {
        let registry = CursorRegistry::new();
        let handle = registry.open(items(3));
        assert!(registry.read(&handle.cursor_id, 3, 0).expect("read").is_empty());
    }

    #[test]
    fn start_beyond_len_is_out_of_range() {
        let registry = CursorRegistry::new();
        let handle = registry.open(items(2));
        assert_eq!(
            registry.read(&handle.cursor_id, 5, 0),
            Err(StoreError::IndexOutOfRange { start: 5, len: 2 })
        );
        // The failed read consumed the cursor too.
        assert!(registry.read(&handle.cursor_id, 0, 0).expect("read").is_empty());
    }

    #[test]
    fn unknown_cursor_reads_empty() {
        let registry = CursorRegistry::new();
        assert!(registry.read("collection999", 0, 0).expect("read").is_empty());
    }

    #[test]
    fn generator_is_unique_across_threads() {
        let generator = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..250).map(|_| generator.next_value()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        for handle in handles {
            for value in handle.join().expect("thread") {
                assert!(seen.insert(value), "duplicate id {value}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}
