//! Cache layers and their single invalidation entry point.
//!
//! | Layer            | Scope        | Keyed by            | Cleared by                    |
//! |------------------|--------------|---------------------|-------------------------------|
//! | [`TtlCell`]      | process      | nothing ("all")     | TTL or explicit `invalidate`  |
//! | [`ObjectCache`]  | process      | `(post, key)`       | [`CacheInvalidator`]          |
//! | transients       | `PostStore`  | `*_{post}_{slot}`   | TTL or [`CacheInvalidator`]   |
//!
//! Per-post state is only ever cleared through
//! [`CacheInvalidator::invalidate`], so the scheduler and the coordinator
//! can't drift apart on which keys belong to a post.

use crate::{
    error::StoreError,
    store::{PostId, PostStore, Slot},
};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Prefix of the per-post transient caching an assembled compile input.
pub const COMPILE_INPUT_TRANSIENT: &str = "fanculo_compile_input_";

/// Transient key caching the compile input of `post` for `slot`.
pub fn compile_input_key(post: PostId, slot: Slot) -> String {
    format!("{COMPILE_INPUT_TRANSIENT}{post}_{}", slot.as_str())
}

// ============================================================================
// TtlCell
// ============================================================================

/// Single cached value that expires after a fixed TTL.
///
/// Used for whole-table scans ("all blocks", "all global partials") where
/// there is no finer key to invalidate by.
#[derive(Debug)]
pub struct TtlCell<T> {
    ttl: Duration,
    slot: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached value or compute, store and return a fresh one.
    ///
    /// The compute closure runs without the lock held. Errors are not cached.
    pub fn get_or_try_insert_with<E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let value = f()?;
        *self.slot.lock() = Some((Instant::now(), value.clone()));
        Ok(value)
    }

    /// Cached value if still within its TTL.
    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock();
        slot.as_ref()
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

// ============================================================================
// ObjectCache
// ============================================================================

/// Per-process cache of JSON values grouped by post.
#[derive(Debug, Default)]
pub struct ObjectCache {
    entries: RwLock<FxHashMap<PostId, FxHashMap<String, Value>>>,
}

impl ObjectCache {
    pub fn get(&self, post: PostId, key: &str) -> Option<Value> {
        self.entries
            .read()
            .get(&post)
            .and_then(|group| group.get(key))
            .cloned()
    }

    pub fn set(&self, post: PostId, key: &str, value: Value) {
        self.entries
            .write()
            .entry(post)
            .or_default()
            .insert(key.to_owned(), value);
    }

    pub fn remove_post(&self, post: PostId) {
        self.entries.write().remove(&post);
    }
}

// ============================================================================
// CacheInvalidator
// ============================================================================

/// Clears every cache entry that belongs to one post.
pub struct CacheInvalidator {
    store: Arc<dyn PostStore>,
    objects: ObjectCache,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn PostStore>) -> Self {
        Self {
            store,
            objects: ObjectCache::default(),
        }
    }

    pub fn objects(&self) -> &ObjectCache {
        &self.objects
    }

    /// Drop the object-cache group and the transients keyed by `post`.
    pub fn invalidate(&self, post: PostId) -> Result<(), StoreError> {
        self.objects.remove_post(post);
        for slot in Slot::ALL {
            self.store.delete_transient(&compile_input_key(post, slot))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_ttl_cell_caches_until_invalidated() {
        let cell = TtlCell::new(Duration::from_secs(600));
        let calls = Cell::new(0);
        let compute = || -> Result<u32, ()> {
            calls.set(calls.get() + 1);
            Ok(calls.get())
        };

        assert_eq!(cell.get_or_try_insert_with(compute), Ok(1));
        assert_eq!(cell.get_or_try_insert_with(compute), Ok(1));
        assert_eq!(calls.get(), 1);

        cell.invalidate();
        assert_eq!(cell.get_or_try_insert_with(compute), Ok(2));
    }

    #[test]
    fn test_ttl_cell_zero_ttl_never_hits() {
        let cell = TtlCell::new(Duration::ZERO);
        cell.get_or_try_insert_with(|| Ok::<_, ()>(1)).unwrap();
        assert_eq!(cell.get(), None);
    }

    #[test]
    fn test_ttl_cell_does_not_cache_errors() {
        let cell: TtlCell<u32> = TtlCell::new(Duration::from_secs(60));
        assert_eq!(cell.get_or_try_insert_with(|| Err("down")), Err("down"));
        assert_eq!(cell.get_or_try_insert_with(|| Ok::<_, &str>(5)), Ok(5));
    }

    #[test]
    fn test_invalidate_clears_both_layers() {
        let store = Arc::new(MemoryStore::new());
        let caches = CacheInvalidator::new(store.clone());

        caches.objects().set(PostId(1), "input", json!(1));
        caches.objects().set(PostId(2), "input", json!(2));
        for slot in Slot::ALL {
            store
                .set_transient(&compile_input_key(PostId(1), slot), json!(1), Duration::from_secs(60))
                .unwrap();
        }

        caches.invalidate(PostId(1)).unwrap();

        assert_eq!(caches.objects().get(PostId(1), "input"), None);
        assert_eq!(caches.objects().get(PostId(2), "input"), Some(json!(2)));
        for slot in Slot::ALL {
            assert_eq!(
                store.get_transient(&compile_input_key(PostId(1), slot)).unwrap(),
                None
            );
        }
    }

    #[test]
    fn test_compile_input_key_format() {
        assert_eq!(
            compile_input_key(PostId(12), Slot::EditorStyle),
            "fanculo_compile_input_12_editorStyle"
        );
    }
}
