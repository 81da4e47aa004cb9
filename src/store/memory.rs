//! In-process post store with optional JSON persistence.
//!
//! The on-disk shape keeps each post's metadata next to it, which makes
//! store files easy to write by hand:
//!
//! ```json
//! {
//!   "posts": [
//!     { "id": 10, "type": "block", "slug": "hero", "status": "publish",
//!       "meta": { "_fanculo_block_scss": ".hero { color: red; }" } }
//!   ],
//!   "transients": {
//!     "fanculo_blocks_need_recompile": { "value": {}, "expiresAt": "2025-01-01T00:05:00Z" }
//!   }
//! }
//! ```

use super::{Post, PostId, PostQuery, PostStore};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Post together with its metadata, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PostRecord {
    #[serde(flatten)]
    post: Post,
    #[serde(default)]
    meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Transient {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl Transient {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    posts: Vec<PostRecord>,
    #[serde(default)]
    transients: BTreeMap<String, Transient>,
}

#[derive(Debug, Default)]
struct Inner {
    posts: BTreeMap<PostId, PostRecord>,
    /// Metadata written for ids with no post record yet
    orphan_meta: BTreeMap<PostId, BTreeMap<String, Value>>,
    transients: BTreeMap<String, Transient>,
}

impl Inner {
    fn meta(&self, id: PostId) -> Option<&BTreeMap<String, Value>> {
        self.posts
            .get(&id)
            .map(|r| &r.meta)
            .or_else(|| self.orphan_meta.get(&id))
    }

    fn meta_mut(&mut self, id: PostId) -> &mut BTreeMap<String, Value> {
        match self.posts.get_mut(&id) {
            Some(record) => &mut record.meta,
            None => self.orphan_meta.entry(id).or_default(),
        }
    }
}

/// Thread-safe store backed by ordered maps.
///
/// Uses `RwLock` so concurrent generators can read while writes stay exclusive.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store file. A missing file yields an empty store bound to `path`.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let file: StoreFile = if path.exists() {
            let content =
                fs::read_to_string(path).map_err(|e| StoreError::Io(path.to_path_buf(), e))?;
            serde_json::from_str(&content).map_err(|e| StoreError::Parse(path.to_path_buf(), e))?
        } else {
            StoreFile::default()
        };

        let posts = file
            .posts
            .into_iter()
            .map(|record| (record.post.id, record))
            .collect();

        Ok(Self {
            inner: RwLock::new(Inner {
                posts,
                orphan_meta: BTreeMap::new(),
                transients: file.transients,
            }),
            path: Some(path.to_path_buf()),
        })
    }

    /// Write the store back to its file. No-op for purely in-memory stores.
    ///
    /// Expired transients are dropped on the way out.
    pub fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let now = Utc::now();
        let file = {
            let inner = self.inner.read();
            StoreFile {
                posts: inner.posts.values().cloned().collect(),
                transients: inner
                    .transients
                    .iter()
                    .filter(|(_, t)| !t.is_expired(now))
                    .map(|(k, t)| (k.clone(), t.clone()))
                    .collect(),
            }
        };

        let json = serde_json::to_string_pretty(&file).map_err(StoreError::Serialize)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }
        fs::write(path, json).map_err(|e| StoreError::Io(path.clone(), e))
    }

    /// Insert or replace a post, keeping any metadata already stored for it.
    ///
    /// Returns the previous revision of the post.
    pub fn upsert_post(&self, post: Post) -> Option<Post> {
        let mut inner = self.inner.write();
        let id = post.id;
        if let Some(record) = inner.posts.get_mut(&id) {
            return Some(std::mem::replace(&mut record.post, post));
        }
        let meta = inner.orphan_meta.remove(&id).unwrap_or_default();
        inner.posts.insert(id, PostRecord { post, meta });
        None
    }

    /// Remove a post and all of its metadata.
    pub fn remove_post(&self, id: PostId) -> Option<Post> {
        let mut inner = self.inner.write();
        inner.orphan_meta.remove(&id);
        inner.posts.remove(&id).map(|record| record.post)
    }

    /// Snapshot of every metadata entry of a post.
    pub fn all_meta(&self, id: PostId) -> BTreeMap<String, Value> {
        self.inner.read().meta(id).cloned().unwrap_or_default()
    }
}

impl PostStore for MemoryStore {
    fn get_post(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(self.inner.read().posts.get(&id).map(|r| r.post.clone()))
    }

    fn query_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError> {
        Ok(self
            .inner
            .read()
            .posts
            .values()
            .filter(|r| query.matches(&r.post))
            .map(|r| r.post.clone())
            .collect())
    }

    fn get_meta(&self, id: PostId, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .inner
            .read()
            .meta(id)
            .and_then(|meta| meta.get(key))
            .cloned())
    }

    fn set_meta(&self, id: PostId, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.write().meta_mut(id).insert(key.to_owned(), value);
        Ok(())
    }

    fn delete_meta(&self, id: PostId, key: &str) -> Result<(), StoreError> {
        self.inner.write().meta_mut(id).remove(key);
        Ok(())
    }

    fn get_transient(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = Utc::now();
        let inner = self.inner.read();
        Ok(inner
            .transients
            .get(key)
            .filter(|t| !t.is_expired(now))
            .map(|t| t.value.clone()))
    }

    fn set_transient(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.inner
            .write()
            .transients
            .insert(key.to_owned(), Transient { value, expires_at });
        Ok(())
    }

    fn delete_transient(&self, key: &str) -> Result<(), StoreError> {
        self.inner.write().transients.remove(key);
        Ok(())
    }
}
