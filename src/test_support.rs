//! Fixtures shared by unit tests.

use crate::{
    config::SiteConfig,
    error::StoreError,
    pipeline::Pipeline,
    store::{
        ContentType, MemoryStore, Post, PostId, PostQuery, PostStore, meta::keys,
    },
};
use serde_json::{Value, json};
use std::{path::Path, sync::Arc, time::Duration};

pub fn set(store: &dyn PostStore, id: u64, key: &str, value: Value) {
    store.set_meta(PostId(id), key, value).unwrap();
}

pub fn add_block(store: &MemoryStore, id: u64, slug: &str) {
    store.upsert_post(Post::new(id, ContentType::Block, slug));
}

/// Block with front-end SCSS and an explicit partial selection.
pub fn add_styled_block(store: &MemoryStore, id: u64, slug: &str, selected: Value) {
    add_block(store, id, slug);
    set(store, id, keys::BLOCK_SCSS, json!(format!(".{slug} {{ color: red; }}")));
    set(store, id, keys::BLOCK_COMPILED_CSS, json!(format!(".{slug}{{color:red}}")));
    set(store, id, keys::BLOCK_SELECTED_PARTIALS, selected);
}

pub fn add_partial(store: &MemoryStore, id: u64, slug: &str, scss: &str) {
    store.upsert_post(Post::new(id, ContentType::ScssPartial, slug));
    set(store, id, keys::PARTIAL_SCSS, json!(scss));
}

pub fn add_global_partial(store: &MemoryStore, id: u64, slug: &str, order: i64) {
    add_partial(store, id, slug, &format!("${slug}: 1px;"));
    set(store, id, keys::PARTIAL_IS_GLOBAL, json!("1"));
    set(store, id, keys::PARTIAL_GLOBAL_ORDER, json!(order));
}

pub fn pipeline(store: Arc<dyn PostStore>, output: &Path) -> Pipeline {
    let mut config = SiteConfig::default();
    config.output.root = output.to_path_buf();
    Pipeline::new(store, &config)
}

/// Store wrapper whose metadata writes fail for one post.
pub struct RejectingStore {
    pub inner: MemoryStore,
    pub reject: PostId,
}

impl RejectingStore {
    fn check(&self, id: PostId, key: &str) -> Result<(), StoreError> {
        if id == self.reject {
            return Err(StoreError::WriteRejected {
                post: id,
                key: key.to_owned(),
                reason: "read-only row".into(),
            });
        }
        Ok(())
    }
}

impl PostStore for RejectingStore {
    fn get_post(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        self.inner.get_post(id)
    }

    fn query_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError> {
        self.inner.query_posts(query)
    }

    fn get_meta(&self, id: PostId, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get_meta(id, key)
    }

    fn set_meta(&self, id: PostId, key: &str, value: Value) -> Result<(), StoreError> {
        self.check(id, key)?;
        self.inner.set_meta(id, key, value)
    }

    fn delete_meta(&self, id: PostId, key: &str) -> Result<(), StoreError> {
        self.check(id, key)?;
        self.inner.delete_meta(id, key)
    }

    fn get_transient(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get_transient(key)
    }

    fn set_transient(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set_transient(key, value, ttl)
    }

    fn delete_transient(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete_transient(key)
    }
}
