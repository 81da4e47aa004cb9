//! Ordered compiler input for one block slot.
//!
//! ```text
//! global partials (globalOrder ↑) ─┐
//! selected partials (stored order) ├──► CompileInput::source()
//! block's own SCSS ────────────────┘
//! ```
//!
//! A partial that is global and also selected is only included once, at
//! its global position. Partials that are missing, unpublished or empty
//! contribute nothing.

use super::resolver::DependencyResolver;
use crate::{
    cache::{CacheInvalidator, compile_input_key},
    error::{CoreError, StoreError},
    log,
    store::{ContentType, MetaExt, PostId, PostStore, Slot, meta::keys},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// One partial contributing to a compile input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSource {
    pub id: PostId,
    pub slug: String,
    pub scss: String,
    pub global: bool,
}

/// Everything the external compiler needs for one block slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileInput {
    pub block: PostId,
    pub slot: Slot,
    pub partials: Vec<PartialSource>,
    pub scss: String,
}

impl CompileInput {
    /// Partial ids in inclusion order.
    pub fn order(&self) -> Vec<PostId> {
        self.partials.iter().map(|p| p.id).collect()
    }

    /// Nothing to compile.
    pub fn is_empty(&self) -> bool {
        self.scss.trim().is_empty()
    }

    /// Concatenated SCSS handed to the compiler.
    pub fn source(&self) -> String {
        self.segments().into_iter().map(|(_, text)| text).collect()
    }

    /// Partial that owns 1-based `line` of [`Self::source`], `None` for the block itself.
    pub fn line_origin(&self, line: u32) -> Option<PostId> {
        let mut start = 1u32;
        for (owner, text) in self.segments() {
            let lines = u32::try_from(text.lines().count()).unwrap_or(u32::MAX);
            if line < start.saturating_add(lines) {
                return owner;
            }
            start = start.saturating_add(lines);
        }
        None
    }

    fn segments(&self) -> Vec<(Option<PostId>, String)> {
        let mut segments: Vec<_> = self
            .partials
            .iter()
            .map(|p| {
                (
                    Some(p.id),
                    format!("/* partial: {} */\n{}\n", p.slug, p.scss.trim_end()),
                )
            })
            .collect();
        segments.push((None, format!("/* block: {} */\n{}\n", self.block, self.scss.trim_end())));
        segments
    }
}

/// Builds and caches [`CompileInput`]s.
pub struct CompileInputs {
    store: Arc<dyn PostStore>,
    resolver: Arc<DependencyResolver>,
    caches: Arc<CacheInvalidator>,
    ttl: Duration,
}

impl CompileInputs {
    pub fn new(
        store: Arc<dyn PostStore>,
        resolver: Arc<DependencyResolver>,
        caches: Arc<CacheInvalidator>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            caches,
            ttl,
        }
    }

    /// Compile input for `block` in `slot`, served from cache when possible.
    pub fn build(&self, block: PostId, slot: Slot) -> Result<CompileInput, StoreError> {
        let key = compile_input_key(block, slot);

        if let Some(input) = self
            .caches
            .objects()
            .get(block, &key)
            .and_then(|v| serde_json::from_value(v).ok())
        {
            return Ok(input);
        }
        if let Some(value) = self.store.get_transient(&key)?
            && let Ok(input) = serde_json::from_value::<CompileInput>(value.clone())
        {
            self.caches.objects().set(block, &key, value);
            return Ok(input);
        }

        let input = self.assemble(block, slot)?;
        if let Ok(value) = serde_json::to_value(&input) {
            self.store.set_transient(&key, value.clone(), self.ttl)?;
            self.caches.objects().set(block, &key, value);
        }
        Ok(input)
    }

    fn assemble(&self, block: PostId, slot: Slot) -> Result<CompileInput, StoreError> {
        let mut partials: Vec<PartialSource> = Vec::new();

        for global in self.resolver.global_partials()?.iter() {
            if let Some(scss) = self.store.meta_text(global.post.id, keys::PARTIAL_SCSS)? {
                partials.push(PartialSource {
                    id: global.post.id,
                    slug: global.post.slug.clone(),
                    scss,
                    global: true,
                });
            }
        }

        for id in self.resolver.usage().selected_partials(block, slot)? {
            if partials.iter().any(|p| p.id == id) {
                continue;
            }
            let Some(post) = self.store.get_post(id)? else {
                log!("deps"; "{}, skipped in block {block}", CoreError::NotFound(id));
                continue;
            };
            if post.content_type() != Some(ContentType::ScssPartial) || !post.is_published() {
                continue;
            }
            if let Some(scss) = self.store.meta_text(id, keys::PARTIAL_SCSS)? {
                partials.push(PartialSource {
                    id,
                    slug: post.slug,
                    scss,
                    global: false,
                });
            }
        }

        Ok(CompileInput {
            block,
            slot,
            partials,
            scss: self.store.meta_text(block, slot.scss_key())?.unwrap_or_default(),
        })
    }
}
