//! Cascading recompilation after a partial changed.
//!
//! The scheduler never compiles anything itself. It turns "partial P
//! changed" into per-block state that an external compiler later consumes:
//!
//! ```text
//! partial P changed
//!        │
//!        ▼
//! affected blocks ──► per block: slots with SCSS ──► none? skip
//!                                   │
//!                                   ▼
//!                     delete compiled CSS (per slot)
//!                     set needs-recompile + timestamp
//!                     CacheInvalidator::invalidate(block)
//!                                   │
//!                                   ▼
//!                  PendingRecompile transient (hint, TTL)
//! ```
//!
//! The per-block flag is the source of truth. The pending transient is only
//! a wake-up hint and is last-writer-wins.

use crate::{
    cache::CacheInvalidator,
    deps::DependencyResolver,
    error::{CompilationError, CoreError, CoreResult, StoreError},
    log,
    store::{ContentType, MetaExt, PostId, PostQuery, PostStore, Slot, meta::keys},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};

// ============================================================================
// Records
// ============================================================================

/// Outcome of one fan-out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecompileSummary {
    pub success: bool,
    pub partial_id: PostId,
    /// Fan-out went to every published block
    pub global: bool,
    /// Candidate blocks considered
    pub blocks_affected: usize,
    /// Blocks that had SCSS and were flagged
    pub blocks_flagged: usize,
    /// Block × slot compilations queued
    pub compilations_triggered: usize,
    /// Flagged blocks, in discovery order
    pub block_ids: Vec<PostId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BlockFailure>,
    pub message: String,
}

/// Per-block failure collected during a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockFailure {
    pub block_id: PostId,
    pub error: String,
}

/// Short-lived hint for the compiler that work is waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecompile {
    pub partial_id: PostId,
    pub block_ids: Vec<PostId>,
    pub enqueued_at: DateTime<Utc>,
}

/// Per-block recompile marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecompileFlag {
    pub needs_recompile: bool,
    pub timestamp: Option<i64>,
}

/// Successful compiler output for one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledCss {
    pub css: String,
    pub source_map: Option<String>,
}

/// Compile failure as kept on the block for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCompileError {
    pub slot: Slot,
    #[serde(flatten)]
    pub error: CompilationError,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct RecompilationScheduler {
    store: Arc<dyn PostStore>,
    resolver: Arc<DependencyResolver>,
    caches: Arc<CacheInvalidator>,
    pending_ttl: Duration,
    pending_key: String,
}

impl RecompilationScheduler {
    pub fn new(
        store: Arc<dyn PostStore>,
        resolver: Arc<DependencyResolver>,
        caches: Arc<CacheInvalidator>,
        pending_ttl: Duration,
        pending_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            caches,
            pending_ttl,
            pending_key: pending_key.into(),
        }
    }

    /// Fan out a change to `partial`: every published block when it is
    /// global, otherwise its explicit users.
    pub fn schedule(&self, partial: PostId) -> Result<RecompileSummary, StoreError> {
        if self.resolver.detect_global_impact(partial)? {
            self.recompile_global(partial)
        } else {
            self.recompile_partial(partial)
        }
    }

    /// Explicit-usage fan-out: blocks listing `partial` in either slot.
    pub fn recompile_partial(&self, partial: PostId) -> Result<RecompileSummary, StoreError> {
        let blocks = self.resolver.usage().blocks_using_partial_any_slot(partial)?;
        self.run(partial, false, &blocks)
    }

    /// Global fan-out: every published block, whatever it selected.
    pub fn recompile_global(&self, partial: PostId) -> Result<RecompileSummary, StoreError> {
        let blocks: Vec<PostId> = self
            .store
            .query_posts(&PostQuery::published(ContentType::Block))?
            .into_iter()
            .map(|post| post.id)
            .collect();
        self.run(partial, true, &blocks)
    }

    /// Flag `blocks` on behalf of `partial` and publish the pending hint.
    pub fn run(
        &self,
        partial: PostId,
        global: bool,
        blocks: &[PostId],
    ) -> Result<RecompileSummary, StoreError> {
        let mut summary = RecompileSummary {
            success: true,
            partial_id: partial,
            global,
            blocks_affected: blocks.len(),
            blocks_flagged: 0,
            compilations_triggered: 0,
            block_ids: Vec::new(),
            failures: Vec::new(),
            message: String::new(),
        };

        if blocks.is_empty() {
            summary.message = "no blocks affected".into();
            return Ok(summary);
        }

        for &block in blocks {
            match self.flag_block(block) {
                Ok(0) => {}
                Ok(slots) => {
                    summary.blocks_flagged += 1;
                    summary.compilations_triggered += slots;
                    summary.block_ids.push(block);
                }
                Err(e) => {
                    log!("recompile"; "block {block}: {e}");
                    summary.failures.push(BlockFailure {
                        block_id: block,
                        error: e.to_string(),
                    });
                }
            }
        }

        if !summary.block_ids.is_empty() {
            let pending = PendingRecompile {
                partial_id: partial,
                block_ids: summary.block_ids.clone(),
                enqueued_at: Utc::now(),
            };
            let value = serde_json::to_value(&pending).map_err(StoreError::Serialize)?;
            self.store
                .set_transient(&self.pending_key, value, self.pending_ttl)?;
        }

        summary.message = format!(
            "{} of {} blocks flagged, {} compilations queued",
            summary.blocks_flagged, summary.blocks_affected, summary.compilations_triggered
        );
        if !summary.failures.is_empty() {
            summary.message.push_str(&format!(", {} failed", summary.failures.len()));
        }
        log!("recompile"; "partial {partial}: {}", summary.message);
        Ok(summary)
    }

    /// Clear compiled CSS for every slot of `block` that has SCSS, then flag
    /// it and drop its caches. Returns the number of slots queued.
    pub fn flag_block(&self, block: PostId) -> Result<usize, StoreError> {
        let mut slots = Vec::with_capacity(Slot::ALL.len());
        for slot in Slot::ALL {
            if self.store.meta_text(block, slot.scss_key())?.is_some() {
                slots.push(slot);
            }
        }

        if slots.is_empty() {
            return Ok(0);
        }

        for slot in &slots {
            self.store.delete_meta(block, slot.compiled_key())?;
            self.store.delete_meta(block, slot.source_map_key())?;
        }
        self.mark_needs_recompile(block)?;
        self.caches.invalidate(block)?;
        Ok(slots.len())
    }

    /// Set the flag and refresh its timestamp. Repeating this is harmless.
    pub fn mark_needs_recompile(&self, block: PostId) -> Result<(), StoreError> {
        self.store.set_meta(block, keys::NEEDS_RECOMPILE, json!(true))?;
        self.store
            .set_meta(block, keys::RECOMPILE_TIMESTAMP, json!(Utc::now().timestamp()))
    }

    pub fn needs_recompile(&self, block: PostId) -> Result<bool, StoreError> {
        self.store.meta_flag(block, keys::NEEDS_RECOMPILE)
    }

    pub fn recompile_flag(&self, block: PostId) -> Result<RecompileFlag, StoreError> {
        Ok(RecompileFlag {
            needs_recompile: self.needs_recompile(block)?,
            timestamp: self.store.meta_int(block, keys::RECOMPILE_TIMESTAMP)?,
        })
    }

    /// Published blocks whose flag is set, ascending by id.
    pub fn flagged_blocks(&self) -> Result<Vec<PostId>, StoreError> {
        let mut flagged = Vec::new();
        for post in self
            .store
            .query_posts(&PostQuery::published(ContentType::Block))?
        {
            if self.needs_recompile(post.id)? {
                flagged.push(post.id);
            }
        }
        Ok(flagged)
    }

    /// Current pending hint, `None` once expired or when unreadable.
    pub fn pending(&self) -> Result<Option<PendingRecompile>, StoreError> {
        let Some(value) = self.store.get_transient(&self.pending_key)? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(pending) => Ok(Some(pending)),
            Err(e) => {
                log!("recompile"; "ignoring malformed `{}`: {e}", self.pending_key);
                Ok(None)
            }
        }
    }

    /// Accept a compiler result for one slot of `block`.
    ///
    /// Success stores the CSS and deletes the flag once every slot with SCSS
    /// has compiled output, returning whether the flag was cleared. Failure
    /// keeps the flag, records the error on the block and hands it back.
    pub fn complete(
        &self,
        block: PostId,
        slot: Slot,
        result: Result<CompiledCss, CompilationError>,
    ) -> CoreResult<bool> {
        if self.store.get_post(block)?.is_none() {
            return Err(CoreError::NotFound(block));
        }

        let compiled = match result {
            Ok(compiled) => compiled,
            Err(error) => {
                self.record_failure(block, slot, &error)?;
                return Err(CoreError::Compilation {
                    block,
                    source: error,
                });
            }
        };

        self.store
            .set_meta(block, slot.compiled_key(), Value::String(compiled.css))?;
        match compiled.source_map {
            Some(map) => self
                .store
                .set_meta(block, slot.source_map_key(), Value::String(map))?,
            None => self.store.delete_meta(block, slot.source_map_key())?,
        }
        self.store.delete_meta(block, slot.compile_error_key())?;

        let cleared = self.all_slots_compiled(block)?;
        if cleared {
            self.store.delete_meta(block, keys::NEEDS_RECOMPILE)?;
            self.store.delete_meta(block, keys::RECOMPILE_TIMESTAMP)?;
        }
        self.caches.invalidate(block)?;
        Ok(cleared)
    }

    /// Last compile failure kept for `slot` of `block`.
    pub fn compile_error(
        &self,
        block: PostId,
        slot: Slot,
    ) -> Result<Option<StoredCompileError>, StoreError> {
        Ok(self
            .store
            .get_meta(block, slot.compile_error_key())?
            .and_then(|value| serde_json::from_value(value).ok()))
    }

    fn record_failure(
        &self,
        block: PostId,
        slot: Slot,
        error: &CompilationError,
    ) -> Result<(), StoreError> {
        match error.partial {
            Some(partial) => {
                log!("error"; "block {block} ({}): {error} in partial {partial}", slot.as_str())
            }
            None => log!("error"; "block {block} ({}): {error}", slot.as_str()),
        }
        let stored = StoredCompileError {
            slot,
            error: error.clone(),
            at: Utc::now(),
        };
        let value = serde_json::to_value(&stored).map_err(StoreError::Serialize)?;
        self.store.set_meta(block, slot.compile_error_key(), value)
    }

    fn all_slots_compiled(&self, block: PostId) -> Result<bool, StoreError> {
        for slot in Slot::ALL {
            if self.store.meta_text(block, slot.scss_key())?.is_some()
                && self.store.meta_text(block, slot.compiled_key())?.is_none()
            {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::PartialsUsageIndex;
    use crate::store::MemoryStore;
    use crate::test_support::{
        RejectingStore, add_block, add_global_partial, add_partial, add_styled_block, set,
    };

    const PENDING_KEY: &str = "fanculo_blocks_need_recompile";

    fn scheduler(store: Arc<dyn PostStore>) -> RecompilationScheduler {
        let ttl = Duration::from_secs(600);
        let usage = Arc::new(PartialsUsageIndex::new(store.clone(), ttl));
        let resolver = Arc::new(DependencyResolver::new(store.clone(), usage, ttl));
        let caches = Arc::new(CacheInvalidator::new(store.clone()));
        RecompilationScheduler::new(store, resolver, caches, Duration::from_secs(300), PENDING_KEY)
    }

    #[test]
    fn test_unused_partial_touches_nothing() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "unused", "$u: 1;");
        add_styled_block(&store, 10, "hero", json!([]));
        let scheduler = scheduler(store.clone());

        let summary = scheduler.schedule(PostId(1)).unwrap();
        assert!(summary.success);
        assert_eq!(summary.blocks_affected, 0);
        assert_eq!(summary.message, "no blocks affected");
        assert!(!scheduler.needs_recompile(PostId(10)).unwrap());
        assert!(store.meta_text(PostId(10), keys::BLOCK_COMPILED_CSS).unwrap().is_some());
        assert!(scheduler.pending().unwrap().is_none());
    }

    #[test]
    fn test_selected_partial_change_flags_user() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        set(&*store, 10, keys::BLOCK_SCSS, json!(".x{color:red}"));
        add_styled_block(&store, 11, "card", json!([]));
        let scheduler = scheduler(store.clone());

        let summary = scheduler.schedule(PostId(1)).unwrap();
        assert_eq!(summary.blocks_affected, 1);
        assert_eq!(summary.blocks_flagged, 1);
        assert_eq!(summary.compilations_triggered, 1);
        assert!(store.meta_text(PostId(10), keys::BLOCK_COMPILED_CSS).unwrap().is_none());
        assert!(scheduler.needs_recompile(PostId(10)).unwrap());

        assert!(!scheduler.needs_recompile(PostId(11)).unwrap());
        assert!(store.meta_text(PostId(11), keys::BLOCK_COMPILED_CSS).unwrap().is_some());

        let pending = scheduler.pending().unwrap().unwrap();
        assert_eq!(pending.partial_id, PostId(1));
        assert_eq!(pending.block_ids, vec![PostId(10)]);
    }

    #[test]
    fn test_flagging_twice_is_stable() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        let scheduler = scheduler(store.clone());

        scheduler.schedule(PostId(1)).unwrap();
        let first = store.all_meta(PostId(10));
        let summary = scheduler.schedule(PostId(1)).unwrap();
        let second = store.all_meta(PostId(10));

        assert_eq!(summary.blocks_flagged, 1);
        assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
        assert!(scheduler.recompile_flag(PostId(10)).unwrap().needs_recompile);
        assert!(!second.contains_key(keys::BLOCK_COMPILED_CSS));
    }

    #[test]
    fn test_global_partial_flags_every_block_with_scss() {
        let store = Arc::new(MemoryStore::new());
        add_global_partial(&store, 2, "tokens", 0);
        add_styled_block(&store, 10, "hero", json!([]));
        add_block(&store, 11, "editor-only");
        set(&*store, 11, keys::BLOCK_EDITOR_SCSS, json!(".e { margin: 0; }"));
        add_block(&store, 12, "bare");
        let scheduler = scheduler(store.clone());

        let summary = scheduler.schedule(PostId(2)).unwrap();
        assert!(summary.global);
        assert_eq!(summary.blocks_affected, 3);
        assert_eq!(summary.blocks_flagged, 2);
        assert_eq!(summary.block_ids, vec![PostId(10), PostId(11)]);
        assert!(scheduler.needs_recompile(PostId(10)).unwrap());
        assert!(scheduler.needs_recompile(PostId(11)).unwrap());
        assert!(!scheduler.needs_recompile(PostId(12)).unwrap());
        assert_eq!(scheduler.flagged_blocks().unwrap(), vec![PostId(10), PostId(11)]);
    }

    #[test]
    fn test_both_slots_count_as_compilations() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        set(&*store, 10, keys::BLOCK_EDITOR_SCSS, json!(".hero-editor {}"));
        set(&*store, 10, keys::BLOCK_EDITOR_COMPILED_CSS, json!(".hero-editor{}"));

        let summary = scheduler(store.clone()).schedule(PostId(1)).unwrap();
        assert_eq!(summary.compilations_triggered, 2);
        assert!(
            store
                .meta_text(PostId(10), keys::BLOCK_EDITOR_COMPILED_CSS)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_write_failure_does_not_stop_siblings() {
        let inner = MemoryStore::new();
        add_partial(&inner, 1, "buttons", "$b: 1;");
        add_styled_block(&inner, 10, "hero", json!([1]));
        add_styled_block(&inner, 11, "card", json!([1]));
        let store = Arc::new(RejectingStore {
            inner,
            reject: PostId(10),
        });
        let scheduler = scheduler(store.clone());

        let summary = scheduler.schedule(PostId(1)).unwrap();
        assert!(summary.success);
        assert_eq!(summary.blocks_affected, 2);
        assert_eq!(summary.blocks_flagged, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].block_id, PostId(10));
        assert!(scheduler.needs_recompile(PostId(11)).unwrap());
        assert_eq!(scheduler.pending().unwrap().unwrap().block_ids, vec![PostId(11)]);
    }

    #[test]
    fn test_pending_is_last_writer_wins() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "a", "$a: 1;");
        add_partial(&store, 2, "b", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        add_styled_block(&store, 11, "card", json!([2]));
        let scheduler = scheduler(store.clone());

        scheduler.schedule(PostId(1)).unwrap();
        scheduler.schedule(PostId(2)).unwrap();
        let pending = scheduler.pending().unwrap().unwrap();
        assert_eq!(pending.partial_id, PostId(2));
        assert_eq!(pending.block_ids, vec![PostId(11)]);
        // Both flags survive regardless of the hint
        assert_eq!(scheduler.flagged_blocks().unwrap(), vec![PostId(10), PostId(11)]);
    }

    #[test]
    fn test_complete_success_clears_flag() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        let scheduler = scheduler(store.clone());
        scheduler.schedule(PostId(1)).unwrap();

        let compiled = CompiledCss {
            css: ".hero{color:red}".into(),
            source_map: Some("{}".into()),
        };
        assert!(scheduler.complete(PostId(10), Slot::Style, Ok(compiled)).unwrap());
        assert!(!scheduler.needs_recompile(PostId(10)).unwrap());
        let meta = store.all_meta(PostId(10));
        assert!(!meta.contains_key(keys::NEEDS_RECOMPILE));
        assert!(!meta.contains_key(keys::RECOMPILE_TIMESTAMP));
        assert_eq!(meta[keys::BLOCK_CSS_SOURCE_MAP], json!("{}"));
    }

    #[test]
    fn test_complete_waits_for_every_slot() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        set(&*store, 10, keys::BLOCK_EDITOR_SCSS, json!(".e {}"));
        let scheduler = scheduler(store.clone());
        scheduler.schedule(PostId(1)).unwrap();

        let css = |s: &str| {
            Ok(CompiledCss {
                css: s.into(),
                source_map: None,
            })
        };
        assert!(!scheduler.complete(PostId(10), Slot::Style, css(".a{}")).unwrap());
        assert!(scheduler.needs_recompile(PostId(10)).unwrap());
        assert!(scheduler.complete(PostId(10), Slot::EditorStyle, css(".e{}")).unwrap());
        assert!(!scheduler.needs_recompile(PostId(10)).unwrap());
    }

    #[test]
    fn test_complete_failure_keeps_flag_and_error() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        let scheduler = scheduler(store.clone());
        scheduler.schedule(PostId(1)).unwrap();

        let mut error = CompilationError::new("undefined variable").at(2, Some(5));
        error.partial = Some(PostId(1));
        let result = scheduler.complete(PostId(10), Slot::Style, Err(error.clone()));
        assert!(matches!(result, Err(CoreError::Compilation { block, .. }) if block == PostId(10)));
        assert!(scheduler.needs_recompile(PostId(10)).unwrap());

        let stored = scheduler.compile_error(PostId(10), Slot::Style).unwrap().unwrap();
        assert_eq!(stored.slot, Slot::Style);
        assert_eq!(stored.error, error);

        let ok = CompiledCss {
            css: ".hero{}".into(),
            source_map: None,
        };
        scheduler.complete(PostId(10), Slot::Style, Ok(ok)).unwrap();
        assert!(scheduler.compile_error(PostId(10), Slot::Style).unwrap().is_none());
    }

    #[test]
    fn test_editor_success_keeps_style_failure() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        set(&*store, 10, keys::BLOCK_EDITOR_SCSS, json!(".e {}"));
        let scheduler = scheduler(store.clone());
        scheduler.schedule(PostId(1)).unwrap();

        let failed = scheduler.complete(
            PostId(10),
            Slot::Style,
            Err(CompilationError::new("front broke")),
        );
        assert!(failed.is_err());
        let ok = CompiledCss {
            css: ".e{}".into(),
            source_map: None,
        };
        assert!(!scheduler.complete(PostId(10), Slot::EditorStyle, Ok(ok)).unwrap());

        assert!(scheduler.needs_recompile(PostId(10)).unwrap());
        let stored = scheduler.compile_error(PostId(10), Slot::Style).unwrap().unwrap();
        assert_eq!(stored.error.message, "front broke");
        assert!(scheduler.compile_error(PostId(10), Slot::EditorStyle).unwrap().is_none());
    }

    #[test]
    fn test_complete_unknown_block() {
        let store = Arc::new(MemoryStore::new());
        let result = scheduler(store).complete(PostId(404), Slot::Style, Ok(CompiledCss::default()));
        assert!(matches!(result, Err(CoreError::NotFound(PostId(404)))));
    }
}
