//! Global-impact detection for saved posts.
//!
//! A partial is either *selected* (opt-in per block and slot) or *global*
//! (implicitly prepended to every block's styles in ascending
//! `globalOrder`). A change to a global partial therefore affects every
//! published block, regardless of what the block selected.

use super::usage::PartialsUsageIndex;
use crate::{
    cache::TtlCell,
    error::{CoreError, StoreError},
    log,
    store::{
        ContentType, MetaExt, Post, PostId, PostQuery, PostStore,
        meta::{is_truthy, keys},
    },
};
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

/// A global partial and its position in the implicit prelude.
#[derive(Debug, Clone)]
pub struct GlobalPartial {
    pub post: Post,
    pub order: i64,
}

/// Blocks that must recompile after a partial changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedBlocks {
    pub global: bool,
    pub blocks: Vec<PostId>,
}

/// Impact statistics for one partial.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub partial_id: PostId,
    pub is_global: bool,
    /// Blocks with an explicit selection edge to the partial
    pub explicit_users: Vec<PostId>,
    /// Blocks a change to the partial fans out to
    pub affected_blocks: Vec<PostId>,
}

pub struct DependencyResolver {
    store: Arc<dyn PostStore>,
    usage: Arc<PartialsUsageIndex>,
    globals: TtlCell<Arc<[GlobalPartial]>>,
}

impl DependencyResolver {
    pub fn new(store: Arc<dyn PostStore>, usage: Arc<PartialsUsageIndex>, ttl: Duration) -> Self {
        Self {
            store,
            usage,
            globals: TtlCell::new(ttl),
        }
    }

    pub fn usage(&self) -> &PartialsUsageIndex {
        &self.usage
    }

    /// True iff `post` is an SCSS partial flagged global.
    ///
    /// Trashed partials keep their flag, so deleting a global partial reports
    /// impact just like editing it.
    pub fn detect_global_impact(&self, post: PostId) -> Result<bool, StoreError> {
        let Some(found) = self.store.get_post(post)? else {
            log!("deps"; "{}, no global impact", CoreError::NotFound(post));
            return Ok(false);
        };
        if found.content_type() != Some(ContentType::ScssPartial) {
            return Ok(false);
        }
        self.store.meta_flag(post, keys::PARTIAL_IS_GLOBAL)
    }

    /// Published global partials, ascending by `globalOrder` then id.
    pub fn global_partials(&self) -> Result<Arc<[GlobalPartial]>, StoreError> {
        self.globals.get_or_try_insert_with(|| {
            let partials = self
                .store
                .query_posts(&PostQuery::published(ContentType::ScssPartial))?;

            let mut globals = Vec::new();
            for post in partials {
                if self.store.meta_flag(post.id, keys::PARTIAL_IS_GLOBAL)? {
                    let order = self
                        .store
                        .meta_int(post.id, keys::PARTIAL_GLOBAL_ORDER)?
                        .unwrap_or(0);
                    globals.push(GlobalPartial { post, order });
                }
            }
            globals.sort_by_key(|g| (g.order, g.post.id));
            Ok(Arc::from(globals))
        })
    }

    /// Published blocks with an explicit selection edge to any global partial.
    ///
    /// Used for impact statistics only: every block includes global partials
    /// implicitly, whether or not it also selects them.
    pub fn posts_using_global_partials(&self) -> Result<Vec<Post>, StoreError> {
        let globals: FxHashSet<PostId> = self.global_partials()?.iter().map(|g| g.post.id).collect();
        if globals.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .usage
            .scan()?
            .iter()
            .filter(|usage| globals.iter().any(|&g| usage.uses(g)))
            .map(|usage| usage.post.clone())
            .collect())
    }

    /// Every published block when `partial` is global, otherwise its explicit users.
    pub fn affected_blocks(&self, partial: PostId) -> Result<AffectedBlocks, StoreError> {
        self.affected_blocks_since(partial, false)
    }

    /// Like [`Self::affected_blocks`], but a partial that `was_global` before
    /// the change still reaches every block: its prelude is baked into their
    /// compiled CSS until they recompile.
    pub fn affected_blocks_since(
        &self,
        partial: PostId,
        was_global: bool,
    ) -> Result<AffectedBlocks, StoreError> {
        if was_global || self.detect_global_impact(partial)? {
            let blocks = self
                .store
                .query_posts(&PostQuery::published(ContentType::Block))?
                .into_iter()
                .map(|post| post.id)
                .collect();
            return Ok(AffectedBlocks { global: true, blocks });
        }
        Ok(AffectedBlocks {
            global: false,
            blocks: self.usage.blocks_using_partial_any_slot(partial)?,
        })
    }

    pub fn impact(&self, partial: PostId) -> Result<ImpactReport, StoreError> {
        let affected = self.affected_blocks(partial)?;
        Ok(ImpactReport {
            partial_id: partial,
            is_global: affected.global,
            explicit_users: self.usage.blocks_using_partial_any_slot(partial)?,
            affected_blocks: affected.blocks,
        })
    }

    /// Whether blocks were last compiled with `partial` as a global prelude.
    ///
    /// Read this before invalidating the globals cache. Partials whose fan-out
    /// was never recorded count as global when they carry any global marker.
    pub fn was_global(&self, partial: PostId) -> Result<bool, StoreError> {
        if self
            .globals
            .get()
            .is_some_and(|globals| globals.iter().any(|g| g.post.id == partial))
        {
            return Ok(true);
        }
        if let Some(applied) = self.store.get_meta(partial, keys::PARTIAL_APPLIED_GLOBAL)? {
            return Ok(is_truthy(&applied));
        }
        Ok(self.store.get_meta(partial, keys::PARTIAL_IS_GLOBAL)?.is_some()
            || self.store.get_meta(partial, keys::PARTIAL_GLOBAL_ORDER)?.is_some())
    }

    /// Remember the global state a fan-out of `partial` was computed with.
    pub fn record_applied_global(&self, partial: PostId, global: bool) -> Result<(), StoreError> {
        self.store
            .set_meta(partial, keys::PARTIAL_APPLIED_GLOBAL, Value::Bool(global))
    }

    /// Forget cached global partials. Call after any partial save.
    pub fn invalidate_globals(&self) {
        self.globals.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PostStatus};
    use crate::test_support::{add_block, add_global_partial, add_partial, add_styled_block, set};
    use serde_json::json;

    fn resolver(store: &Arc<MemoryStore>) -> DependencyResolver {
        let usage = Arc::new(PartialsUsageIndex::new(store.clone(), Duration::from_secs(600)));
        DependencyResolver::new(store.clone(), usage, Duration::from_secs(600))
    }

    #[test]
    fn test_detect_global_impact_coercion() {
        let store = Arc::new(MemoryStore::new());
        for (id, value) in [(1, json!("1")), (2, json!(1)), (3, json!(true))] {
            add_partial(&store, id, &format!("p{id}"), "$a: 1;");
            set(&*store, id, keys::PARTIAL_IS_GLOBAL, value);
        }
        add_partial(&store, 4, "p4", "$a: 1;");
        set(&*store, 4, keys::PARTIAL_IS_GLOBAL, json!("0"));
        add_partial(&store, 5, "p5", "$a: 1;");

        let resolver = resolver(&store);
        assert!(resolver.detect_global_impact(PostId(1)).unwrap());
        assert!(resolver.detect_global_impact(PostId(2)).unwrap());
        assert!(resolver.detect_global_impact(PostId(3)).unwrap());
        assert!(!resolver.detect_global_impact(PostId(4)).unwrap());
        assert!(!resolver.detect_global_impact(PostId(5)).unwrap());
    }

    #[test]
    fn test_detect_global_impact_requires_partial() {
        let store = Arc::new(MemoryStore::new());
        add_block(&store, 1, "hero");
        set(&*store, 1, keys::PARTIAL_IS_GLOBAL, json!(true));

        let resolver = resolver(&store);
        assert!(!resolver.detect_global_impact(PostId(1)).unwrap());
        assert!(!resolver.detect_global_impact(PostId(99)).unwrap());
    }

    #[test]
    fn test_trashed_global_partial_still_has_impact() {
        let store = Arc::new(MemoryStore::new());
        add_global_partial(&store, 1, "tokens", 0);
        let mut post = store.get_post(PostId(1)).unwrap().unwrap();
        post.status = PostStatus::Trash;
        store.upsert_post(post);

        assert!(resolver(&store).detect_global_impact(PostId(1)).unwrap());
    }

    #[test]
    fn test_global_partials_sorted_by_order() {
        let store = Arc::new(MemoryStore::new());
        add_global_partial(&store, 1, "late", 20);
        add_global_partial(&store, 2, "early", 5);
        add_global_partial(&store, 3, "tie", 5);
        add_partial(&store, 4, "selected", "$x: 1;");

        let order: Vec<_> = resolver(&store)
            .global_partials()
            .unwrap()
            .iter()
            .map(|g| g.post.id.0)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_global_partials_cache_invalidation() {
        let store = Arc::new(MemoryStore::new());
        add_global_partial(&store, 1, "tokens", 0);
        let resolver = resolver(&store);
        assert_eq!(resolver.global_partials().unwrap().len(), 1);

        set(&*store, 1, keys::PARTIAL_IS_GLOBAL, json!(false));
        assert_eq!(resolver.global_partials().unwrap().len(), 1);

        resolver.invalidate_globals();
        assert!(resolver.global_partials().unwrap().is_empty());
    }

    #[test]
    fn test_posts_using_global_partials_is_explicit_only() {
        let store = Arc::new(MemoryStore::new());
        add_global_partial(&store, 1, "tokens", 0);
        add_partial(&store, 2, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        add_styled_block(&store, 11, "card", json!([2]));
        add_styled_block(&store, 12, "list", json!([]));

        let users: Vec<_> = resolver(&store)
            .posts_using_global_partials()
            .unwrap()
            .into_iter()
            .map(|p| p.id.0)
            .collect();
        assert_eq!(users, vec![10]);
    }

    #[test]
    fn test_affected_blocks_global_vs_selected() {
        let store = Arc::new(MemoryStore::new());
        add_global_partial(&store, 1, "tokens", 0);
        add_partial(&store, 2, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([2]));
        add_styled_block(&store, 11, "card", json!([]));
        add_block(&store, 12, "bare");

        let resolver = resolver(&store);
        let global = resolver.affected_blocks(PostId(1)).unwrap();
        assert!(global.global);
        assert_eq!(global.blocks, vec![PostId(10), PostId(11), PostId(12)]);

        let selected = resolver.affected_blocks(PostId(2)).unwrap();
        assert!(!selected.global);
        assert_eq!(selected.blocks, vec![PostId(10)]);

        let report = resolver.impact(PostId(1)).unwrap();
        assert!(report.is_global);
        assert!(report.explicit_users.is_empty());
        assert_eq!(report.affected_blocks.len(), 3);
    }

    #[test]
    fn test_formerly_global_partial_still_reaches_every_block() {
        let store = Arc::new(MemoryStore::new());
        add_global_partial(&store, 1, "tokens", 0);
        add_styled_block(&store, 10, "hero", json!([]));
        let resolver = resolver(&store);
        assert_eq!(resolver.global_partials().unwrap().len(), 1);

        set(&*store, 1, keys::PARTIAL_IS_GLOBAL, json!(false));
        assert!(resolver.was_global(PostId(1)).unwrap());
        resolver.invalidate_globals();
        assert!(!resolver.detect_global_impact(PostId(1)).unwrap());

        let affected = resolver.affected_blocks_since(PostId(1), true).unwrap();
        assert!(affected.global);
        assert_eq!(affected.blocks, vec![PostId(10)]);
    }

    #[test]
    fn test_was_global_prefers_recorded_state() {
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "plain", "$p: 1;");
        add_global_partial(&store, 2, "tokens", 0);
        let resolver = resolver(&store);

        // No record and no global markers
        assert!(!resolver.was_global(PostId(1)).unwrap());
        // No record, global markers present
        assert!(resolver.was_global(PostId(2)).unwrap());

        resolver.record_applied_global(PostId(2), false).unwrap();
        set(&*store, 2, keys::PARTIAL_IS_GLOBAL, json!("0"));
        assert!(!resolver.was_global(PostId(2)).unwrap());
        resolver.record_applied_global(PostId(1), true).unwrap();
        assert!(resolver.was_global(PostId(1)).unwrap());
    }
}
