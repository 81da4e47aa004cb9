//! Partial → block usage lookups.
//!
//! The usage graph is never persisted. It is derived from each published
//! block's selected-partials lists and cached as one whole-table scan.

use crate::{
    cache::TtlCell,
    error::StoreError,
    store::{ContentType, MetaExt, Post, PostId, PostQuery, PostStore, Slot},
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};

/// Selected partials of one block, in stored order.
#[derive(Debug, Clone)]
pub struct BlockUsage {
    pub post: Post,
    pub style: Vec<PostId>,
    pub editor_style: Vec<PostId>,
}

impl BlockUsage {
    pub fn partials(&self, slot: Slot) -> &[PostId] {
        match slot {
            Slot::Style => &self.style,
            Slot::EditorStyle => &self.editor_style,
        }
    }

    pub fn uses(&self, partial: PostId) -> bool {
        Slot::ALL.iter().any(|&slot| self.partials(slot).contains(&partial))
    }
}

/// Derived `(partial, block, slot)` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialUsageEntry {
    pub partial_id: PostId,
    pub block_id: PostId,
    pub slot: Slot,
}

/// Answers "which blocks use partial P in slot S?".
pub struct PartialsUsageIndex {
    store: Arc<dyn PostStore>,
    scan: TtlCell<Arc<[BlockUsage]>>,
}

impl PartialsUsageIndex {
    pub fn new(store: Arc<dyn PostStore>, ttl: Duration) -> Self {
        Self {
            store,
            scan: TtlCell::new(ttl),
        }
    }

    /// Usage of every published block, ordered by block id.
    pub fn scan(&self) -> Result<Arc<[BlockUsage]>, StoreError> {
        self.scan.get_or_try_insert_with(|| {
            let blocks = self.store.query_posts(&PostQuery::published(ContentType::Block))?;
            blocks
                .into_iter()
                .map(|post| {
                    Ok(BlockUsage {
                        style: self.store.meta_id_list(post.id, Slot::Style.selected_key())?,
                        editor_style: self
                            .store
                            .meta_id_list(post.id, Slot::EditorStyle.selected_key())?,
                        post,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()
                .map(Arc::from)
        })
    }

    /// Blocks that list `partial` in `slot`, in discovery order.
    pub fn blocks_using_partial(&self, partial: PostId, slot: Slot) -> Result<Vec<PostId>, StoreError> {
        Ok(self
            .scan()?
            .iter()
            .filter(|usage| usage.partials(slot).contains(&partial))
            .map(|usage| usage.post.id)
            .collect())
    }

    /// Union over both slots, each block once, in discovery order.
    pub fn blocks_using_partial_any_slot(&self, partial: PostId) -> Result<Vec<PostId>, StoreError> {
        Ok(self
            .scan()?
            .iter()
            .filter(|usage| usage.uses(partial))
            .map(|usage| usage.post.id)
            .collect())
    }

    /// A block's selection for `slot`, read straight from the store.
    pub fn selected_partials(&self, block: PostId, slot: Slot) -> Result<Vec<PostId>, StoreError> {
        self.store.meta_id_list(block, slot.selected_key())
    }

    /// Every usage edge of the current scan.
    pub fn entries(&self) -> Result<Vec<PartialUsageEntry>, StoreError> {
        let scan = self.scan()?;
        let mut entries = Vec::new();
        for usage in scan.iter() {
            for slot in Slot::ALL {
                entries.extend(usage.partials(slot).iter().map(|&partial_id| PartialUsageEntry {
                    partial_id,
                    block_id: usage.post.id,
                    slot,
                }));
            }
        }
        Ok(entries)
    }

    /// Forget the cached scan. Call after any selected-partials write.
    pub fn invalidate(&self) {
        self.scan.invalidate();
    }
}
