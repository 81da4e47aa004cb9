//! Regeneration decisions for save, rename and delete events.
//!
//! # Decision tree
//!
//! ```text
//! Saved(P) ─────► foreign type? ──► ignore
//!                      │
//!                      ▼
//!              single-post generation for P
//!                      │
//!              P is a partial? ──► fan out: flag affected blocks,
//!                                  regenerate their files; global before
//!                                  or after the save means every block
//!
//! Updated(before, after)
//!     slug changed ─────────────► full regeneration
//!     published → unpublished ──► handled as Deleted
//!     otherwise ────────────────► handled as Saved
//!
//! Deleted(P) ──► partial fan-out (its contribution disappears; a partial
//!            │   that was global reaches every block even once removed)
//!            └─► full regeneration (removes orphaned output)
//! ```
//!
//! Only one event is handled at a time. An event arriving while another is
//! being handled (a save triggered from inside generation, for instance) is
//! skipped instead of nesting.

use crate::{
    cache::CacheInvalidator,
    config::SiteConfig,
    deps::DependencyResolver,
    error::CoreError,
    generator::{ContentTypeProcessor, GenerationContext, PostReport},
    log,
    logger::ProgressBars,
    recompile::{RecompilationScheduler, RecompileSummary},
    store::{ContentType, Post, PostId, PostQuery, PostStore},
    utils::fs::{collect_all_files, recreate_dir},
};
use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Change notification for one post.
#[derive(Debug, Clone)]
pub enum PostEvent {
    Saved(PostId),
    /// Same post before and after an edit that may have changed its slug or status
    Updated { before: Post, after: Post },
    /// Post trashed or removed; carries its last known state. Build it with
    /// [`GenerationCoordinator::deletion`] before the post leaves the store.
    Deleted { post: Post, was_global: bool },
}

/// How an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationKind {
    Single,
    Full,
    Skipped,
}

/// A post whose generation failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostFailure {
    pub post_id: PostId,
    pub error: String,
}

/// Outcome of one event or full regeneration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub success: bool,
    pub kind: GenerationKind,
    pub message: String,
    pub posts: Vec<PostReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recompile: Option<RecompileSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<PostFailure>,
}

impl GenerationReport {
    fn new(kind: GenerationKind) -> Self {
        Self {
            success: true,
            kind,
            message: String::new(),
            posts: Vec::new(),
            recompile: None,
            failures: Vec::new(),
        }
    }

    fn skipped(message: impl Into<String>) -> Self {
        let mut report = Self::new(GenerationKind::Skipped);
        report.message = message.into();
        report
    }

    fn push(&mut self, report: PostReport) {
        for failure in &report.failures {
            self.failures.push(PostFailure {
                post_id: report.post_id,
                error: format!("{}: {}", failure.generator, failure.error),
            });
        }
        self.posts.push(report);
    }

    fn finish(mut self) -> Self {
        self.success = self.failures.is_empty()
            && self.recompile.as_ref().is_none_or(|r| r.failures.is_empty());
        self
    }
}

/// Resets the in-progress flag when dropped.
struct ReentrancyGuard<'a>(&'a AtomicBool);

impl<'a> ReentrancyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then_some(Self(flag))
    }
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct GenerationCoordinator {
    store: Arc<dyn PostStore>,
    config: Arc<SiteConfig>,
    processor: ContentTypeProcessor,
    resolver: Arc<DependencyResolver>,
    scheduler: Arc<RecompilationScheduler>,
    caches: Arc<CacheInvalidator>,
    in_progress: AtomicBool,
}

impl GenerationCoordinator {
    pub fn new(
        store: Arc<dyn PostStore>,
        config: Arc<SiteConfig>,
        processor: ContentTypeProcessor,
        resolver: Arc<DependencyResolver>,
        scheduler: Arc<RecompilationScheduler>,
        caches: Arc<CacheInvalidator>,
    ) -> Self {
        Self {
            store,
            config,
            processor,
            resolver,
            scheduler,
            caches,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Handle one event. Fails only when the store can't be read or the
    /// output root can't be recreated.
    pub fn handle(&self, event: PostEvent) -> Result<GenerationReport> {
        let Some(_guard) = ReentrancyGuard::acquire(&self.in_progress) else {
            log!("generate"; "generation already in progress, skipping {event:?}");
            return Ok(GenerationReport::skipped("generation already in progress"));
        };

        match event {
            PostEvent::Saved(id) => self.on_saved(id),
            PostEvent::Updated { before, after } => {
                if before.slug != after.slug {
                    log!("generate"; "post {} renamed `{}` → `{}`", after.id, before.slug, after.slug);
                    self.forget(&after);
                    self.full_regeneration()
                } else if before.is_published() && !after.is_published() {
                    let was_global = self.partial_was_global(&after)?;
                    self.on_deleted(&after, was_global)
                } else {
                    self.on_saved(after.id)
                }
            }
            PostEvent::Deleted { post, was_global } => self.on_deleted(&post, was_global),
        }
    }

    /// Delete event for `post`, capturing whether blocks still carry it as a
    /// global prelude. Call while the post and its metadata are still stored.
    pub fn deletion(&self, post: Post) -> Result<PostEvent> {
        let was_global = self.partial_was_global(&post)?;
        Ok(PostEvent::Deleted { post, was_global })
    }

    /// Wipe the output root and regenerate every published post.
    pub fn regenerate_all(&self) -> Result<GenerationReport> {
        let Some(_guard) = ReentrancyGuard::acquire(&self.in_progress) else {
            return Ok(GenerationReport::skipped("generation already in progress"));
        };
        self.full_regeneration()
    }

    /// Run the generators for one post. Unpublished and foreign posts
    /// produce no report.
    pub fn generate_post(&self, post: &Post) -> Option<PostReport> {
        if !post.is_published() {
            return None;
        }
        let ctx = GenerationContext::new(post, self.store.as_ref(), &self.config)?;
        self.processor.process(&ctx)
    }

    fn on_saved(&self, id: PostId) -> Result<GenerationReport> {
        let Some(post) = self.store.get_post(id)? else {
            log!("generate"; "{}, nothing to generate", CoreError::NotFound(id));
            return Ok(GenerationReport::skipped(format!("post {id} not found")));
        };
        let Some(content_type) = post.content_type() else {
            return Ok(GenerationReport::skipped(format!(
                "post {id} has unmanaged type `{}`",
                post.post_type
            )));
        };

        // Before `forget`, which drops the cached global set
        let was_global = self.partial_was_global(&post)?;
        self.forget(&post);

        let mut report = GenerationReport::new(GenerationKind::Single);
        if let Some(post_report) = self.generate_post(&post) {
            report.push(post_report);
        }

        if content_type == ContentType::ScssPartial {
            report.recompile = Some(self.fan_out(id, was_global, &mut report)?);
        }

        report.message = format!("{} post(s) generated", report.posts.len());
        Ok(report.finish())
    }

    fn on_deleted(&self, post: &Post, was_global: bool) -> Result<GenerationReport> {
        log!("generate"; "post {} (`{}`) removed", post.id, post.slug);
        self.forget(post);

        let recompile = if post.content_type() == Some(ContentType::ScssPartial) {
            // Files regenerate below anyway, so only the flags matter here
            let affected = self.resolver.affected_blocks_since(post.id, was_global)?;
            Some(self.scheduler.run(post.id, affected.global, &affected.blocks)?)
        } else {
            None
        };

        let mut report = self.full_regeneration()?;
        report.recompile = recompile;
        Ok(report.finish())
    }

    /// Flag blocks affected by a partial change and regenerate their files.
    fn fan_out(
        &self,
        partial: PostId,
        was_global: bool,
        report: &mut GenerationReport,
    ) -> Result<RecompileSummary> {
        let affected = self.resolver.affected_blocks_since(partial, was_global)?;
        let summary = self.scheduler.run(partial, affected.global, &affected.blocks)?;

        let now_global = self.resolver.detect_global_impact(partial)?;
        if let Err(e) = self.resolver.record_applied_global(partial, now_global) {
            log!("generate"; "partial {partial}: {e}");
        }

        for block in &affected.blocks {
            if let Some(post) = self.store.get_post(*block)?
                && let Some(post_report) = self.generate_post(&post)
            {
                report.push(post_report);
            }
        }
        Ok(summary)
    }

    fn partial_was_global(&self, post: &Post) -> Result<bool> {
        if post.content_type() != Some(ContentType::ScssPartial) {
            return Ok(false);
        }
        Ok(self.resolver.was_global(post.id)? || self.resolver.detect_global_impact(post.id)?)
    }

    /// Drop every cache that may hold state derived from `post`.
    fn forget(&self, post: &Post) {
        if let Err(e) = self.caches.invalidate(post.id) {
            log!("generate"; "cache invalidation for post {} failed: {e}", post.id);
        }
        match post.content_type() {
            Some(ContentType::Block) => self.resolver.usage().invalidate(),
            Some(ContentType::ScssPartial) => self.resolver.invalidate_globals(),
            _ => {}
        }
    }

    fn full_regeneration(&self) -> Result<GenerationReport> {
        let root = &self.config.output.root;
        recreate_dir(root)?;

        let mut posts = Vec::new();
        for content_type in ContentType::ALL {
            posts.extend(self.store.query_posts(&PostQuery::published(content_type))?);
        }

        let progress = ProgressBars::new_filtered(&[("generate", posts.len())]);
        let mut reports: Vec<PostReport> = posts
            .par_iter()
            .filter_map(|post| {
                let report = self.generate_post(post);
                if let Some(progress) = &progress {
                    progress.inc_by_name("generate");
                }
                report
            })
            .collect();
        drop(progress);
        reports.sort_by_key(|r| r.post_id);

        let mut report = GenerationReport::new(GenerationKind::Full);
        for post_report in reports {
            report.push(post_report);
        }
        report.message = format!(
            "{} post(s) regenerated, {} file(s) in {}",
            report.posts.len(),
            collect_all_files(root).len(),
            root.display()
        );
        log!("generate"; "{}", report.message);
        Ok(report.finish())
    }
}
