//! Wiring of the shared indexes, the scheduler and the coordinator.
//!
//! ```text
//!              ┌──────────────────────┐
//!              │      PostStore       │
//!              └──────────┬───────────┘
//!      ┌──────────────────┼───────────────────┐
//!      ▼                  ▼                   ▼
//! PartialsUsageIndex  CacheInvalidator   ContentTypeProcessor
//!      │                  │                   │
//!      ▼                  │                   │
//! DependencyResolver ─────┤                   │
//!      │                  │                   │
//!      ▼                  ▼                   ▼
//! RecompilationScheduler ───────────► GenerationCoordinator
//! ```

use crate::{
    cache::CacheInvalidator,
    compiler::{CommandCompiler, DrainReport, ScssCompiler, drain_flagged},
    config::SiteConfig,
    coordinator::GenerationCoordinator,
    deps::{CompileInputs, DependencyResolver, PartialsUsageIndex},
    error::{CompilationError, CoreResult},
    generator::{ContentTypeProcessor, PostReport},
    recompile::{CompiledCss, RecompilationScheduler},
    store::{PostId, PostStore, Slot},
};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

/// Result of compiling flagged blocks and regenerating their files.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileReport {
    #[serde(flatten)]
    pub drain: DrainReport,
    pub generated: Vec<PostReport>,
}

/// Result of accepting one compiler write-back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub flag_cleared: bool,
    /// Regenerated files of the block, `None` when it isn't published
    pub generated: Option<PostReport>,
}

impl Completion {
    pub fn is_ok(&self) -> bool {
        self.generated.as_ref().is_none_or(PostReport::is_ok)
    }
}

pub struct Pipeline {
    pub store: Arc<dyn PostStore>,
    pub config: Arc<SiteConfig>,
    pub resolver: Arc<DependencyResolver>,
    pub caches: Arc<CacheInvalidator>,
    pub inputs: CompileInputs,
    pub scheduler: Arc<RecompilationScheduler>,
    pub coordinator: GenerationCoordinator,
    compiler: Box<dyn ScssCompiler>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn PostStore>, config: &SiteConfig) -> Self {
        let config = Arc::new(config.clone());
        let usage = Arc::new(PartialsUsageIndex::new(store.clone(), config.cache.usage()));
        let resolver = Arc::new(DependencyResolver::new(
            store.clone(),
            usage,
            config.cache.globals(),
        ));
        let caches = Arc::new(CacheInvalidator::new(store.clone()));
        let inputs = CompileInputs::new(
            store.clone(),
            resolver.clone(),
            caches.clone(),
            config.cache.compile_input(),
        );
        let scheduler = Arc::new(RecompilationScheduler::new(
            store.clone(),
            resolver.clone(),
            caches.clone(),
            config.recompile.pending(),
            config.recompile.transient_key.clone(),
        ));
        let coordinator = GenerationCoordinator::new(
            store.clone(),
            config.clone(),
            ContentTypeProcessor::with_defaults(),
            resolver.clone(),
            scheduler.clone(),
            caches.clone(),
        );
        let compiler = Box::new(CommandCompiler::new(
            config.compiler.command.clone(),
            config.root.clone(),
        ));

        Self {
            store,
            config,
            resolver,
            caches,
            inputs,
            scheduler,
            coordinator,
            compiler,
        }
    }

    /// Replace the configured compiler command.
    pub fn with_compiler(mut self, compiler: Box<dyn ScssCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Compile every flagged block and regenerate the files of those whose
    /// CSS changed.
    pub fn compile_flagged(&self) -> Result<CompileReport> {
        let drain = drain_flagged(&self.scheduler, &self.inputs, self.compiler.as_ref())?;
        let generated = self.regenerate_blocks(&drain.updated)?;
        Ok(CompileReport { drain, generated })
    }

    /// Post an externally produced compiler result for one slot. The block's
    /// files are regenerated on success.
    pub fn complete(
        &self,
        block: PostId,
        slot: Slot,
        result: Result<CompiledCss, CompilationError>,
    ) -> CoreResult<Completion> {
        let flag_cleared = self.scheduler.complete(block, slot, result)?;
        let generated = self
            .store
            .get_post(block)?
            .and_then(|post| self.coordinator.generate_post(&post));
        Ok(Completion {
            flag_cleared,
            generated,
        })
    }

    fn regenerate_blocks(&self, blocks: &[PostId]) -> Result<Vec<PostReport>> {
        let mut reports = Vec::new();
        for block in blocks {
            if let Some(post) = self.store.get_post(*block)?
                && let Some(report) = self.coordinator.generate_post(&post)
            {
                reports.push(report);
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::PostEvent;
    use crate::deps::CompileInput;
    use crate::error::CoreError;
    use crate::store::{MemoryStore, MetaExt, meta::keys};
    use crate::test_support::{add_partial, add_styled_block, pipeline, set};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    /// Emits the partial count as CSS so output changes are visible.
    struct CountingCompiler;

    impl ScssCompiler for CountingCompiler {
        fn compile(&self, input: &CompileInput) -> Result<CompiledCss, CompilationError> {
            Ok(CompiledCss {
                css: format!("/* {} partials */\n", input.partials.len()),
                source_map: Some("{\"version\":3}".into()),
            })
        }
    }

    #[test]
    fn test_partial_edit_to_css_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        let pipeline = pipeline(store.clone(), &dir.path().join("generated"))
            .with_compiler(Box::new(CountingCompiler));
        let hero = dir.path().join("generated/blocks/hero");

        pipeline.coordinator.regenerate_all().unwrap();
        assert_eq!(fs::read_to_string(hero.join("style.css")).unwrap(), ".hero{color:red}");

        set(&*store, 1, keys::PARTIAL_SCSS, json!("$b: 2;"));
        pipeline.coordinator.handle(PostEvent::Saved(PostId(1))).unwrap();
        assert!(!hero.join("style.css").exists());
        assert!(pipeline.scheduler.pending().unwrap().is_some());

        let report = pipeline.compile_flagged().unwrap();
        assert_eq!(report.drain.compiled, vec![PostId(10)]);
        assert_eq!(report.generated.len(), 1);
        assert_eq!(
            fs::read_to_string(hero.join("style.css")).unwrap(),
            "/* 1 partials */\n"
        );
        assert!(hero.join("style.css.map").is_file());
        assert!(pipeline.scheduler.flagged_blocks().unwrap().is_empty());
    }

    #[test]
    fn test_complete_failure_keeps_flag() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        add_styled_block(&store, 10, "hero", json!([]));
        let pipeline = pipeline(store.clone(), dir.path());
        pipeline.scheduler.mark_needs_recompile(PostId(10)).unwrap();

        let result = pipeline.complete(
            PostId(10),
            Slot::Style,
            Err(CompilationError::new("Undefined variable.").at(3, Some(7))),
        );
        assert!(matches!(result, Err(CoreError::Compilation { .. })));
        assert!(store.meta_flag(PostId(10), keys::NEEDS_RECOMPILE).unwrap());
        let stored = pipeline.scheduler.compile_error(PostId(10), Slot::Style).unwrap().unwrap();
        assert_eq!(stored.error.line, Some(3));
    }

    #[test]
    fn test_complete_reports_generation_failures() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        add_styled_block(&store, 10, "hero", json!([]));
        let pipeline = pipeline(store.clone(), dir.path());
        pipeline.scheduler.mark_needs_recompile(PostId(10)).unwrap();
        let css = || -> Result<CompiledCss, CompilationError> {
            Ok(CompiledCss {
                css: ".hero{}".into(),
                source_map: None,
            })
        };

        let done = pipeline.complete(PostId(10), Slot::Style, css()).unwrap();
        assert!(done.flag_cleared);
        assert!(done.is_ok());
        assert!(done.generated.unwrap().written.contains(&"style.css".to_string()));

        // A file where the block directory should be
        let hero = dir.path().join("blocks/hero");
        fs::remove_dir_all(&hero).unwrap();
        fs::write(&hero, "not a directory").unwrap();
        let done = pipeline.complete(PostId(10), Slot::Style, css()).unwrap();
        assert!(!done.is_ok());
        assert!(!done.generated.unwrap().failures.is_empty());
    }

    #[test]
    fn test_config_ttls_reach_the_indexes() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut config = SiteConfig::default();
        config.output.root = dir.path().to_path_buf();
        config.recompile.transient_key = "custom_pending".into();
        let pipeline = Pipeline::new(store.clone(), &config);

        add_partial(&store, 1, "buttons", "$b: 1;");
        add_styled_block(&store, 10, "hero", json!([1]));
        pipeline.scheduler.schedule(PostId(1)).unwrap();
        assert!(store.get_transient("custom_pending").unwrap().is_some());
    }
}
