//! Generated file writers, one [`Generator`] per output file.
//!
//! # Layout
//!
//! ```text
//! generated/
//! ├── blocks/<slug>/      block.json render.php style.css(.map)
//! │                       editor.css(.map) view.js index.js index.asset.php
//! ├── symbols/<slug>.php
//! └── scss-partials/_<slug>.scss
//! ```
//!
//! Generators are pure functions of a post's current metadata. A generator
//! whose `validate` fails has its previous output removed, so a directory
//! always mirrors what the metadata says right now.

mod block_json;
mod partial;
mod render;
mod script;
mod style;
mod symbol;

pub use block_json::BlockJsonGenerator;
pub use partial::PartialGenerator;
pub use render::RenderPhpGenerator;
pub use script::{AssetPhpGenerator, IndexJsGenerator, ViewJsGenerator};
pub use style::{SourceMapGenerator, StyleGenerator};
pub use symbol::SymbolGenerator;

use crate::{
    config::SiteConfig,
    error::StoreError,
    log,
    store::{ContentType, Post, PostId, PostStore, Slot},
    utils::{
        fs::{WriteOutcome, remove_if_exists, write_if_changed},
        slug::sanitize_slug,
    },
};
use anyhow::Result;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};

// ============================================================================
// Context
// ============================================================================

/// Everything a generator may read. Passed explicitly, never ambient.
pub struct GenerationContext<'a> {
    pub post: &'a Post,
    pub store: &'a dyn PostStore,
    pub config: &'a SiteConfig,
    /// Directory the generated files of this post live in
    pub dir: PathBuf,
}

impl<'a> GenerationContext<'a> {
    /// Context for `post`, `None` for foreign content types.
    pub fn new(post: &'a Post, store: &'a dyn PostStore, config: &'a SiteConfig) -> Option<Self> {
        let dir = post_dir(config, post)?;
        Some(Self {
            post,
            store,
            config,
            dir,
        })
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Registered block name, `namespace/slug`.
    pub fn block_name(&self) -> String {
        format!("{}/{}", self.config.block.namespace, self.safe_slug())
    }

    pub fn safe_slug(&self) -> String {
        sanitize_slug(&self.post.slug, self.post.id)
    }
}

/// Output directory of `post`: its own directory for blocks, the shared
/// per-type directory otherwise.
pub fn post_dir(config: &SiteConfig, post: &Post) -> Option<PathBuf> {
    let content_type = post.content_type()?;
    let base = config.output.dir_for(content_type);
    Some(match content_type {
        ContentType::Block => base.join(sanitize_slug(&post.slug, post.id)),
        ContentType::Symbol | ContentType::ScssPartial => base,
    })
}

// ============================================================================
// Generator trait
// ============================================================================

/// Produces one output file for one post.
pub trait Generator: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    fn can_generate(&self, content_type: ContentType) -> bool;

    /// Whether the post currently has what this file needs. `false` skips
    /// generation and removes any stale output.
    fn validate(&self, ctx: &GenerationContext<'_>) -> Result<bool, StoreError>;

    fn file_name(&self, post: &Post) -> String;

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String>;

    fn generate(&self, ctx: &GenerationContext<'_>) -> Result<WriteOutcome> {
        let content = self.render(ctx)?;
        write_if_changed(&ctx.path(&self.file_name(ctx.post)), content.as_bytes())
    }
}

// ============================================================================
// Processor
// ============================================================================

/// A generator that failed for one post.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorFailure {
    pub generator: &'static str,
    pub error: String,
}

/// What single-post generation did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReport {
    pub post_id: PostId,
    pub content_type: ContentType,
    pub dir: PathBuf,
    /// Files whose content changed
    pub written: Vec<String>,
    /// Files already up to date
    pub unchanged: Vec<String>,
    /// Stale files deleted because their generator no longer applies
    pub removed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<GeneratorFailure>,
}

impl PostReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Map from content type to its ordered generators.
pub struct ContentTypeProcessor {
    generators: FxHashMap<ContentType, Vec<Arc<dyn Generator>>>,
}

impl ContentTypeProcessor {
    pub fn new() -> Self {
        Self {
            generators: FxHashMap::default(),
        }
    }

    /// Registry holding every built-in generator.
    pub fn with_defaults() -> Self {
        let mut processor = Self::new();
        processor
            .register(ContentType::Block, Arc::new(RenderPhpGenerator))
            .register(ContentType::Block, Arc::new(StyleGenerator::new(Slot::Style)))
            .register(ContentType::Block, Arc::new(SourceMapGenerator::new(Slot::Style)))
            .register(ContentType::Block, Arc::new(StyleGenerator::new(Slot::EditorStyle)))
            .register(ContentType::Block, Arc::new(SourceMapGenerator::new(Slot::EditorStyle)))
            .register(ContentType::Block, Arc::new(ViewJsGenerator))
            .register(ContentType::Block, Arc::new(IndexJsGenerator))
            .register(ContentType::Block, Arc::new(AssetPhpGenerator))
            .register(ContentType::Block, Arc::new(BlockJsonGenerator))
            .register(ContentType::Symbol, Arc::new(SymbolGenerator))
            .register(ContentType::ScssPartial, Arc::new(PartialGenerator));
        processor
    }

    /// Append `generator` for `content_type`. Generators that don't handle
    /// the type are ignored.
    pub fn register(&mut self, content_type: ContentType, generator: Arc<dyn Generator>) -> &mut Self {
        if generator.can_generate(content_type) {
            self.generators.entry(content_type).or_default().push(generator);
        } else {
            log!("generate"; "{} can't generate {content_type}, not registered", generator.name());
        }
        self
    }

    pub fn generators_for(&self, content_type: ContentType) -> &[Arc<dyn Generator>] {
        self.generators
            .get(&content_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Run every applicable generator for the post in `ctx`.
    ///
    /// One failing generator never blocks the others.
    pub fn process(&self, ctx: &GenerationContext<'_>) -> Option<PostReport> {
        let content_type = ctx.post.content_type()?;
        let mut report = PostReport {
            post_id: ctx.post.id,
            content_type,
            dir: ctx.dir.clone(),
            written: Vec::new(),
            unchanged: Vec::new(),
            removed: Vec::new(),
            failures: Vec::new(),
        };

        for generator in self.generators_for(content_type) {
            let file = generator.file_name(ctx.post);
            let outcome = match generator.validate(ctx) {
                Ok(true) => generator.generate(ctx).map(|written| match written {
                    WriteOutcome::Written => report.written.push(file),
                    WriteOutcome::Unchanged => report.unchanged.push(file),
                }),
                Ok(false) => remove_if_exists(&ctx.path(&file)).map(|removed| {
                    if removed {
                        report.removed.push(file);
                    }
                }),
                Err(e) => Err(e.into()),
            };

            if let Err(e) = outcome {
                log!("generate"; "{} failed for post {}: {e:#}", generator.name(), ctx.post.id);
                report.failures.push(GeneratorFailure {
                    generator: generator.name(),
                    error: format!("{e:#}"),
                });
            }
        }

        Some(report)
    }
}

impl Default for ContentTypeProcessor {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Header comment placed at the top of generated PHP files.
fn php_header(post: &Post, summary: &str) -> String {
    format!(
        "/**\n * {summary}\n *\n * Generated from post {} (`{}`). Do not edit, changes are overwritten.\n */",
        post.id, post.slug
    )
}
