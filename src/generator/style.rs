//! Compiled stylesheets and their source maps.
//!
//! Missing compiled CSS means "not yet compiled": the file is simply absent
//! until the compiler posts a result back.

use super::{GenerationContext, Generator};
use crate::{
    error::StoreError,
    store::{ContentType, MetaExt, Post, Slot},
};
use anyhow::{Context, Result};

/// Whether `slot` currently has compiled CSS.
pub fn has_css(ctx: &GenerationContext<'_>, slot: Slot) -> Result<bool, StoreError> {
    Ok(ctx.store.meta_text(ctx.post.id, slot.compiled_key())?.is_some())
}

/// `style.css` or `editor.css`.
pub struct StyleGenerator {
    slot: Slot,
}

impl StyleGenerator {
    pub const fn new(slot: Slot) -> Self {
        Self { slot }
    }
}

impl Generator for StyleGenerator {
    fn name(&self) -> &'static str {
        self.slot.css_file()
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Block
    }

    fn validate(&self, ctx: &GenerationContext<'_>) -> Result<bool, StoreError> {
        has_css(ctx, self.slot)
    }

    fn file_name(&self, _: &Post) -> String {
        self.slot.css_file().into()
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        ctx.store
            .meta_text(ctx.post.id, self.slot.compiled_key())?
            .with_context(|| format!("no compiled {} CSS", self.slot.as_str()))
    }
}

/// `style.css.map` or `editor.css.map`.
pub struct SourceMapGenerator {
    slot: Slot,
}

impl SourceMapGenerator {
    pub const fn new(slot: Slot) -> Self {
        Self { slot }
    }
}

impl Generator for SourceMapGenerator {
    fn name(&self) -> &'static str {
        match self.slot {
            Slot::Style => "style.css.map",
            Slot::EditorStyle => "editor.css.map",
        }
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Block
    }

    /// A map without its stylesheet would point at nothing.
    fn validate(&self, ctx: &GenerationContext<'_>) -> Result<bool, StoreError> {
        Ok(has_css(ctx, self.slot)?
            && ctx
                .store
                .meta_text(ctx.post.id, self.slot.source_map_key())?
                .is_some())
    }

    fn file_name(&self, _: &Post) -> String {
        self.name().into()
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        ctx.store
            .meta_text(ctx.post.id, self.slot.source_map_key())?
            .context("no source map")
    }
}
