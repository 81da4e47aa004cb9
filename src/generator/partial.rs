//! SCSS partial sources, exported as `_<slug>.scss`.

use super::{GenerationContext, Generator};
use crate::{
    error::StoreError,
    store::{ContentType, MetaExt, Post, meta::keys},
    utils::slug::sanitize_slug,
};
use anyhow::{Context, Result};

pub struct PartialGenerator;

impl Generator for PartialGenerator {
    fn name(&self) -> &'static str {
        "scss-partial"
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::ScssPartial
    }

    fn validate(&self, ctx: &GenerationContext<'_>) -> Result<bool, StoreError> {
        Ok(ctx.store.meta_text(ctx.post.id, keys::PARTIAL_SCSS)?.is_some())
    }

    fn file_name(&self, post: &Post) -> String {
        format!("_{}.scss", sanitize_slug(&post.slug, post.id))
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        let scss = ctx
            .store
            .meta_text(ctx.post.id, keys::PARTIAL_SCSS)?
            .context("partial has no SCSS")?;
        let global = if ctx.store.meta_flag(ctx.post.id, keys::PARTIAL_IS_GLOBAL)? {
            let order = ctx
                .store
                .meta_int(ctx.post.id, keys::PARTIAL_GLOBAL_ORDER)?
                .unwrap_or(0);
            format!(", global (order {order})")
        } else {
            String::new()
        };
        Ok(format!(
            "// Generated from post {}{global}. Do not edit.\n{}\n",
            ctx.post.id,
            scss.trim_end()
        ))
    }
}
