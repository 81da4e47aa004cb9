//! Reusable PHP snippets, one file per symbol.

use super::{GenerationContext, Generator, php_header};
use crate::{
    error::StoreError,
    store::{ContentType, MetaExt, Post, meta::keys},
    utils::slug::sanitize_slug,
};
use anyhow::{Context, Result};

pub struct SymbolGenerator;

impl Generator for SymbolGenerator {
    fn name(&self) -> &'static str {
        "symbol"
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Symbol
    }

    fn validate(&self, ctx: &GenerationContext<'_>) -> Result<bool, StoreError> {
        Ok(ctx.store.meta_text(ctx.post.id, keys::SYMBOL_PHP)?.is_some())
    }

    fn file_name(&self, post: &Post) -> String {
        format!("{}.php", sanitize_slug(&post.slug, post.id))
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        let php = ctx
            .store
            .meta_text(ctx.post.id, keys::SYMBOL_PHP)?
            .context("symbol has no PHP")?;
        let header = php_header(ctx.post, &format!("Symbol `{}`.", ctx.safe_slug()));

        // Keep the snippet's own opening tag rather than nesting a second one
        let body = php.trim();
        let body = body.strip_prefix("<?php").map_or(body, str::trim_start);
        Ok(format!("<?php\n{header}\n\n{body}\n"))
    }
}
