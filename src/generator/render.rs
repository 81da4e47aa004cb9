//! `render.php` for dynamic blocks.
//!
//! The template receives its render state as explicit variables:
//!
//! | Variable      | Type       | Content                  |
//! |---------------|------------|--------------------------|
//! | `$attributes` | `array`    | block attributes         |
//! | `$content`    | `string`   | rendered inner blocks    |
//! | `$block`      | `WP_Block` | the block instance       |

use super::{GenerationContext, Generator, php_header};
use crate::{
    error::StoreError,
    store::{ContentType, MetaExt, Post, meta::keys},
};
use anyhow::{Context, Result};

pub const FILE: &str = "render.php";

/// Whether the block has a server-side template.
pub fn has_render(ctx: &GenerationContext<'_>) -> Result<bool, StoreError> {
    Ok(ctx.store.meta_text(ctx.post.id, keys::BLOCK_PHP)?.is_some())
}

pub struct RenderPhpGenerator;

impl Generator for RenderPhpGenerator {
    fn name(&self) -> &'static str {
        FILE
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Block
    }

    fn validate(&self, ctx: &GenerationContext<'_>) -> Result<bool, StoreError> {
        has_render(ctx)
    }

    fn file_name(&self, _: &Post) -> String {
        FILE.into()
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        let template = ctx
            .store
            .meta_text(ctx.post.id, keys::BLOCK_PHP)?
            .context("block has no render template")?;

        let header = php_header(
            ctx.post,
            &format!(
                "Render template for `{}`.\n *\n * @var array    $attributes Block attributes.\n * @var string   $content    Rendered inner blocks.\n * @var WP_Block $block      Block instance.",
                ctx.block_name()
            ),
        );

        Ok(format!(
            "<?php\n{header}\n\nif (!defined('ABSPATH')) {{\n    exit;\n}}\n?>\n{}\n",
            template.trim_end()
        ))
    }
}
