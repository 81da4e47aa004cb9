//! Editor and front-end scripts.
//!
//! `index.js` registers the block with the editor using the `wp` globals,
//! so no bundler is needed. Blocks with a render template are previewed
//! through `ServerSideRender`, which adds a script dependency declared in
//! `index.asset.php` next to a content-hash version.

use super::{GenerationContext, Generator, php_header, render::has_render};
use crate::{
    error::StoreError,
    store::{ContentType, MetaExt, Post, meta::keys},
    utils::fs::content_hash,
};
use anyhow::{Context, Result};

pub const INDEX_JS: &str = "index.js";
pub const ASSET_PHP: &str = "index.asset.php";
pub const VIEW_JS: &str = "view.js";

/// Script handles `index.js` relies on.
fn dependencies(server_rendered: bool) -> Vec<&'static str> {
    let mut deps = vec!["wp-block-editor", "wp-blocks", "wp-element", "wp-i18n"];
    if server_rendered {
        deps.push("wp-server-side-render");
    }
    deps
}

/// Source of `index.js`.
pub fn index_js(ctx: &GenerationContext<'_>) -> Result<String> {
    let name = serde_json::to_string(&ctx.block_name())?;
    let title = serde_json::to_string(if ctx.post.title.is_empty() {
        &ctx.post.slug
    } else {
        &ctx.post.title
    })?;

    let (imports, edit, save) = if has_render(ctx)? {
        (
            "    const ServerSideRender = wp.serverSideRender;\n",
            "el('div', useBlockProps(), el(ServerSideRender, { block: name, attributes: props.attributes }))",
            "null",
        )
    } else {
        (
            "",
            "el('div', useBlockProps(), title)",
            "el('div', useBlockProps.save(), title)",
        )
    };

    Ok(format!(
        "(function (wp) {{
    const {{ registerBlockType }} = wp.blocks;
    const {{ useBlockProps }} = wp.blockEditor;
    const {{ createElement: el }} = wp.element;
{imports}
    const name = {name};
    const title = {title};

    registerBlockType(name, {{
        edit: function (props) {{
            return {edit};
        }},
        save: function () {{
            return {save};
        }},
    }});
}})(window.wp);
"
    ))
}

pub struct IndexJsGenerator;

impl Generator for IndexJsGenerator {
    fn name(&self) -> &'static str {
        INDEX_JS
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Block
    }

    fn validate(&self, _: &GenerationContext<'_>) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn file_name(&self, _: &Post) -> String {
        INDEX_JS.into()
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        index_js(ctx)
    }
}

pub struct AssetPhpGenerator;

impl Generator for AssetPhpGenerator {
    fn name(&self) -> &'static str {
        ASSET_PHP
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Block
    }

    fn validate(&self, _: &GenerationContext<'_>) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn file_name(&self, _: &Post) -> String {
        ASSET_PHP.into()
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        let script = index_js(ctx)?;
        let version = &content_hash(script.as_bytes())[..20];
        let deps = dependencies(has_render(ctx)?)
            .iter()
            .map(|d| format!("'{d}'"))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "<?php\n{}\n\nreturn array('dependencies' => array({deps}), 'version' => '{version}');\n",
            php_header(ctx.post, &format!("Asset manifest for `{INDEX_JS}`."))
        ))
    }
}

pub struct ViewJsGenerator;

impl Generator for ViewJsGenerator {
    fn name(&self) -> &'static str {
        VIEW_JS
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Block
    }

    fn validate(&self, ctx: &GenerationContext<'_>) -> Result<bool, StoreError> {
        Ok(ctx.store.meta_text(ctx.post.id, keys::BLOCK_JS)?.is_some())
    }

    fn file_name(&self, _: &Post) -> String {
        VIEW_JS.into()
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        let js = ctx
            .store
            .meta_text(ctx.post.id, keys::BLOCK_JS)?
            .context("block has no view script")?;
        Ok(format!("{}\n", js.trim_end()))
    }
}
