//! `block.json` block metadata.
//!
//! ```json
//! {
//!   "$schema": "https://schemas.wp.org/trunk/block.json",
//!   "apiVersion": 3,
//!   "name": "fanculo/hero",
//!   "editorScript": "file:./index.js",
//!   "render": "file:./render.php",
//!   "style": "file:./style.css"
//! }
//! ```
//!
//! Asset references are derived from the same predicates the asset
//! generators validate with, so block.json never points at a missing file.

use super::{
    GenerationContext, Generator,
    render::{self, has_render},
    script::{INDEX_JS, VIEW_JS},
    style::has_css,
};
use crate::{
    error::StoreError,
    store::{ContentType, MetaExt, Post, Slot, meta::keys},
};
use anyhow::Result;
use serde_json::{Map, Value, json};

pub const FILE: &str = "block.json";
const SCHEMA: &str = "https://schemas.wp.org/trunk/block.json";

/// Settings keys copied verbatim into block.json.
const PASSTHROUGH: &[&str] = &[
    "description",
    "icon",
    "keywords",
    "attributes",
    "supports",
    "example",
    "parent",
    "ancestor",
    "styles",
    "providesContext",
    "usesContext",
];

pub struct BlockJsonGenerator;

impl BlockJsonGenerator {
    fn metadata(ctx: &GenerationContext<'_>) -> Result<Map<String, Value>> {
        let settings = ctx.store.meta_object(ctx.post.id, keys::BLOCK_SETTINGS)?;
        let block = &ctx.config.block;

        let mut meta = Map::new();
        meta.insert("$schema".into(), json!(SCHEMA));
        meta.insert("apiVersion".into(), json!(block.api_version));
        meta.insert("name".into(), json!(ctx.block_name()));
        meta.insert("title".into(), json!(title(ctx.post, &settings)));
        meta.insert(
            "category".into(),
            settings
                .get("category")
                .filter(|v| v.is_string())
                .cloned()
                .unwrap_or_else(|| json!(block.category)),
        );
        meta.insert("textdomain".into(), json!(block.text_domain));

        for key in PASSTHROUGH {
            if let Some(value) = settings.get(*key) {
                meta.insert((*key).into(), value.clone());
            }
        }

        meta.insert("editorScript".into(), json!(file_ref(INDEX_JS)));
        if has_render(ctx)? {
            meta.insert("render".into(), json!(file_ref(render::FILE)));
        }
        if has_css(ctx, Slot::Style)? {
            meta.insert("style".into(), json!(file_ref(Slot::Style.css_file())));
        }
        if has_css(ctx, Slot::EditorStyle)? {
            meta.insert(
                "editorStyle".into(),
                json!(file_ref(Slot::EditorStyle.css_file())),
            );
        }
        if ctx.store.meta_text(ctx.post.id, keys::BLOCK_JS)?.is_some() {
            meta.insert("viewScript".into(), json!(file_ref(VIEW_JS)));
        }
        Ok(meta)
    }
}

fn title(post: &Post, settings: &Map<String, Value>) -> String {
    settings
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| {
            if post.title.trim().is_empty() {
                post.slug.clone()
            } else {
                post.title.clone()
            }
        })
}

fn file_ref(file: &str) -> String {
    format!("file:./{file}")
}

impl Generator for BlockJsonGenerator {
    fn name(&self) -> &'static str {
        FILE
    }

    fn can_generate(&self, content_type: ContentType) -> bool {
        content_type == ContentType::Block
    }

    fn validate(&self, _: &GenerationContext<'_>) -> Result<bool, StoreError> {
        Ok(true)
    }

    fn file_name(&self, _: &Post) -> String {
        FILE.into()
    }

    fn render(&self, ctx: &GenerationContext<'_>) -> Result<String> {
        let meta = Self::metadata(ctx)?;
        let mut json = serde_json::to_string_pretty(&Value::Object(meta))?;
        json.push('\n');
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SiteConfig,
        store::{MemoryStore, PostId, PostStore},
        test_support::{add_block, set},
    };

    fn render_for(store: &MemoryStore, config: &SiteConfig) -> Value {
        let post = store.get_post(PostId(10)).unwrap().unwrap();
        let ctx = GenerationContext::new(&post, store, config).unwrap();
        serde_json::from_str(&BlockJsonGenerator.render(&ctx).unwrap()).unwrap()
    }

    #[test]
    fn test_minimal_block() {
        let store = MemoryStore::new();
        add_block(&store, 10, "hero");
        let json = render_for(&store, &SiteConfig::default());

        assert_eq!(json["$schema"], SCHEMA);
        assert_eq!(json["apiVersion"], 3);
        assert_eq!(json["name"], "fanculo/hero");
        assert_eq!(json["title"], "hero");
        assert_eq!(json["category"], "widgets");
        assert_eq!(json["editorScript"], "file:./index.js");
        assert!(json.get("render").is_none());
        assert!(json.get("style").is_none());
        assert!(json.get("viewScript").is_none());
    }

    #[test]
    fn test_assets_follow_metadata() {
        let store = MemoryStore::new();
        add_block(&store, 10, "hero");
        set(&store, 10, keys::BLOCK_PHP, json!("<p></p>"));
        set(&store, 10, keys::BLOCK_SCSS, json!(".a { b: c }"));
        set(&store, 10, keys::BLOCK_EDITOR_COMPILED_CSS, json!(".e{}"));
        set(&store, 10, keys::BLOCK_JS, json!("void 0;"));
        let json = render_for(&store, &SiteConfig::default());

        assert_eq!(json["render"], "file:./render.php");
        // SCSS without compiled CSS is "not yet compiled"
        assert!(json.get("style").is_none());
        assert_eq!(json["editorStyle"], "file:./editor.css");
        assert_eq!(json["viewScript"], "file:./view.js");
    }

    #[test]
    fn test_settings_passthrough() {
        let store = MemoryStore::new();
        add_block(&store, 10, "hero");
        set(
            &store,
            10,
            keys::BLOCK_SETTINGS,
            json!(r#"{"title": "Hero", "category": "design", "supports": {"align": true}, "secret": 1}"#),
        );
        let mut config = SiteConfig::default();
        config.block.namespace = "acme".into();
        config.block.api_version = 2;
        let json = render_for(&store, &config);

        assert_eq!(json["name"], "acme/hero");
        assert_eq!(json["apiVersion"], 2);
        assert_eq!(json["title"], "Hero");
        assert_eq!(json["category"], "design");
        assert_eq!(json["supports"]["align"], true);
        assert!(json.get("secret").is_none());
    }

    #[test]
    fn test_malformed_settings_fall_back() {
        let store = MemoryStore::new();
        add_block(&store, 10, "hero");
        set(&store, 10, keys::BLOCK_SETTINGS, json!("{not json"));
        let json = render_for(&store, &SiteConfig::default());
        assert_eq!(json["title"], "hero");
    }
}
