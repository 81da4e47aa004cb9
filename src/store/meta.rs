//! Metadata keys and typed, normalising readers.
//!
//! Storage layers coerce types freely: a boolean may come back as `true`,
//! `1` or `"1"`, an id list as a JSON array or as a string holding one.
//! All of that is resolved here, once, so callers only ever see `bool`,
//! `Vec<PostId>` and friends.

use super::{PostId, PostStore};
use crate::{
    error::{CoreError, StoreError},
    log,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Keys
// ============================================================================

pub mod keys {
    pub const BLOCK_SCSS: &str = "_fanculo_block_scss";
    pub const BLOCK_EDITOR_SCSS: &str = "_fanculo_block_editor_scss";
    pub const BLOCK_COMPILED_CSS: &str = "_fanculo_block_compiled_css";
    pub const BLOCK_EDITOR_COMPILED_CSS: &str = "_fanculo_block_editor_compiled_css";
    pub const BLOCK_CSS_SOURCE_MAP: &str = "_fanculo_block_css_source_map";
    pub const BLOCK_EDITOR_CSS_SOURCE_MAP: &str = "_fanculo_block_editor_css_source_map";
    pub const BLOCK_SELECTED_PARTIALS: &str = "_fanculo_block_selected_partials";
    pub const BLOCK_EDITOR_SELECTED_PARTIALS: &str = "_fanculo_block_editor_selected_partials";
    pub const BLOCK_PHP: &str = "_fanculo_block_php";
    pub const BLOCK_JS: &str = "_fanculo_block_js";
    pub const BLOCK_SETTINGS: &str = "_fanculo_block_settings";

    pub const NEEDS_RECOMPILE: &str = "_fanculo_block_needs_recompile";
    pub const RECOMPILE_TIMESTAMP: &str = "_fanculo_block_recompile_timestamp";
    pub const COMPILE_ERROR: &str = "_fanculo_block_compile_error";
    pub const EDITOR_COMPILE_ERROR: &str = "_fanculo_block_editor_compile_error";

    pub const PARTIAL_SCSS: &str = "_fanculo_scss_partial_scss";
    pub const PARTIAL_IS_GLOBAL: &str = "_fanculo_scss_partial_is_global";
    pub const PARTIAL_GLOBAL_ORDER: &str = "_fanculo_scss_partial_global_order";
    /// Global state the last fan-out of the partial was computed with
    pub const PARTIAL_APPLIED_GLOBAL: &str = "_fanculo_scss_partial_applied_global";

    pub const SYMBOL_PHP: &str = "_fanculo_symbol_php";
}

// ============================================================================
// Style slots
// ============================================================================

/// One of the two independent compiled-CSS outputs of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Slot {
    Style,
    EditorStyle,
}

impl Slot {
    pub const ALL: [Self; 2] = [Self::Style, Self::EditorStyle];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::EditorStyle => "editorStyle",
        }
    }

    pub const fn scss_key(self) -> &'static str {
        match self {
            Self::Style => keys::BLOCK_SCSS,
            Self::EditorStyle => keys::BLOCK_EDITOR_SCSS,
        }
    }

    pub const fn compiled_key(self) -> &'static str {
        match self {
            Self::Style => keys::BLOCK_COMPILED_CSS,
            Self::EditorStyle => keys::BLOCK_EDITOR_COMPILED_CSS,
        }
    }

    pub const fn source_map_key(self) -> &'static str {
        match self {
            Self::Style => keys::BLOCK_CSS_SOURCE_MAP,
            Self::EditorStyle => keys::BLOCK_EDITOR_CSS_SOURCE_MAP,
        }
    }

    pub const fn selected_key(self) -> &'static str {
        match self {
            Self::Style => keys::BLOCK_SELECTED_PARTIALS,
            Self::EditorStyle => keys::BLOCK_EDITOR_SELECTED_PARTIALS,
        }
    }

    /// Last compile failure of this slot.
    pub const fn compile_error_key(self) -> &'static str {
        match self {
            Self::Style => keys::COMPILE_ERROR,
            Self::EditorStyle => keys::EDITOR_COMPILE_ERROR,
        }
    }

    /// Generated stylesheet name inside a block directory.
    pub const fn css_file(self) -> &'static str {
        match self {
            Self::Style => "style.css",
            Self::EditorStyle => "editor.css",
        }
    }
}

// ============================================================================
// Normalisation
// ============================================================================

/// Interpret a stored boolean. Accepts `true`, `1` and `"1"`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1) || n.as_u64() == Some(1),
        Value::String(s) => s.trim() == "1",
        _ => false,
    }
}

/// Parse a stored id list, preserving order and dropping repeats.
///
/// Accepts a JSON array or a string containing one; elements may be numbers
/// or numeric strings. Elements that are not ids are skipped.
pub fn parse_id_list(value: &Value) -> Result<Vec<PostId>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(collect_ids(items)),
        Value::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Ok(collect_ids(&items)),
            Ok(other) => Err(format!("expected a JSON array, found `{other}`")),
            Err(e) => Err(e.to_string()),
        },
        other => Err(format!("expected a JSON array, found `{other}`")),
    }
}

fn collect_ids(items: &[Value]) -> Vec<PostId> {
    let mut ids: Vec<PostId> = Vec::with_capacity(items.len());
    for item in items {
        let id = match item {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if let Some(id) = id.filter(|&id| id > 0).map(PostId)
            && !ids.contains(&id)
        {
            ids.push(id);
        }
    }
    ids
}

fn report_malformed(post: PostId, key: &str, reason: String) {
    let err = CoreError::MalformedData {
        post,
        key: key.to_owned(),
        reason,
    };
    log!("meta"; "{err}, treating as empty");
}

// ============================================================================
// Typed readers
// ============================================================================

/// Typed accessors over any [`PostStore`].
pub trait MetaExt {
    /// Non-blank text value.
    fn meta_text(&self, id: PostId, key: &str) -> Result<Option<String>, StoreError>;

    /// Normalised boolean, `false` when absent.
    fn meta_flag(&self, id: PostId, key: &str) -> Result<bool, StoreError>;

    /// Integer stored as a number or numeric string.
    fn meta_int(&self, id: PostId, key: &str) -> Result<Option<i64>, StoreError>;

    /// Ordered id list; malformed values read as empty.
    fn meta_id_list(&self, id: PostId, key: &str) -> Result<Vec<PostId>, StoreError>;

    /// JSON object stored directly or as a string; malformed values read as empty.
    fn meta_object(&self, id: PostId, key: &str) -> Result<Map<String, Value>, StoreError>;
}

impl<S: PostStore + ?Sized> MetaExt for S {
    fn meta_text(&self, id: PostId, key: &str) -> Result<Option<String>, StoreError> {
        Ok(match self.get_meta(id, key)? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    fn meta_flag(&self, id: PostId, key: &str) -> Result<bool, StoreError> {
        Ok(self.get_meta(id, key)?.as_ref().is_some_and(is_truthy))
    }

    fn meta_int(&self, id: PostId, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(match self.get_meta(id, key)? {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }

    fn meta_id_list(&self, id: PostId, key: &str) -> Result<Vec<PostId>, StoreError> {
        let Some(value) = self.get_meta(id, key)? else {
            return Ok(Vec::new());
        };
        Ok(parse_id_list(&value).unwrap_or_else(|reason| {
            report_malformed(id, key, reason);
            Vec::new()
        }))
    }

    fn meta_object(&self, id: PostId, key: &str) -> Result<Map<String, Value>, StoreError> {
        let parsed = match self.get_meta(id, key)? {
            None | Some(Value::Null) => return Ok(Map::new()),
            Some(Value::Object(map)) => return Ok(map),
            Some(Value::String(s)) if s.trim().is_empty() => return Ok(Map::new()),
            Some(Value::String(s)) => serde_json::from_str::<Value>(&s).map_err(|e| e.to_string()),
            Some(other) => Ok(other),
        };
        match parsed {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => {
                report_malformed(id, key, format!("expected a JSON object, found `{other}`"));
                Ok(Map::new())
            }
            Err(reason) => {
                report_malformed(id, key, reason);
                Ok(Map::new())
            }
        }
    }
}
