//! Post storage boundary.
//!
//! The host application owns posts, metadata and short-lived transients.
//! Everything in this crate reaches them through the [`PostStore`] trait,
//! so the dependency and regeneration logic never depends on how they are
//! persisted.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  get_meta / set_meta   ┌──────────────────────────┐
//! │ usage index  │ ─────────────────────► │                          │
//! │ resolver     │                        │  dyn PostStore           │
//! │ scheduler    │  query_posts           │  (MemoryStore on disk)   │
//! │ coordinator  │ ─────────────────────► │                          │
//! └──────────────┘  transients (TTL)      └──────────────────────────┘
//!         │
//!         └── MetaExt: typed reads, normalised the moment data is read
//! ```

mod memory;
pub mod meta;

pub use memory::MemoryStore;
pub use meta::{MetaExt, Slot};

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr, time::Duration};

// ============================================================================
// Identifiers
// ============================================================================

/// Numeric post identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PostId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(PostId)
    }
}

// ============================================================================
// Post
// ============================================================================

/// Managed content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Block,
    Symbol,
    ScssPartial,
}

impl ContentType {
    pub const ALL: [Self; 3] = [Self::Block, Self::Symbol, Self::ScssPartial];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Symbol => "symbol",
            Self::ScssPartial => "scss_partial",
        }
    }

    /// Parse a stored post type, returning `None` for foreign types.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "block" => Some(Self::Block),
            "symbol" => Some(Self::Symbol),
            "scss_partial" | "scss-partial" | "scssPartial" => Some(Self::ScssPartial),
            _ => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Publish,
    Draft,
    Pending,
    Private,
    Trash,
}

/// Generic content unit.
///
/// Opaque to the core except for `id`, its content type and `slug`
/// (generated directories are keyed by slug).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Stored post type, kept as text so foreign types survive a round trip
    #[serde(rename = "type")]
    pub post_type: String,
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: PostStatus,
    /// Taxonomy terms attached to the post
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<String>,
}

impl Post {
    pub fn new(id: u64, content_type: ContentType, slug: &str) -> Self {
        Self {
            id: PostId(id),
            post_type: content_type.as_str().to_owned(),
            slug: slug.to_owned(),
            title: slug.to_owned(),
            status: PostStatus::Publish,
            terms: Vec::new(),
        }
    }

    /// Managed content type, `None` for posts this crate ignores.
    pub fn content_type(&self) -> Option<ContentType> {
        ContentType::parse(&self.post_type)
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Publish
    }
}

/// Filter for [`PostStore::query_posts`]. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub content_type: Option<ContentType>,
    pub status: Option<PostStatus>,
    pub term: Option<String>,
}

impl PostQuery {
    /// Published posts of one content type.
    pub fn published(content_type: ContentType) -> Self {
        Self {
            content_type: Some(content_type),
            status: Some(PostStatus::Publish),
            term: None,
        }
    }

    pub fn matches(&self, post: &Post) -> bool {
        self.content_type.is_none_or(|ty| post.content_type() == Some(ty))
            && self.status.is_none_or(|status| post.status == status)
            && self
                .term
                .as_deref()
                .is_none_or(|term| post.terms.iter().any(|t| t == term))
    }
}

// ============================================================================
// Store capability
// ============================================================================

/// Metadata and transient storage owned by the host application.
///
/// Results of `query_posts` are ordered by ascending post id.
pub trait PostStore: Send + Sync {
    fn get_post(&self, id: PostId) -> Result<Option<Post>, StoreError>;

    fn query_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError>;

    fn get_meta(&self, id: PostId, key: &str) -> Result<Option<Value>, StoreError>;

    fn set_meta(&self, id: PostId, key: &str, value: Value) -> Result<(), StoreError>;

    fn delete_meta(&self, id: PostId, key: &str) -> Result<(), StoreError>;

    /// Read a transient, `None` once its TTL has elapsed.
    fn get_transient(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Store a transient, replacing any previous value under `key`.
    fn set_transient(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError>;

    fn delete_transient(&self, key: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        assert_eq!(ContentType::parse("block"), Some(ContentType::Block));
        assert_eq!(ContentType::parse("scssPartial"), Some(ContentType::ScssPartial));
        assert_eq!(ContentType::parse("scss_partial"), Some(ContentType::ScssPartial));
        assert_eq!(ContentType::parse("page"), None);
    }

    #[test]
    fn test_post_serde_uses_type_field() {
        let post: Post = serde_json::from_str(
            r#"{"id": 4, "type": "symbol", "slug": "card", "status": "draft"}"#,
        )
        .unwrap();
        assert_eq!(post.id, PostId(4));
        assert_eq!(post.content_type(), Some(ContentType::Symbol));
        assert_eq!(post.status, PostStatus::Draft);
        assert!(post.title.is_empty());

        let foreign: Post =
            serde_json::from_str(r#"{"id": 5, "type": "page", "slug": "about"}"#).unwrap();
        assert_eq!(foreign.content_type(), None);
        assert!(foreign.is_published());
    }

    #[test]
    fn test_query_matches() {
        let mut post = Post::new(1, ContentType::Block, "hero");
        post.terms.push("blocks".into());

        assert!(PostQuery::default().matches(&post));
        assert!(PostQuery::published(ContentType::Block).matches(&post));
        assert!(!PostQuery::published(ContentType::Symbol).matches(&post));

        let by_term = PostQuery {
            term: Some("blocks".into()),
            ..PostQuery::default()
        };
        assert!(by_term.matches(&post));

        post.status = PostStatus::Trash;
        assert!(!PostQuery::published(ContentType::Block).matches(&post));
    }

    #[test]
    fn test_post_id_from_str() {
        assert_eq!(" 42 ".parse::<PostId>().unwrap(), PostId(42));
        assert!("x".parse::<PostId>().is_err());
    }
}
