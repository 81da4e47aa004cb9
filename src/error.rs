//! Error taxonomy for the dependency and regeneration core.
//!
//! | Error               | Policy                                          |
//! |---------------------|-------------------------------------------------|
//! | `NotFound`          | dependency contributes nothing, logged          |
//! | `MalformedData`     | replaced by an empty value, logged              |
//! | `StoreWrite`        | logged per item, aggregated into a summary      |
//! | `Compilation`       | kept visible on the block, flag stays set       |
//!
//! Only store-level failures escape batch operations as `Err`.

use crate::store::PostId;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a [`crate::store::PostStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error when accessing store `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("store file `{0}` is not valid JSON")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("failed to serialize store contents")]
    Serialize(#[source] serde_json::Error),

    #[error("write of `{key}` on post {post} was rejected: {reason}")]
    WriteRejected {
        post: PostId,
        key: String,
        reason: String,
    },
}

/// Error produced by the external SCSS compiler.
///
/// Never generated by the core itself, only carried back to the operator.
#[derive(Debug, Clone, Error, Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[error("{message}{}", location_suffix(.line, .column))]
pub struct CompilationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Partial whose source contains the failing line, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<PostId>,
}

impl CompilationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
            partial: None,
        }
    }

    pub fn at(mut self, line: u32, column: Option<u32>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }
}

fn location_suffix(line: &Option<u32>, column: &Option<u32>) -> String {
    match (*line, *column) {
        (Some(line), Some(column)) => format!(" (line {line}, column {column})"),
        (Some(line), None) => format!(" (line {line})"),
        _ => String::new(),
    }
}

/// Core error taxonomy.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("post {0} not found")]
    NotFound(PostId),

    #[error("malformed `{key}` on post {post}: {reason}")]
    MalformedData {
        post: PostId,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    StoreWrite(#[from] StoreError),

    #[error("compilation of block {block} failed: {source}")]
    Compilation {
        block: PostId,
        #[source]
        source: CompilationError,
    },
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
