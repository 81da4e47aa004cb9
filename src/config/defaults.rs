//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// [store] Section Defaults
// ============================================================================

pub mod store {
    use std::path::PathBuf;

    pub fn path() -> PathBuf {
        "fanculo-store.json".into()
    }
}

// ============================================================================
// [output] Section Defaults
// ============================================================================

pub mod output {
    use std::path::PathBuf;

    pub fn root() -> PathBuf {
        "generated".into()
    }

    pub fn blocks() -> PathBuf {
        "blocks".into()
    }

    pub fn symbols() -> PathBuf {
        "symbols".into()
    }

    pub fn partials() -> PathBuf {
        "scss-partials".into()
    }
}

// ============================================================================
// [block] Section Defaults
// ============================================================================

pub mod block {
    pub fn namespace() -> String {
        "fanculo".into()
    }

    pub fn api_version() -> u8 {
        3
    }

    pub fn text_domain() -> String {
        "fanculo".into()
    }

    pub fn category() -> String {
        "widgets".into()
    }
}

// ============================================================================
// [cache] Section Defaults
// ============================================================================

pub mod cache {
    /// Seconds, shared by every cache layer
    pub fn ttl() -> u64 {
        600
    }
}

// ============================================================================
// [recompile] Section Defaults
// ============================================================================

pub mod recompile {
    pub fn pending_ttl() -> u64 {
        300
    }

    pub fn transient_key() -> String {
        "fanculo_blocks_need_recompile".into()
    }
}

// ============================================================================
// [compiler] Section Defaults
// ============================================================================

pub mod compiler {
    pub fn command() -> Vec<String> {
        vec!["sass".into(), "--stdin".into(), "--no-source-map".into()]
    }
}
