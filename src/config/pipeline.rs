//! `[cache]`, `[recompile]` and `[compiler]` sections.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[cache]` section - lifetimes in seconds.
///
/// # Example
/// ```toml
/// [cache]
/// usage_ttl = 60          # partial → blocks scan
/// globals_ttl = 60        # global partial list
/// compile_input_ttl = 600 # per-block compile input transient
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "defaults::cache::ttl")]
    #[educe(Default = defaults::cache::ttl())]
    pub usage_ttl: u64,

    #[serde(default = "defaults::cache::ttl")]
    #[educe(Default = defaults::cache::ttl())]
    pub globals_ttl: u64,

    #[serde(default = "defaults::cache::ttl")]
    #[educe(Default = defaults::cache::ttl())]
    pub compile_input_ttl: u64,
}

impl CacheConfig {
    pub const fn usage(&self) -> Duration {
        Duration::from_secs(self.usage_ttl)
    }

    pub const fn globals(&self) -> Duration {
        Duration::from_secs(self.globals_ttl)
    }

    pub const fn compile_input(&self) -> Duration {
        Duration::from_secs(self.compile_input_ttl)
    }
}

/// `[recompile]` section - the pending work hint.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct RecompileConfig {
    /// Seconds before the pending hint expires.
    #[serde(default = "defaults::recompile::pending_ttl")]
    #[educe(Default = defaults::recompile::pending_ttl())]
    pub pending_ttl: u64,

    /// Transient key the compiler polls.
    #[serde(default = "defaults::recompile::transient_key")]
    #[educe(Default = defaults::recompile::transient_key())]
    pub transient_key: String,
}

impl RecompileConfig {
    pub const fn pending(&self) -> Duration {
        Duration::from_secs(self.pending_ttl)
    }
}

/// `[compiler]` section - external SCSS compiler.
///
/// # Example
/// ```toml
/// [compiler]
/// command = ["npx", "sass", "--stdin", "--no-source-map"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Reads SCSS on stdin, writes CSS on stdout.
    #[serde(default = "defaults::compiler::command")]
    #[educe(Default = defaults::compiler::command())]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use std::time::Duration;

    #[test]
    fn test_pipeline_config() {
        let config = r#"
            [cache]
            usage_ttl = 0

            [recompile]
            pending_ttl = 60
            transient_key = "acme_pending"

            [compiler]
            command = ["dart", "sass", "--stdin"]
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.cache.usage(), Duration::ZERO);
        assert_eq!(config.cache.globals(), Duration::from_secs(600));
        assert_eq!(config.recompile.pending(), Duration::from_secs(60));
        assert_eq!(config.recompile.transient_key, "acme_pending");
        assert_eq!(config.compiler.command, ["dart", "sass", "--stdin"]);
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = SiteConfig::default();

        assert_eq!(config.cache.compile_input(), Duration::from_secs(600));
        assert_eq!(config.recompile.pending(), Duration::from_secs(300));
        assert_eq!(config.recompile.transient_key, "fanculo_blocks_need_recompile");
        assert_eq!(config.compiler.command, ["sass", "--stdin", "--no-source-map"]);
    }
}
