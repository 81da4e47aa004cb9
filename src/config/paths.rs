//! `[store]` and `[output]` sections.
//!
//! Where posts are read from and where generated files go.

use super::defaults;
use crate::store::ContentType;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[store]` section in fanculo.toml.
///
/// # Example
/// ```toml
/// [store]
/// path = "data/store.json"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// JSON file holding posts, metadata and transients.
    #[serde(default = "defaults::store::path")]
    #[educe(Default = defaults::store::path())]
    pub path: PathBuf,
}

/// `[output]` section in fanculo.toml - generated file locations.
///
/// # Example
/// ```toml
/// [output]
/// root = "build/fanculo"
/// blocks = "blocks"
/// symbols = "symbols"
/// partials = "scss-partials"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Generated files root. Wiped by a full regeneration.
    #[serde(default = "defaults::output::root")]
    #[educe(Default = defaults::output::root())]
    pub root: PathBuf,

    /// One sub-directory per block, relative to `root`.
    #[serde(default = "defaults::output::blocks")]
    #[educe(Default = defaults::output::blocks())]
    pub blocks: PathBuf,

    #[serde(default = "defaults::output::symbols")]
    #[educe(Default = defaults::output::symbols())]
    pub symbols: PathBuf,

    #[serde(default = "defaults::output::partials")]
    #[educe(Default = defaults::output::partials())]
    pub partials: PathBuf,
}

impl OutputConfig {
    /// Directory holding generated output for one content type.
    pub fn dir_for(&self, content_type: ContentType) -> PathBuf {
        match content_type {
            ContentType::Block => self.root.join(&self.blocks),
            ContentType::Symbol => self.root.join(&self.symbols),
            ContentType::ScssPartial => self.root.join(&self.partials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use crate::store::ContentType;
    use std::path::Path;

    #[test]
    fn test_output_config() {
        let config = r#"
            [output]
            root = "out"
            blocks = "b"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.output.dir_for(ContentType::Block), Path::new("out/b"));
        assert_eq!(config.output.dir_for(ContentType::Symbol), Path::new("out/symbols"));
        assert_eq!(
            config.output.dir_for(ContentType::ScssPartial),
            Path::new("out/scss-partials")
        );
    }

    #[test]
    fn test_store_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.path, Path::new("fanculo-store.json"));
        assert_eq!(config.output.root, Path::new("generated"));
    }

    #[test]
    fn test_unknown_field_rejection() {
        let config = r#"
            [output]
            root = "out"
            unknown_field = true
        "#;
        assert!(toml::from_str::<SiteConfig>(config).is_err());
    }
}
