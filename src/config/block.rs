//! `[block]` section configuration.
//!
//! Values written into every generated `block.json` and PHP header.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[block]` section in fanculo.toml.
///
/// # Example
/// ```toml
/// [block]
/// namespace = "acme"      # blocks register as acme/<slug>
/// api_version = 3
/// text_domain = "acme"
/// category = "design"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    /// Prefix of the registered block name.
    #[serde(default = "defaults::block::namespace")]
    #[educe(Default = defaults::block::namespace())]
    pub namespace: String,

    /// Block API version declared in block.json.
    #[serde(default = "defaults::block::api_version")]
    #[educe(Default = defaults::block::api_version())]
    pub api_version: u8,

    #[serde(default = "defaults::block::text_domain")]
    #[educe(Default = defaults::block::text_domain())]
    pub text_domain: String,

    /// Inserter category used when a block has no `category` setting.
    #[serde(default = "defaults::block::category")]
    #[educe(Default = defaults::block::category())]
    pub category: String,
}
