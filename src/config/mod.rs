//! Configuration management for `fanculo.toml`.
//!
//! # Sections
//!
//! | Section       | Purpose                                        |
//! |---------------|------------------------------------------------|
//! | `[store]`     | Post store file                                |
//! | `[output]`    | Generated files root and per-type directories  |
//! | `[block]`     | Block namespace, API version, text domain      |
//! | `[cache]`     | Scan and compile input cache lifetimes         |
//! | `[recompile]` | Pending work hint key and lifetime             |
//! | `[compiler]`  | External SCSS compiler command                 |
//!
//! Every field has a default, so the file itself is optional.
//!
//! # Example
//!
//! ```toml
//! [store]
//! path = "fanculo-store.json"
//!
//! [output]
//! root = "generated"
//!
//! [block]
//! namespace = "acme"
//!
//! [compiler]
//! command = ["sass", "--stdin", "--no-source-map"]
//! ```

mod block;
pub mod defaults;
mod error;
mod paths;
mod pipeline;

use block::BlockConfig;
use error::ConfigError;
use paths::{OutputConfig, StoreConfig};
use pipeline::{CacheConfig, CompilerConfig, RecompileConfig};

use crate::cli::Cli;
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing fanculo.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root every relative path is resolved against
    #[serde(skip)]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub block: BlockConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub recompile: RecompileConfig,

    #[serde(default)]
    pub compiler: CompilerConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load `cli.config` below the root, or defaults when it doesn't exist.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .as_ref()
            .cloned()
            .unwrap_or_else(|| self.get_root().to_owned());

        Self::update_option(&mut self.store.path, cli.store.as_ref());
        Self::update_option(&mut self.output.root, cli.output.as_ref());

        let root = Self::normalize_path(&root);
        self.config_path = Self::normalize_path(&root.join(&cli.config));
        self.store.path = Self::normalize_path(&root.join(&self.store.path));
        self.output.root = Self::normalize_path(&root.join(&self.output.root));
        self.root = Some(root);
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.compiler.command.is_empty() {
            bail!(ConfigError::Validation(
                "[compiler.command] must have at least one element".into()
            ));
        }

        let namespace = &self.block.namespace;
        if namespace.is_empty()
            || !namespace
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            bail!(ConfigError::Validation(format!(
                "[block.namespace] `{namespace}` must be lowercase letters, digits or `-`"
            )));
        }

        if !(1..=3).contains(&self.block.api_version) {
            bail!(ConfigError::Validation(
                "[block.api_version] must be 1, 2 or 3".into()
            ));
        }

        for (field, dir) in [
            ("[output.blocks]", &self.output.blocks),
            ("[output.symbols]", &self.output.symbols),
            ("[output.partials]", &self.output.partials),
        ] {
            if dir.as_os_str().is_empty() || dir.is_absolute() {
                bail!(ConfigError::Validation(format!(
                    "{field} must be a relative, non-empty path"
                )));
            }
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
