//! Command-line interface definitions.
//!
//! Each subcommand maps onto one operation of the pipeline; results are
//! printed to stdout as JSON, logs go to stderr.

use crate::store::PostId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fanculo partial dependency tracking and regeneration CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: fanculo.toml)
    #[arg(short = 'C', long, default_value = "fanculo.toml")]
    pub config: PathBuf,

    /// Store file path (relative to project root)
    #[arg(short, long)]
    pub store: Option<PathBuf>,

    /// Generated files root (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Flag every block depending on a partial for recompilation
    Recompile {
        /// id of the changed SCSS partial
        partial: PostId,
    },

    /// Wipe the generated files root and regenerate every published post
    Regenerate,

    /// Handle a saved post: regenerate its files and fan out to dependents
    Save {
        post: PostId,
    },

    /// Change a post's slug and rebuild all generated files
    Rename {
        post: PostId,
        /// the new slug
        slug: String,
    },

    /// Trash a post and rebuild all generated files
    Delete {
        post: PostId,
    },

    /// Show the pending recompile work item
    Pending,

    /// Show which blocks a change to a partial reaches
    Impact {
        partial: PostId,
    },

    /// Show the ordered compiler input of a block
    Input {
        block: PostId,

        /// use the editor stylesheet slot
        #[arg(long)]
        editor: bool,
    },

    /// Compile every flagged block with the configured compiler
    Compile,

    /// Post a compiler result back for one block slot
    Complete {
        block: PostId,

        /// use the editor stylesheet slot
        #[arg(long)]
        editor: bool,

        /// file holding the compiled CSS
        #[arg(long, conflicts_with = "error", required_unless_present = "error")]
        css: Option<PathBuf>,

        /// file holding the source map
        #[arg(long, requires = "css")]
        map: Option<PathBuf>,

        /// compilation error message
        #[arg(long)]
        error: Option<String>,

        /// line of the compilation error
        #[arg(long, requires = "error")]
        line: Option<u32>,

        /// column of the compilation error
        #[arg(long, requires = "line")]
        column: Option<u32>,
    },
}

impl Cli {
    /// Whether the command writes to the store.
    pub const fn is_mutating(&self) -> bool {
        !matches!(
            self.command,
            Commands::Pending | Commands::Impact { .. } | Commands::Input { .. }
        )
    }
}
