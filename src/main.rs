//! Fanculo - SCSS partial dependency tracking and cascading regeneration.

mod cache;
mod cli;
mod compiler;
mod config;
mod coordinator;
mod deps;
mod error;
mod generator;
mod logger;
mod pipeline;
mod recompile;
mod store;
#[cfg(test)]
mod test_support;
mod utils;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use coordinator::PostEvent;
use error::{CompilationError, CoreError};
use generator::PostReport;
use pipeline::Pipeline;
use recompile::CompiledCss;
use serde::Serialize;
use std::{fs, path::Path, sync::Arc};
use store::{MemoryStore, Post, PostId, PostStatus, PostStore, Slot};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SiteConfig::load(&cli)?;

    let store = Arc::new(MemoryStore::from_path(&config.store.path)?);
    let pipeline = Pipeline::new(store.clone(), &config);

    let result = run(&cli, &store, &pipeline);
    // Compile failures are recorded on the block, so persist even on error
    if cli.is_mutating() {
        store.flush()?;
    }
    result
}

fn run(cli: &Cli, store: &MemoryStore, pipeline: &Pipeline) -> Result<()> {
    match &cli.command {
        Commands::Recompile { partial } => print(&pipeline.scheduler.schedule(*partial)?),
        Commands::Regenerate => print(&pipeline.coordinator.regenerate_all()?),
        Commands::Save { post } => print(&pipeline.coordinator.handle(PostEvent::Saved(*post))?),
        Commands::Rename { post, slug } => {
            let before = require_post(store, *post)?;
            let mut after = before.clone();
            after.slug = slug.clone();
            store.upsert_post(after.clone());
            print(&pipeline.coordinator.handle(PostEvent::Updated { before, after })?)
        }
        Commands::Delete { post } => {
            let mut post = require_post(store, *post)?;
            post.status = PostStatus::Trash;
            let event = pipeline.coordinator.deletion(post.clone())?;
            store.upsert_post(post);
            print(&pipeline.coordinator.handle(event)?)
        }
        Commands::Pending => print(&pipeline.scheduler.pending()?),
        Commands::Impact { partial } => print(&pipeline.resolver.impact(*partial)?),
        Commands::Input { block, editor } => {
            require_post(store, *block)?;
            print(&pipeline.inputs.build(*block, slot(*editor))?)
        }
        Commands::Compile => {
            let report = pipeline.compile_flagged()?;
            print(&report)?;
            if !report.drain.failures.is_empty() {
                bail!("{} slot(s) failed to compile", report.drain.failures.len());
            }
            Ok(())
        }
        Commands::Complete {
            block,
            editor,
            css,
            map,
            error,
            line,
            column,
        } => {
            let result = match (css, error) {
                (Some(css), _) => Ok(CompiledCss {
                    css: read(css)?,
                    source_map: map.as_deref().map(read).transpose()?,
                }),
                (None, Some(message)) => {
                    let mut error = CompilationError::new(message.clone());
                    if let Some(line) = line {
                        error = error.at(*line, *column);
                    }
                    Err(error)
                }
                (None, None) => bail!("either --css or --error is required"),
            };
            complete(pipeline, *block, slot(*editor), result)
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteOutcome {
    success: bool,
    block_id: PostId,
    slot: Slot,
    flag_cleared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated: Option<PostReport>,
}

fn complete(
    pipeline: &Pipeline,
    block: PostId,
    slot: Slot,
    result: Result<CompiledCss, CompilationError>,
) -> Result<()> {
    match pipeline.complete(block, slot, result) {
        Ok(completion) => {
            let success = completion.is_ok();
            print(&CompleteOutcome {
                success,
                block_id: block,
                slot,
                flag_cleared: completion.flag_cleared,
                error: None,
                generated: completion.generated,
            })?;
            if !success {
                bail!("block {block} compiled but its files failed to regenerate");
            }
            Ok(())
        }
        Err(CoreError::Compilation { source, .. }) => {
            print(&CompleteOutcome {
                success: false,
                block_id: block,
                slot,
                flag_cleared: false,
                error: Some(source.to_string()),
                generated: None,
            })?;
            bail!("block {block} keeps its recompile flag")
        }
        Err(e) => Err(e.into()),
    }
}

fn require_post(store: &MemoryStore, id: PostId) -> Result<Post> {
    store.get_post(id)?.ok_or_else(|| CoreError::NotFound(id).into())
}

const fn slot(editor: bool) -> Slot {
    if editor { Slot::EditorStyle } else { Slot::Style }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
