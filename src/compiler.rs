//! External SCSS compiler and the drain of flagged blocks.
//!
//! The core only flags blocks. Something else has to turn their SCSS into
//! CSS and post the result back through
//! [`RecompilationScheduler::complete`]. [`drain_flagged`] is that
//! something when running from the command line.

use crate::{
    deps::{CompileInput, CompileInputs},
    error::{CompilationError, CoreError, StoreError},
    log,
    recompile::{CompiledCss, RecompilationScheduler},
    store::{PostId, Slot},
    utils::exec::{run_with_stdin, strip_ansi},
};
use regex::Regex;
use serde::Serialize;
use std::{path::PathBuf, sync::OnceLock};

/// `Compile(scss, partials) -> css | error`.
pub trait ScssCompiler: Send + Sync {
    fn compile(&self, input: &CompileInput) -> Result<CompiledCss, CompilationError>;
}

// ============================================================================
// CommandCompiler
// ============================================================================

/// Pipes the concatenated source into a command such as `sass --stdin`.
pub struct CommandCompiler {
    command: Vec<String>,
    root: Option<PathBuf>,
}

impl CommandCompiler {
    pub fn new(command: Vec<String>, root: Option<PathBuf>) -> Self {
        Self { command, root }
    }
}

impl ScssCompiler for CommandCompiler {
    fn compile(&self, input: &CompileInput) -> Result<CompiledCss, CompilationError> {
        let output = run_with_stdin(self.root.as_deref(), &self.command, input.source().as_bytes())
            .map_err(|e| CompilationError::new(format!("{e:#}")))?;

        if output.status.success() {
            return Ok(CompiledCss {
                css: String::from_utf8_lossy(&output.stdout).into_owned(),
                source_map: None,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut error = parse_diagnostic(&strip_ansi(&stderr));
        if error.message.is_empty() {
            error.message = format!("compiler exited with {}", output.status);
        }
        error.partial = error.line.and_then(|line| input.line_origin(line));
        Err(error)
    }
}

/// Extract message and `line:column` from compiler stderr.
///
/// Understands dart-sass output:
///
/// ```text
/// Error: Undefined variable.
///   ╷
/// 4 │ .x { color: $missing; }
///   │             ^^^^^^^^
///   ╵
///   - 4:13  root stylesheet
/// ```
fn parse_diagnostic(stderr: &str) -> CompilationError {
    static LOCATION: OnceLock<Regex> = OnceLock::new();
    let re = LOCATION.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:-|stdin|\S+\.scss)\s+(\d+):(\d+)\b").unwrap()
    });

    let message = stderr
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("Error:").unwrap_or(line).trim().to_owned())
        .unwrap_or_default();

    let mut error = CompilationError::new(message);
    if let Some(caps) = re.captures(stderr)
        && let Ok(line) = caps[1].parse::<u32>()
    {
        error = error.at(line, caps[2].parse().ok());
    }
    error
}

// ============================================================================
// Drain
// ============================================================================

/// One slot that failed to compile during a drain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainFailure {
    pub block_id: PostId,
    pub slot: Slot,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<PostId>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Blocks whose flag was cleared
    pub compiled: Vec<PostId>,
    /// Blocks that had at least one slot written
    pub updated: Vec<PostId>,
    pub failures: Vec<DrainFailure>,
}

/// Compile every flagged block and post the results back.
///
/// Failures are recorded per slot and never stop the remaining blocks.
pub fn drain_flagged(
    scheduler: &RecompilationScheduler,
    inputs: &CompileInputs,
    compiler: &dyn ScssCompiler,
) -> Result<DrainReport, StoreError> {
    let mut report = DrainReport::default();

    for block in scheduler.flagged_blocks()? {
        let mut cleared = false;
        let mut wrote = false;

        for slot in Slot::ALL {
            let input = inputs.build(block, slot)?;
            if input.is_empty() {
                continue;
            }

            match scheduler.complete(block, slot, compiler.compile(&input)) {
                Ok(done) => {
                    wrote = true;
                    cleared |= done;
                }
                Err(CoreError::Compilation { source, .. }) => {
                    report.failures.push(DrainFailure {
                        block_id: block,
                        slot,
                        error: source.to_string(),
                        partial: source.partial,
                    });
                }
                Err(e) => {
                    log!("compile"; "block {block} ({}): {e}", slot.as_str());
                    report.failures.push(DrainFailure {
                        block_id: block,
                        slot,
                        error: e.to_string(),
                        partial: None,
                    });
                }
            }
        }

        if wrote {
            report.updated.push(block);
        }
        if cleared {
            report.compiled.push(block);
        }
    }

    log!(
        "compile";
        "{} compiled, {} failed",
        report.compiled.len(),
        report.failures.len()
    );
    Ok(report)
}
