//! Terminal output: the `log!` macro and progress bars.
//!
//! Everything goes to stderr so stdout stays reserved for JSON reports.
//! When stderr is redirected, lines are written plainly and no progress
//! bars are drawn.
//!
//! ```text
//! [recompile] partial 4: 2 of 3 blocks flagged, 2 compilations queued
//! [generate] [██████████░░░░░░░░░░] 12/24
//! ```

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType, size},
    tty::IsTty,
};
use parking_lot::Mutex;
use std::{
    io::{Write, stderr},
    sync::{
        OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Rows currently held by progress bars below the log output.
static RESERVED_ROWS: AtomicUsize = AtomicUsize::new(0);

const FALLBACK_WIDTH: usize = 120;
const BAR_MIN: usize = 10;
const BAR_MAX: usize = 40;

fn terminal_width() -> usize {
    static WIDTH: OnceLock<usize> = OnceLock::new();
    *WIDTH.get_or_init(|| size().map_or(FALLBACK_WIDTH, |(w, _)| usize::from(w)))
}

/// `[module]` in the module's color.
fn prefix(module: &str) -> ColoredString {
    let text = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "recompile" => text.bright_magenta().bold(),
        "generate" => text.bright_green().bold(),
        "compile" => text.bright_blue().bold(),
        "error" => text.bright_red().bold(),
        _ => text.bright_yellow().bold(),
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let end = (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
    &s[..end]
}

/// Filled cells of a `width`-cell bar at `current / total`.
fn filled_cells(current: usize, total: usize, width: usize) -> usize {
    if total == 0 {
        return 0;
    }
    (current.min(total) * width) / total
}

// ============================================================================
// log!
// ============================================================================

/// Log a message with a colored module prefix.
///
/// ```ignore
/// log!("generate"; "{} post(s) regenerated", count);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Write one log line. Single-line messages are clipped to the terminal
/// width; active progress bars are redrawn below the line.
#[allow(clippy::cast_possible_truncation)]
pub fn log(module: &str, message: &str) {
    let mut out = stderr().lock();
    if !out.is_tty() {
        writeln!(out, "{} {message}", prefix(module)).ok();
        return;
    }

    let reserved = RESERVED_ROWS.load(Ordering::SeqCst);
    if reserved > 0 {
        execute!(out, cursor::MoveUp(reserved as u16), Clear(ClearType::FromCursorDown)).ok();
    } else {
        execute!(out, Clear(ClearType::UntilNewLine)).ok();
    }

    let message = if message.contains('\n') {
        message
    } else {
        // "[module] " takes the module name plus three columns
        clip(message, terminal_width().saturating_sub(module.len() + 3))
    };
    writeln!(out, "{} {message}", prefix(module)).ok();

    for _ in 0..reserved {
        writeln!(out).ok();
    }
    out.flush().ok();
}

// ============================================================================
// Progress bars
// ============================================================================

struct Bar {
    name: &'static str,
    total: usize,
    done: AtomicUsize,
}

/// One progress bar per named task, each on its own terminal row.
///
/// Safe to advance from rayon workers; rendering is serialized.
pub struct ProgressBars {
    bars: Vec<Bar>,
    render: Mutex<()>,
}

impl ProgressBars {
    /// Bars for the tasks with work to do.
    ///
    /// `None` when there is at most one item overall or stderr is not a
    /// terminal.
    pub fn new_filtered(tasks: &[(&'static str, usize)]) -> Option<Self> {
        let bars: Vec<Bar> = tasks
            .iter()
            .filter(|(_, total)| *total > 0)
            .map(|&(name, total)| Bar {
                name,
                total,
                done: AtomicUsize::new(0),
            })
            .collect();

        if bars.iter().map(|b| b.total).sum::<usize>() <= 1 || !stderr().is_tty() {
            return None;
        }

        let mut out = stderr().lock();
        for _ in &bars {
            writeln!(out).ok();
        }
        out.flush().ok();
        RESERVED_ROWS.store(bars.len(), Ordering::SeqCst);

        Some(Self {
            bars,
            render: Mutex::new(()),
        })
    }

    /// Advance the bar called `name`. Unknown names are ignored.
    pub fn inc_by_name(&self, name: &str) {
        if let Some(row) = self.bars.iter().position(|bar| bar.name == name) {
            let bar = &self.bars[row];
            let done = bar.done.fetch_add(1, Ordering::Relaxed) + 1;
            self.draw(row, done);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw(&self, row: usize, done: usize) {
        let bar = &self.bars[row];
        let count = format!("{done}/{}", bar.total);
        // "[name] [" + "] " + count
        let overhead = bar.name.len() + 3 + 3 + count.len();
        let width = terminal_width().saturating_sub(overhead).clamp(BAR_MIN, BAR_MAX);
        let filled = filled_cells(done, bar.total, width);

        let _render = self.render.lock();
        let mut out = stderr().lock();
        let up = (self.bars.len() - row) as u16;
        execute!(out, cursor::MoveUp(up), Clear(ClearType::CurrentLine)).ok();
        write!(
            out,
            "{} [{}{}] {count}",
            prefix(bar.name),
            "█".repeat(filled),
            "░".repeat(width - filled)
        )
        .ok();
        execute!(out, cursor::MoveDown(up)).ok();
        write!(out, "\r").ok();
        out.flush().ok();
    }

    /// Erase the bars and release their rows.
    #[allow(clippy::cast_possible_truncation)]
    pub fn finish(&self) {
        RESERVED_ROWS.store(0, Ordering::SeqCst);
        let _render = self.render.lock();
        let mut out = stderr().lock();
        let rows = self.bars.len() as u16;
        execute!(out, cursor::MoveUp(rows), Clear(ClearType::FromCursorDown)).ok();
        out.flush().ok();
    }
}

impl Drop for ProgressBars {
    fn drop(&mut self) {
        self.finish();
    }
}
