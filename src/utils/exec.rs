//! External command execution.
//!
//! Runs a configured command with a payload piped to stdin and hands the
//! raw output back to the caller, which decides how to interpret failure.

use anyhow::{Context, Result};
use regex::Regex;
use std::{
    borrow::Cow,
    ffi::OsString,
    io::Write,
    path::Path,
    process::{Command, Output, Stdio},
    sync::OnceLock,
    thread,
};

/// Prepare a Command from components.
fn prepare(root: Option<&Path>, cmd: &[OsString]) -> Result<(String, Command)> {
    let name = cmd
        .first()
        .and_then(|s| s.to_str())
        .context("Empty command")?
        .to_owned();

    let mut command = Command::new(&cmd[0]);
    command.args(&cmd[1..]);

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((name, command))
}

/// Run `cmd`, write `input` to its stdin and collect stdout/stderr.
///
/// A non-zero exit status is not an error here; only failing to spawn or
/// talk to the process is.
pub fn run_with_stdin(root: Option<&Path>, cmd: &[String], input: &[u8]) -> Result<Output> {
    let cmd: Vec<OsString> = cmd.iter().map(OsString::from).collect();
    let (name, mut command) = prepare(root, &cmd)?;

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn `{name}`"))?;

    let mut stdin = child.stdin.take().context("Failed to acquire stdin")?;
    let payload = input.to_vec();
    // Feed stdin from a separate thread so a chatty child can't fill its
    // stdout pipe while we are still blocked writing.
    let writer = thread::spawn(move || stdin.write_all(&payload));

    let output = child
        .wait_with_output()
        .with_context(|| format!("`{name}` process failed"))?;

    writer
        .join()
        .map_err(|_| anyhow::anyhow!("Failed to join stdin writer thread"))?
        .with_context(|| format!("Failed to write stdin of `{name}`"))?;

    Ok(output)
}

/// Remove ANSI color sequences from command output.
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}
