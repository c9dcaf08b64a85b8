// src/cli/handlers/mounts.rs

use anyhow::Result;
use colored::*;
use std::io::Write;

use crate::{core::interpreter::ShellState, models::ScriptValue};

/// `mounts` prints the mount table, one `mount_point -> source` per line,
/// sorted by mount point.
pub fn handle(state: &mut ShellState, _args: &[String], out: &mut dyn Write) -> Result<ScriptValue> {
    let mut entries: Vec<_> = state.mounts.entries().iter().collect();
    entries.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));

    let width = entries
        .iter()
        .map(|e| e.mount_point.len())
        .max()
        .unwrap_or(0);
    for entry in entries {
        let padding = " ".repeat(width.saturating_sub(entry.mount_point.len()));
        writeln!(
            out,
            "{}{} -> {}",
            entry.mount_point.cyan(),
            padding,
            entry.source
        )?;
    }
    Ok(ScriptValue::success())
}
