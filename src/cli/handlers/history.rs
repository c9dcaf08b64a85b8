//! # Handler for the `history` command
//!
//! Lists the recorded lines, oldest first and numbered from 1, or clears
//! them with `-c`. Multi-line entries are printed with their continuation
//! lines indented under the number.

use anyhow::Result;
use clap::Parser;
use std::io::Write;

use crate::{core::interpreter::ShellState, models::ScriptValue};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "history", about = "Show or clear the line history.")]
struct HistoryArgs {
    /// Remove every entry.
    #[arg(short = 'c', long = "clear")]
    clear: bool,
}

pub fn handle(state: &mut ShellState, args: &[String], out: &mut dyn Write) -> Result<ScriptValue> {
    let history_args = HistoryArgs::try_parse_from(args)?;

    if history_args.clear {
        state.history.clear()?;
        return Ok(ScriptValue::success());
    }

    let width = state.history.len().to_string().len();
    for (i, entry) in state.history.entries().enumerate() {
        let mut lines = entry.lines();
        let first = lines.next().unwrap_or_default();
        writeln!(out, "{:>width$}  {}", i + 1, first, width = width)?;
        for continuation in lines {
            writeln!(out, "{:>width$}  {}", "", continuation, width = width)?;
        }
    }
    Ok(ScriptValue::success())
}
