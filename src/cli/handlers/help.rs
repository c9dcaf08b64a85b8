// src/cli/handlers/help.rs

use anyhow::Result;
use colored::*;
use std::io::Write;

use crate::{cli::dispatcher::COMMAND_REGISTRY, core::interpreter::ShellState, models::ScriptValue};

/// Lists the internal commands. Anything else is a script looked up in `PATH`.
pub fn handle(state: &mut ShellState, _args: &[String], out: &mut dyn Write) -> Result<ScriptValue> {
    writeln!(out, "{}", t!("help.header").bold())?;

    let width = COMMAND_REGISTRY
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0);
    for command in COMMAND_REGISTRY {
        let padding = " ".repeat(width.saturating_sub(command.name.len()));
        writeln!(out, "  {}{}  {}", command.name.cyan(), padding, command.summary)?;
    }

    let path = state.env.get("PATH").map(String::as_str).unwrap_or_default();
    writeln!(out, "\n{} {}", t!("help.footer"), path.dimmed())?;
    Ok(ScriptValue::success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::handlers::commons::test_support::state;

    #[test]
    fn test_lists_every_command() {
        let mut state = state();
        let mut out = Vec::new();
        handle(&mut state, &[], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        for command in COMMAND_REGISTRY {
            assert!(text.contains(command.name), "missing '{}'", command.name);
        }
    }
}
