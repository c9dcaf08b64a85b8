// src/cli/handlers/env.rs

use anyhow::{Result, anyhow};
use std::io::Write;

use super::commons::{split_assignment, validate_identifier};
use crate::{core::interpreter::ShellState, models::ScriptValue};

/// Variables the shell cannot run without.
const PROTECTED: &[&str] = &["PWD"];

/// Prints the environment as `NAME=value`, sorted by name.
pub fn handle_env(state: &mut ShellState, args: &[String], out: &mut dyn Write) -> Result<ScriptValue> {
    if let Some(name) = args.first() {
        // `env NAME` prints one value, like `printenv NAME`.
        return match state.env.get(name) {
            Some(value) => {
                writeln!(out, "{}", value)?;
                Ok(ScriptValue::success())
            }
            None => Ok(ScriptValue::Int(1)),
        };
    }
    for (name, value) in &state.env {
        writeln!(out, "{}={}", name, value)?;
    }
    Ok(ScriptValue::success())
}

/// `export NAME=value...` sets variables. A bare `NAME` that is not yet set
/// is created empty.
pub fn handle_export(
    state: &mut ShellState,
    args: &[String],
    out: &mut dyn Write,
) -> Result<ScriptValue> {
    if args.is_empty() {
        return handle_env(state, args, out);
    }

    // Validate everything before changing anything.
    let mut assignments = Vec::with_capacity(args.len());
    for operand in args {
        let (name, value) = split_assignment(operand).unwrap_or((operand.as_str(), ""));
        let name = validate_identifier(name)?;
        let keep_existing = !operand.contains('=');
        assignments.push((name, value, keep_existing));
    }

    for (name, value, keep_existing) in assignments {
        if keep_existing && state.env.contains_key(name) {
            continue;
        }
        log::debug!("Exported '{}'.", name);
        state.env.insert(name.to_string(), value.to_string());
    }
    Ok(ScriptValue::success())
}

/// `unset NAME...` removes variables. Unknown names are ignored.
pub fn handle_unset(state: &mut ShellState, args: &[String], _out: &mut dyn Write) -> Result<ScriptValue> {
    for name in args {
        if PROTECTED.contains(&name.as_str()) {
            return Err(anyhow!(t!("env.error.protected"), name = name));
        }
    }
    for name in args {
        state.env.remove(name);
    }
    Ok(ScriptValue::success())
}
