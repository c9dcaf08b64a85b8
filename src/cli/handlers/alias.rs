//! # Handlers for `alias` and `unalias`
//!
//! Aliases rewrite the first word of a command before it is resolved. The
//! expansion is split into words, so `alias ll='ls -l'` makes `ll /work`
//! run `ls -l /work`. Expansion happens once; an alias is never expanded
//! again from inside another alias.

use anyhow::{Result, anyhow};
use colored::*;
use std::io::Write;

use super::commons::{quote_for_display, split_assignment, validate_identifier};
use crate::{core::interpreter::ShellState, models::ScriptValue};

/// `alias` lists every alias; `alias name` shows one; `alias name=expansion`
/// defines or replaces one. Several operands may be given.
pub fn handle_alias(
    state: &mut ShellState,
    args: &[String],
    out: &mut dyn Write,
) -> Result<ScriptValue> {
    if args.is_empty() {
        for (name, expansion) in &state.aliases {
            writeln!(out, "alias {}={}", name.cyan(), quote_for_display(expansion))?;
        }
        return Ok(ScriptValue::success());
    }

    let mut missing = Vec::new();
    for operand in args {
        match split_assignment(operand) {
            Some((name, expansion)) => {
                let name = validate_identifier(name)?;
                if shlex::split(expansion).is_none_or(|words| words.is_empty()) {
                    return Err(anyhow!(t!("alias.error.empty_expansion"), name = name));
                }
                log::debug!("Alias '{}' set.", name);
                state.aliases.insert(name.to_string(), expansion.to_string());
            }
            None => match state.aliases.get(operand.as_str()) {
                Some(expansion) => {
                    writeln!(out, "alias {}={}", operand.cyan(), quote_for_display(expansion))?;
                }
                None => missing.push(operand.as_str()),
            },
        }
    }

    if missing.is_empty() {
        Ok(ScriptValue::success())
    } else {
        Err(anyhow!(t!("alias.error.not_found"), names = missing.join(", ")))
    }
}

/// `unalias name...` removes aliases; naming an unknown alias is an error.
pub fn handle_unalias(
    state: &mut ShellState,
    args: &[String],
    _out: &mut dyn Write,
) -> Result<ScriptValue> {
    if args.is_empty() {
        return Err(anyhow!(t!("alias.error.unalias_usage")));
    }

    let missing: Vec<&str> = args
        .iter()
        .filter(|name| state.aliases.remove(name.as_str()).is_none())
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(ScriptValue::success())
    } else {
        Err(anyhow!(t!("alias.error.not_found"), names = missing.join(", ")))
    }
}
