// src/cli/handlers/eval.rs

use anyhow::{Result, anyhow};
use std::io::Write;

use crate::{core::interpreter::ShellState, engine::js::ScriptScope, models::ScriptValue};

/// `eval <code...>` runs code in the shell's own evaluator, with no new
/// process. Globals it defines stay visible to later `eval` lines.
pub fn handle(state: &mut ShellState, args: &[String], _out: &mut dyn Write) -> Result<ScriptValue> {
    if args.is_empty() {
        return Err(anyhow!(t!("eval.error.no_code")));
    }
    let source = args.join(" ");
    let scope = ScriptScope::for_inline(&[], state.env.clone());
    Ok(state.evaluator.eval(&source, &scope)?)
}
