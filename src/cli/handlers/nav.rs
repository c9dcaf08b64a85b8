// src/cli/handlers/nav.rs

use anyhow::{Result, anyhow};
use std::io::Write;

use crate::{core::interpreter::ShellState, models::ScriptValue, vfs::path};

/// `cd [dir]` changes `PWD` inside the virtual namespace. With no argument it
/// goes to `HOME`; `cd -` goes back to `OLDPWD`.
pub fn handle_cd(state: &mut ShellState, args: &[String], out: &mut dyn Write) -> Result<ScriptValue> {
    let target = match args.first().map(String::as_str) {
        None => state
            .env
            .get("HOME")
            .cloned()
            .ok_or_else(|| anyhow!(t!("nav.error.no_home")))?,
        Some("-") => {
            let previous = state
                .env
                .get("OLDPWD")
                .cloned()
                .ok_or_else(|| anyhow!(t!("nav.error.no_oldpwd")))?;
            writeln!(out, "{}", previous)?;
            previous
        }
        Some(dir) => dir.to_string(),
    };

    let resolved = path::absolutize(state.cwd(), &target);
    if !state.mounts.is_dir(&resolved) {
        return Err(anyhow!(t!("nav.error.not_a_directory"), path = resolved));
    }

    let previous = state.cwd().to_string();
    log::debug!("Changing directory from '{}' to '{}'.", previous, resolved);
    state.env.insert("OLDPWD".to_string(), previous);
    state.env.insert("PWD".to_string(), resolved);
    Ok(ScriptValue::success())
}

/// `pwd` prints the virtual working directory.
pub fn handle_pwd(state: &mut ShellState, _args: &[String], out: &mut dyn Write) -> Result<ScriptValue> {
    writeln!(out, "{}", state.cwd())?;
    Ok(ScriptValue::success())
}
