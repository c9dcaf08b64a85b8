//! # Engine
//!
//! Decides what a process runs once its context is built: inline code, a
//! script file, or the shell itself.

use crate::{
    CancellationToken,
    cli::bootstrap::ConfigError,
    constants::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_NOT_FOUND, EXIT_UNKNOWN},
    core::{interpreter::report, mount_table::MountTable, repl},
    models::{ExecutionContext, ScriptValue},
    system::launcher::ProcessLauncher,
    vfs::path,
};
use anyhow::Result;
use std::rc::Rc;
use std::sync::Arc;

pub mod js;

use js::{EvalError, Evaluator, JsEvaluator, ScriptScope};

/// Runs `context` to completion and returns the process exit code.
///
/// # Errors
/// Only for failures before any script runs (mounts, engine start-up) or
/// when a resolved script cannot be read.
pub fn run(context: ExecutionContext, cancel: CancellationToken) -> Result<i32> {
    let mounts = Arc::new(MountTable::from_specs(&context.mounts).map_err(ConfigError::from)?);
    let mut evaluator = JsEvaluator::new(Arc::clone(&mounts))?
        .with_launcher(Rc::new(ProcessLauncher::new(mounts.specs())))
        .with_cancellation(Arc::clone(&cancel));

    let ExecutionContext {
        code,
        args,
        env,
        aliases,
        ..
    } = context;

    if let Some(code) = code {
        log::debug!("Running inline code with {} argument(s).", args.len());
        let scope = ScriptScope::for_inline(&args, env);
        return Ok(exit_code(evaluator.eval(&code, &scope)));
    }

    if let Some((script, script_args)) = args.split_first() {
        let Some(resolved) = path::which(&mounts, &env, script) else {
            report(&format!("{}: {}", script, t!("engine.error.script_not_found")));
            return Ok(EXIT_NOT_FOUND);
        };
        log::debug!("Running script '{}'.", resolved);
        let source = mounts.read_to_string(&resolved)?;
        let scope = ScriptScope::for_script(&resolved, script_args, env);
        return Ok(exit_code(evaluator.eval(&source, &scope)));
    }

    repl::run_shell(
        repl::ShellSetup {
            env,
            aliases,
            mounts,
            evaluator: Box::new(evaluator),
        },
        cancel,
    )
}

/// An integral result is the exit code; anything else is printed and counts
/// as success.
fn exit_code(result: Result<ScriptValue, EvalError>) -> i32 {
    match result {
        Ok(ScriptValue::Int(code)) => i32::try_from(code).unwrap_or(EXIT_UNKNOWN),
        Ok(ScriptValue::Text(text)) => {
            println!("{}", text);
            0
        }
        Ok(ScriptValue::Undefined) => 0,
        Err(EvalError::Interrupted) => EXIT_INTERRUPTED,
        Err(e) => {
            report(&e.to_string());
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MountSpec;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;

    fn context(code: Option<&str>, args: &[&str]) -> ExecutionContext {
        ExecutionContext {
            code: code.map(str::to_string),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: BTreeMap::from([
                ("PATH".to_string(), "/sbin".to_string()),
                ("PWD".to_string(), "/".to_string()),
            ]),
            mounts: vec![MountSpec::builtin_root()],
            aliases: BTreeMap::new(),
        }
    }

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(Ok(ScriptValue::Int(7))), 7);
        assert_eq!(exit_code(Ok(ScriptValue::Int(i64::MAX))), EXIT_UNKNOWN);
        assert_eq!(exit_code(Ok(ScriptValue::Text("done".to_string()))), 0);
        assert_eq!(exit_code(Ok(ScriptValue::Undefined)), 0);
        assert_eq!(
            exit_code(Err(EvalError::Script("boom".to_string()))),
            EXIT_FAILURE
        );
        assert_eq!(exit_code(Err(EvalError::Interrupted)), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_bundled_ls_loads_its_library() {
        assert_eq!(run(context(None, &["ls", "-la", "/lib"]), token()).unwrap(), 0);
        assert_eq!(run(context(None, &["ls", "--bogus"]), token()).unwrap(), 2);
    }

    #[test]
    fn test_raised_token_interrupts_inline_code() {
        let cancel = Arc::new(AtomicBool::new(true));
        let code = run(context(Some("while (true) {}"), &[]), cancel).unwrap();
        assert_eq!(code, EXIT_INTERRUPTED);
    }

    #[test]
    fn test_inline_code_sees_its_arguments() {
        let code = run(
            context(Some("process.argv.length === 4 && process.argv[1] === '-C' ? 5 : 1"), &["a", "b"]),
            token(),
        )
        .unwrap();
        assert_eq!(code, 5);
    }

    #[test]
    fn test_runs_script_from_path() {
        assert_eq!(run(context(None, &["true"]), token()).unwrap(), 0);
        assert_eq!(run(context(None, &["false"]), token()).unwrap(), 1);
    }

    #[test]
    fn test_missing_script() {
        let code = run(context(None, &["frobnicate"]), token()).unwrap();
        assert_eq!(code, EXIT_NOT_FOUND);
    }

    #[test]
    fn test_script_error_is_failure() {
        let code = run(context(Some("throw new Error('boom')"), &[]), token()).unwrap();
        assert_eq!(code, EXIT_FAILURE);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let mut ctx = context(Some("0"), &[]);
        ctx.mounts.clear();
        assert!(run(ctx, token()).is_err());
    }
}
