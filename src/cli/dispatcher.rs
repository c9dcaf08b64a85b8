// src/cli/dispatcher.rs

use anyhow::Result;
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

use crate::{
    cli::handlers,
    constants::{EXIT_FAILURE, EXIT_INTERRUPTED, EXIT_NOT_FOUND},
    core::{interpreter::ShellState, mount_table::MountTable},
    engine::js::EvalError,
    models::ScriptValue,
    system::{executor::ExecutionError, launcher::LaunchError},
    vfs::path,
};

/// Names that end the shell instead of running anything.
const EXIT_SENTINELS: &[&str] = &["exit", "quit"];

/// Signature shared by every internal command.
///
/// Handlers run against the live shell state and write their output to
/// `out`, which is either the terminal or a buffer feeding the next stage.
pub type Handler = fn(&mut ShellState, &[String], &mut dyn Write) -> Result<ScriptValue>;

/// An internal command: runs inside the shell process, never spawned.
#[derive(Debug)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub summary: &'static str,
    pub handler: Handler,
}

/// All internal commands.
pub static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "alias",
        aliases: &[],
        summary: t!("command.alias.summary"),
        handler: handlers::alias::handle_alias,
    },
    CommandDefinition {
        name: "cd",
        aliases: &[],
        summary: t!("command.cd.summary"),
        handler: handlers::nav::handle_cd,
    },
    CommandDefinition {
        name: "env",
        aliases: &["printenv"],
        summary: t!("command.env.summary"),
        handler: handlers::env::handle_env,
    },
    CommandDefinition {
        name: "eval",
        aliases: &[],
        summary: t!("command.eval.summary"),
        handler: handlers::eval::handle,
    },
    CommandDefinition {
        name: "export",
        aliases: &[],
        summary: t!("command.export.summary"),
        handler: handlers::env::handle_export,
    },
    CommandDefinition {
        name: "help",
        aliases: &["?"],
        summary: t!("command.help.summary"),
        handler: handlers::help::handle,
    },
    CommandDefinition {
        name: "history",
        aliases: &[],
        summary: t!("command.history.summary"),
        handler: handlers::history::handle,
    },
    CommandDefinition {
        name: "mounts",
        aliases: &["mount"],
        summary: t!("command.mounts.summary"),
        handler: handlers::mounts::handle,
    },
    CommandDefinition {
        name: "pwd",
        aliases: &[],
        summary: t!("command.pwd.summary"),
        handler: handlers::nav::handle_pwd,
    },
    CommandDefinition {
        name: "unalias",
        aliases: &[],
        summary: t!("command.unalias.summary"),
        handler: handlers::alias::handle_unalias,
    },
    CommandDefinition {
        name: "unset",
        aliases: &[],
        summary: t!("command.unset.summary"),
        handler: handlers::env::handle_unset,
    },
];

/// Finds a command definition in the registry by its name or alias.
pub fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0}: command not found")]
    NotFound(String),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Spawn(ExecutionError),
    #[error("Could not forward command output: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("{name}: {error:#}")]
    Handler {
        name: String,
        error: anyhow::Error,
    },
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("Interrupted.")]
    Interrupted,
}

impl DispatchError {
    /// The line result a failed dispatch produces.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) => EXIT_NOT_FOUND,
            Self::Interrupted => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }

    /// Wraps a handler failure, surfacing evaluator errors as such.
    pub fn from_handler(name: &str, error: anyhow::Error) -> Self {
        match error.downcast::<EvalError>() {
            Ok(EvalError::Interrupted) => Self::Interrupted,
            Ok(eval) => Self::Eval(eval),
            Err(error) => Self::Handler {
                name: name.to_string(),
                error,
            },
        }
    }
}

impl From<ExecutionError> for DispatchError {
    fn from(error: ExecutionError) -> Self {
        match error {
            ExecutionError::Interrupted => Self::Interrupted,
            other => Self::Spawn(other),
        }
    }
}

/// How one command of a pipeline will run.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// `exit` or `quit`.
    Exit,
    /// An internal command, run against the live shell state.
    Internal(&'static CommandDefinition),
    /// A script run in a new process, by resolved virtual path.
    External(String),
}

/// Classifies an (already alias-expanded) command name.
///
/// Internal commands win over scripts of the same name. Other names are
/// looked up through `PATH` in the mount table.
pub fn resolve(
    name: &str,
    mounts: &MountTable,
    env: &BTreeMap<String, String>,
) -> Result<Dispatch, DispatchError> {
    if is_exit_sentinel(name) {
        return Ok(Dispatch::Exit);
    }
    if let Some(command) = find_command(name) {
        return Ok(Dispatch::Internal(command));
    }

    let script =
        path::which(mounts, env, name).ok_or_else(|| DispatchError::NotFound(name.to_string()))?;
    log::debug!("Resolved '{}' to script '{}'.", name, script);
    Ok(Dispatch::External(script))
}

/// Whether `name` ends the shell.
pub fn is_exit_sentinel(name: &str) -> bool {
    EXIT_SENTINELS.contains(&name)
}

/// Expands a leading alias once. The expansion is not itself re-expanded.
pub fn expand_alias(
    aliases: &BTreeMap<String, String>,
    name: &str,
    args: &[String],
) -> Option<(String, Vec<String>)> {
    let expansion = aliases.get(name)?;
    let mut words = shlex::split(expansion)?.into_iter();
    let new_name = words.next()?;
    let mut new_args: Vec<String> = words.collect();
    new_args.extend(args.iter().cloned());
    log::debug!("Alias '{}' expanded to '{}'.", name, expansion);
    Some((new_name, new_args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MountSpec;

    fn root_only() -> MountTable {
        MountTable::from_specs(&[MountSpec::builtin_root()]).unwrap()
    }

    fn default_env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/sbin".to_string());
        env.insert("PWD".to_string(), "/".to_string());
        env
    }

    #[test]
    fn test_registry_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for command in COMMAND_REGISTRY {
            assert!(seen.insert(command.name), "duplicate '{}'", command.name);
            for alias in command.aliases {
                assert!(seen.insert(alias), "duplicate alias '{}'", alias);
            }
        }
    }

    #[test]
    fn test_find_by_name_and_alias() {
        assert_eq!(find_command("history").unwrap().name, "history");
        assert_eq!(find_command("printenv").unwrap().name, "env");
        assert!(find_command("frobnicate").is_none());
    }

    #[test]
    fn test_resolution_order() {
        let mounts = root_only();
        let env = default_env();

        assert!(matches!(resolve("exit", &mounts, &env).unwrap(), Dispatch::Exit));
        assert!(matches!(resolve("quit", &mounts, &env).unwrap(), Dispatch::Exit));
        assert!(matches!(
            resolve("pwd", &mounts, &env).unwrap(),
            Dispatch::Internal(def) if def.name == "pwd"
        ));
        assert!(matches!(
            resolve("echo", &mounts, &env).unwrap(),
            Dispatch::External(script) if script == "/sbin/echo.js"
        ));
    }

    #[test]
    fn test_unknown_command_is_not_found() {
        let error = resolve("frobnicate", &root_only(), &default_env()).unwrap_err();
        assert!(matches!(error, DispatchError::NotFound(_)));
        assert_eq!(error.exit_code(), EXIT_NOT_FOUND);
        assert!(error.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_alias_expands_once() {
        let mut aliases = BTreeMap::new();
        aliases.insert("ll".to_string(), "ls -l".to_string());
        aliases.insert("ls".to_string(), "ll".to_string());

        let (name, args) = expand_alias(&aliases, "ll", &["/work".to_string()]).unwrap();
        assert_eq!(name, "ls");
        assert_eq!(args, vec!["-l", "/work"]);
        assert!(expand_alias(&aliases, "cat", &[]).is_none());
    }

    #[test]
    fn test_interrupt_maps_to_its_own_code() {
        let error: DispatchError = ExecutionError::Interrupted.into();
        assert_eq!(error.exit_code(), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_eval_errors_surface_from_handlers() {
        let error = DispatchError::from_handler(
            "eval",
            anyhow::Error::new(EvalError::Script("boom".to_string())),
        );
        assert!(matches!(error, DispatchError::Eval(_)));
    }

    #[test]
    fn test_interrupted_evaluation_uses_interrupt_code() {
        let error =
            DispatchError::from_handler("eval", anyhow::Error::new(EvalError::Interrupted));
        assert!(matches!(error, DispatchError::Interrupted));
        assert_eq!(error.exit_code(), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_exit_sentinels() {
        assert!(is_exit_sentinel("exit"));
        assert!(is_exit_sentinel("quit"));
        assert!(!is_exit_sentinel("exit.js"));
    }
}
