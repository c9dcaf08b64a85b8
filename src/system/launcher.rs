// src/system/launcher.rs

use crate::{
    constants::{KEY_FD, KEY_FD_FLAG, RESUME_FLAG},
    models::{ExecutionContext, MountSpec},
    system::secret_box::{SealedBox, SecretBox, TransportError, TransportKey},
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Could not locate the running jsh binary: {0}")]
    SelfPath(#[source] std::io::Error),
    #[error("No script given to launch.")]
    NoScript,
    #[error("Could not prepare the child's transport: {0}")]
    Transport(#[from] TransportError),
    #[error("Could not hand the transport key to the child: {0}")]
    KeyHandoff(String),
}

/// A child invocation that is ready to start but not yet started.
///
/// Owns the transport file the child will consume. If the process is never
/// spawned, call [`discard`](Self::discard) so the file does not linger.
#[derive(Debug)]
pub struct PreparedProcess {
    pub command: Command,
    pub transport: Option<PathBuf>,
}

impl PreparedProcess {
    /// Wraps a command that needs no transport file.
    pub fn plain(command: Command) -> Self {
        Self {
            command,
            transport: None,
        }
    }

    pub fn discard(self) {
        if let Some(path) = &self.transport {
            SecretBox::discard(path);
        }
    }
}

/// Builds child processes for external commands.
pub trait Launch {
    /// Prepares a child that runs `code`, or the script in `args[0]`, with
    /// `args` and `env`.
    fn build(
        &self,
        code: Option<String>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Result<PreparedProcess, LaunchError>;
}

/// Re-executes the running binary, handing it the context through a
/// [`SecretBox`].
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    mounts: Vec<MountSpec>,
    transport_dir: Option<PathBuf>,
    self_path: Option<PathBuf>,
}

impl ProcessLauncher {
    /// `mounts` are the parent's current mounts; children get the same
    /// namespace rather than re-deriving one.
    pub fn new(mounts: Vec<MountSpec>) -> Self {
        Self {
            mounts,
            transport_dir: None,
            self_path: None,
        }
    }

    /// Writes transport files to `dir` instead of the per-user default.
    pub fn with_transport_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transport_dir = Some(dir.into());
        self
    }

    /// Launches `path` instead of the current executable.
    pub fn with_self_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.self_path = Some(path.into());
        self
    }

    fn resolve_self(&self) -> Result<PathBuf, LaunchError> {
        match &self.self_path {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().map_err(LaunchError::SelfPath),
        }
    }

    fn seal(&self, context: &ExecutionContext) -> Result<SealedBox, TransportError> {
        match &self.transport_dir {
            Some(dir) => SecretBox::create_in(dir, context),
            None => SecretBox::create(context),
        }
    }
}

impl Launch for ProcessLauncher {
    fn build(
        &self,
        code: Option<String>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Result<PreparedProcess, LaunchError> {
        if code.is_none() && args.is_empty() {
            return Err(LaunchError::NoScript);
        }
        // Only script runs show a name on argv; inline code shows nothing.
        let script = match &code {
            Some(_) => None,
            None => args.first().cloned(),
        };
        let self_path = self.resolve_self()?;

        let context = ExecutionContext {
            code,
            args,
            env,
            mounts: self.mounts.clone(),
            aliases: BTreeMap::new(),
        };
        let SealedBox { path, key } = self.seal(&context)?;

        // argv carries only the mode flags, an opaque path and the script
        // name. Nothing from `env` or `code` goes on argv or into the
        // child's environment, and the key goes through a pipe.
        let mut command = Command::new(&self_path);
        command.arg(RESUME_FLAG).arg(&path);
        if let Err(e) = attach_key(&mut command, &key) {
            SecretBox::discard(&path);
            return Err(e);
        }
        command.args(&script);
        log::debug!(
            "Prepared child '{}' for '{}' with transport '{}'.",
            self_path.display(),
            script.as_deref().unwrap_or("-C"),
            path.display()
        );

        Ok(PreparedProcess {
            command,
            transport: Some(path),
        })
    }
}

/// Leaves `key` in a pipe the child inherits as descriptor [`KEY_FD`], and
/// tells the child where to find it.
#[cfg(unix)]
pub fn attach_key(command: &mut Command, key: &TransportKey) -> Result<(), LaunchError> {
    use command_fds::{CommandFdExt, FdMapping};
    use std::io::Write;

    let handoff = |e: &dyn std::fmt::Display| LaunchError::KeyHandoff(e.to_string());
    let (reader, mut writer) = std::io::pipe().map_err(|e| handoff(&e))?;
    // Fits in the pipe buffer, so this never blocks on the child.
    writer.write_all(key.as_bytes()).map_err(|e| handoff(&e))?;
    drop(writer);

    command
        .fd_mappings(vec![FdMapping {
            parent_fd: reader.into(),
            child_fd: KEY_FD,
        }])
        .map_err(|e| handoff(&e))?;
    command.arg(KEY_FD_FLAG).arg(KEY_FD.to_string());
    Ok(())
}

#[cfg(not(unix))]
pub fn attach_key(_command: &mut Command, _key: &TransportKey) -> Result<(), LaunchError> {
    Err(LaunchError::KeyHandoff(
        "descriptor inheritance is only supported on Unix".to_string(),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::MountSource;
    use tempfile::TempDir;

    fn parent_mounts() -> Vec<MountSpec> {
        vec![
            MountSpec::builtin_root(),
            MountSpec::new("/work", MountSource::Host("/home/dev/project".into())),
        ]
    }

    fn secret_env() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("PWD".to_string(), "/work".to_string());
        env.insert("AWS_SECRET".to_string(), "do-not-leak-me".to_string());
        env
    }

    fn argv(prepared: &PreparedProcess) -> Vec<String> {
        prepared
            .command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_build_produces_resume_invocation() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(parent_mounts())
            .with_transport_dir(dir.path())
            .with_self_path("/usr/local/bin/jsh");

        let prepared = launcher
            .build(
                None,
                vec!["/sbin/echo.js".to_string(), "hello".to_string()],
                secret_env(),
            )
            .unwrap();

        let transport = prepared.transport.clone().unwrap();
        assert_eq!(transport.extension().unwrap(), "jsb");
        assert_eq!(prepared.command.get_program(), "/usr/local/bin/jsh");
        assert_eq!(
            argv(&prepared),
            vec![
                RESUME_FLAG.to_string(),
                transport.display().to_string(),
                KEY_FD_FLAG.to_string(),
                KEY_FD.to_string(),
                "/sbin/echo.js".to_string(),
            ]
        );
        assert_eq!(prepared.command.get_envs().count(), 0);
    }

    #[test]
    fn test_secrets_stay_off_argv_and_disk() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(parent_mounts())
            .with_transport_dir(dir.path())
            .with_self_path("/usr/local/bin/jsh");

        let code = "const token = 'inline-credential'; 0".to_string();
        let prepared = launcher
            .build(Some(code), vec!["-C".to_string()], secret_env())
            .unwrap();

        assert_eq!(prepared.command.get_args().count(), 4);
        for arg in prepared.command.get_args() {
            let arg = arg.to_string_lossy();
            assert!(!arg.contains("do-not-leak-me"));
            assert!(!arg.contains("inline-credential"));
        }

        let raw = std::fs::read(prepared.transport.as_ref().unwrap()).unwrap();
        for needle in [&b"do-not-leak-me"[..], &b"inline-credential"[..]] {
            assert!(!raw.windows(needle.len()).any(|w| w == needle));
        }
        prepared.discard();
    }

    #[test]
    fn test_sealed_context_carries_parent_mounts() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(parent_mounts()).with_transport_dir(dir.path());
        let context = ExecutionContext {
            code: None,
            args: vec!["/sbin/true.js".to_string()],
            env: secret_env(),
            mounts: launcher.mounts.clone(),
            aliases: BTreeMap::new(),
        };

        let sealed = launcher.seal(&context).unwrap();
        let opened = SecretBox::open(&sealed.path, &sealed.key).unwrap();
        assert_eq!(opened.mounts, parent_mounts());
        assert_eq!(opened.env, secret_env());
    }

    #[test]
    fn test_child_reads_key_from_inherited_descriptor() {
        let dir = TempDir::new().unwrap();
        let sealed = SecretBox::create_in(
            dir.path(),
            &ExecutionContext {
                code: Some("0".to_string()),
                args: Vec::new(),
                env: BTreeMap::new(),
                mounts: Vec::new(),
                aliases: BTreeMap::new(),
            },
        )
        .unwrap();

        let mut command = Command::new("sh");
        command.arg("-c").arg(format!("cat <&{}", KEY_FD));
        attach_key(&mut command, &sealed.key).unwrap();
        let output = command.output().unwrap();

        assert!(output.status.success());
        let key = TransportKey::read_from(output.stdout.as_slice()).unwrap();
        assert_eq!(key, sealed.key);
        assert!(SecretBox::open(&sealed.path, &key).is_ok());
    }

    #[test]
    fn test_build_without_script_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(parent_mounts()).with_transport_dir(dir.path());

        let result = launcher.build(None, Vec::new(), BTreeMap::new());
        assert!(matches!(result, Err(LaunchError::NoScript)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_transport_dir_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(parent_mounts())
            .with_transport_dir(dir.path().join("missing"))
            .with_self_path("/usr/local/bin/jsh");

        let result = launcher.build(None, vec!["/sbin/true.js".to_string()], BTreeMap::new());
        assert!(matches!(result, Err(LaunchError::Transport(_))));
    }

    #[test]
    fn test_discard_removes_transport() {
        let dir = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(parent_mounts())
            .with_transport_dir(dir.path())
            .with_self_path("/usr/local/bin/jsh");

        let prepared = launcher
            .build(None, vec!["/sbin/true.js".to_string()], BTreeMap::new())
            .unwrap();
        let transport = prepared.transport.clone().unwrap();
        prepared.discard();
        assert!(!transport.exists());
    }
}
