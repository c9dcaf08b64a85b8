// src/cli/bootstrap.rs

//! Turns the command line into the [`ExecutionContext`] a process runs with.
//!
//! A fresh invocation builds the context from its flags and the defaults
//! below. A child started by the launcher (`-S <file> -K <fd>`) rebuilds it
//! from the transport file its parent sealed, with the key read from the
//! inherited descriptor. Either way, `-e` assignments are applied
//! last and the built-in root is guaranteed to be mounted.

use crate::{
    cli::{Cli, handlers::commons::split_assignment},
    constants::{
        DEFAULT_LIBRARY_PATH, DEFAULT_PATH, ROOT_MOUNT_POINT, WORK_MOUNT_POINT,
    },
    core::mount_table::MountError,
    models::{ExecutionContext, MountSource, MountSpec},
    system::secret_box::{SecretBox, TransportError, TransportKey},
    vfs::path,
};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid assignment '{0}': expected NAME=VALUE.")]
    InvalidAssignment(String),
    #[error("Invalid mount '{0}': expected MOUNTPOINT=DIR.")]
    InvalidMount(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error("A transport file was given without the descriptor holding its key.")]
    MissingKey,
    #[error("Could not determine the current directory: {0}")]
    Cwd(#[source] std::io::Error),
}

/// Builds the context for this process.
///
/// # Errors
/// Any failure here is fatal: nothing runs with a half-built context.
pub fn build_context(cli: &Cli) -> Result<ExecutionContext, ConfigError> {
    let mut context = match &cli.resume {
        Some(transport) => {
            let fd = cli.key_fd.ok_or(ConfigError::MissingKey)?;
            let key = TransportKey::read_from_fd(fd)?;
            SecretBox::open(transport, &key)?
        }
        None => fresh_context(cli)?,
    };

    apply_env_overrides(&mut context.env, &cli.env)?;
    ensure_root(&mut context.mounts);

    log::debug!("Execution context ready: {:?}", context);
    Ok(context)
}

fn fresh_context(cli: &Cli) -> Result<ExecutionContext, ConfigError> {
    let mut mounts = parse_mounts(&cli.mounts)?;
    if !mounts.iter().any(|m| m.mount_point == WORK_MOUNT_POINT) {
        let cwd = std::env::current_dir().map_err(ConfigError::Cwd)?;
        let cwd = dunce::canonicalize(&cwd).map_err(ConfigError::Cwd)?;
        mounts.push(MountSpec::new(WORK_MOUNT_POINT, MountSource::Host(cwd)));
    }

    Ok(ExecutionContext {
        code: cli.code.clone(),
        args: cli.args.clone(),
        env: default_env(),
        mounts,
        aliases: default_aliases(),
    })
}

pub fn default_env() -> BTreeMap<String, String> {
    [
        ("PATH", DEFAULT_PATH),
        ("HOME", WORK_MOUNT_POINT),
        ("PWD", WORK_MOUNT_POINT),
        ("LIBRARY_PATH", DEFAULT_LIBRARY_PATH),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("ll".to_string(), "ls -l".to_string())])
}

fn apply_env_overrides(
    env: &mut BTreeMap<String, String>,
    assignments: &[String],
) -> Result<(), ConfigError> {
    for raw in assignments {
        match split_assignment(raw) {
            Some((name, value)) if !name.is_empty() => {
                env.insert(name.to_string(), value.to_string());
            }
            _ => return Err(ConfigError::InvalidAssignment(raw.clone())),
        }
    }
    Ok(())
}

/// Parses `-v MOUNTPOINT=DIR` declarations. Sources must exist on the host
/// and are stored canonicalized, so children resolve them identically.
fn parse_mounts(raw_mounts: &[String]) -> Result<Vec<MountSpec>, ConfigError> {
    let mut specs: Vec<MountSpec> = Vec::with_capacity(raw_mounts.len());
    for raw in raw_mounts {
        let (mount_point, source) = split_assignment(raw)
            .filter(|(point, dir)| !point.is_empty() && !dir.is_empty())
            .ok_or_else(|| ConfigError::InvalidMount(raw.clone()))?;

        if !mount_point.starts_with('/') {
            return Err(MountError::InvalidMountPoint(mount_point.to_string()).into());
        }
        let mount_point = path::normalize(mount_point);
        if specs.iter().any(|s| s.mount_point == mount_point) {
            return Err(MountError::Conflict(mount_point).into());
        }

        let dir = shellexpand::tilde(source).into_owned();
        let canonical = dunce::canonicalize(&dir).map_err(|error| MountError::SourceUnavailable {
            mount_point: mount_point.clone(),
            source_path: dir.clone(),
            error,
        })?;
        log::debug!("Declared mount '{}' -> '{}'.", mount_point, canonical.display());
        specs.push(MountSpec::new(mount_point, MountSource::Host(canonical)));
    }
    Ok(specs)
}

/// Prepends the built-in root when nothing is mounted at `/`. Placed first,
/// so any later declaration of `/` would shadow it.
fn ensure_root(mounts: &mut Vec<MountSpec>) {
    if !mounts.iter().any(|m| m.mount_point == ROOT_MOUNT_POINT) {
        mounts.insert(0, MountSpec::builtin_root());
    }
}
