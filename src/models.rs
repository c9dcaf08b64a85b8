// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// --- MOUNT DECLARATIONS ---

/// Where the backend of a mount comes from.
///
/// Only the description travels between processes; every process builds its
/// own backend instances from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// The root image compiled into the binary.
    Builtin,
    /// A directory on the host.
    Host(PathBuf),
}

impl fmt::Display for MountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("<builtin>"),
            Self::Host(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A declared mount: a virtual mount point and the source behind it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub mount_point: String,
    pub source: MountSource,
}

impl MountSpec {
    pub fn new(mount_point: impl Into<String>, source: MountSource) -> Self {
        Self {
            mount_point: mount_point.into(),
            source,
        }
    }

    /// The built-in root image mounted at `/`.
    pub fn builtin_root() -> Self {
        Self::new(crate::constants::ROOT_MOUNT_POINT, MountSource::Builtin)
    }
}

// --- EXECUTION CONTEXT ---

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Failed to encode execution context: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("Failed to decode execution context: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("Execution context has {0} unexpected trailing bytes.")]
    TrailingBytes(usize),
    #[error("Execution context declares a relative mount point '{0}'.")]
    RelativeMountPoint(String),
}

/// Everything one process needs to run: source, argv, environment, mounts
/// and aliases.
///
/// Built once per process (from flags or a decrypted transport) and not
/// changed once execution starts.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Inline source to run instead of a script file.
    pub code: Option<String>,
    /// For script runs, `args[0]` is the script and the rest is its argv.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Ordered; a later entry for the same mount point shadows an earlier one.
    pub mounts: Vec<MountSpec>,
    pub aliases: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Serializes the context into its binary transport form.
    pub fn encode(&self) -> Result<Vec<u8>, ContextError> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    /// Rebuilds a context from [`encode`](Self::encode) output and validates it.
    pub fn decode(bytes: &[u8]) -> Result<Self, ContextError> {
        let (context, read): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if read != bytes.len() {
            return Err(ContextError::TrailingBytes(bytes.len() - read));
        }
        context.validate()?;
        Ok(context)
    }

    pub fn validate(&self) -> Result<(), ContextError> {
        match self.mounts.iter().find(|m| !m.mount_point.starts_with('/')) {
            Some(relative) => Err(ContextError::RelativeMountPoint(
                relative.mount_point.clone(),
            )),
            None => Ok(()),
        }
    }

    pub fn has_mount_point(&self, mount_point: &str) -> bool {
        self.mounts.iter().any(|m| m.mount_point == mount_point)
    }
}

// Env values and inline code may carry credentials; keep them out of logs.
impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&String> = self.env.keys().collect();
        f.debug_struct("ExecutionContext")
            .field("code", &self.code.as_ref().map(|_| "__REDACTED__"))
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("mounts", &self.mounts)
            .field("aliases", &self.aliases)
            .finish()
    }
}

// --- SCRIPT RESULTS ---

/// The value a script or internal command evaluated to.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// An integral result; becomes the exit code.
    Int(i64),
    /// Any other result, rendered for display.
    Text(String),
    /// No value at all.
    Undefined,
}

impl ScriptValue {
    /// Shorthand for a successful internal command.
    pub fn success() -> Self {
        Self::Int(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> ExecutionContext {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/sbin:/work".to_string());
        env.insert("API_TOKEN".to_string(), "s3cr3t-value".to_string());
        let mut aliases = BTreeMap::new();
        aliases.insert("ll".to_string(), "ls -l".to_string());

        ExecutionContext {
            code: Some("console.println('hi'); 0".to_string()),
            args: vec!["/work/job.js".to_string(), "--fast".to_string(), "".to_string()],
            env,
            mounts: vec![
                MountSpec::builtin_root(),
                MountSpec::new("/work", MountSource::Host(PathBuf::from("/tmp/project"))),
            ],
            aliases,
        }
    }

    #[test]
    fn test_encode_decode_preserves_every_field() {
        let context = sample_context();
        let bytes = context.encode().unwrap();
        let decoded = ExecutionContext::decode(&bytes).unwrap();
        assert_eq!(decoded, context);
        assert_eq!(decoded.mounts[1].source, MountSource::Host(PathBuf::from("/tmp/project")));
    }

    #[test]
    fn test_decode_default_context() {
        let context = ExecutionContext::default();
        let decoded = ExecutionContext::decode(&context.encode().unwrap()).unwrap();
        assert_eq!(decoded, context);
        assert!(decoded.code.is_none());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = sample_context().encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            ExecutionContext::decode(&bytes),
            Err(ContextError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        let bytes = sample_context().encode().unwrap();
        assert!(ExecutionContext::decode(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_decode_rejects_relative_mount_point() {
        let mut context = sample_context();
        context.mounts.push(MountSpec::new("work", MountSource::Builtin));
        let bytes = context.encode().unwrap();
        assert!(matches!(
            ExecutionContext::decode(&bytes),
            Err(ContextError::RelativeMountPoint(_))
        ));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let rendered = format!("{:?}", sample_context());
        assert!(!rendered.contains("s3cr3t-value"));
        assert!(!rendered.contains("console.println"));
        assert!(rendered.contains("API_TOKEN"));
        assert!(rendered.contains("__REDACTED__"));
    }
}
