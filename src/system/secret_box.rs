// src/system/secret_box.rs

//! One-shot encrypted hand-off of an [`ExecutionContext`] to a child process.
//!
//! A child's argv and environment are readable by anyone on the host who can
//! list processes, so a context (which may hold credentials in env values or
//! inline code) never travels there. The parent seals it into a file that
//! only its owner can read and gives the child the path on argv. The key
//! never touches the disk: it reaches the child through an inherited pipe.
//!
//! File layout: `MAGIC | nonce (12) | ciphertext+tag`. The key is drawn
//! fresh from the OS RNG for every box and protects exactly one file. The
//! child claims the file by renaming it before reading, so a reference can
//! be opened at most once.

use crate::{
    core::paths,
    models::{ContextError, ExecutionContext},
};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAGIC: &[u8; 8] = b"JSHBOX\x00\x02";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const CLAIMED_SUFFIX: &str = "claimed";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport file '{0}' does not exist or was already consumed.")]
    Missing(PathBuf),
    #[error("Transport file '{path}' is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("Transport file I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not read the transport key: {0}")]
    Key(#[source] std::io::Error),
    #[error("Could not encode execution context: {0}")]
    Encode(#[source] ContextError),
    #[error("Could not seal execution context.")]
    Seal,
    #[error("Transport directory unavailable: {0}")]
    Dir(#[from] paths::PathError),
}

impl TransportError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// The secret that opens one transport file.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportKey([u8; KEY_LEN]);

impl fmt::Debug for TransportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransportKey(..)")
    }
}

impl TransportKey {
    /// Length of the key on the wire.
    pub const LEN: usize = KEY_LEN;

    fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Reads exactly one key from `reader`.
    pub fn read_from(mut reader: impl Read) -> Result<Self, TransportError> {
        let mut key = [0u8; KEY_LEN];
        reader.read_exact(&mut key).map_err(TransportError::Key)?;
        Ok(Self(key))
    }

    /// Reads the key a parent left on the inherited descriptor `fd`.
    #[cfg(unix)]
    pub fn read_from_fd(fd: i32) -> Result<Self, TransportError> {
        let file = fs::File::open(format!("/dev/fd/{}", fd)).map_err(TransportError::Key)?;
        Self::read_from(file)
    }

    #[cfg(not(unix))]
    pub fn read_from_fd(_fd: i32) -> Result<Self, TransportError> {
        Err(TransportError::Key(std::io::Error::from(
            ErrorKind::Unsupported,
        )))
    }
}

/// A sealed transport file and the key that opens it.
#[derive(Debug)]
pub struct SealedBox {
    pub path: PathBuf,
    pub key: TransportKey,
}

/// Entry points for sealing and opening transport files.
#[derive(Debug)]
pub struct SecretBox;

impl SecretBox {
    /// Seals `context` into a new file in the per-user transport directory.
    pub fn create(context: &ExecutionContext) -> Result<SealedBox, TransportError> {
        let dir = paths::get_transport_dir()?;
        Self::create_in(&dir, context)
    }

    /// Seals `context` into a new owner-only file inside `dir`.
    ///
    /// `dir` must be a private directory of the current user. If anything
    /// fails after the file is created, the file is removed before
    /// returning.
    pub fn create_in(dir: &Path, context: &ExecutionContext) -> Result<SealedBox, TransportError> {
        let plaintext = context.encode().map_err(TransportError::Encode)?;

        let key = TransportKey::generate();
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: MAGIC,
                },
            )
            .map_err(|_| TransportError::Seal)?;

        // `tempfile` creates the file with 0600 permissions and deletes it
        // on drop unless it is explicitly kept.
        let mut file = tempfile::Builder::new()
            .prefix("box-")
            .suffix(".jsb")
            .tempfile_in(dir)
            .map_err(|e| TransportError::io(dir, e))?;
        paths::verify_private_dir(dir, file.as_file())?;

        let path = file.path().to_path_buf();
        let parts: [&[u8]; 3] = [MAGIC, &nonce, &ciphertext];
        let written = parts
            .iter()
            .try_for_each(|part| file.write_all(part))
            .and_then(|()| file.as_file().sync_all());
        written.map_err(|e| TransportError::io(&path, e))?;

        let (_, kept) = file
            .keep()
            .map_err(|e| TransportError::io(&path, e.error))?;
        log::debug!("Sealed execution context into '{}'.", kept.display());
        Ok(SealedBox { path: kept, key })
    }

    /// Claims, decrypts and deletes a transport file.
    ///
    /// # Errors
    /// `Missing` if the file does not exist (including when it was already
    /// opened); `Corrupt` if it fails authentication under `key` or does not
    /// decode.
    pub fn open(path: &Path, key: &TransportKey) -> Result<ExecutionContext, TransportError> {
        let claimed = claimed_path(path);
        fs::rename(path, &claimed).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransportError::Missing(path.to_path_buf()),
            _ => TransportError::io(path, e),
        })?;

        let read = fs::read(&claimed);
        if let Err(e) = fs::remove_file(&claimed) {
            log::warn!(
                "Could not delete consumed transport file '{}': {}",
                claimed.display(),
                e
            );
        }
        let bytes = read.map_err(|e| TransportError::io(path, e))?;

        let context = unseal(path, &bytes, key)?;
        log::debug!("Opened execution context from '{}'.", path.display());
        Ok(context)
    }

    /// Deletes a transport file that will never be opened.
    pub fn discard(path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => log::debug!("Discarded unused transport '{}'.", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not discard transport '{}': {}", path.display(), e),
        }
    }
}

fn claimed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(CLAIMED_SUFFIX);
    PathBuf::from(name)
}

fn unseal(
    path: &Path,
    bytes: &[u8],
    key: &TransportKey,
) -> Result<ExecutionContext, TransportError> {
    let rest = bytes
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| TransportError::corrupt(path, "bad header"))?;
    let (nonce, ciphertext) = rest
        .split_first_chunk::<NONCE_LEN>()
        .ok_or_else(|| TransportError::corrupt(path, "truncated nonce"))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: MAGIC,
            },
        )
        .map_err(|_| TransportError::corrupt(path, "authentication failed"))?;

    ExecutionContext::decode(&plaintext).map_err(|e| TransportError::corrupt(path, e.to_string()))
}
