//! Shared secret used to sign requests to the control plane.
//!
//! The secret lives base64-encoded in a file. It is read on first use (or
//! eagerly through [`SecretProvider::load`]) and cached for the provider's
//! lifetime; callers only ever receive copies.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::OnceCell;
use thiserror::Error;

/// Number of bytes the decoded secret must have.
pub const SECRET_LEN: usize = 32;

/// Errors loading the shared secret.
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("read secret file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode secret file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: base64::DecodeError,
    },

    #[error("secret must be 32 bytes, got {0}")]
    Length(usize),
}

/// Lazily loaded, read-only shared secret.
pub struct SecretProvider {
    path: PathBuf,
    cached: OnceCell<Box<[u8]>>,
}

impl std::fmt::Debug for SecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretProvider")
            .field("path", &self.path)
            .field("loaded", &self.cached.get().is_some())
            .finish()
    }
}

impl SecretProvider {
    /// Provider reading the secret from `path` on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceCell::new(),
        }
    }

    /// Provider holding an already decoded secret.
    pub fn from_bytes(secret: &[u8]) -> Result<Self, SecretError> {
        if secret.len() != SECRET_LEN {
            return Err(SecretError::Length(secret.len()));
        }
        Ok(Self {
            path: PathBuf::new(),
            cached: OnceCell::with_value(secret.into()),
        })
    }

    /// Where the secret is read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the secret now so that startup fails fast on a bad file.
    pub fn load(&self) -> Result<(), SecretError> {
        self.cached().map(|_| ())
    }

    /// A copy of the decoded secret. A failed load is not cached.
    pub fn bytes(&self) -> Result<Vec<u8>, SecretError> {
        self.cached().map(|secret| secret.to_vec())
    }

    fn cached(&self) -> Result<&[u8], SecretError> {
        self.cached
            .get_or_try_init(|| read_secret(&self.path))
            .map(|secret| &secret[..])
    }
}

fn read_secret(path: &Path) -> Result<Box<[u8]>, SecretError> {
    let encoded = std::fs::read_to_string(path).map_err(|source| SecretError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|source| SecretError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    if decoded.len() != SECRET_LEN {
        return Err(SecretError::Length(decoded.len()));
    }
    tracing::debug!(path = %path.display(), "Shared secret loaded");
    Ok(decoded.into_boxed_slice())
}
