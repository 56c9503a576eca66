//! Error taxonomy for vault operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Message shown for every authentication or format problem.
///
/// Wrong passwords, tampered headers and corrupted ciphertext all end up here
/// so the caller cannot tell which input was bad.
pub const GENERIC_FAILURE: &str = "wrong password or corrupt vault";

#[derive(Error, Debug)]
pub enum VaultError {
    /// AEAD tag mismatch: wrong password, tampered header or corrupted file.
    #[error("wrong password or corrupt vault")]
    AuthenticationFailure,

    #[error("not a vault file")]
    NotAVault,

    #[error("unsupported vault version: {0}")]
    UnsupportedVersion(u16),

    /// Internal consistency violated after successful authentication.
    #[error("vault contents are corrupt: {0}")]
    FormatCorruption(String),

    #[error("vault is in use by another process: {}", .0.display())]
    VaultBusy(PathBuf),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("'{0}' already exists")]
    NameConflict(String),

    #[error("invalid name: '{0}'")]
    InvalidName(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("key derivation failed: {0}")]
    KdfFailure(String),

    #[error("encryption failed")]
    EncryptionFailure,

    #[error("session is closed")]
    SessionClosed,

    #[error("vault already exists: {}", .0.display())]
    VaultExists(PathBuf),

    #[error("vault does not exist: {}", .0.display())]
    VaultNotFound(PathBuf),

    #[error("I/O error: {0}")]
    IoFailure(#[from] std::io::Error),
}

impl VaultError {
    /// Text suitable for showing to an end user.
    ///
    /// Authentication and format errors collapse into [`GENERIC_FAILURE`];
    /// usage errors keep the offending path or name.
    pub fn user_message(&self) -> String {
        match self {
            VaultError::AuthenticationFailure
            | VaultError::NotAVault
            | VaultError::UnsupportedVersion(_)
            | VaultError::FormatCorruption(_) => GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }

    /// Only lock contention is worth retrying after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::VaultBusy(_))
    }
}
