//! Binary container format.
//!
//! Provides version-aware parsing and serialization of the vault file: a
//! fixed plaintext header followed by the encrypted payload. The header bytes
//! are the AAD of the payload, so they cannot be altered without breaking
//! decryption.

use crate::crypto::{EncryptedPayload, KdfParams, SALT_LEN};
use crate::error::{Result, VaultError};

pub mod v1;

/// Magic bytes identifying a vault file.
pub const MAGIC: &[u8; MAGIC_LEN] = b"COFFERv1";
/// Length of magic bytes.
pub const MAGIC_LEN: usize = 8;
/// Length of version field.
pub const VER_LEN: usize = 2;
/// Latest format version
pub const CURRENT_VERSION: u16 = v1::VERSION_V1;

/// Fixed, unencrypted vault header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultHeader {
    version: u16,
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
}

impl VaultHeader {
    /// Header length in bytes; also the length of the AAD.
    pub const LEN: usize = v1::HEADER_LEN;

    pub fn new(salt: [u8; SALT_LEN], kdf: KdfParams) -> Self {
        Self {
            version: CURRENT_VERSION,
            salt,
            kdf,
        }
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    /// Encoded header, used both on disk and as AAD.
    pub fn to_bytes(&self) -> [u8; v1::HEADER_LEN] {
        v1::encode_header(self)
    }
}

/// Parses a vault file into its header and encrypted payload.
///
/// Magic and version are checked before anything else.
///
/// # Errors
///
/// - [`VaultError::NotAVault`] if the file is too short or the magic is wrong
/// - [`VaultError::UnsupportedVersion`] if the version is unknown
/// - [`VaultError::AuthenticationFailure`] if the payload is too short to
///   hold a nonce and tag
pub fn parse(data: &[u8]) -> Result<(VaultHeader, EncryptedPayload)> {
    if data.len() < MAGIC_LEN + VER_LEN {
        return Err(VaultError::NotAVault);
    }

    if &data[..MAGIC_LEN] != MAGIC {
        return Err(VaultError::NotAVault);
    }

    let version = u16::from_le_bytes([data[MAGIC_LEN], data[MAGIC_LEN + 1]]);

    match version {
        v1::VERSION_V1 => v1::parse(data),
        other => Err(VaultError::UnsupportedVersion(other)),
    }
}

/// Serializes header and payload to the on-disk layout.
///
/// # Errors
///
/// Returns an error if the header version is unsupported.
pub fn serialize(header: &VaultHeader, payload: &EncryptedPayload) -> Result<Vec<u8>> {
    match header.version() {
        v1::VERSION_V1 => Ok(v1::serialize(header, payload)),
        other => Err(VaultError::UnsupportedVersion(other)),
    }
}
