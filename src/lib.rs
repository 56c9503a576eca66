//! Password-protected encrypted file container.
//!
//! A vault is a single file: a fixed plaintext header followed by an
//! Argon2id-keyed, ChaCha20-Poly1305-sealed payload. The payload holds a
//! small virtual file system that is only ever decrypted in memory. Open one
//! with [`VaultSession::open`] or start one with [`VaultSession::create`].

pub mod crypto;
mod error;
pub mod format;
pub mod session;
pub mod storage;
pub mod strength;
pub mod vfs;

pub use crate::crypto::{KdfParams, NonceSource};
pub use crate::error::{GENERIC_FAILURE, Result, VaultError};
pub use crate::format::VaultHeader;
pub use crate::session::{SessionState, VaultSession};
pub use crate::storage::Storage;
pub use crate::vfs::{EntryInfo, EntryKind, VaultStats};

use directories::ProjectDirs;

/// File name of the vault in the platform data directory.
pub const DEFAULT_VAULT_NAME: &str = "vault.coffer";

/// Storage for the per-user default vault.
pub fn default_storage() -> Result<Storage> {
    let project_dirs = ProjectDirs::from("", "", "coffer").ok_or_else(|| {
        VaultError::InvalidPath("could not determine platform directories".to_string())
    })?;

    Storage::new(project_dirs.data_dir().join(DEFAULT_VAULT_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::*;

    #[test]
    fn encrypt_decrypt_with_header_roundtrip() {
        let kdf = KdfParams::new(1024, 1, 1).unwrap();
        let salt = generate_salt().unwrap();
        let key = derive_key("pw", &salt, kdf).unwrap();

        let header = VaultHeader::new(salt, kdf);
        let payload = encrypt(&key, &header.to_bytes(), b"secret data").unwrap();
        let file = format::serialize(&header, &payload).unwrap();

        let (parsed, parsed_payload) = format::parse(&file).unwrap();
        let key2 = derive_key("pw", parsed.salt(), *parsed.kdf()).unwrap();
        let plaintext = decrypt(&key2, &parsed.to_bytes(), &parsed_payload).unwrap();

        assert_eq!(plaintext.as_slice(), b"secret data");
    }

    #[test]
    fn default_storage_uses_vault_name() {
        if let Ok(storage) = default_storage() {
            assert!(storage.path().ends_with(DEFAULT_VAULT_NAME));
        }
    }
}
