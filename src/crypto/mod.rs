//! Cryptographic primitives for the vault.
//!
//! Provides password-based key derivation, authenticated encryption of the
//! container payload and the compression applied before encryption.

pub mod aead;
pub mod compress;
pub mod kdf;

pub use aead::{
    CounterNonces, EncryptedPayload, NonceSource, OsNonces, decrypt, encrypt, encrypt_with,
    generate_salt,
};
pub use compress::{compress, decompress};
pub use kdf::{KdfParams, VaultKey, derive_key};

/// Length of the KDF salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (12 bytes for ChaCha20-Poly1305).
pub const NONCE_LEN: usize = 12;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the Poly1305 authentication tag appended to the ciphertext.
pub const TAG_LEN: usize = 16;
