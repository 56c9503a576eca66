use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use getrandom::fill;
use zeroize::Zeroizing;

use super::{NONCE_LEN, SALT_LEN, VaultKey};
use crate::error::{Result, VaultError};

/// Fill buffer with cryptographically secure random bytes
fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|e| {
        VaultError::IoFailure(std::io::Error::other(format!(
            "OS random generator unavailable: {e}"
        )))
    })
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Supplies the nonce for each encryption.
///
/// Implementations must never hand out the same value twice for one key.
pub trait NonceSource: Send {
    fn next_nonce(&mut self) -> Result<[u8; NONCE_LEN]>;
}

/// Random nonces from the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsNonces;

impl NonceSource for OsNonces {
    fn next_nonce(&mut self) -> Result<[u8; NONCE_LEN]> {
        let mut nonce = [0u8; NONCE_LEN];
        secure_random(&mut nonce)?;
        Ok(nonce)
    }
}

/// Deterministic little-endian counter nonces.
///
/// Only unique within one instance, so it must not be used for more than one
/// session under the same key. Meant for tests.
#[derive(Debug, Default, Clone)]
pub struct CounterNonces {
    next: u64,
}

impl CounterNonces {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }
}

impl NonceSource for CounterNonces {
    fn next_nonce(&mut self) -> Result<[u8; NONCE_LEN]> {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..8].copy_from_slice(&self.next.to_le_bytes());
        self.next = self
            .next
            .checked_add(1)
            .ok_or(VaultError::EncryptionFailure)?;
        Ok(nonce)
    }
}

/// Nonce followed by ChaCha20-Poly1305 ciphertext (tag included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    pub fn new(nonce: [u8; NONCE_LEN], ciphertext: Vec<u8>) -> Self {
        Self { nonce, ciphertext }
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Encrypt plaintext under a fresh OS-random nonce, binding `aad`.
pub fn encrypt(key: &VaultKey, aad: &[u8], plaintext: &[u8]) -> Result<EncryptedPayload> {
    encrypt_with(&mut OsNonces, key, aad, plaintext)
}

/// Encrypt plaintext with a nonce drawn from `nonces`, binding `aad`.
pub fn encrypt_with(
    nonces: &mut dyn NonceSource,
    key: &VaultKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<EncryptedPayload> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = nonces.next_nonce()?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| VaultError::EncryptionFailure)?;

    Ok(EncryptedPayload { nonce, ciphertext })
}

/// Decrypt and verify a payload against `aad`.
///
/// Any tag mismatch is reported as [`VaultError::AuthenticationFailure`];
/// no plaintext is returned in that case.
pub fn decrypt(
    key: &VaultKey,
    aad: &[u8],
    payload: &EncryptedPayload,
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&payload.nonce),
            Payload {
                msg: &payload.ciphertext,
                aad,
            },
        )
        .map_err(|_| VaultError::AuthenticationFailure)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;

    fn key(b: u8) -> VaultKey {
        VaultKey::from_bytes([b; KEY_LEN])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let k = key(1);
        let payload = encrypt(&k, b"header", b"secret data").unwrap();
        let plain = decrypt(&k, b"header", &payload).unwrap();
        assert_eq!(plain.as_slice(), b"secret data");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let payload = encrypt(&key(1), b"", b"secret").unwrap();
        assert!(matches!(
            decrypt(&key(2), b"", &payload),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn flipped_bits_anywhere_fail_authentication() {
        let k = key(3);
        let aad = b"0123456789abcdef";
        let payload = encrypt(&k, aad, b"some plaintext").unwrap();

        for i in 0..payload.ciphertext.len() {
            let mut tampered = payload.clone();
            tampered.ciphertext[i] ^= 0x01;
            assert!(matches!(
                decrypt(&k, aad, &tampered),
                Err(VaultError::AuthenticationFailure)
            ));
        }

        for i in 0..NONCE_LEN {
            let mut tampered = payload.clone();
            tampered.nonce[i] ^= 0x80;
            assert!(decrypt(&k, aad, &tampered).is_err());
        }

        for i in 0..aad.len() {
            let mut bad_aad = *aad;
            bad_aad[i] ^= 0x01;
            assert!(matches!(
                decrypt(&k, &bad_aad, &payload),
                Err(VaultError::AuthenticationFailure)
            ));
        }
    }

    #[test]
    fn os_nonces_differ_between_calls() {
        let k = key(4);
        let a = encrypt(&k, b"", b"same").unwrap();
        let b = encrypt(&k, b"", b"same").unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn counter_nonces_are_sequential() {
        let mut nonces = CounterNonces::starting_at(7);
        let a = nonces.next_nonce().unwrap();
        let b = nonces.next_nonce().unwrap();
        assert_eq!(a[0], 7);
        assert_eq!(b[0], 8);
        assert_ne!(a, b);
    }

    #[test]
    fn counter_nonces_refuse_to_wrap() {
        let mut nonces = CounterNonces::starting_at(u64::MAX);
        assert!(nonces.next_nonce().is_err());
    }

    #[test]
    fn generated_salts_differ() {
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
    }
}
