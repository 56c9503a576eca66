use argon2::{Algorithm, Argon2, Params, Version};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::KEY_LEN;
use crate::error::{Result, VaultError};

/// Upper bound on Argon2 memory (4 GiB), so a crafted header cannot make
/// `open` allocate without limit.
pub const MAX_MEM_COST_KIB: u32 = 4 * 1024 * 1024;
pub const MAX_TIME_COST: u32 = 64;
pub const MAX_PARALLELISM: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            // 512 MiB
            mem_cost_kib: 512 * 1024,
            time_cost: 4,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    /// Builds params without bounds checks. Used when decoding a header;
    /// [`derive_key`] validates before doing any work.
    pub(crate) fn from_raw(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        }
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(VaultError::KdfFailure(msg.to_string()));

        if self.time_cost < 1 {
            return fail("argon2 time cost must be >= 1");
        }
        if self.parallelism < 1 {
            return fail("argon2 parallelism must be >= 1");
        }
        if self.mem_cost_kib < 8 * self.parallelism {
            return fail("argon2 memory cost must be at least 8 * parallelism");
        }
        if self.mem_cost_kib > MAX_MEM_COST_KIB {
            return fail("argon2 memory cost too high");
        }
        if self.time_cost > MAX_TIME_COST {
            return fail("argon2 time cost too high");
        }
        if self.parallelism > MAX_PARALLELISM {
            return fail("argon2 parallelism too high");
        }
        Ok(())
    }
}

/// Symmetric key derived from the vault password. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    bytes: [u8; KEY_LEN],
}

impl VaultKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Derives the vault key with Argon2id.
///
/// Deterministic for identical inputs. Fails with
/// [`VaultError::KdfFailure`] when `kdf` is out of bounds.
pub fn derive_key(password: &str, salt: &[u8], kdf: KdfParams) -> Result<VaultKey> {
    kdf.validate()?;

    let params = Params::new(
        kdf.mem_cost_kib,
        kdf.time_cost,
        kdf.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::KdfFailure(format!("failed to construct Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = VaultKey::from_bytes([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key.bytes)
        .map_err(|e| VaultError::KdfFailure(format!("argon2 key derivation failed: {e}")))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::new(1024, 1, 1).unwrap()
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; 16];

        let k1 = derive_key("password", &salt, fast()).unwrap();
        let k2 = derive_key("password", &salt, fast()).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn kdf_params_affect_output() {
        let salt = [7u8; 16];

        let kdf1 = KdfParams::new(1024, 1, 1).unwrap();
        let kdf2 = KdfParams::new(2048, 1, 1).unwrap();

        let k1 = derive_key("pw", &salt, kdf1).unwrap();
        let k2 = derive_key("pw", &salt, kdf2).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn salt_affects_output() {
        let k1 = derive_key("pw", &[1u8; 16], fast()).unwrap();
        let k2 = derive_key("pw", &[2u8; 16], fast()).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn kdf_invalid_params_fail_gracefully() {
        assert!(matches!(
            KdfParams::new(0, 0, 0),
            Err(VaultError::KdfFailure(_))
        ));
        assert!(KdfParams::new(1024, 1, 0).is_err());
        assert!(KdfParams::new(1024, 0, 1).is_err());
        assert!(KdfParams::new(MAX_MEM_COST_KIB + 1, 1, 1).is_err());
    }

    #[test]
    fn derive_rejects_unvalidated_params() {
        let raw = KdfParams::from_raw(0, 1, 1);
        assert!(matches!(
            derive_key("pw", &[0u8; 16], raw),
            Err(VaultError::KdfFailure(_))
        ));
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = VaultKey::from_bytes([0xAB; KEY_LEN]);
        let shown = format!("{key:?}");
        assert!(!shown.contains("171"));
        assert!(shown.contains("REDACTED"));
    }
}
