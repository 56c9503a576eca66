//! File format v1.
//!
//! ```text
//! MAGIC (8) | VERSION (2) | SALT (16) | MEM_COST (4) | TIME_COST (4) | PARALLELISM (4) | NONCE (12) | CIPHERTEXT
//! ```
//!
//! All integers little-endian. The AAD is bytes `0..38`.

use super::{MAGIC, MAGIC_LEN, VER_LEN, VaultHeader};
use crate::crypto::{EncryptedPayload, KdfParams, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::error::{Result, VaultError};

pub const VERSION_V1: u16 = 1;

const MEM_LEN: usize = 4;
const TIME_LEN: usize = 4;
const PAR_LEN: usize = 4;

pub const HEADER_LEN: usize = MAGIC_LEN + VER_LEN + SALT_LEN + MEM_LEN + TIME_LEN + PAR_LEN;

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

pub(super) fn encode_header(header: &VaultHeader) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    let mut offset = 0;

    let mut put = |bytes: &[u8]| {
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        offset += bytes.len();
    };

    put(&MAGIC[..]);
    put(&header.version().to_le_bytes());
    put(&header.salt()[..]);
    put(&header.kdf().mem_cost_kib().to_le_bytes());
    put(&header.kdf().time_cost().to_le_bytes());
    put(&header.kdf().parallelism().to_le_bytes());

    buf
}

/// Parses a v1 vault file. Magic and version were checked by the caller.
pub fn parse(data: &[u8]) -> Result<(VaultHeader, EncryptedPayload)> {
    if data.len() < HEADER_LEN {
        return Err(VaultError::NotAVault);
    }

    // a body that cannot even hold nonce and tag is a damaged vault
    if data.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
        return Err(VaultError::AuthenticationFailure);
    }

    let mut offset = MAGIC_LEN + VER_LEN;

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&data[offset..offset + SALT_LEN]);
    offset += SALT_LEN;

    let mem_cost = read_u32(data, offset);
    offset += MEM_LEN;

    let time_cost = read_u32(data, offset);
    offset += TIME_LEN;

    let parallelism = read_u32(data, offset);
    offset += PAR_LEN;

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&data[offset..offset + NONCE_LEN]);
    offset += NONCE_LEN;

    let ciphertext = data[offset..].to_vec();

    let header = VaultHeader {
        version: VERSION_V1,
        salt,
        kdf: KdfParams::from_raw(mem_cost, time_cost, parallelism),
    };

    Ok((header, EncryptedPayload::new(nonce, ciphertext)))
}

pub fn serialize(header: &VaultHeader, payload: &EncryptedPayload) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + NONCE_LEN + payload.ciphertext().len());

    buf.extend_from_slice(&encode_header(header));
    buf.extend_from_slice(payload.nonce());
    buf.extend_from_slice(payload.ciphertext());

    buf
}
