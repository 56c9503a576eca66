//! Whole-payload zlib compression applied before encryption.

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{ErrorKind, Read, Write};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

const CHUNK: usize = 16 * 1024;

/// Worst-case zlib output size for `len` input bytes, so the encoder never
/// has to reallocate.
fn compress_bound(len: usize) -> usize {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

pub fn compress(data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let out = Vec::with_capacity(compress_bound(data.len()));
    let mut encoder = ZlibEncoder::new(out, Compression::default());
    encoder.write_all(data)?;
    Ok(Zeroizing::new(encoder.finish()?))
}

/// Inflate an authenticated payload.
///
/// The input already passed AEAD verification, so failure here means the
/// writer produced a bad stream and is reported as
/// [`VaultError::FormatCorruption`].
///
/// Output grows through zeroizing buffers only: a full buffer is copied into
/// a larger one and wiped, never handed back to the allocator as-is.
pub fn decompress(data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut chunk = Zeroizing::new([0u8; CHUNK]);
    let mut out = Zeroizing::new(Vec::with_capacity(data.len().saturating_mul(4).max(CHUNK)));

    loop {
        let n = match decoder.read(&mut chunk[..]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(VaultError::FormatCorruption(format!(
                    "payload decompression failed: {e}"
                )));
            }
        };

        if out.len() + n > out.capacity() {
            let wanted = (out.len() + n).max(out.capacity().saturating_mul(2));
            let mut grown = Zeroizing::new(Vec::with_capacity(wanted));
            grown.extend_from_slice(&out);
            out = grown;
        }
        out.extend_from_slice(&chunk[..n]);
    }

    Ok(out)
}
