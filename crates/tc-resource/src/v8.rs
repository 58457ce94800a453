//! V8: V4 chunked streaming with plaintext padding.
//!
//! The whole plaintext is padded once up front (not chunk-by-chunk) and
//! the padded buffer is then split into chunks exactly like V4. This is
//! simpler than padding only the final chunk and matches how V6/V7 treat
//! padding as a pre-processing step ahead of the underlying cipher.

use tc_crypto::keys::SymmetricKey;
use tc_proto::ResourceId;

use crate::error::ResourceError;
use crate::padding::{self, PaddingStep};
use crate::v4;

pub const VERSION: u8 = 8;

pub fn encrypted_size(
    clear_size: u64,
    encrypted_chunk_size: u32,
    step: PaddingStep,
) -> Result<u64, ResourceError> {
    v4::encrypted_size(padding::padded_size(clear_size, step), encrypted_chunk_size)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    crate::chunked::ChunkHeader::decode(encrypted, VERSION).map(|h| h.resource_id)
}

/// Upper bound on the clear size: walks the chunk framing the same way
/// [`v4::decrypted_size`] does, but the padding marker that trims the
/// last few bytes off lives inside the plaintext, so it isn't visible
/// without decrypting.
pub fn decrypted_size_upper_bound(encrypted: &[u8]) -> Result<u64, ResourceError> {
    let stride = chunk_stride(encrypted)?;
    let mut rewritten = encrypted.to_vec();
    for tag in rewritten.iter_mut().step_by(stride) {
        if *tag != VERSION {
            return Err(ResourceError::UnsupportedVersion(*tag));
        }
        *tag = v4::VERSION;
    }
    v4::decrypted_size(&rewritten)
}

pub fn encrypt(
    plaintext: &[u8],
    key: &SymmetricKey,
    encrypted_chunk_size: u32,
    step: PaddingStep,
) -> Result<Vec<u8>, ResourceError> {
    let padded = padding::pad(plaintext, step);
    let mut out = v4::encrypt(&padded, key, encrypted_chunk_size)?;
    rewrite_version_tags(&mut out);
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    let stride = chunk_stride(encrypted)?;
    let mut rewritten = encrypted.to_vec();
    for tag in rewritten.iter_mut().step_by(stride) {
        if *tag != VERSION {
            return Err(ResourceError::UnsupportedVersion(*tag));
        }
        *tag = v4::VERSION;
    }
    let padded = v4::decrypt(&rewritten, key)?;
    padding::unpad(&padded)
}

/// V4's chunk headers carry a fixed-size `chunk_size`, so every header's
/// version byte sits `chunk_size` bytes apart except the final (short)
/// chunk; stepping by the first header's declared size is enough to walk
/// every version byte without re-parsing headers here. Reads the
/// `chunk_size` field directly rather than through `ChunkHeader::decode`
/// so it works regardless of which version tag is currently stored there.
fn chunk_stride(encrypted: &[u8]) -> Result<usize, ResourceError> {
    use crate::chunked::HEADER_SIZE;
    if encrypted.len() < HEADER_SIZE {
        return Err(ResourceError::InvalidFormat("buffer too short to hold a chunk header".into()));
    }
    let chunk_size = u32::from_le_bytes(encrypted[1..5].try_into().expect("4 bytes"));
    Ok(chunk_size as usize)
}

fn rewrite_version_tags(buf: &mut [u8]) {
    let Ok(stride) = chunk_stride(buf) else { return };
    for tag in buf.iter_mut().step_by(stride) {
        *tag = VERSION;
    }
}
