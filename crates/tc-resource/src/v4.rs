//! V4: chunked streaming XChaCha20-Poly1305-IETF.
//!
//! The plaintext is split into fixed-size chunks, each independently
//! framed and authenticated with [`ChunkHeader`]. A chunk whose total
//! on-wire size is smaller than `chunk_size` marks end-of-stream — the
//! final chunk may carry zero plaintext bytes. This lets a decoder
//! process the stream incrementally without knowing the overall length
//! up front, and lets a corrupted/cut-off stream be told apart from one
//! that ended cleanly.

use tc_crypto::aead::{aead_decrypt, aead_encrypt};
use tc_crypto::keys::{AeadNonce, SymmetricKey};
use tc_crypto::random::random_bytes;
use tc_proto::ResourceId;

use crate::chunked::{clear_payload_size, ChunkHeader, CHUNK_MAC_SIZE, DEFAULT_ENCRYPTED_CHUNK_SIZE, HEADER_SIZE};
use crate::error::ResourceError;

pub const VERSION: u8 = 4;

pub fn encrypted_size(clear_size: u64, encrypted_chunk_size: u32) -> Result<u64, ResourceError> {
    let payload = clear_payload_size(encrypted_chunk_size)? as u64;
    let full_chunks = clear_size / payload;
    let remainder = clear_size % payload;
    // A terminating chunk (possibly empty) is always emitted, even when
    // clear_size is an exact multiple of payload, so the decoder can
    // observe a short final chunk.
    Ok(full_chunks * encrypted_chunk_size as u64 + HEADER_SIZE as u64 + remainder + CHUNK_MAC_SIZE as u64)
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, ResourceError> {
    let header = ChunkHeader::decode(encrypted, VERSION)?;
    Ok(header.resource_id)
}

/// Sum each chunk's plaintext length straight from its header framing,
/// without touching the AEAD: `this_chunk_len - HEADER_SIZE - CHUNK_MAC_SIZE`
/// per chunk, same walk [`decrypt`] does to find the terminator. A
/// truncated or otherwise malformed stream is reported as an error rather
/// than guessed at.
pub fn decrypted_size(encrypted: &[u8]) -> Result<u64, ResourceError> {
    let mut offset = 0;
    let mut clear_size: u64 = 0;
    let mut resource_id: Option<ResourceId> = None;
    let mut saw_terminator = false;

    while offset < encrypted.len() {
        if offset + HEADER_SIZE > encrypted.len() {
            return Err(ResourceError::InvalidFormat("buffer too short to hold a chunk header".into()));
        }
        let header = ChunkHeader::decode(&encrypted[offset..], VERSION)?;
        match resource_id {
            Some(id) if id != header.resource_id => {
                return Err(ResourceError::InvalidFormat("resource id changed mid-stream".into()))
            }
            Some(_) => {}
            None => resource_id = Some(header.resource_id),
        }

        let full_chunk_len = header.chunk_size as usize;
        let remaining = encrypted.len() - offset;
        let this_chunk_len = full_chunk_len.min(remaining);
        if this_chunk_len < HEADER_SIZE + CHUNK_MAC_SIZE {
            return Err(ResourceError::InvalidFormat("chunk shorter than its header and MAC".into()));
        }
        clear_size += (this_chunk_len - HEADER_SIZE - CHUNK_MAC_SIZE) as u64;

        offset += this_chunk_len;
        if this_chunk_len < full_chunk_len {
            saw_terminator = true;
            break;
        }
    }

    if !saw_terminator {
        return Err(ResourceError::InvalidFormat("stream has no terminating chunk".into()));
    }
    Ok(clear_size)
}

pub fn encrypt(
    plaintext: &[u8],
    key: &SymmetricKey,
    encrypted_chunk_size: u32,
) -> Result<Vec<u8>, ResourceError> {
    let clear_payload = clear_payload_size(encrypted_chunk_size)?;
    let resource_id = ResourceId::from_bytes(random_bytes::<16>());

    let mut out = Vec::new();
    let mut offset = 0;
    loop {
        let end = (offset + clear_payload).min(plaintext.len());
        let chunk = &plaintext[offset..end];

        let iv = random_bytes::<24>();
        let header = ChunkHeader { version: VERSION, chunk_size: encrypted_chunk_size, resource_id, iv };
        let header_bytes = header.encode();
        let nonce = AeadNonce::from_bytes(iv);
        let ct = aead_encrypt(key, &nonce, chunk, &header_bytes)?;

        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&ct);

        offset = end;
        if chunk.len() < clear_payload {
            break;
        }
    }
    Ok(out)
}

pub fn decrypt(encrypted: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, ResourceError> {
    let mut offset = 0;
    let mut out = Vec::new();
    let mut resource_id: Option<ResourceId> = None;
    let mut saw_terminator = false;

    while offset < encrypted.len() {
        if offset + HEADER_SIZE > encrypted.len() {
            return Err(ResourceError::DecryptionFailed);
        }
        let header = ChunkHeader::decode(&encrypted[offset..], VERSION)?;
        match resource_id {
            Some(id) if id != header.resource_id => {
                return Err(ResourceError::InvalidFormat("resource id changed mid-stream".into()))
            }
            Some(_) => {}
            None => resource_id = Some(header.resource_id),
        }

        let full_chunk_len = header.chunk_size as usize;
        let remaining = encrypted.len() - offset;
        let this_chunk_len = full_chunk_len.min(remaining);
        if this_chunk_len < HEADER_SIZE + CHUNK_MAC_SIZE {
            return Err(ResourceError::DecryptionFailed);
        }

        let ct_len = this_chunk_len - HEADER_SIZE;
        let ct = &encrypted[offset + HEADER_SIZE..offset + HEADER_SIZE + ct_len];
        let nonce = AeadNonce::from_bytes(header.iv);
        let header_bytes = &encrypted[offset..offset + HEADER_SIZE];
        let pt = aead_decrypt(key, &nonce, ct, header_bytes).map_err(|_| ResourceError::DecryptionFailed)?;
        out.extend_from_slice(&pt);

        offset += this_chunk_len;
        if this_chunk_len < full_chunk_len {
            saw_terminator = true;
            break;
        }
    }

    if !saw_terminator {
        return Err(ResourceError::DecryptionFailed);
    }
    Ok(out)
}
