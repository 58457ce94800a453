//! Shared per-chunk header framing for V4/V8 streaming encryption.
//!
//! Each chunk is independently AEAD-authenticated; a chunk shorter than
//! `chunk_size` marks end-of-stream (the final chunk MAY be empty).

use tc_proto::ResourceId;

use crate::error::ResourceError;

pub const HEADER_SIZE: usize = 1 + 4 + 16 + 24;
pub const CHUNK_MAC_SIZE: usize = 16;
pub const DEFAULT_ENCRYPTED_CHUNK_SIZE: u32 = 1024 * 1024;

/// `chunk_size` names the *total* size of a full chunk on the wire
/// (header + ciphertext + mac); this is the plaintext room left once
/// framing overhead is subtracted.
pub fn clear_payload_size(chunk_size: u32) -> Result<usize, ResourceError> {
    (chunk_size as usize)
        .checked_sub(HEADER_SIZE + CHUNK_MAC_SIZE)
        .filter(|&n| n > 0)
        .ok_or_else(|| ResourceError::InvalidFormat("chunk size too small to hold any plaintext".into()))
}

pub struct ChunkHeader {
    pub version: u8,
    pub chunk_size: u32,
    pub resource_id: ResourceId,
    pub iv: [u8; 24],
}

impl ChunkHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = self.version;
        out[1..5].copy_from_slice(&self.chunk_size.to_le_bytes());
        out[5..21].copy_from_slice(self.resource_id.as_bytes());
        out[21..45].copy_from_slice(&self.iv);
        out
    }

    pub fn decode(bytes: &[u8], expected_version: u8) -> Result<Self, ResourceError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ResourceError::InvalidFormat("chunk header truncated".into()));
        }
        let version = bytes[0];
        if version != expected_version {
            return Err(ResourceError::UnsupportedVersion(version));
        }
        let chunk_size = u32::from_le_bytes(bytes[1..5].try_into().expect("4 bytes"));
        let resource_id = ResourceId::from_bytes(bytes[5..21].try_into().expect("16 bytes"));
        let iv: [u8; 24] = bytes[21..45].try_into().expect("24 bytes");
        Ok(Self { version, chunk_size, resource_id, iv })
    }
}
