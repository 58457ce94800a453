//! Identifier newtypes shared across the trustchain block taxonomy.
//!
//! Most identifiers are a 32-byte hash of some canonical representation
//! (a public key, a block hash, ...); `ResourceId` is the one exception,
//! at 16 bytes, plus the 32-byte `CompositeResourceId` introduced for
//! transparent sessions (V8+).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

macro_rules! fixed_id {
    ($name:ident, $n:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; $n]);

        impl $name {
            pub const SIZE: usize = $n;

            pub fn from_bytes(bytes: [u8; $n]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $n] {
                &self.0
            }

            pub fn is_null(&self) -> bool {
                self.0 == [0u8; $n]
            }

            pub fn null() -> Self {
                Self([0u8; $n])
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = ProtoError;

            fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; $n] = value.try_into().map_err(|_| {
                    ProtoError::invalid_field(
                        stringify!($name),
                        format!("expected {} bytes, got {}", $n, value.len()),
                    )
                })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

fixed_id!(TrustchainId, 32, "Identifies a trustchain (the root block's hash).");
fixed_id!(UserId, 32, "Hash of a user's creation block.");
fixed_id!(DeviceId, 32, "Hash of a device creation block.");
fixed_id!(GroupId, 32, "The group's signature public key, reused as its id.");
fixed_id!(ResourceId, 16, "Identifies a single encrypted resource.");
fixed_id!(CompositeResourceId, 32, "Session id ‖ sub-resource discriminant (V8+).");

/// A resource key is addressed either by its plain 16-byte id or, for
/// sessions opened under V8 and later, by a 32-byte composite id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnyResourceId {
    Simple(ResourceId),
    Composite(CompositeResourceId),
}

impl AnyResourceId {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AnyResourceId::Simple(id) => id.as_bytes(),
            AnyResourceId::Composite(id) => id.as_bytes(),
        }
    }
}

impl CompositeResourceId {
    /// Build a composite id from its two 16-byte halves.
    pub fn from_parts(session_id: ResourceId, individual_id: ResourceId) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(session_id.as_bytes());
        bytes[16..].copy_from_slice(individual_id.as_bytes());
        Self(bytes)
    }

    pub fn session_id(&self) -> ResourceId {
        ResourceId::from_bytes(self.0[..16].try_into().expect("16-byte slice"))
    }

    pub fn individual_id(&self) -> ResourceId {
        ResourceId::from_bytes(self.0[16..].try_into().expect("16-byte slice"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrips_through_byte_slice() {
        let id = UserId::from_bytes([9u8; 32]);
        let parsed = UserId::try_from(id.as_bytes().as_slice()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(UserId::try_from(&[1u8, 2, 3][..]).is_err());
    }
}
