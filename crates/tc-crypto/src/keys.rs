//! Fixed-size, strongly-typed wrappers around the byte arrays that flow
//! through the rest of the workspace (keys, hashes, MACs, signatures).
//!
//! Every wrapper's public surface is the byte slice plus `is_null`,
//! equality/ordering and serialization — never a bare `[u8; N]` escapes
//! this crate. Secret-holding wrappers zeroize on drop.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Declares a `Copy` fixed-size newtype over `[u8; $n]` with the common
/// trait surface (equality, ordering, hex `Debug`, (de)serialization,
/// slice access). Used only for *public* material — secret material gets
/// its own zeroizing wrapper defined alongside its operations.
macro_rules! fixed_bytes {
    ($name:ident, $n:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(#[serde(with = "serde_bytes_array")] pub [u8; $n]);

        impl $name {
            pub const SIZE: usize = $n;

            pub fn from_bytes(bytes: [u8; $n]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $n] {
                &self.0
            }

            /// True for the all-zero sentinel value (e.g. the "author"
            /// field of a trustchain-creation block).
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
            type Error = crate::error::CryptoError;

            fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; $n] = value.try_into().map_err(|_| {
                    crate::error::CryptoError::InvalidKey(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        $n,
                        value.len()
                    ))
                })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }
    };
}

// serde helper for fixed-size arrays (serde only provides impls up to 32
// natively pre-const-generics-in-serde; keep our own so every size works
// uniformly across the crate).
mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        bytes.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let slice: &[u8] = Deserialize::deserialize(deserializer)?;
        slice
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {N} bytes")))
    }
}

fixed_bytes!(PublicSignatureKey, 32, "Ed25519 public signature key.");
fixed_bytes!(Signature, 64, "Raw Ed25519 signature.");
fixed_bytes!(PublicEncryptionKey, 32, "X25519 public encryption key.");
fixed_bytes!(Hash, 32, "BLAKE3-based generic hash.");
fixed_bytes!(Mac, 16, "Poly1305 authentication tag.");
fixed_bytes!(AeadNonce, 24, "XChaCha20-Poly1305 nonce.");
fixed_bytes!(SubkeySeed, 32, "Seed embedded in a transparent-session header.");

/// 32-byte symmetric AEAD key. Zeroized on drop; never `Debug`-printed in full.
#[derive(Clone, Serialize, Deserialize)]
pub struct SymmetricKey(#[serde(with = "serde_bytes_array")] pub(crate) [u8; 32]);

impl SymmetricKey {
    pub const SIZE: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        crate::random::random_fill(&mut bytes);
        Self(bytes)
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0.ct_eq(&other.0).into()
    }
}
impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey(<redacted, fingerprint {}>)", &self.fingerprint())
    }
}

impl SymmetricKey {
    /// Short non-secret fingerprint for logs: BLAKE3 of the key, truncated.
    pub fn fingerprint(&self) -> String {
        hex::encode(&blake3::hash(&self.0).as_bytes()[..4])
    }
}

impl TryFrom<&[u8]> for SymmetricKey {
    type Error = crate::error::CryptoError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = value
            .try_into()
            .map_err(|_| crate::error::CryptoError::InvalidKey("symmetric key must be 32 bytes".into()))?;
        Ok(Self(arr))
    }
}
