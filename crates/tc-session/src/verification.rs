//! Verification factors presented to `registerIdentity`/`verifyIdentity`,
//! and the key derivation that turns one into the symmetric key a ghost
//! device's private keys are sealed under.

use serde::{Deserialize, Serialize};

use tc_crypto::kdf::{hkdf_expand_32, storage_key_from_passphrase};
use tc_crypto::SymmetricKey;

use crate::error::Error;

/// Maximum consecutive failed attempts before an identity is locked out
/// of further verification until a new factor is issued out-of-band.
pub const MAX_VERIFICATION_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub enum VerificationFactor {
    Passphrase(String),
    EmailVerification { email: String, code: String },
    PhoneNumberVerification { phone_number: String, code: String },
    OidcIdToken(String),
    /// A ghost device's private keys, exported once at registration and
    /// handed back directly instead of going through the server-stored
    /// sealed blob. Base64-encoded JSON: `{deviceId, privateSignatureKey,
    /// privateEncryptionKey}`.
    VerificationKey(String),
}

/// The JSON shape a `VerificationKey` factor's base64 payload decodes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationKeyPayload {
    pub device_id: String,
    pub private_signature_key: String,
    pub private_encryption_key: String,
}

impl VerificationFactor {
    pub fn validate(&self) -> Result<(), Error> {
        let empty = match self {
            VerificationFactor::Passphrase(p) => p.is_empty(),
            VerificationFactor::EmailVerification { email, code } => email.is_empty() || code.is_empty(),
            VerificationFactor::PhoneNumberVerification { phone_number, code } => {
                phone_number.is_empty() || code.is_empty()
            }
            VerificationFactor::OidcIdToken(token) => token.is_empty(),
            VerificationFactor::VerificationKey(s) => s.is_empty(),
        };
        if empty {
            return Err(Error::invalid_argument("verification factor is missing a required field"));
        }
        Ok(())
    }

    /// `true` for the one factor that recovers a ghost device's keys
    /// directly from its own payload rather than asking the server for a
    /// sealed blob.
    pub fn is_verification_key(&self) -> bool {
        matches!(self, VerificationFactor::VerificationKey(_))
    }

    /// Derive the symmetric key a ghost device's private keys are sealed
    /// under for this factor. A passphrase goes through Argon2id, same as
    /// local storage encryption; the single-use, server-issued secrets
    /// (an email/phone code, an OIDC token) go through a domain-separated
    /// HKDF over the factor's own bytes, since they carry enough entropy
    /// on their own and don't need memory-hard stretching.
    pub(crate) fn derive_storage_key(&self, salt: &[u8; 16]) -> Result<SymmetricKey, Error> {
        match self {
            VerificationFactor::Passphrase(passphrase) => {
                let key = storage_key_from_passphrase(passphrase.as_bytes(), salt)?;
                Ok(SymmetricKey::from_bytes(key.0))
            }
            other => {
                let ikm = other.factor_bytes();
                let bytes = hkdf_expand_32(&ikm, Some(salt), b"tc-session-verification-factor")?;
                Ok(SymmetricKey::from_bytes(bytes))
            }
        }
    }

    fn factor_bytes(&self) -> Vec<u8> {
        match self {
            VerificationFactor::Passphrase(p) => p.as_bytes().to_vec(),
            VerificationFactor::EmailVerification { email, code } => format!("{email}:{code}").into_bytes(),
            VerificationFactor::PhoneNumberVerification { phone_number, code } => {
                format!("{phone_number}:{code}").into_bytes()
            }
            VerificationFactor::OidcIdToken(token) => token.as_bytes().to_vec(),
            VerificationFactor::VerificationKey(s) => s.as_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_passphrase_is_invalid() {
        let factor = VerificationFactor::Passphrase(String::new());
        assert!(factor.validate().is_err());
    }

    #[test]
    fn empty_code_is_invalid_even_with_an_email() {
        let factor = VerificationFactor::EmailVerification { email: "a@b.com".into(), code: String::new() };
        assert!(factor.validate().is_err());
    }

    #[test]
    fn same_passphrase_and_salt_derive_the_same_key() {
        let factor = VerificationFactor::Passphrase("correct horse battery staple".into());
        let salt = [1u8; 16];
        let a = factor.derive_storage_key(&salt).unwrap();
        let b = factor.derive_storage_key(&salt).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_salts_derive_different_keys() {
        let factor = VerificationFactor::OidcIdToken("some.jwt.token".into());
        let a = factor.derive_storage_key(&[1u8; 16]).unwrap();
        let b = factor.derive_storage_key(&[2u8; 16]).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
