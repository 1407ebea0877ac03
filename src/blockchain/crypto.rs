use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

/// Modulus size of every identity key pair
pub const KEY_BITS: usize = 2048;

/// Number of hex characters of the public key digest kept as the address
pub const ADDRESS_LEN: usize = 40;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to generate keypair: {0}")]
    KeypairGenerationError(String),

    #[error("Failed to encode public key: {0}")]
    EncodingError(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
}

/// A ledger participant: the hash prefix of a PEM encoded public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Derives the address of a PEM encoded public key
    pub fn from_public_key_pem(pem: &str) -> Self {
        let digest = hex::encode(Sha256::digest(pem.as_bytes()));
        Address(digest[..ADDRESS_LEN].to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address(value.to_string())
    }
}

/// Hex encoded RSASSA-PSS signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes =
            hex::decode(&self.0).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;

        Signature::try_from(bytes.as_slice())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

/// Key pair held by a node or actor.
///
/// Only the PEM public key and the derived address ever leave the process;
/// the type deliberately has no serde implementation.
pub struct Identity {
    owner: String,
    signing_key: BlindedSigningKey<Sha256>,
    public_key_pem: String,
    address: Address,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("owner", &self.owner)
            .field("address", &self.address)
            .finish()
    }
}

impl Identity {
    /// Generates a fresh RSA key pair for `owner`
    ///
    /// # Arguments
    ///
    /// * `owner` - A human readable label, never part of any signed data
    ///
    /// # Returns
    ///
    /// The new identity, or an error if the key could not be created or encoded
    pub fn generate(owner: &str) -> Result<Self, CryptoError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| CryptoError::KeypairGenerationError(e.to_string()))?;
        let public_key_pem = RsaPublicKey::from(&private_key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::EncodingError(e.to_string()))?;
        let address = Address::from_public_key_pem(&public_key_pem);

        Ok(Identity {
            owner: owner.to_string(),
            signing_key: BlindedSigningKey::<Sha256>::new(private_key),
            public_key_pem,
            address,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The PEM public key, the only key material shared with peers
    pub fn export_public_key(&self) -> &str {
        &self.public_key_pem
    }

    /// Signs `message` with a salted PSS padding over its SHA-256 digest.
    ///
    /// Two signatures over the same message differ; both verify.
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        let signature: Signature = self.signing_key.sign_with_rng(&mut OsRng, message);
        DigitalSignature(hex::encode(signature.to_bytes()))
    }
}

/// Verifies a signature against a message and a PEM encoded public key
///
/// Malformed key or signature encodings are errors; a well formed signature
/// that does not match yields `Ok(false)`.
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key_pem: &str,
) -> Result<bool, CryptoError> {
    let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let signature = signature.to_signature()?;

    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    Ok(verifying_key.verify(message, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_creation() {
        let identity = Identity::generate("alice").unwrap();

        assert_eq!(identity.owner(), "alice");
        assert_eq!(identity.address().0.len(), ADDRESS_LEN);
        assert!(identity.address().0.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(identity
            .export_public_key()
            .starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn test_address_is_derived_from_public_key() {
        let identity = Identity::generate("alice").unwrap();
        let derived = Address::from_public_key_pem(identity.export_public_key());

        assert_eq!(&derived, identity.address());
    }

    #[test]
    fn test_signing_and_verification() {
        let identity = Identity::generate("alice").unwrap();
        let message = b"Hello, world!";

        let signature = identity.sign(message);
        let result = verify_signature(message, &signature, identity.export_public_key()).unwrap();
        assert!(result);

        let result =
            verify_signature(b"Wrong message", &signature, identity.export_public_key()).unwrap();
        assert!(!result);
    }

    #[test]
    fn test_signatures_are_salted() {
        let identity = Identity::generate("alice").unwrap();
        let message = b"same bytes";

        let first = identity.sign(message);
        let second = identity.sign(message);

        assert_ne!(first, second);
        assert!(verify_signature(message, &second, identity.export_public_key()).unwrap());
    }

    #[test]
    fn test_verification_with_foreign_key_fails() {
        let alice = Identity::generate("alice").unwrap();
        let bob = Identity::generate("bob").unwrap();

        let signature = alice.sign(b"payload");
        assert!(!verify_signature(b"payload", &signature, bob.export_public_key()).unwrap());
    }

    #[test]
    fn test_malformed_inputs_are_errors() {
        let identity = Identity::generate("alice").unwrap();
        let signature = identity.sign(b"payload");

        let bad_key = verify_signature(b"payload", &signature, "SYSTEM");
        assert!(matches!(bad_key, Err(CryptoError::InvalidPublicKey(_))));

        let bad_signature = verify_signature(
            b"payload",
            &DigitalSignature("not-hex".to_string()),
            identity.export_public_key(),
        );
        assert!(matches!(bad_signature, Err(CryptoError::InvalidSignature(_))));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let identity = Identity::generate("alice").unwrap();
        let rendered = format!("{:?}", identity);

        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("signing_key"));
    }
}
