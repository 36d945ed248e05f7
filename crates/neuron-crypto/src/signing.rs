//! Ed25519 sign/verify (the primitive backing C3's consent tokens).
//!
//! Ed25519 is pre-hashed internally — signing and verifying operate on the
//! message bytes directly, no external digest is applied before the call.
//! Same shape as a typical signer wrapper in this workspace (`sign`,
//! `verify_signature`, a zeroizing key holder) built on a classical
//! scheme since the wire contract fixes Ed25519, not a post-quantum one
//! (see DESIGN.md).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key encoding")]
    InvalidPublicKey,
    #[error("invalid signature encoding")]
    InvalidSignatureEncoding,
}

/// Decode a base64url (no padding) 32-byte Ed25519 public key.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| SignatureError::InvalidPublicKey)
}

/// Encode a 32-byte Ed25519 public key as base64url (no padding).
pub fn encode_public_key(key: &VerifyingKey) -> String {
    URL_SAFE_NO_PAD.encode(key.as_bytes())
}

/// Decode a base64url (no padding) 64-byte Ed25519 signature.
pub fn decode_signature(encoded: &str) -> Result<Signature, SignatureError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| SignatureError::InvalidSignatureEncoding)?;
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidSignatureEncoding)?;
    Ok(Signature::from_bytes(&arr))
}

/// Encode a signature as base64url (no padding).
pub fn encode_signature(sig: &Signature) -> String {
    URL_SAFE_NO_PAD.encode(sig.to_bytes())
}

/// Verify `message` was signed by the holder of `public_key_b64`.
pub fn verify_signature(
    public_key_b64: &str,
    message: &[u8],
    signature_b64: &str,
) -> Result<(), SignatureError> {
    let key = decode_public_key(public_key_b64)?;
    let sig = decode_signature(signature_b64)?;
    key.verify(message, &sig)
        .map_err(|_| SignatureError::InvalidSignature)
}

/// A keypair wrapper used by test fixtures and the patient-agent-facing
/// tooling that signs consent tokens. The secret key is zeroized on drop.
pub struct NeuronSigner {
    signing_key: Zeroizing<[u8; 32]>,
    pub public_key_b64: String,
}

impl NeuronSigner {
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        let public_key_b64 = encode_public_key(&key.verifying_key());
        Self {
            signing_key: Zeroizing::new(key.to_bytes()),
            public_key_b64,
        }
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.signing_key)
    }

    pub fn sign(&self, message: &[u8]) -> String {
        let sig = self.signing_key().sign(message);
        encode_signature(&sig)
    }

    pub fn verify(&self, message: &[u8], signature_b64: &str) -> Result<(), SignatureError> {
        verify_signature(&self.public_key_b64, message, signature_b64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let signer = NeuronSigner::generate();
        let message = b"patient-001|1234567893";
        let sig = signer.sign(message);
        assert!(verify_signature(&signer.public_key_b64, message, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails() {
        let signer = NeuronSigner::generate();
        let sig = signer.sign(b"original");
        assert_eq!(
            verify_signature(&signer.public_key_b64, b"tampered", &sig),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn wrong_key_fails() {
        let signer = NeuronSigner::generate();
        let other = NeuronSigner::generate();
        let sig = signer.sign(b"hello");
        assert!(verify_signature(&other.public_key_b64, b"hello", &sig).is_err());
    }

    #[test]
    fn malformed_public_key_is_rejected() {
        assert_eq!(
            verify_signature("not-base64!!", b"x", "also-not-base64"),
            Err(SignatureError::InvalidPublicKey)
        );
    }
}
