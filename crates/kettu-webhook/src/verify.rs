use ed25519_dalek::{Signature, Verifier, VerifyingKey, SIGNATURE_LENGTH};
use kettu_core::{errors::Error, interaction::SignatureVerifier, Result};

/// Checks `x-signature-ed25519` against the application public key.
///
/// The signed message is the timestamp header followed by the raw body.
#[derive(Clone, Debug)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parse a hex-encoded 32-byte public key.
    pub fn from_hex(public_key: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(public_key.trim(), &mut bytes)
            .map_err(|e| Error::Config(format!("public key is not 32 hex-encoded bytes: {e}")))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::Config(format!("public key is not an ed25519 point: {e}")))?;
        Ok(Self::new(key))
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, timestamp: &str, body: &[u8], signature: &str) -> bool {
        let mut sig = [0u8; SIGNATURE_LENGTH];
        if hex::decode_to_slice(signature, &mut sig).is_err() {
            return false;
        }

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        self.key.verify(&message, &Signature::from_bytes(&sig)).is_ok()
    }
}
