//! Elliptic-curve points, key pairs and ECDSA over secp256r1/secp256k1.

use crate::{CryptoError, CryptoResult};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rand::rngs::OsRng;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The size of a compressed point encoding in bytes.
pub const COMPRESSED_POINT_SIZE: usize = 33;

/// Curves the protocol signs with. secp256r1 is the default for all
/// consensus-critical signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ECCurve {
    #[default]
    Secp256r1,
    Secp256k1,
}

/// A validated public key in compressed form (sign byte plus X coordinate).
#[derive(Clone, Copy, Eq)]
pub struct ECPoint {
    curve: ECCurve,
    encoded: [u8; COMPRESSED_POINT_SIZE],
}

impl ECPoint {
    /// Decodes and validates a compressed point on `curve`.
    pub fn decode(data: &[u8], curve: ECCurve) -> CryptoResult<Self> {
        if data.len() != COMPRESSED_POINT_SIZE || (data[0] != 0x02 && data[0] != 0x03) {
            return Err(CryptoError::InvalidPublicKey);
        }
        let on_curve = match curve {
            ECCurve::Secp256r1 => p256::PublicKey::from_sec1_bytes(data).is_ok(),
            ECCurve::Secp256k1 => k256::PublicKey::from_sec1_bytes(data).is_ok(),
        };
        if !on_curve {
            return Err(CryptoError::InvalidPublicKey);
        }
        let mut encoded = [0u8; COMPRESSED_POINT_SIZE];
        encoded.copy_from_slice(data);
        Ok(Self { curve, encoded })
    }

    /// Decodes a secp256r1 point, the protocol default.
    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        Self::decode(data, ECCurve::Secp256r1)
    }

    /// Parses a point from its hex representation.
    pub fn from_hex(hex_str: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|_| CryptoError::InvalidFormat("invalid hex public key".into()))?;
        Self::from_bytes(&bytes)
    }

    /// The compressed 33-byte encoding.
    pub fn encode_compressed(&self) -> [u8; COMPRESSED_POINT_SIZE] {
        self.encoded
    }

    /// The compressed encoding as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// Which curve the point lies on.
    pub fn curve(&self) -> ECCurve {
        self.curve
    }

    /// Verifies an ECDSA signature (64-byte `r ∥ s`) over `message`.
    ///
    /// The message is hashed with SHA-256 before verification.
    pub fn verify_signature(&self, message: &[u8], signature: &[u8]) -> bool {
        self.verify_hash(&crate::sha256(message), signature)
    }

    /// Verifies an ECDSA signature over an already-hashed 32-byte digest.
    pub fn verify_hash(&self, digest: &[u8; 32], signature: &[u8]) -> bool {
        if signature.len() != 64 {
            return false;
        }
        match self.curve {
            ECCurve::Secp256r1 => {
                let Ok(key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(&self.encoded) else {
                    return false;
                };
                let Ok(sig) = p256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify_prehash(digest, &sig).is_ok()
            }
            ECCurve::Secp256k1 => {
                let Ok(key) = k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.encoded) else {
                    return false;
                };
                let Ok(sig) = k256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                key.verify_prehash(digest, &sig).is_ok()
            }
        }
    }
}

impl PartialEq for ECPoint {
    fn eq(&self, other: &Self) -> bool {
        self.curve == other.curve && self.encoded == other.encoded
    }
}

impl Hash for ECPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl PartialOrd for ECPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ECPoint {
    /// Points sort by X coordinate, then by the Y parity byte.
    fn cmp(&self, other: &Self) -> Ordering {
        self.encoded[1..]
            .cmp(&other.encoded[1..])
            .then_with(|| self.encoded[0].cmp(&other.encoded[0]))
    }
}

impl fmt::Debug for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ECPoint({})", hex::encode(self.encoded))
    }
}

impl fmt::Display for ECPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.encoded))
    }
}

/// A private/public key pair.
pub struct KeyPair {
    curve: ECCurve,
    private_key: [u8; 32],
    public_key: ECPoint,
}

impl KeyPair {
    /// Generates a fresh secp256r1 key pair from the OS RNG.
    pub fn generate() -> Self {
        let signing = p256::ecdsa::SigningKey::random(&mut OsRng);
        let mut private_key = [0u8; 32];
        private_key.copy_from_slice(&signing.to_bytes());
        let encoded = signing.verifying_key().to_encoded_point(true);
        let public_key = ECPoint::from_bytes(encoded.as_bytes())
            .expect("freshly generated key is a valid point");
        Self {
            curve: ECCurve::Secp256r1,
            private_key,
            public_key,
        }
    }

    /// Builds a secp256r1 key pair from raw private-key bytes.
    pub fn from_private_key(private_key: &[u8]) -> CryptoResult<Self> {
        if private_key.len() != 32 {
            return Err(CryptoError::InvalidPrivateKey);
        }
        let signing = p256::ecdsa::SigningKey::from_slice(private_key)
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        let encoded = signing.verifying_key().to_encoded_point(true);
        let public_key = ECPoint::from_bytes(encoded.as_bytes())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        let mut key = [0u8; 32];
        key.copy_from_slice(private_key);
        Ok(Self {
            curve: ECCurve::Secp256r1,
            private_key: key,
            public_key,
        })
    }

    /// The public half of the pair.
    pub fn public_key(&self) -> &ECPoint {
        &self.public_key
    }

    /// The raw private-key bytes.
    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }

    /// Signs `message` (SHA-256 hashed internally), returning `r ∥ s`.
    pub fn sign(&self, message: &[u8]) -> CryptoResult<[u8; 64]> {
        let digest = crate::sha256(message);
        match self.curve {
            ECCurve::Secp256r1 => {
                let signing = p256::ecdsa::SigningKey::from_slice(&self.private_key)
                    .map_err(|_| CryptoError::InvalidPrivateKey)?;
                let signature: p256::ecdsa::Signature = signing
                    .sign_prehash(&digest)
                    .map_err(|_| CryptoError::InvalidSignature)?;
                let mut out = [0u8; 64];
                out.copy_from_slice(&signature.to_bytes());
                Ok(out)
            }
            ECCurve::Secp256k1 => {
                let signing = k256::ecdsa::SigningKey::from_slice(&self.private_key)
                    .map_err(|_| CryptoError::InvalidPrivateKey)?;
                let signature: k256::ecdsa::Signature = signing
                    .sign_prehash(&digest)
                    .map_err(|_| CryptoError::InvalidSignature)?;
                let mut out = [0u8; 64];
                out.copy_from_slice(&signature.to_bytes());
                Ok(out)
            }
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.private_key.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let pair = KeyPair::generate();
        let signature = pair.sign(b"message").unwrap();
        assert!(pair.public_key().verify_signature(b"message", &signature));
        assert!(!pair.public_key().verify_signature(b"other", &signature));
    }

    #[test]
    fn tampered_signature_fails() {
        let pair = KeyPair::generate();
        let mut signature = pair.sign(b"message").unwrap();
        signature[10] ^= 0xFF;
        assert!(!pair.public_key().verify_signature(b"message", &signature));
    }

    #[test]
    fn decode_rejects_wrong_prefix_and_length() {
        assert!(ECPoint::from_bytes(&[0x04; 33]).is_err());
        assert!(ECPoint::from_bytes(&[0x02; 20]).is_err());
    }

    #[test]
    fn compressed_encoding_round_trips() {
        let pair = KeyPair::generate();
        let encoded = pair.public_key().encode_compressed();
        let decoded = ECPoint::from_bytes(&encoded).unwrap();
        assert_eq!(&decoded, pair.public_key());
    }

    #[test]
    fn ordering_is_by_x_coordinate() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let (pa, pb) = (a.public_key(), b.public_key());
        if pa.as_bytes()[1..] < pb.as_bytes()[1..] {
            assert!(pa < pb);
        } else if pa.as_bytes()[1..] > pb.as_bytes()[1..] {
            assert!(pa > pb);
        }
    }
}
