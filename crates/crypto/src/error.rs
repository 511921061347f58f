//! Error types for the crypto crate.

use thiserror::Error;

/// Result alias used throughout the crypto crate.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// A byte sequence is not a valid point on the requested curve.
    #[error("invalid public key encoding")]
    InvalidPublicKey,

    /// A private key is zero or outside the curve order.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// A signature has the wrong length or is otherwise malformed.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// Base58 or Base58Check decoding failed.
    #[error("invalid base58 string: {0}")]
    InvalidBase58(String),

    /// A Base58Check checksum did not match.
    #[error("base58 checksum mismatch")]
    ChecksumMismatch,

    /// Generic malformed-input failure.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}
