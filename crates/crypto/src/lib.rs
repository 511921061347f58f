//! Cryptographic primitives used by the neo3 node.
//!
//! Hashing is deterministic and allocation-free where possible; signing and
//! key generation go through the operating system RNG. Curve arithmetic is
//! delegated to the `p256`/`k256` crates, with [`ECPoint`] holding the
//! protocol-level compressed encoding.

mod base58;
mod ecc;
mod error;
mod hash;
mod merkle;
mod multisig;
mod murmur;

pub use base58::{
    base58check_decode, base58check_encode, script_hash_from_address, script_hash_to_address,
    script_to_script_hash,
};
pub use ecc::{ECCurve, ECPoint, KeyPair};
pub use error::{CryptoError, CryptoResult};
pub use hash::{hash160, hash256, keccak256, ripemd160, sha256, sha512};
pub use merkle::MerkleTree;
pub use multisig::verify_multisig;
pub use murmur::{murmur128, murmur32};
