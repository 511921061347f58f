//! The interface shared by everything a witness can sign.

use crate::{UInt160, UInt256, Witness};

/// An object carrying witnesses over its unsigned encoding.
///
/// `sign_data` is what signatures actually commit to: the network magic
/// followed by the object hash, so a signature can never be replayed on
/// another network.
pub trait Verifiable {
    /// Hash of the unsigned encoding.
    fn hash(&self) -> UInt256;

    /// The witnesses attached to the object, one per verifying script hash.
    fn witnesses(&self) -> &[Witness];

    /// The script hashes whose witnesses must verify, in witness order.
    fn script_hashes_for_verifying(&self) -> Vec<UInt160>;

    /// The bytes signatures are computed over.
    fn sign_data(&self, network: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 32);
        data.extend_from_slice(&network.to_le_bytes());
        data.extend_from_slice(self.hash().get_span());
        data
    }
}
