//! Merkle tree over 32-byte hashes.

use crate::hash256;

/// Computes Merkle roots the way block headers expect them: leaves are
/// 32-byte hashes, an odd layer duplicates its last element, and the root of
/// an empty list is all zeroes.
pub struct MerkleTree;

impl MerkleTree {
    /// Computes the Merkle root of `hashes`.
    pub fn compute_root(hashes: &[[u8; 32]]) -> [u8; 32] {
        match hashes.len() {
            0 => [0u8; 32],
            1 => hashes[0],
            _ => {
                let mut layer: Vec<[u8; 32]> = hashes.to_vec();
                while layer.len() > 1 {
                    if layer.len() % 2 == 1 {
                        let last = *layer.last().expect("layer is non-empty");
                        layer.push(last);
                    }
                    layer = layer
                        .chunks_exact(2)
                        .map(|pair| Self::parent(&pair[0], &pair[1]))
                        .collect();
                }
                layer[0]
            }
        }
    }

    fn parent(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut buffer = [0u8; 64];
        buffer[..32].copy_from_slice(left);
        buffer[32..].copy_from_slice(right);
        hash256(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(MerkleTree::compute_root(&[]), [0u8; 32]);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let leaf = [7u8; 32];
        assert_eq!(MerkleTree::compute_root(&[leaf]), leaf);
    }

    #[test]
    fn odd_layer_duplicates_last_leaf() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];
        let ab = MerkleTree::compute_root(&[a, b]);
        let cc = MerkleTree::compute_root(&[c, c]);
        assert_eq!(
            MerkleTree::compute_root(&[a, b, c]),
            MerkleTree::compute_root(&[ab, cc])
        );
    }

    #[test]
    fn root_depends_on_leaf_order() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(
            MerkleTree::compute_root(&[a, b]),
            MerkleTree::compute_root(&[b, a])
        );
    }
}
