//! Canonical m-of-n multi-signature verification.

use crate::ECPoint;

/// Verifies `m` signatures against `n` candidate public keys in canonical
/// order.
///
/// Signatures and keys are scanned left to right. The key index always
/// advances; the signature index advances only when the current signature
/// matches the current key. Verification fails as soon as the remaining keys
/// cannot cover the remaining signatures, so signatures out of key order are
/// rejected.
pub fn verify_multisig(message: &[u8], signatures: &[Vec<u8>], pubkeys: &[ECPoint]) -> bool {
    let m = signatures.len();
    let n = pubkeys.len();
    if m == 0 || m > n {
        return false;
    }

    let digest = crate::sha256(message);
    let mut sig_index = 0;
    let mut key_index = 0;
    while sig_index < m && key_index < n {
        if pubkeys[key_index].verify_hash(&digest, &signatures[sig_index]) {
            sig_index += 1;
        }
        key_index += 1;
        if m - sig_index > n - key_index {
            return false;
        }
    }
    sig_index == m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    fn keys_sorted(count: usize) -> Vec<KeyPair> {
        let mut pairs: Vec<KeyPair> = (0..count).map(|_| KeyPair::generate()).collect();
        pairs.sort_by(|a, b| a.public_key().cmp(b.public_key()));
        pairs
    }

    #[test]
    fn accepts_signatures_in_key_order() {
        let pairs = keys_sorted(4);
        let message = b"block";
        let pubkeys: Vec<_> = pairs.iter().map(|p| *p.public_key()).collect();
        // Keys [A, B, C, D], signatures from B then D.
        let signatures = vec![
            pairs[1].sign(message).unwrap().to_vec(),
            pairs[3].sign(message).unwrap().to_vec(),
        ];
        assert!(verify_multisig(message, &signatures, &pubkeys));
    }

    #[test]
    fn rejects_signatures_out_of_key_order() {
        let pairs = keys_sorted(4);
        let message = b"block";
        let pubkeys: Vec<_> = pairs.iter().map(|p| *p.public_key()).collect();
        // D before B: the matcher has already passed B when D matches.
        let signatures = vec![
            pairs[3].sign(message).unwrap().to_vec(),
            pairs[1].sign(message).unwrap().to_vec(),
        ];
        assert!(!verify_multisig(message, &signatures, &pubkeys));
    }

    #[test]
    fn rejects_signature_from_skipped_key() {
        let pairs = keys_sorted(4);
        let message = b"block";
        let pubkeys: Vec<_> = pairs.iter().map(|p| *p.public_key()).collect();
        // B then A: A was skipped while matching B and cannot match afterwards.
        let signatures = vec![
            pairs[1].sign(message).unwrap().to_vec(),
            pairs[0].sign(message).unwrap().to_vec(),
        ];
        assert!(!verify_multisig(message, &signatures, &pubkeys));
    }

    #[test]
    fn rejects_m_greater_than_n() {
        let pairs = keys_sorted(1);
        let message = b"x";
        let pubkeys: Vec<_> = pairs.iter().map(|p| *p.public_key()).collect();
        let signatures = vec![
            pairs[0].sign(message).unwrap().to_vec(),
            pairs[0].sign(message).unwrap().to_vec(),
        ];
        assert!(!verify_multisig(message, &signatures, &pubkeys));
    }
}
