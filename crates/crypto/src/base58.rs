//! Base58Check encoding and the address format built on it.

use crate::{hash160, hash256, CryptoError, CryptoResult};

/// Encodes `data` with a 4-byte double-SHA-256 checksum appended.
pub fn base58check_encode(data: &[u8]) -> String {
    let checksum = hash256(data);
    let mut payload = Vec::with_capacity(data.len() + 4);
    payload.extend_from_slice(data);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

/// Decodes a Base58Check string, verifying and stripping the checksum.
pub fn base58check_decode(input: &str) -> CryptoResult<Vec<u8>> {
    let decoded = bs58::decode(input)
        .into_vec()
        .map_err(|e| CryptoError::InvalidBase58(e.to_string()))?;
    if decoded.len() < 4 {
        return Err(CryptoError::InvalidBase58("input too short".into()));
    }
    let (data, checksum) = decoded.split_at(decoded.len() - 4);
    if hash256(data)[..4] != *checksum {
        return Err(CryptoError::ChecksumMismatch);
    }
    Ok(data.to_vec())
}

/// Derives the address string for a 20-byte script hash.
pub fn script_hash_to_address(script_hash: &[u8; 20], address_version: u8) -> String {
    let mut data = Vec::with_capacity(21);
    data.push(address_version);
    data.extend_from_slice(script_hash);
    base58check_encode(&data)
}

/// Recovers the 20-byte script hash from an address string.
pub fn script_hash_from_address(address: &str, address_version: u8) -> CryptoResult<[u8; 20]> {
    let data = base58check_decode(address)?;
    if data.len() != 21 {
        return Err(CryptoError::InvalidFormat(format!(
            "address payload of {} bytes",
            data.len()
        )));
    }
    if data[0] != address_version {
        return Err(CryptoError::InvalidFormat(format!(
            "address version {:#04x}, expected {address_version:#04x}",
            data[0]
        )));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&data[1..]);
    Ok(hash)
}

/// Script hash of a verification script: RIPEMD-160 over SHA-256.
pub fn script_to_script_hash(script: &[u8]) -> [u8; 20] {
    hash160(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_round_trip() {
        let data = b"\x17\x01\x02\x03\x04";
        let encoded = base58check_encode(data);
        assert_eq!(base58check_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut encoded = base58check_encode(b"payload").into_bytes();
        let last = encoded.len() - 1;
        encoded[last] = if encoded[last] == b'1' { b'2' } else { b'1' };
        let corrupted = String::from_utf8(encoded).unwrap();
        assert!(matches!(
            base58check_decode(&corrupted),
            Err(CryptoError::ChecksumMismatch) | Err(CryptoError::InvalidBase58(_))
        ));
    }

    #[test]
    fn address_round_trip() {
        let hash = [0xAB; 20];
        let address = script_hash_to_address(&hash, 0x35);
        assert!(address.starts_with('N'));
        assert_eq!(script_hash_from_address(&address, 0x35).unwrap(), hash);
    }

    #[test]
    fn address_with_wrong_version_is_rejected() {
        let address = script_hash_to_address(&[0u8; 20], 0x35);
        assert!(script_hash_from_address(&address, 0x17).is_err());
    }
}
