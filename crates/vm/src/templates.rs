//! Recognizers for the two standard verification-script shapes.

use crate::OpCode;

/// Descriptor hash of `System.Crypto.CheckSig`.
pub const CHECKSIG_SYSCALL: u32 = 0x27B3E756;

/// Descriptor hash of `System.Crypto.CheckMultisig`.
pub const CHECKMULTISIG_SYSCALL: u32 = 0x3ADCD09E;

/// Parsed form of an m-of-n multi-signature verification script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigTemplate {
    /// Required signature count.
    pub m: usize,
    /// The candidate public keys, compressed, in script order.
    pub pubkeys: Vec<Vec<u8>>,
}

/// Whether `script` is the standard single-signature verification script,
/// returning the embedded compressed public key.
///
/// Shape: `PUSHDATA1 33 <pubkey> SYSCALL System.Crypto.CheckSig`.
pub fn is_signature_contract(script: &[u8]) -> Option<[u8; 33]> {
    if script.len() != 40 {
        return None;
    }
    if script[0] != OpCode::PushData1 as u8 || script[1] != 33 {
        return None;
    }
    if script[35] != OpCode::Syscall as u8 {
        return None;
    }
    let hash = u32::from_le_bytes(script[36..40].try_into().expect("4 bytes"));
    if hash != CHECKSIG_SYSCALL {
        return None;
    }
    Some(script[2..35].try_into().expect("33 bytes"))
}

/// Whether `script` is the standard m-of-n multi-signature verification
/// script, returning `m` and the embedded public keys.
///
/// Shape: `push(m) (PUSHDATA1 33 <pubkey>)×n push(n) SYSCALL CheckMultisig`.
pub fn is_multisig_contract(script: &[u8]) -> Option<MultisigTemplate> {
    let mut position = 0usize;
    let m = read_small_int(script, &mut position)?;
    let mut pubkeys = Vec::new();
    while position + 2 <= script.len()
        && script[position] == OpCode::PushData1 as u8
        && script[position + 1] == 33
    {
        if position + 35 > script.len() {
            return None;
        }
        pubkeys.push(script[position + 2..position + 35].to_vec());
        position += 35;
    }
    let n = read_small_int(script, &mut position)?;
    if pubkeys.is_empty() || pubkeys.len() != n || m == 0 || m > n || n > 1024 {
        return None;
    }
    if script.len() != position + 5 {
        return None;
    }
    if script[position] != OpCode::Syscall as u8 {
        return None;
    }
    let hash = u32::from_le_bytes(
        script[position + 1..position + 5]
            .try_into()
            .expect("4 bytes"),
    );
    if hash != CHECKMULTISIG_SYSCALL {
        return None;
    }
    Some(MultisigTemplate { m, pubkeys })
}

/// Reads a `PUSH1..=PUSH16`, `PUSHINT8` or `PUSHINT16` literal.
fn read_small_int(script: &[u8], position: &mut usize) -> Option<usize> {
    let byte = *script.get(*position)?;
    if (OpCode::Push1 as u8..=OpCode::Push16 as u8).contains(&byte) {
        *position += 1;
        return Some((byte - OpCode::Push0 as u8) as usize);
    }
    if byte == OpCode::PushInt8 as u8 {
        let value = *script.get(*position + 1)?;
        *position += 2;
        return Some(value as usize);
    }
    if byte == OpCode::PushInt16 as u8 {
        let low = *script.get(*position + 1)?;
        let high = *script.get(*position + 2)?;
        *position += 3;
        return Some(u16::from_le_bytes([low, high]) as usize);
    }
    None
}

/// Builds the standard single-signature verification script.
pub fn signature_contract_script(pubkey: &[u8; 33]) -> Vec<u8> {
    let mut script = Vec::with_capacity(40);
    script.push(OpCode::PushData1 as u8);
    script.push(33);
    script.extend_from_slice(pubkey);
    script.push(OpCode::Syscall as u8);
    script.extend_from_slice(&CHECKSIG_SYSCALL.to_le_bytes());
    script
}

/// Builds the standard m-of-n multi-signature verification script. The keys
/// must already be sorted.
pub fn multisig_contract_script(m: usize, pubkeys: &[[u8; 33]]) -> Option<Vec<u8>> {
    if m == 0 || m > pubkeys.len() || pubkeys.is_empty() || pubkeys.len() > 1024 {
        return None;
    }
    let mut script = Vec::new();
    push_small_int(&mut script, m);
    for pubkey in pubkeys {
        script.push(OpCode::PushData1 as u8);
        script.push(33);
        script.extend_from_slice(pubkey);
    }
    push_small_int(&mut script, pubkeys.len());
    script.push(OpCode::Syscall as u8);
    script.extend_from_slice(&CHECKMULTISIG_SYSCALL.to_le_bytes());
    Some(script)
}

fn push_small_int(script: &mut Vec<u8>, value: usize) {
    if (1..=16).contains(&value) {
        script.push(OpCode::Push0 as u8 + value as u8);
    } else if value <= u8::MAX as usize {
        script.push(OpCode::PushInt8 as u8);
        script.push(value as u8);
    } else {
        script.push(OpCode::PushInt16 as u8);
        script.extend_from_slice(&(value as u16).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_template_round_trips() {
        let pubkey = [0x02; 33];
        let script = signature_contract_script(&pubkey);
        assert_eq!(is_signature_contract(&script), Some(pubkey));
        assert!(is_multisig_contract(&script).is_none());
    }

    #[test]
    fn multisig_template_round_trips() {
        let keys = [[0x02; 33], [0x03; 33], [0x02; 33]];
        let script = multisig_contract_script(2, &keys).unwrap();
        let template = is_multisig_contract(&script).unwrap();
        assert_eq!(template.m, 2);
        assert_eq!(template.pubkeys.len(), 3);
        assert!(is_signature_contract(&script).is_none());
    }

    #[test]
    fn tampered_syscall_hash_is_rejected() {
        let mut script = signature_contract_script(&[0x02; 33]);
        let last = script.len() - 1;
        script[last] ^= 0xFF;
        assert!(is_signature_contract(&script).is_none());
    }

    #[test]
    fn m_greater_than_n_is_rejected() {
        // Hand-build push(3) key push(1) syscall.
        let mut script = Vec::new();
        script.push(OpCode::Push3 as u8);
        script.push(OpCode::PushData1 as u8);
        script.push(33);
        script.extend_from_slice(&[0x02; 33]);
        script.push(OpCode::Push1 as u8);
        script.push(OpCode::Syscall as u8);
        script.extend_from_slice(&CHECKMULTISIG_SYSCALL.to_le_bytes());
        assert!(is_multisig_contract(&script).is_none());
    }
}
