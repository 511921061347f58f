// Copyright (C) 2015-2025 The Neo Project.
//
// transaction/mod.rs file belongs to the neo project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! Transactions and their canonical encoding.

mod attribute;

pub use attribute::{OracleResponseCode, TransactionAttribute, MAX_ORACLE_RESULT_SIZE};

use crate::{CoreError, CoreResult, Signer, UInt160, UInt256, Verifiable, Witness};
use neo3_config::{MAX_SCRIPT_SIZE, MAX_TRANSACTION_ATTRIBUTES};
use neo3_io::{
    helper, var_bytes_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable,
};
use std::sync::OnceLock;

/// Fixed-size prefix of the unsigned encoding: version, nonce, fees and
/// expiry.
pub const TRANSACTION_HEADER_SIZE: usize = 1 + 4 + 8 + 8 + 4;

/// A signed request to execute a script against the ledger.
///
/// All fields are frozen after construction; the hash is computed over the
/// unsigned encoding on first use and cached.
#[derive(Debug, Clone)]
pub struct Transaction {
    version: u8,
    nonce: u32,
    system_fee: i64,
    network_fee: i64,
    valid_until_block: u32,
    signers: Vec<Signer>,
    attributes: Vec<TransactionAttribute>,
    script: Vec<u8>,
    witnesses: Vec<Witness>,
    hash_cache: OnceLock<UInt256>,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.nonce == other.nonce
            && self.system_fee == other.system_fee
            && self.network_fee == other.network_fee
            && self.valid_until_block == other.valid_until_block
            && self.signers == other.signers
            && self.attributes == other.attributes
            && self.script == other.script
            && self.witnesses == other.witnesses
    }
}

impl Eq for Transaction {}

impl Transaction {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    /// Fee paid for execution, in datoshi.
    pub fn system_fee(&self) -> i64 {
        self.system_fee
    }

    /// Fee paid for inclusion and verification, in datoshi.
    pub fn network_fee(&self) -> i64 {
        self.network_fee
    }

    /// The transaction is valid strictly before this block height.
    pub fn valid_until_block(&self) -> u32 {
        self.valid_until_block
    }

    pub fn signers(&self) -> &[Signer] {
        &self.signers
    }

    pub fn attributes(&self) -> &[TransactionAttribute] {
        &self.attributes
    }

    pub fn script(&self) -> &[u8] {
        &self.script
    }

    pub fn witnesses(&self) -> &[Witness] {
        &self.witnesses
    }

    /// Replaces the witnesses, e.g. after signing.
    pub fn set_witnesses(&mut self, witnesses: Vec<Witness>) {
        self.witnesses = witnesses;
    }

    /// The fee payer: the first signer.
    pub fn sender(&self) -> UInt160 {
        self.signers[0].account
    }

    /// Attributes of a given variant, by example of the type byte.
    pub fn attributes_of_type(&self, type_byte: u8) -> impl Iterator<Item = &TransactionAttribute> {
        self.attributes
            .iter()
            .filter(move |attribute| attribute.type_byte() == type_byte)
    }

    /// SHA-256 of the unsigned encoding, cached after the first call.
    pub fn hash(&self) -> UInt256 {
        *self
            .hash_cache
            .get_or_init(|| UInt256::digest(&self.unsigned_bytes()))
    }

    /// Serialized size including witnesses.
    pub fn size(&self) -> usize {
        TRANSACTION_HEADER_SIZE
            + helper::list_size(&self.signers)
            + helper::list_size(&self.attributes)
            + var_bytes_size(&self.script)
            + helper::list_size(&self.witnesses)
    }

    /// The unsigned encoding the hash and every signature commit to.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)
            .expect("serialization into memory buffer");
        writer.into_bytes()
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.version)?;
        writer.write_u32(self.nonce)?;
        writer.write_i64(self.system_fee)?;
        writer.write_i64(self.network_fee)?;
        writer.write_u32(self.valid_until_block)?;
        writer.write_serializable_list(&self.signers)?;
        writer.write_serializable_list(&self.attributes)?;
        writer.write_var_bytes(&self.script)
    }

    fn validate(
        signers: &[Signer],
        attributes: &[TransactionAttribute],
        script: &[u8],
        system_fee: i64,
        network_fee: i64,
    ) -> CoreResult<()> {
        if signers.is_empty() || signers.len() > MAX_TRANSACTION_ATTRIBUTES {
            return Err(CoreError::invalid_format(format!(
                "{} signers outside 1..=16",
                signers.len()
            )));
        }
        for (i, signer) in signers.iter().enumerate() {
            if signers[..i].iter().any(|s| s.account == signer.account) {
                return Err(CoreError::invalid_format(format!(
                    "duplicate signer {}",
                    signer.account
                )));
            }
        }
        if attributes.len() > MAX_TRANSACTION_ATTRIBUTES - signers.len() {
            return Err(CoreError::invalid_format("too many attributes"));
        }
        for (i, attribute) in attributes.iter().enumerate() {
            if !attribute.allow_multiple()
                && attributes[..i]
                    .iter()
                    .any(|a| a.type_byte() == attribute.type_byte())
            {
                return Err(CoreError::invalid_format(format!(
                    "duplicate attribute type {:#04x}",
                    attribute.type_byte()
                )));
            }
        }
        if script.is_empty() || script.len() > MAX_SCRIPT_SIZE {
            return Err(CoreError::invalid_format(format!(
                "script of {} bytes outside 1..={MAX_SCRIPT_SIZE}",
                script.len()
            )));
        }
        if system_fee < 0 || network_fee < 0 {
            return Err(CoreError::invalid_format("negative fee"));
        }
        if system_fee.checked_add(network_fee).is_none() {
            return Err(CoreError::invalid_format("fee sum overflows"));
        }
        Ok(())
    }
}

impl Verifiable for Transaction {
    fn hash(&self) -> UInt256 {
        Transaction::hash(self)
    }

    fn witnesses(&self) -> &[Witness] {
        &self.witnesses
    }

    fn script_hashes_for_verifying(&self) -> Vec<UInt160> {
        self.signers.iter().map(|signer| signer.account).collect()
    }
}

impl Serializable for Transaction {
    fn size(&self) -> usize {
        Transaction::size(self)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_unsigned(writer)?;
        writer.write_serializable_list(&self.witnesses)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_u8()?;
        if version != 0 {
            return Err(IoError::invalid_format(format!(
                "unsupported transaction version {version}"
            )));
        }
        let nonce = reader.read_u32()?;
        let system_fee = reader.read_i64()?;
        let network_fee = reader.read_i64()?;
        let valid_until_block = reader.read_u32()?;
        let signers: Vec<Signer> = helper::deserialize_list(reader, MAX_TRANSACTION_ATTRIBUTES)?;
        let attributes: Vec<TransactionAttribute> =
            helper::deserialize_list(reader, MAX_TRANSACTION_ATTRIBUTES)?;
        let script = reader.read_var_bytes(MAX_SCRIPT_SIZE)?;
        Self::validate(&signers, &attributes, &script, system_fee, network_fee)
            .map_err(|e| IoError::invalid_format(e.to_string()))?;
        let witnesses: Vec<Witness> = helper::deserialize_list(reader, MAX_TRANSACTION_ATTRIBUTES)?;
        if witnesses.len() != signers.len() {
            return Err(IoError::invalid_format(format!(
                "{} witnesses for {} signers",
                witnesses.len(),
                signers.len()
            )));
        }
        Ok(Self {
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            signers,
            attributes,
            script,
            witnesses,
            hash_cache: OnceLock::new(),
        })
    }
}

/// Step-by-step construction of a [`Transaction`].
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    nonce: u32,
    system_fee: i64,
    network_fee: i64,
    valid_until_block: u32,
    signers: Vec<Signer>,
    attributes: Vec<TransactionAttribute>,
    script: Vec<u8>,
    witnesses: Vec<Witness>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nonce(mut self, nonce: u32) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn system_fee(mut self, fee: i64) -> Self {
        self.system_fee = fee;
        self
    }

    pub fn network_fee(mut self, fee: i64) -> Self {
        self.network_fee = fee;
        self
    }

    pub fn valid_until_block(mut self, height: u32) -> Self {
        self.valid_until_block = height;
        self
    }

    pub fn signer(mut self, signer: Signer) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn attribute(mut self, attribute: TransactionAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn script(mut self, script: Vec<u8>) -> Self {
        self.script = script;
        self
    }

    pub fn witness(mut self, witness: Witness) -> Self {
        self.witnesses.push(witness);
        self
    }

    /// Validates the accumulated fields and produces the transaction.
    ///
    /// Missing witnesses are filled with empty ones so the result is always
    /// structurally complete.
    pub fn build(mut self) -> CoreResult<Transaction> {
        Transaction::validate(
            &self.signers,
            &self.attributes,
            &self.script,
            self.system_fee,
            self.network_fee,
        )?;
        while self.witnesses.len() < self.signers.len() {
            self.witnesses.push(Witness::empty());
        }
        if self.witnesses.len() != self.signers.len() {
            return Err(CoreError::invalid_format(
                "more witnesses than signers",
            ));
        }
        Ok(Transaction {
            version: 0,
            nonce: self.nonce,
            system_fee: self.system_fee,
            network_fee: self.network_fee,
            valid_until_block: self.valid_until_block,
            signers: self.signers,
            attributes: self.attributes,
            script: self.script,
            witnesses: self.witnesses,
            hash_cache: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WitnessScopes;
    use neo3_io::SerializableExt;

    fn sample_transaction() -> Transaction {
        TransactionBuilder::new()
            .nonce(0xDEADBEEF)
            .system_fee(100)
            .network_fee(200)
            .valid_until_block(1000)
            .signer(Signer::called_by_entry(UInt160::from_script(b"\x51")))
            .script(vec![0x51])
            .build()
            .unwrap()
    }

    #[test]
    fn encode_decode_round_trips() {
        let tx = sample_transaction();
        let decoded = Transaction::from_array(&tx.to_array()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn hash_covers_only_the_unsigned_part() {
        let mut tx = sample_transaction();
        let hash_before = tx.hash();
        tx.set_witnesses(vec![Witness::new(vec![0x0C], vec![0x51])]);
        // The witness is not part of the signed data.
        assert_eq!(UInt256::digest(&tx.unsigned_bytes()), hash_before);
    }

    #[test]
    fn zero_signers_is_rejected() {
        let result = TransactionBuilder::new().script(vec![0x51]).build();
        assert!(result.is_err());
    }

    #[test]
    fn seventeen_signers_is_rejected() {
        let mut builder = TransactionBuilder::new().script(vec![0x51]);
        for i in 0u8..17 {
            let mut account = [0u8; 20];
            account[0] = i;
            builder = builder.signer(Signer::new(account.into(), WitnessScopes::NONE));
        }
        assert!(builder.build().is_err());
    }

    #[test]
    fn duplicate_signer_accounts_are_rejected() {
        let account = UInt160::from_script(b"\x55");
        let result = TransactionBuilder::new()
            .script(vec![0x51])
            .signer(Signer::called_by_entry(account))
            .signer(Signer::global(account))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_high_priority_is_rejected() {
        let result = TransactionBuilder::new()
            .script(vec![0x51])
            .signer(Signer::called_by_entry(UInt160::ZERO))
            .attribute(TransactionAttribute::HighPriority)
            .attribute(TransactionAttribute::HighPriority)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn multiple_conflicts_are_allowed() {
        let result = TransactionBuilder::new()
            .script(vec![0x51])
            .signer(Signer::called_by_entry(UInt160::ZERO))
            .attribute(TransactionAttribute::Conflicts {
                hash: UInt256::digest(b"a"),
            })
            .attribute(TransactionAttribute::Conflicts {
                hash: UInt256::digest(b"b"),
            })
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn size_matches_encoding_length() {
        let tx = sample_transaction();
        assert_eq!(tx.size(), tx.to_array().len());
    }
}
