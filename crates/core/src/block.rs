//! Block headers and blocks.

use crate::{Transaction, UInt160, UInt256, Verifiable, Witness};
use neo3_crypto::MerkleTree;
use neo3_io::{helper, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use std::sync::OnceLock;

/// A block header: everything except the transactions.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u32,
    pub prev_hash: UInt256,
    pub merkle_root: UInt256,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub nonce: u64,
    pub index: u32,
    /// Index of the consensus primary that proposed the block.
    pub primary_index: u8,
    /// Script hash of the next round's consensus multisig.
    pub next_consensus: UInt160,
    pub witness: Witness,
    hash_cache: OnceLock<UInt256>,
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.prev_hash == other.prev_hash
            && self.merkle_root == other.merkle_root
            && self.timestamp == other.timestamp
            && self.nonce == other.nonce
            && self.index == other.index
            && self.primary_index == other.primary_index
            && self.next_consensus == other.next_consensus
            && self.witness == other.witness
    }
}

impl Eq for Header {}

impl Header {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u32,
        prev_hash: UInt256,
        merkle_root: UInt256,
        timestamp: u64,
        nonce: u64,
        index: u32,
        primary_index: u8,
        next_consensus: UInt160,
        witness: Witness,
    ) -> Self {
        Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            nonce,
            index,
            primary_index,
            next_consensus,
            witness,
            hash_cache: OnceLock::new(),
        }
    }

    /// SHA-256 of the unsigned header encoding, cached after first use.
    pub fn hash(&self) -> UInt256 {
        *self
            .hash_cache
            .get_or_init(|| UInt256::digest(&self.unsigned_bytes()))
    }

    /// The unsigned encoding the hash and witness commit to.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)
            .expect("serialization into memory buffer");
        writer.into_bytes()
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(self.version)?;
        self.prev_hash.serialize(writer)?;
        self.merkle_root.serialize(writer)?;
        writer.write_u64(self.timestamp)?;
        writer.write_u64(self.nonce)?;
        writer.write_u32(self.index)?;
        writer.write_u8(self.primary_index)?;
        self.next_consensus.serialize(writer)
    }
}

impl Verifiable for Header {
    fn hash(&self) -> UInt256 {
        Header::hash(self)
    }

    fn witnesses(&self) -> &[Witness] {
        std::slice::from_ref(&self.witness)
    }

    fn script_hashes_for_verifying(&self) -> Vec<UInt160> {
        // The witness must come from the consensus address committed to by
        // the previous block; the caller resolves it from the snapshot.
        vec![self.witness.script_hash()]
    }
}

impl Serializable for Header {
    fn size(&self) -> usize {
        4 + 32 + 32 + 8 + 8 + 4 + 1 + 20 + 1 + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_unsigned(writer)?;
        // Headers carry exactly one witness on the wire.
        writer.write_var_int(1)?;
        self.witness.serialize(writer)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_u32()?;
        if version != 0 {
            return Err(IoError::invalid_format(format!(
                "unsupported block version {version}"
            )));
        }
        let prev_hash = UInt256::deserialize(reader)?;
        let merkle_root = UInt256::deserialize(reader)?;
        let timestamp = reader.read_u64()?;
        let nonce = reader.read_u64()?;
        let index = reader.read_u32()?;
        let primary_index = reader.read_u8()?;
        let next_consensus = UInt160::deserialize(reader)?;
        let witness_count = reader.read_var_int(1)?;
        if witness_count != 1 {
            return Err(IoError::invalid_format(format!(
                "header carries {witness_count} witnesses, expected 1"
            )));
        }
        let witness = Witness::deserialize(reader)?;
        Ok(Self::new(
            version,
            prev_hash,
            merkle_root,
            timestamp,
            nonce,
            index,
            primary_index,
            next_consensus,
            witness,
        ))
    }
}

/// A header plus the transactions it commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> UInt256 {
        self.header.hash()
    }

    pub fn index(&self) -> u32 {
        self.header.index
    }

    pub fn timestamp(&self) -> u64 {
        self.header.timestamp
    }

    /// The Merkle root of the transaction hashes.
    pub fn compute_merkle_root(&self) -> UInt256 {
        Self::merkle_root_of(&self.transactions)
    }

    /// Merkle root of an arbitrary transaction list.
    pub fn merkle_root_of(transactions: &[Transaction]) -> UInt256 {
        let leaves: Vec<[u8; 32]> = transactions.iter().map(|tx| tx.hash().to_array()).collect();
        UInt256::from(MerkleTree::compute_root(&leaves))
    }

    /// Whether the header's Merkle root matches the transactions.
    pub fn verify_merkle_root(&self) -> bool {
        self.compute_merkle_root() == self.header.merkle_root
    }

    /// Serialized size of the whole block.
    pub fn size(&self) -> usize {
        self.header.size() + helper::list_size(&self.transactions)
    }
}

impl Serializable for Block {
    fn size(&self) -> usize {
        Block::size(self)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.header.serialize(writer)?;
        writer.write_serializable_list(&self.transactions)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let header = Header::deserialize(reader)?;
        let transactions: Vec<Transaction> =
            helper::deserialize_list(reader, u16::MAX as usize)?;
        let mut seen = std::collections::HashSet::with_capacity(transactions.len());
        for tx in &transactions {
            if !seen.insert(tx.hash()) {
                return Err(IoError::invalid_format("duplicate transaction in block"));
            }
        }
        let block = Block::new(header, transactions);
        if !block.verify_merkle_root() {
            return Err(IoError::invalid_format("merkle root mismatch"));
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Signer, TransactionBuilder};
    use neo3_io::SerializableExt;

    fn sample_header(index: u32) -> Header {
        Header::new(
            0,
            UInt256::digest(b"prev"),
            UInt256::ZERO,
            1_600_000_000_000,
            42,
            index,
            3,
            UInt160::from_script(b"consensus"),
            Witness::empty(),
        )
    }

    fn sample_transaction(nonce: u32) -> Transaction {
        TransactionBuilder::new()
            .nonce(nonce)
            .valid_until_block(100)
            .signer(Signer::called_by_entry(UInt160::from_script(b"\x51")))
            .script(vec![0x51])
            .build()
            .unwrap()
    }

    #[test]
    fn header_round_trips() {
        let header = sample_header(7);
        assert_eq!(Header::from_array(&header.to_array()).unwrap(), header);
    }

    #[test]
    fn block_round_trips_with_valid_merkle_root() {
        let transactions = vec![sample_transaction(1), sample_transaction(2)];
        let mut header = sample_header(9);
        header.merkle_root = Block::merkle_root_of(&transactions);
        let block = Block::new(header, transactions);
        assert_eq!(Block::from_array(&block.to_array()).unwrap(), block);
    }

    #[test]
    fn merkle_root_mismatch_is_rejected_at_decode() {
        let transactions = vec![sample_transaction(1)];
        let header = sample_header(9); // zero merkle root, does not match
        let block = Block::new(header, transactions);
        assert!(Block::from_array(&block.to_array()).is_err());
    }

    #[test]
    fn header_hash_ignores_witness() {
        let mut header = sample_header(3);
        let hash = header.hash();
        header.witness = Witness::new(vec![1], vec![2]);
        assert_eq!(UInt256::digest(&header.unsigned_bytes()), hash);
    }
}
