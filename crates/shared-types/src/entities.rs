//! # Core Ledger Entities
//!
//! The shapes a committed chain exposes to its consumers.
//!
//! ## Clusters
//!
//! - **Chain**: `BlockHeader`, `Block`, `SignedTransaction`
//! - **Execution Output**: `TransactionReceipt`, `Log`
//! - **Notifications**: `ChainEvent`

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha3::{Digest, Keccak256};
use std::sync::Arc;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// A 64-byte signature.
pub type Signature = [u8; 64];

/// A 32-byte public key.
pub type PublicKey = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// The all-zero hash, used as the parent of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// The header of a block containing metadata and root hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Protocol version for this block.
    pub version: u16,
    /// Block height in the chain.
    pub height: u64,
    /// Hash of the parent block (creates the chain linkage).
    pub parent_hash: Hash,
    /// Merkle root of all transactions in the block.
    pub merkle_root: Hash,
    /// Root of the receipts produced by this block.
    pub receipts_root: Hash,
    /// Root hash of the state trie after applying this block.
    pub state_root: Hash,
    /// Unix timestamp when the block was proposed.
    pub timestamp: u64,
    /// The validator who proposed this block.
    pub proposer: PublicKey,
    /// PoW difficulty target.
    pub difficulty: U256,
    /// PoW nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Keccak-256 over the canonical header layout.
    ///
    /// Integers are hashed big-endian, `difficulty` as a full 32-byte word.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.version.to_be_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.parent_hash);
        hasher.update(self.merkle_root);
        hasher.update(self.receipts_root);
        hasher.update(self.state_root);
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.proposer);
        let mut difficulty = [0u8; 32];
        self.difficulty.to_big_endian(&mut difficulty);
        hasher.update(difficulty);
        hasher.update(self.nonce.to_be_bytes());
        hasher.finalize().into()
    }
}

/// A signed transaction as included in a block.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Sender address.
    pub from: Address,
    /// Recipient address (None for contract creation).
    pub to: Option<Address>,
    /// Transaction value in base units.
    pub value: U256,
    /// Sender's nonce to prevent replay attacks.
    pub nonce: u64,
    /// Gas price in base units.
    pub gas_price: U256,
    /// Gas limit for this transaction.
    pub gas_limit: u64,
    /// Transaction payload (contract call data, etc.).
    pub data: Vec<u8>,
    /// ECDSA signature (r, s, v).
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

/// A committed block.
///
/// The header hash is computed once in [`Block::new`]; fields are read-only
/// afterwards so the cached hash can never drift from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<SignedTransaction>,
    hash: Hash,
}

impl Block {
    /// Build a block, caching its header hash.
    pub fn new(header: BlockHeader, transactions: Vec<SignedTransaction>) -> Self {
        let hash = header.hash();
        Self {
            header,
            transactions,
            hash,
        }
    }

    /// The block hash.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Hash of the parent block.
    pub fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    /// Block height.
    pub fn number(&self) -> u64 {
        self.header.height
    }

    /// State root after applying this block.
    pub fn state_root(&self) -> Hash {
        self.header.state_root
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }
}

// =============================================================================
// CLUSTER B: EXECUTION OUTPUT
// =============================================================================

/// A log entry emitted during transaction execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<Hash>,
    /// Unindexed data.
    pub data: Vec<u8>,
}

/// The receipt of an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Hash of the transaction this receipt belongs to.
    pub tx_hash: Hash,
    /// Whether execution succeeded.
    pub success: bool,
    /// Gas used by this and all preceding transactions in the block.
    pub cumulative_gas_used: u64,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
}

// =============================================================================
// CLUSTER C: NOTIFICATIONS
// =============================================================================

/// Notification that a block has been committed to the canonical chain.
///
/// Emitted by the chain in commit order, at most once per block.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    /// The committed block.
    pub block: Arc<Block>,
    /// Logs emitted by the block's transactions.
    pub logs: Vec<Log>,
}

impl ChainEvent {
    pub fn new(block: Arc<Block>, logs: Vec<Log>) -> Self {
        Self { block, logs }
    }

    /// Hash of the committed block.
    pub fn hash(&self) -> Hash {
        self.block.hash()
    }
}
