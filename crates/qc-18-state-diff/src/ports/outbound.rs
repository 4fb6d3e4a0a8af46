//! Outbound ports (driven side - SPI)
//!
//! The chain, the diff builder and the payload encoder are external
//! collaborators; the dispatcher only sees them through these traits.

use crate::domain::StateDiff;
use shared_types::{Block, ChainEvent, Hash, TransactionReceipt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Terminal failure of the chain event feed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventSourceError {
    /// The source reported an error and will deliver no further events
    #[error("chain event subscription failed: {0}")]
    Failed(String),

    /// The source went away without reporting an error
    #[error("chain event subscription closed")]
    Closed,
}

/// Handle on a live chain event subscription.
///
/// Events flow through the sink handed to
/// [`ChainEventSource::subscribe_chain_events`]; this handle only carries the
/// terminal error signal. Dropping the intake receiver is how the consumer
/// unsubscribes: the source's next send fails and it forgets the feed.
#[derive(Debug)]
pub struct ChainEventSubscription {
    err_rx: oneshot::Receiver<EventSourceError>,
}

impl ChainEventSubscription {
    pub fn new(err_rx: oneshot::Receiver<EventSourceError>) -> Self {
        Self { err_rx }
    }

    /// Resolve with the terminal error, or `Closed` if the source dropped
    /// its end without reporting one. Cancel-safe.
    pub async fn err(&mut self) -> EventSourceError {
        (&mut self.err_rx)
            .await
            .unwrap_or(EventSourceError::Closed)
    }
}

/// Port: sequential feed of committed blocks
pub trait ChainEventSource: Send + Sync {
    /// Start delivering chain events, in commit order, into `sink`.
    fn subscribe_chain_events(&self, sink: mpsc::Sender<ChainEvent>) -> ChainEventSubscription;
}

/// Port: ledger lookups
pub trait BlockReader: Send + Sync {
    fn get_block_by_hash(&self, hash: &Hash) -> Option<Arc<Block>>;

    /// Receipts of the block's transactions, empty if unknown
    fn get_receipts_by_hash(&self, hash: &Hash) -> Vec<TransactionReceipt>;
}

/// Diff builder failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("state root 0x{} is not available", hex::encode(.0))]
    MissingStateRoot(Hash),

    #[error("trie traversal failed: {0}")]
    Trie(String),
}

/// Port: computes the account-level diff between two state roots
pub trait StateDiffBuilder: Send + Sync {
    fn build_state_diff(
        &self,
        parent_root: Hash,
        current_root: Hash,
        block_number: u64,
        block_hash: Hash,
    ) -> Result<StateDiff, BuilderError>;
}

/// Payload encoding failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("encoded {what} is {size} bytes, limit is {limit}")]
    TooLarge {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    #[error("failed to encode {what}: {reason}")]
    Failed { what: &'static str, reason: String },
}

/// Port: deterministic byte encoding of diffs, blocks and receipts.
///
/// Equal inputs must always produce equal bytes; the empty-diff check
/// compares encodings byte for byte.
pub trait PayloadEncoder: Send + Sync {
    fn encode_state_diff(&self, diff: &StateDiff) -> Result<Vec<u8>, EncodingError>;

    fn encode_block(&self, block: &Block) -> Result<Vec<u8>, EncodingError>;

    fn encode_receipts(&self, receipts: &[TransactionReceipt]) -> Result<Vec<u8>, EncodingError>;
}
