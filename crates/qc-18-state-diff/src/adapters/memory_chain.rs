//! In-memory chain implementing the event source and ledger ports.
//!
//! Used by embedders without a persistent chain and by the test suite.

use crate::ports::{BlockReader, ChainEventSource, ChainEventSubscription, EventSourceError};
use parking_lot::{Mutex, RwLock};
use shared_types::{Block, ChainEvent, Hash, TransactionReceipt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct Feed {
    sink: mpsc::Sender<ChainEvent>,
    err_tx: oneshot::Sender<EventSourceError>,
}

/// In-memory ledger with a committed-block feed
#[derive(Default)]
pub struct InMemoryChain {
    blocks: RwLock<HashMap<Hash, Arc<Block>>>,
    receipts: RwLock<HashMap<Hash, Vec<TransactionReceipt>>>,
    feeds: Mutex<Vec<Feed>>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block without announcing it (genesis, backfill).
    pub fn insert_block(&self, block: Block, receipts: Vec<TransactionReceipt>) -> Arc<Block> {
        let block = Arc::new(block);
        let hash = block.hash();
        self.blocks.write().insert(hash, block.clone());
        self.receipts.write().insert(hash, receipts);
        block
    }

    /// Store a block and announce it to every live feed.
    ///
    /// Never waits on a feed: a full feed misses the event, a closed feed
    /// is forgotten. Returns how many feeds accepted the event.
    pub fn commit_block(&self, block: Block, receipts: Vec<TransactionReceipt>) -> usize {
        let block = self.insert_block(block, receipts);
        self.announce(ChainEvent::new(block, Vec::new()))
    }

    /// Re-announce an already stored block (e.g. after a reorg).
    pub fn announce(&self, event: ChainEvent) -> usize {
        let mut delivered = 0;
        self.feeds.lock().retain(|feed| match feed.sink.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    block_height = event.block.number(),
                    "chain event feed is full; dropping event"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("chain event feed closed; unsubscribing");
                false
            }
        });
        delivered
    }

    /// Terminate every feed with `error`.
    pub fn fail(&self, error: EventSourceError) {
        for feed in self.feeds.lock().drain(..) {
            let _ = feed.err_tx.send(error.clone());
        }
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.lock().len()
    }
}

impl ChainEventSource for InMemoryChain {
    fn subscribe_chain_events(&self, sink: mpsc::Sender<ChainEvent>) -> ChainEventSubscription {
        let (err_tx, err_rx) = oneshot::channel();
        self.feeds.lock().push(Feed { sink, err_tx });
        ChainEventSubscription::new(err_rx)
    }
}

impl BlockReader for InMemoryChain {
    fn get_block_by_hash(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.blocks.read().get(hash).cloned()
    }

    fn get_receipts_by_hash(&self, hash: &Hash) -> Vec<TransactionReceipt> {
        self.receipts.read().get(hash).cloned().unwrap_or_default()
    }
}
