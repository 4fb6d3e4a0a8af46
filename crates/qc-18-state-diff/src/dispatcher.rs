//! Dispatch loop: turns committed-block events into broadcast payloads.
//!
//! One task owns the [`Dispatcher`] for its whole life. It waits on three
//! things, first-ready wins: the next chain event, the source's terminal
//! error, and the shutdown signal. Events are processed strictly one at a
//! time in feed order.

use crate::domain::{BroadcastReport, Broadcaster, Payload, StateDiff, SubscriptionRegistry};
use crate::error::{Result, StateDiffError};
use crate::metrics::Metrics;
use crate::ports::{BlockReader, ChainEventSubscription, PayloadEncoder, StateDiffBuilder};
use parking_lot::RwLock;
use shared_types::{Block, ChainEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Lifecycle of the dispatch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Constructed, not yet started
    Idle,
    Running,
    /// Shutting down; terminating subscriptions
    Draining,
    /// Terminal
    Stopped,
}

/// What happened to a single chain event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nobody was subscribed; no work done
    Skipped,
    /// The diff was empty; nothing sent
    Suppressed,
    /// Payload handed to the broadcaster
    Broadcast(BroadcastReport),
}

/// Per-event processing state owned by the dispatch loop
pub struct Dispatcher {
    stream_block: bool,
    blocks: Arc<dyn BlockReader>,
    builder: Arc<dyn StateDiffBuilder>,
    encoder: Arc<dyn PayloadEncoder>,
    registry: Arc<SubscriptionRegistry>,
    broadcaster: Broadcaster,
    metrics: Arc<Metrics>,
    /// Most recently processed block; saves a lookup when it is the next parent
    last_block: Option<Arc<Block>>,
}

impl Dispatcher {
    pub fn new(
        stream_block: bool,
        blocks: Arc<dyn BlockReader>,
        builder: Arc<dyn StateDiffBuilder>,
        encoder: Arc<dyn PayloadEncoder>,
        registry: Arc<SubscriptionRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            stream_block,
            blocks,
            builder,
            encoder,
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            metrics,
            last_block: None,
        }
    }

    pub fn last_block(&self) -> Option<&Arc<Block>> {
        self.last_block.as_ref()
    }

    /// Run until shutdown, feed closure or an upstream error, then terminate
    /// every subscription.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ChainEvent>,
        mut subscription: ChainEventSubscription,
        mut quit_rx: oneshot::Receiver<()>,
        state: Arc<RwLock<DispatchState>>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(&event),
                    None => {
                        warn!("[qc-18] Chain event feed closed, breaking loop");
                        break;
                    }
                },
                err = subscription.err() => {
                    warn!(error = %err, "[qc-18] Error from chain event subscription, breaking loop");
                    break;
                }
                _ = &mut quit_rx => {
                    info!("[qc-18] Quitting the statediffing process");
                    break;
                }
            }
        }

        *state.write() = DispatchState::Draining;
        // Dropping the intake receiver unsubscribes from the source
        drop(events);
        let closed = self.broadcaster.close();
        info!(closed, "[qc-18] All subscriptions closed");
        *state.write() = DispatchState::Stopped;
    }

    fn handle_event(&mut self, event: &ChainEvent) {
        let height = event.block.number();
        self.metrics.record_event_received();
        debug!(block_height = height, block_hash = %hex::encode(event.hash()), "Event received from chain event feed");

        match self.process_event(event) {
            Ok(ProcessOutcome::Skipped) => {
                debug!("Currently no subscribers to the statediffing service; processing is halted")
            }
            Ok(ProcessOutcome::Suppressed) => {
                debug!(block_height = height, "State diff is empty; nothing to send")
            }
            Ok(ProcessOutcome::Broadcast(report)) => debug!(
                block_height = height,
                delivered = report.delivered,
                evicted = report.evicted.len(),
                "State diff payload broadcast"
            ),
            Err(err) => {
                self.metrics.record_processing_failure();
                error!(block_height = height, error = %err, "Error processing statediff; skipping block");
            }
        }
        self.metrics.record_event_processed();
    }

    /// Process one event. Errors are per-event; the caller drops the event.
    pub fn process_event(&mut self, event: &ChainEvent) -> Result<ProcessOutcome> {
        if !self.registry.is_active() {
            self.metrics.record_event_skipped();
            return Ok(ProcessOutcome::Skipped);
        }

        let current = event.block.clone();
        let parent_hash = current.parent_hash();
        let parent = match &self.last_block {
            Some(last) if last.hash() == parent_hash => Some(last.clone()),
            _ => self.blocks.get_block_by_hash(&parent_hash),
        };
        // Updated whether or not the parent resolved
        self.last_block = Some(current.clone());

        let parent = parent.ok_or(StateDiffError::ParentBlockNotFound {
            height: current.number(),
            parent_hash,
        })?;

        let payload = self.build_payload(&current, &parent)?;

        if self.is_empty_payload(&payload, &current) {
            self.metrics.record_diff_suppressed();
            return Ok(ProcessOutcome::Suppressed);
        }

        let report = self.broadcaster.broadcast(&payload);
        self.metrics
            .record_broadcast(report.delivered, report.evicted.len());
        Ok(ProcessOutcome::Broadcast(report))
    }

    fn build_payload(&self, current: &Block, parent: &Block) -> Result<Payload> {
        let diff = self.builder.build_state_diff(
            parent.state_root(),
            current.state_root(),
            current.number(),
            current.hash(),
        )?;
        self.metrics.record_diff_built();

        let payload = Payload::new(self.encoder.encode_state_diff(&diff)?);
        if !self.stream_block {
            return Ok(payload);
        }

        let block_rlp = self.encoder.encode_block(current)?;
        let receipts = self.blocks.get_receipts_by_hash(&current.hash());
        let receipts_rlp = self.encoder.encode_receipts(&receipts)?;
        Ok(payload.with_block(block_rlp, receipts_rlp))
    }

    /// Byte comparison against the canonical empty diff for this block.
    /// If the reference cannot be encoded the payload counts as non-empty.
    fn is_empty_payload(&self, payload: &Payload, block: &Block) -> bool {
        match self.encoder.encode_state_diff(&StateDiff::empty_for(block)) {
            Ok(empty) => payload.state_diff_rlp == empty,
            Err(err) => {
                warn!(error = %err, "Error checking if payload is empty");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{decode_state_diff, InMemoryChain, RlpPayloadEncoder};
    use crate::domain::{Subscription, SubscriptionId, TerminationReason};
    use crate::ports::{BuilderError, EventSourceError, ChainEventSource};
    use crate::test_utils::{make_block, make_diff, ScriptedBuilder};
    use shared_types::{Hash, TransactionReceipt, ZERO_HASH};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Counts ledger lookups on top of an in-memory chain
    struct CountingReader {
        chain: Arc<InMemoryChain>,
        lookups: AtomicUsize,
    }

    impl BlockReader for CountingReader {
        fn get_block_by_hash(&self, hash: &Hash) -> Option<Arc<Block>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.chain.get_block_by_hash(hash)
        }

        fn get_receipts_by_hash(&self, hash: &Hash) -> Vec<TransactionReceipt> {
            self.chain.get_receipts_by_hash(hash)
        }
    }

    struct Harness {
        chain: Arc<InMemoryChain>,
        reader: Arc<CountingReader>,
        builder: Arc<ScriptedBuilder>,
        registry: Arc<SubscriptionRegistry>,
        metrics: Arc<Metrics>,
        dispatcher: Dispatcher,
        genesis: Arc<Block>,
    }

    fn harness(stream_block: bool, encoder: RlpPayloadEncoder) -> Harness {
        let chain = Arc::new(InMemoryChain::new());
        let genesis = chain.insert_block(make_block(0, ZERO_HASH), vec![]);
        let reader = Arc::new(CountingReader {
            chain: chain.clone(),
            lookups: AtomicUsize::new(0),
        });
        let builder = Arc::new(ScriptedBuilder::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Dispatcher::new(
            stream_block,
            reader.clone(),
            builder.clone(),
            Arc::new(encoder),
            registry.clone(),
            metrics.clone(),
        );
        Harness {
            chain,
            reader,
            builder,
            registry,
            metrics,
            dispatcher,
            genesis,
        }
    }

    fn subscribe(
        registry: &SubscriptionRegistry,
        id: &str,
        capacity: usize,
    ) -> (mpsc::Receiver<Payload>, mpsc::Receiver<TerminationReason>) {
        let (payload_tx, payload_rx) = mpsc::channel(capacity);
        let (control_tx, control_rx) = mpsc::channel(1);
        registry.add(
            SubscriptionId::from(id),
            Subscription::new(payload_tx, control_tx),
        );
        (payload_rx, control_rx)
    }

    fn event(block: Block) -> ChainEvent {
        ChainEvent::new(Arc::new(block), vec![])
    }

    #[test]
    fn test_no_subscribers_skips_all_work() {
        let mut h = harness(false, RlpPayloadEncoder::new());
        let b1 = make_block(1, h.genesis.hash());

        let outcome = h.dispatcher.process_event(&event(b1)).unwrap();

        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(h.builder.calls(), 0);
        assert_eq!(h.reader.lookups.load(Ordering::SeqCst), 0);
        assert!(h.dispatcher.last_block().is_none());
        assert_eq!(h.metrics.get_events_skipped(), 1);
    }

    #[test]
    fn test_non_empty_diff_is_broadcast() {
        let mut h = harness(false, RlpPayloadEncoder::new());
        let (mut payload_rx, _control_rx) = subscribe(&h.registry, "0x1", 4);
        let b1 = make_block(1, h.genesis.hash());
        let diff = make_diff(&b1, 0xaa);
        h.builder.script_diff(diff.clone());

        let outcome = h.dispatcher.process_event(&event(b1)).unwrap();

        assert!(matches!(outcome, ProcessOutcome::Broadcast(ref r) if r.delivered == 1));
        let payload = payload_rx.try_recv().unwrap();
        assert_eq!(decode_state_diff(&payload.state_diff_rlp).unwrap(), diff);
        assert!(payload.block_rlp.is_none());
        assert!(payload.receipts_rlp.is_none());
    }

    #[test]
    fn test_empty_diff_is_suppressed() {
        let mut h = harness(false, RlpPayloadEncoder::new());
        let (mut payload_rx, _control_rx) = subscribe(&h.registry, "0x1", 4);
        let b1 = make_block(1, h.genesis.hash());

        let outcome = h.dispatcher.process_event(&event(b1)).unwrap();

        assert_eq!(outcome, ProcessOutcome::Suppressed);
        assert_eq!(h.builder.calls(), 1);
        assert!(payload_rx.try_recv().is_err());
        assert_eq!(h.metrics.get_diffs_suppressed(), 1);
    }

    #[test]
    fn test_cached_parent_avoids_lookup() {
        let mut h = harness(false, RlpPayloadEncoder::new());
        let _sinks = subscribe(&h.registry, "0x1", 8);
        let b1 = make_block(1, h.genesis.hash());
        let b2 = make_block(2, b1.hash());

        h.dispatcher.process_event(&event(b1)).unwrap();
        assert_eq!(h.reader.lookups.load(Ordering::SeqCst), 1);

        h.dispatcher.process_event(&event(b2.clone())).unwrap();
        assert_eq!(h.reader.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(h.dispatcher.last_block().unwrap().hash(), b2.hash());
    }

    #[test]
    fn test_missing_parent_drops_event_but_updates_cache() {
        let mut h = harness(false, RlpPayloadEncoder::new());
        let _sinks = subscribe(&h.registry, "0x1", 8);
        let orphan = make_block(5, [0x55; 32]);

        let err = h.dispatcher.process_event(&event(orphan.clone())).unwrap_err();

        assert!(matches!(
            err,
            StateDiffError::ParentBlockNotFound { height: 5, parent_hash } if parent_hash == [0x55; 32]
        ));
        assert_eq!(h.builder.calls(), 0);
        assert_eq!(h.dispatcher.last_block().unwrap().hash(), orphan.hash());

        // Its child resolves the parent from the cache
        let child = make_block(6, orphan.hash());
        h.builder.script_diff(make_diff(&child, 1));
        let outcome = h.dispatcher.process_event(&event(child)).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Broadcast(_)));
    }

    #[test]
    fn test_builder_failure_is_per_event() {
        let mut h = harness(false, RlpPayloadEncoder::new());
        let (mut payload_rx, _control_rx) = subscribe(&h.registry, "0x1", 8);
        let b1 = make_block(1, h.genesis.hash());
        let b2 = make_block(2, b1.hash());
        h.builder
            .script_failure(b1.hash(), BuilderError::Trie("missing node".into()));
        h.builder.script_diff(make_diff(&b2, 2));

        let err = h.dispatcher.process_event(&event(b1)).unwrap_err();
        assert!(err.is_recoverable());

        let outcome = h.dispatcher.process_event(&event(b2)).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Broadcast(_)));
        assert!(payload_rx.try_recv().is_ok());
    }

    #[test]
    fn test_encoding_failure_is_per_event() {
        let mut h = harness(false, RlpPayloadEncoder::with_max_item_size(16));
        let _sinks = subscribe(&h.registry, "0x1", 8);
        let b1 = make_block(1, h.genesis.hash());
        h.builder.script_diff(make_diff(&b1, 3));

        let err = h.dispatcher.process_event(&event(b1)).unwrap_err();
        assert!(matches!(err, StateDiffError::Encoding(_)));
    }

    #[test]
    fn test_stream_block_attaches_block_and_receipts() {
        let mut h = harness(true, RlpPayloadEncoder::new());
        let (mut payload_rx, _control_rx) = subscribe(&h.registry, "0x1", 8);
        let b1 = make_block(1, h.genesis.hash());
        let receipts = vec![TransactionReceipt {
            tx_hash: [1; 32],
            success: true,
            cumulative_gas_used: 21_000,
            logs: vec![],
        }];
        h.chain.insert_block(b1.clone(), receipts.clone());
        h.builder.script_diff(make_diff(&b1, 4));

        h.dispatcher.process_event(&event(b1.clone())).unwrap();

        let encoder = RlpPayloadEncoder::new();
        let payload = payload_rx.try_recv().unwrap();
        assert_eq!(payload.block_rlp, Some(encoder.encode_block(&b1).unwrap()));
        assert_eq!(
            payload.receipts_rlp,
            Some(encoder.encode_receipts(&receipts).unwrap())
        );
    }

    #[test]
    fn test_stalled_subscriber_is_evicted() {
        let mut h = harness(false, RlpPayloadEncoder::new());
        let (_payload_rx, mut control_rx) = subscribe(&h.registry, "0xslow", 1);
        let b1 = make_block(1, h.genesis.hash());
        let b2 = make_block(2, b1.hash());
        h.builder.script_diff(make_diff(&b1, 1));
        h.builder.script_diff(make_diff(&b2, 2));

        h.dispatcher.process_event(&event(b1)).unwrap();
        let outcome = h.dispatcher.process_event(&event(b2)).unwrap();

        assert!(matches!(outcome, ProcessOutcome::Broadcast(ref r) if r.evicted.len() == 1));
        assert!(!h.registry.is_active());
        assert_eq!(control_rx.try_recv().unwrap(), TerminationReason::Evicted);
        assert_eq!(h.metrics.get_evictions(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_on_quit() {
        let h = harness(false, RlpPayloadEncoder::new());
        let (_payload_rx, mut control_rx) = subscribe(&h.registry, "0x1", 8);
        let state = Arc::new(RwLock::new(DispatchState::Running));
        let (event_tx, event_rx) = mpsc::channel(8);
        let subscription = h.chain.subscribe_chain_events(event_tx);
        let (quit_tx, quit_rx) = oneshot::channel();

        let task = tokio::spawn(h.dispatcher.run(event_rx, subscription, quit_rx, state.clone()));
        quit_tx.send(()).unwrap();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

        assert_eq!(*state.read(), DispatchState::Stopped);
        assert!(h.registry.is_empty());
        assert_eq!(control_rx.try_recv().unwrap(), TerminationReason::Shutdown);
    }

    #[tokio::test]
    async fn test_run_drains_on_upstream_error() {
        let h = harness(false, RlpPayloadEncoder::new());
        let (_payload_rx, mut control_rx) = subscribe(&h.registry, "0x1", 8);
        let state = Arc::new(RwLock::new(DispatchState::Running));
        let (event_tx, event_rx) = mpsc::channel(8);
        let subscription = h.chain.subscribe_chain_events(event_tx);
        let (_quit_tx, quit_rx) = oneshot::channel();

        let task = tokio::spawn(h.dispatcher.run(event_rx, subscription, quit_rx, state.clone()));
        h.chain.fail(EventSourceError::Failed("node shutting down".into()));
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

        assert_eq!(*state.read(), DispatchState::Stopped);
        assert!(!h.registry.is_active());
        assert_eq!(control_rx.try_recv().unwrap(), TerminationReason::Shutdown);
    }
}
