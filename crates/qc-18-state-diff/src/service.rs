//! Concrete State Diff Service
//!
//! Owns the registry, the collaborators and the dispatch loop task. One
//! instance is constructed by the host and lives for the life of the node.

use crate::{
    adapters::RlpPayloadEncoder,
    config::StateDiffConfig,
    dispatcher::{DispatchState, Dispatcher},
    domain::{
        Broadcaster, Payload, Subscription, SubscriptionId, SubscriptionRegistry,
        TerminationReason,
    },
    error::{Result, StateDiffError},
    metrics::Metrics,
    ports::{BlockReader, ChainEventSource, PayloadEncoder, StateDiffApi, StateDiffBuilder},
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Subscriber-side handle returned by [`StateDiffService::stream`]
#[derive(Debug)]
pub struct StateDiffStream {
    pub id: SubscriptionId,
    pub payloads: mpsc::Receiver<Payload>,
    pub control: mpsc::Receiver<TerminationReason>,
}

impl StateDiffStream {
    /// Next payload, or `None` once the subscription has been terminated.
    ///
    /// Payloads already queued are handed out before a termination signal
    /// is honoured.
    pub async fn recv(&mut self) -> Option<Payload> {
        tokio::select! {
            biased;
            payload = self.payloads.recv() => payload,
            reason = self.control.recv() => {
                debug!(subscription_id = %self.id, ?reason, "State diff subscription terminated");
                None
            }
        }
    }
}

/// The state diff streaming service
pub struct StateDiffService {
    config: StateDiffConfig,
    registry: Arc<SubscriptionRegistry>,
    metrics: Arc<Metrics>,
    events: Arc<dyn ChainEventSource>,
    blocks: Arc<dyn BlockReader>,
    builder: Arc<dyn StateDiffBuilder>,
    encoder: Arc<dyn PayloadEncoder>,
    state: Arc<RwLock<DispatchState>>,
    quit_tx: Mutex<Option<oneshot::Sender<()>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl StateDiffService {
    /// Create a service over `chain` with the default RLP encoder
    pub fn new<C>(
        config: StateDiffConfig,
        chain: Arc<C>,
        builder: Arc<dyn StateDiffBuilder>,
    ) -> Result<Self>
    where
        C: ChainEventSource + BlockReader + 'static,
    {
        config.validate()?;

        info!("[qc-18] Initializing State Diff Service");
        info!("  Stream Block: {}", config.stream_block);
        info!("  Event Channel: {}", config.event_channel_capacity);

        Ok(Self {
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            metrics: Arc::new(Metrics::new()),
            events: chain.clone(),
            blocks: chain,
            builder,
            encoder: Arc::new(RlpPayloadEncoder::new()),
            state: Arc::new(RwLock::new(DispatchState::Idle)),
            quit_tx: Mutex::new(None),
            loop_handle: Mutex::new(None),
        })
    }

    /// Replace the default RLP payload encoder
    pub fn with_encoder(mut self, encoder: Arc<dyn PayloadEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn config(&self) -> &StateDiffConfig {
        &self.config
    }

    pub fn state(&self) -> DispatchState {
        *self.state.read()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether any subscriber exists (the activity gate)
    pub fn is_active(&self) -> bool {
        self.registry.is_active()
    }

    /// Allocate sinks with the configured capacities and subscribe them
    /// under a fresh id.
    pub fn stream(&self) -> StateDiffStream {
        let id = SubscriptionId::random();
        let (payload_tx, payloads) = mpsc::channel(self.config.payload_channel_capacity);
        let (control_tx, control) = mpsc::channel(self.config.control_channel_capacity);
        self.subscribe(id.clone(), payload_tx, control_tx);
        StateDiffStream {
            id,
            payloads,
            control,
        }
    }

    /// Wait for the dispatch loop to finish draining.
    ///
    /// Returns immediately if the loop was never started or was already
    /// joined.
    pub async fn join(&self) {
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "[qc-18] Dispatch loop terminated abnormally");
            }
        }
    }
}

impl StateDiffApi for StateDiffService {
    fn subscribe(
        &self,
        id: SubscriptionId,
        payload_tx: mpsc::Sender<Payload>,
        control_tx: mpsc::Sender<TerminationReason>,
    ) {
        info!(subscription_id = %id, "Subscribing to the statediff service");
        let subscription = Subscription::new(payload_tx, control_tx);

        // Held across the insert so the loop cannot drain in between
        let state = self.state.read();
        if matches!(*state, DispatchState::Draining | DispatchState::Stopped) {
            info!(subscription_id = %id, "Statediff service is shut down; closing subscription");
            subscription.signal(TerminationReason::Shutdown);
            return;
        }

        if self.registry.add(id.clone(), subscription) {
            debug!(subscription_id = %id, "Replaced existing subscription");
        }
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> Result<()> {
        info!(subscription_id = %id, "Unsubscribing from the statediff service");
        let subscription = self
            .registry
            .remove(id)
            .ok_or_else(|| StateDiffError::SubscriptionNotFound(id.clone()))?;
        subscription.signal(TerminationReason::Unsubscribed);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| StateDiffError::NoRuntime)?;

        let (event_tx, event_rx) = mpsc::channel(self.config.event_channel_capacity);
        let (quit_tx, quit_rx) = oneshot::channel();
        {
            let mut state = self.state.write();
            match *state {
                DispatchState::Idle => {}
                DispatchState::Running | DispatchState::Draining => {
                    return Err(StateDiffError::AlreadyStarted)
                }
                DispatchState::Stopped => return Err(StateDiffError::AlreadyStopped),
            }
            *state = DispatchState::Running;
            *self.quit_tx.lock() = Some(quit_tx);
        }

        info!("[qc-18] Starting statediff service");
        let subscription = self.events.subscribe_chain_events(event_tx);
        let dispatcher = Dispatcher::new(
            self.config.stream_block,
            self.blocks.clone(),
            self.builder.clone(),
            self.encoder.clone(),
            self.registry.clone(),
            self.metrics.clone(),
        );
        let handle = runtime.spawn(dispatcher.run(
            event_rx,
            subscription,
            quit_rx,
            self.state.clone(),
        ));
        *self.loop_handle.lock() = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        info!("[qc-18] Stopping statediff service");
        {
            let mut state = self.state.write();
            if *state == DispatchState::Idle {
                // Never started: latch the stop so a later start is refused
                *state = DispatchState::Stopped;
                let closed = Broadcaster::new(self.registry.clone()).close();
                info!(closed, "[qc-18] Statediff service stopped before start");
                return;
            }
        }
        match self.quit_tx.lock().take() {
            Some(tx) => {
                // The loop may already be gone after an upstream error
                let _ = tx.send(());
            }
            None => debug!("[qc-18] Statediff service not running or already stopping"),
        }
    }
}
