//! Inbound ports (driving side - API)

use crate::domain::{Payload, SubscriptionId, TerminationReason};
use crate::error::Result;
use tokio::sync::mpsc;

/// Primary API exposed to the host (RPC layer, node runtime)
pub trait StateDiffApi: Send + Sync {
    /// Register a subscriber; a reused id overwrites the previous entry
    fn subscribe(
        &self,
        id: SubscriptionId,
        payload_tx: mpsc::Sender<Payload>,
        control_tx: mpsc::Sender<TerminationReason>,
    );

    /// Remove a subscriber, failing with `SubscriptionNotFound` for unknown ids
    fn unsubscribe(&self, id: &SubscriptionId) -> Result<()>;

    /// Spawn the dispatch loop and return immediately
    fn start(&self) -> Result<()>;

    /// Signal shutdown and return immediately; idempotent
    fn stop(&self);
}
