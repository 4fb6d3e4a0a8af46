//! Fan-out of payloads to every registered subscriber.
//!
//! Delivery is a `try_send` per subscriber. A sink that cannot take the
//! payload right now (full or closed) gets a best-effort `Evicted` signal on
//! its control sink and is removed from the registry; there is no buffering
//! and no retry. The producer never waits on a subscriber.

use super::{Payload, SubscriptionId, SubscriptionRegistry, TerminationReason};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

/// Outcome of one broadcast round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that accepted the payload
    pub delivered: usize,
    /// Subscribers evicted during this round
    pub evicted: Vec<SubscriptionId>,
}

/// Writes payloads to the subscribers held in a shared registry
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriptionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Attempt delivery of `payload` to every current subscriber exactly once.
    pub fn broadcast(&self, payload: &Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        self.registry.retain(|id, sub| {
            match sub.payload_tx.try_send(payload.clone()) {
                Ok(()) => {
                    debug!(subscription_id = %id, "sending state diff payload to subscription");
                    report.delivered += 1;
                    true
                }
                Err(err) => {
                    let cause = match err {
                        TrySendError::Full(_) => "channel is full",
                        TrySendError::Closed(_) => "channel has no receiver",
                    };
                    info!(subscription_id = %id, cause, "unable to send payload to subscription; evicting");
                    if sub.signal(TerminationReason::Evicted) {
                        info!(subscription_id = %id, "closing subscription");
                    } else {
                        info!(subscription_id = %id, "unable to close subscription; control channel has no receiver");
                    }
                    report.evicted.push(id.clone());
                    false
                }
            }
        });

        report
    }

    /// Shutdown path: signal every subscriber and empty the registry.
    ///
    /// Returns how many subscriptions were terminated.
    pub fn close(&self) -> usize {
        self.registry.retain(|id, sub| {
            if sub.signal(TerminationReason::Shutdown) {
                info!(subscription_id = %id, "closing subscription");
            } else {
                info!(subscription_id = %id, "unable to close subscription; control channel has no receiver");
            }
            false
        })
    }
}
