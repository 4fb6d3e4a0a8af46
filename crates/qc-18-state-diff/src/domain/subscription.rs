//! Subscriber identity and sinks.

use super::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Opaque subscription identifier (hex string, RPC style)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Fresh random id: `0x` followed by 32 hex digits
    pub fn random() -> Self {
        Self(format!("0x{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SubscriptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Why a subscription was terminated by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The payload sink was full or closed
    Evicted,
    /// Removed through an explicit unsubscribe
    Unsubscribed,
    /// The dispatcher shut down
    Shutdown,
}

/// A registered consumer.
///
/// Both sinks are owned by the consumer; the dispatcher only ever writes,
/// and only with `try_send`.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub payload_tx: mpsc::Sender<Payload>,
    pub control_tx: mpsc::Sender<TerminationReason>,
}

impl Subscription {
    pub fn new(
        payload_tx: mpsc::Sender<Payload>,
        control_tx: mpsc::Sender<TerminationReason>,
    ) -> Self {
        Self {
            payload_tx,
            control_tx,
        }
    }

    /// Best-effort termination signal; returns whether it was accepted
    pub fn signal(&self, reason: TerminationReason) -> bool {
        self.control_tx.try_send(reason).is_ok()
    }
}
