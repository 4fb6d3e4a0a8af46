//! Domain layer: diff entities, payloads, subscriptions, registry and fan-out.

pub mod broadcaster;
pub mod payload;
pub mod registry;
pub mod state_diff;
pub mod subscription;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use payload::Payload;
pub use registry::SubscriptionRegistry;
pub use state_diff::{AccountDiff, StateDiff, StorageDiff};
pub use subscription::{Subscription, SubscriptionId, TerminationReason};
