//! Error types for the state diff subsystem

use crate::domain::SubscriptionId;
use crate::ports::{BuilderError, EncodingError, EventSourceError};
use thiserror::Error;

/// Result type alias for state diff operations
pub type Result<T> = std::result::Result<T, StateDiffError>;

/// Errors that can occur while streaming state diffs
#[derive(Debug, Error)]
pub enum StateDiffError {
    /// The parent of a committed block could not be resolved
    #[error("Parent block not found for block {height} (parent 0x{parent})", parent = hex::encode(.parent_hash))]
    ParentBlockNotFound {
        /// Height of the block whose parent is missing
        height: u64,
        /// Declared parent hash
        parent_hash: [u8; 32],
    },

    /// The diff builder failed for a block
    #[error("Error building statediff: {0}")]
    Builder(#[from] BuilderError),

    /// Payload encoding failed
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The chain event source failed; terminal for the dispatch loop
    #[error("Chain event source error: {0}")]
    EventSource(#[from] EventSourceError),

    /// Unsubscribe for an id that is not registered
    #[error("cannot unsubscribe; subscription for id {0} does not exist")]
    SubscriptionNotFound(SubscriptionId),

    /// `start` called while the dispatch loop is already running
    #[error("State diff service already started")]
    AlreadyStarted,

    /// `start` called after the dispatch loop has stopped
    #[error("State diff service already stopped; it cannot be restarted")]
    AlreadyStopped,

    /// `start` called outside a Tokio runtime
    #[error("No Tokio runtime available to spawn the dispatch loop")]
    NoRuntime,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StateDiffError {
    /// Per-event failures: the event is dropped and the loop carries on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ParentBlockNotFound { .. } | Self::Builder(_) | Self::Encoding(_)
        )
    }

    /// Failures that terminate the dispatch loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EventSource(_))
    }
}
