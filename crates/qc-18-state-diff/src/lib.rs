//! # Quantum Chain - State Diff Streaming (Subsystem 18)
//!
//! **Bounded Context:** State Diff Streaming
//! **Architecture Compliance:** DDD + Hexagonal + EDA + TDD
//!
//! ## Purpose
//!
//! Listens to the committed-block feed and, for every new block, computes
//! the state diff against its parent, encodes it, and pushes it to every
//! live subscriber:
//! - Zero work while nobody is subscribed (activity gate)
//! - Empty diffs are never sent
//! - A subscriber whose sink is full is evicted, never waited on
//! - Shutdown signals every subscriber exactly once
//!
//! ## Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Adapters (Outer)                                   │
//! │  - InMemoryChain: event feed + block/receipt ledger │
//! │  - RlpPayloadEncoder: deterministic RLP             │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Ports (Middle)                                     │
//! │  - Inbound: StateDiffApi                            │
//! │  - Outbound: ChainEventSource, BlockReader,         │
//! │              StateDiffBuilder, PayloadEncoder       │
//! └─────────────────────────────────────────────────────┘
//!                         │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (Inner)                                     │
//! │  - SubscriptionRegistry + activity gate             │
//! │  - Broadcaster (non-blocking fan-out, eviction)     │
//! │  - StateDiff / Payload                              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Event Flow
//!
//! ```text
//! chain feed ──► Dispatcher ──► StateDiffBuilder ──► PayloadEncoder
//!                    │                                     │
//!                    │  (gate closed: drop)                ▼
//!                    └──────────────────────────────► Broadcaster ──► subscribers
//! ```
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! let service = StateDiffService::new(StateDiffConfig::default(), chain, builder)?;
//! let mut stream = service.stream();
//! service.start()?;
//! while let Some(payload) = stream.recv().await {
//!     // payload.state_diff_rlp
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`domain`]: Diff entities, registry and fan-out
//! - [`ports`]: Hexagonal architecture interfaces (inbound/outbound)
//! - [`adapters`]: In-memory chain and RLP encoder
//! - [`dispatcher`]: The per-block processing loop
//! - [`service`]: Lifecycle and subscription API

#![warn(clippy::all)]

pub mod adapters;
pub mod dispatcher;
pub mod domain;
pub mod ports;
pub mod service;
/// Test doubles shared with the integration tests
pub mod test_utils;

mod config;
mod error;
mod metrics;

pub use config::StateDiffConfig;
pub use error::{Result, StateDiffError};
pub use metrics::Metrics;

pub use adapters::{decode_state_diff, InMemoryChain, RlpPayloadEncoder};
pub use dispatcher::{DispatchState, Dispatcher, ProcessOutcome};
pub use domain::{
    AccountDiff, BroadcastReport, Payload, StateDiff, StorageDiff, SubscriptionId,
    SubscriptionRegistry, TerminationReason,
};
pub use ports::{
    BlockReader, BuilderError, ChainEventSource, ChainEventSubscription, EncodingError,
    EventSourceError, PayloadEncoder, StateDiffApi, StateDiffBuilder,
};
pub use service::{StateDiffService, StateDiffStream};

/// Subsystem identifier
pub const SUBSYSTEM_ID: u8 = 18;

/// Default buffer between the chain feed and the dispatch loop
pub const CHAIN_EVENT_CHANNEL_SIZE: usize = 20_000;

/// Default per-subscriber payload buffer
pub const PAYLOAD_CHANNEL_SIZE: usize = 20_000;
