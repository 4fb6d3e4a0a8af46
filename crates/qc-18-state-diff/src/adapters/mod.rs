//! Adapters for the outbound ports

pub mod memory_chain;
pub mod rlp_encoder;

pub use memory_chain::InMemoryChain;
pub use rlp_encoder::{decode_state_diff, RlpPayloadEncoder};
