//! # Shared Types Crate
//!
//! Ledger entities shared by the chain and every subsystem that consumes
//! its committed-block feed.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Block, receipt and event shapes are defined
//!   once here and never redefined by consumers.
//! - **Hash Caching**: A `Block` computes its header hash once at
//!   construction; every later lookup is a field read.

pub mod entities;

pub use entities::*;
