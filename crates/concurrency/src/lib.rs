//! Concurrency layer for courier
//!
//! This crate implements the transaction pool:
//! - TransactionPool: sliding-window slot table keyed by pseudo-random ids
//! - Transaction: owned execution context checked out of / into the pool
//! - Lock sharding: fixed number of mutexes per array, never two held at once
//! - Cooperative expiry driven by externally supplied ticks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod pool;
mod slots;
pub mod transaction;

pub use error::{PoolError, Result};
pub use pool::{TransactionPool, NOF_SHARDS, PROBE_BANDS};
pub use transaction::Transaction;
