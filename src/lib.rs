//! # Courier
//!
//! Delegate-request engine and transaction pool for a search service.
//!
//! A search instance often answers a query by asking its peers. Courier sends
//! those delegate requests over keep-alive HTTP/1.1 connections from a single
//! event loop thread, and keeps server-side transactions (cursors, partial
//! results) alive between client round trips under short opaque ids.
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier::prelude::*;
//!
//! let courier: Courier<Cursor> = Courier::from_config_file("courier.toml")?;
//!
//! // Delegate requests: answered exactly once, in order per address
//! courier.send("search-2:8080/query", "POST", body, |answer| {
//!     if answer.ok {
//!         merge(answer.body_str());
//!     }
//! });
//!
//! // Transactions: expire after their idle time unless fetched
//! let id = courier.create_transaction(cursor, 30)?;
//! if let Some(txn) = courier.fetch_transaction(&id.to_string())? {
//!     courier.return_transaction(txn)?;
//! }
//!
//! courier.shutdown();
//! ```
//!
//! ## Crates
//!
//! - `courier-core` - answers, error codes, transaction ids, ticks
//! - `courier-concurrency` - the sharded [`TransactionPool`]
//! - `courier-engine` - connections, event loop and HTTP transport

#![warn(missing_docs)]

mod config;
mod courier;
mod error;

pub mod prelude;

pub use crate::config::{
    ConfigError, ConnectionConfig, CourierConfig, EventLoopSection, TransactionConfig,
};
pub use crate::courier::{Courier, CourierBuilder};
pub use crate::error::{Error, Result};

pub use courier_concurrency::{PoolError, Transaction, TransactionPool};
pub use courier_core::{Answer, ErrorCode, Tick, TickClock, TransactionId};
pub use courier_engine::{Channel, Connector, EngineError, EventLoopStats, HttpConnector};
