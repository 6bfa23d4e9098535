//! Core types for courier
//!
//! This crate defines the types shared by the transaction pool and the
//! delegate engine:
//! - Answer: the single value delivered to a delegate-request callback
//! - TransactionId: the 16-character external transaction identifier
//! - PseudoRandomSource: fast 64-bit mixing generator for slot placement
//! - Tick / TickClock: coarse time used for expiry bookkeeping

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod answer;
pub mod error;
pub mod id;
pub mod random;
pub mod tick;

pub use answer::{Answer, AnswerCallback, ErrorCode};
pub use error::{CoreError, Result};
pub use id::TransactionId;
pub use random::PseudoRandomSource;
pub use tick::{Tick, TickClock};
