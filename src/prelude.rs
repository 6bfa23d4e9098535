//! Convenient imports for courier.
//!
//! ```ignore
//! use courier::prelude::*;
//!
//! let courier: Courier<Cursor> = Courier::builder().open()?;
//! ```

// Main entry point
pub use crate::courier::{Courier, CourierBuilder};
pub use crate::config::CourierConfig;

// Error handling
pub use crate::error::{Error, Result};

// Delegate answers
pub use courier_core::{Answer, ErrorCode};

// Transactions
pub use courier_concurrency::{Transaction, TransactionPool};
pub use courier_core::{Tick, TransactionId};
