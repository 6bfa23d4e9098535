//! Transaction pool errors

use courier_core::CoreError;
use thiserror::Error;

/// Errors returned by [`crate::TransactionPool`] operations
///
/// An unknown or expired id is not an error: `fetch` returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No free index entry or storage slot within the probing bound
    #[error("transaction pool exhausted: {0}")]
    Exhausted(&'static str),

    /// The id string could not be decoded
    #[error(transparent)]
    MalformedId(#[from] CoreError),

    /// Pool construction parameters out of range
    #[error("invalid transaction pool configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Check if this is a resource exhaustion error
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::Exhausted(_))
    }

    /// Check if this is a malformed id error
    pub fn is_malformed_id(&self) -> bool {
        matches!(self, PoolError::MalformedId(_))
    }
}

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;
