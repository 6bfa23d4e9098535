//! Error types shared by courier crates

use thiserror::Error;

/// Errors raised by the core value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A transaction identifier did not have the expected shape
    #[error("malformed transaction id {id:?}: {reason}")]
    MalformedTransactionId {
        /// The rejected input
        id: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
