//! Delegate engine errors

use courier_core::ErrorCode;
use std::time::Duration;
use thiserror::Error;

/// Errors of the delegate engine
///
/// Only construction failures and resource exhaustion reach the submitting
/// caller directly. Everything that happens after a request was accepted is
/// turned into a failed [`courier_core::Answer`] via [`EngineError::code`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Address could not be parsed
    #[error("invalid delegate address {address:?}: {reason}")]
    InvalidAddress {
        /// The rejected address
        address: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Method token is not a valid HTTP method
    #[error("invalid request method {0:?}")]
    InvalidMethod(String),

    /// Connection could not be established
    #[error("connect to {address} failed: {message}")]
    Connect {
        /// Target address
        address: String,
        /// Underlying error
        message: String,
    },

    /// I/O or protocol failure during an exchange
    #[error("delegate request failed: {0}")]
    Request(String),

    /// Exchange exceeded the request timeout
    #[error("delegate request timed out after {0:?}")]
    Timeout(Duration),

    /// Too many requests queued for one address
    #[error("request queue for {address} is full ({limit} pending)")]
    QueueFull {
        /// Target address
        address: String,
        /// Configured limit
        limit: usize,
    },

    /// Connection registry reached its limit
    #[error("too many delegate connections (limit {limit})")]
    TooManyConnections {
        /// Configured limit
        limit: usize,
    },

    /// Event loop stopped
    #[error("event loop stopped")]
    Shutdown,

    /// Event loop was already started
    #[error("event loop already started")]
    AlreadyStarted,

    /// Runtime, thread or wake channel could not be created
    #[error("event loop resources unavailable: {0}")]
    Runtime(#[from] std::io::Error),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Application error code reported in a failed answer
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidAddress { .. } => ErrorCode::InvalidAddress,
            EngineError::InvalidMethod(_) => ErrorCode::InvalidMethod,
            EngineError::Connect { .. } => ErrorCode::ConnectFailed,
            EngineError::Request(_) => ErrorCode::RequestFailed,
            EngineError::Timeout(_) => ErrorCode::Timeout,
            EngineError::QueueFull { .. } | EngineError::TooManyConnections { .. } => {
                ErrorCode::Internal
            }
            EngineError::Shutdown => ErrorCode::Shutdown,
            EngineError::AlreadyStarted | EngineError::Runtime(_) | EngineError::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }

    /// Check if this is a resource exhaustion error
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            EngineError::QueueFull { .. } | EngineError::TooManyConnections { .. }
        )
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
