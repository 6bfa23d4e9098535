//! Unified error type for courier.
//!
//! Wraps the errors of the member crates so callers handle one type.

use crate::config::ConfigError;
use courier_concurrency::PoolError;
use courier_core::CoreError;
use courier_engine::EngineError;
use thiserror::Error;

/// All courier errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transaction pool error
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Delegate engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Malformed input outside the pool
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for courier operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a resource exhaustion error.
    ///
    /// Exhaustion is transient; the operation may succeed once transactions
    /// expire or queues drain.
    pub fn is_exhausted(&self) -> bool {
        match self {
            Error::Pool(e) => e.is_exhausted(),
            Error::Engine(e) => e.is_exhausted(),
            _ => false,
        }
    }

    /// Check if this is a malformed transaction id.
    pub fn is_malformed_id(&self) -> bool {
        match self {
            Error::Pool(e) => e.is_malformed_id(),
            Error::Core(CoreError::MalformedTransactionId { .. }) => true,
            _ => false,
        }
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if the service is shutting down.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Engine(EngineError::Shutdown))
    }
}
