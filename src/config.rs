//! Service configuration
//!
//! Loaded from TOML; every key is optional and falls back to its default.
//!
//! ```toml
//! [transactions]
//! max_idle_time = 600          # seconds
//! transactions_per_tick = 4
//!
//! [event_loop]
//! wake_period_ms = 1000
//! ticker_job_interval = 64
//! request_timeout_ms = 30000
//! connect_timeout_ms = 3000
//!
//! [connections]
//! max_connections = 256
//! max_pending_per_address = 1024
//! content_type = "application/json; charset=utf-8"
//! ```

use courier_engine::{EventLoopConfig, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML or has wrongly typed keys
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("validation error: {0}")]
    Validation(String),
}

/// Transaction pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Longest idle time a transaction may ask for, in ticks (seconds)
    pub max_idle_time: u64,
    /// Expected transaction creations per tick; rounded up to a power of two
    pub transactions_per_tick: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        TransactionConfig {
            max_idle_time: 600,
            transactions_per_tick: 4,
        }
    }
}

/// Event loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopSection {
    /// Longest wait between ticker runs
    pub wake_period_ms: u64,
    /// Completed jobs after which tickers run early
    pub ticker_job_interval: u64,
    /// Upper bound for one delegate exchange
    pub request_timeout_ms: u64,
    /// Upper bound for establishing a connection
    pub connect_timeout_ms: u64,
}

impl Default for EventLoopSection {
    fn default() -> Self {
        EventLoopSection {
            wake_period_ms: 1000,
            ticker_job_interval: 64,
            request_timeout_ms: 30_000,
            connect_timeout_ms: 3000,
        }
    }
}

/// Delegate connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Maximum number of distinct delegate addresses
    pub max_connections: usize,
    /// Maximum queued requests per address
    pub max_pending_per_address: usize,
    /// Content type sent with non-empty request bodies
    pub content_type: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            max_connections: 256,
            max_pending_per_address: 1024,
            content_type: Some("application/json; charset=utf-8".to_string()),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// `[transactions]`
    pub transactions: TransactionConfig,
    /// `[event_loop]`
    pub event_loop: EventLoopSection,
    /// `[connections]`
    pub connections: ConnectionConfig,
}

impl CourierConfig {
    /// Load and validate a TOML file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::load_str(&content)
    }

    /// Parse and validate TOML text
    pub fn load_str(content: &str) -> Result<Self, ConfigError> {
        let config: CourierConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |value: u64, key: &str| {
            if value == 0 {
                Err(ConfigError::Validation(format!("{} must be positive", key)))
            } else {
                Ok(())
            }
        };
        positive(self.transactions.max_idle_time, "transactions.max_idle_time")?;
        positive(
            self.transactions.transactions_per_tick as u64,
            "transactions.transactions_per_tick",
        )?;
        positive(self.event_loop.wake_period_ms, "event_loop.wake_period_ms")?;
        positive(self.event_loop.ticker_job_interval, "event_loop.ticker_job_interval")?;
        positive(self.event_loop.request_timeout_ms, "event_loop.request_timeout_ms")?;
        positive(self.event_loop.connect_timeout_ms, "event_loop.connect_timeout_ms")?;
        positive(self.connections.max_connections as u64, "connections.max_connections")?;
        positive(
            self.connections.max_pending_per_address as u64,
            "connections.max_pending_per_address",
        )?;
        Ok(())
    }

    pub(crate) fn event_loop_config(&self) -> EventLoopConfig {
        EventLoopConfig {
            wake_period: Duration::from_millis(self.event_loop.wake_period_ms),
            ticker_job_interval: self.event_loop.ticker_job_interval,
            request_timeout: Duration::from_millis(self.event_loop.request_timeout_ms),
        }
    }

    pub(crate) fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_connections: self.connections.max_connections,
            max_pending_per_address: self.connections.max_pending_per_address,
        }
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.event_loop.connect_timeout_ms)
    }
}
