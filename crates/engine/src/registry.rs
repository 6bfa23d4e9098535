//! Address-keyed connection registry
//!
//! Connections are created on first use and live as long as the registry.
//! Lookups take the read lock; only a miss takes the write lock, and the map is
//! checked again under it so concurrent callers agree on one connection.

use crate::address::DelegateAddress;
use crate::connection::DelegateConnection;
use crate::error::{EngineError, Result};
use crate::transport::Connector;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of distinct addresses
    pub max_connections: usize,
    /// Maximum number of queued requests per address
    pub max_pending_per_address: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            max_connections: 256,
            max_pending_per_address: 1024,
        }
    }
}

/// Map from address string to its shared connection
pub struct ConnectionRegistry {
    connections: RwLock<FxHashMap<String, Arc<DelegateConnection>>>,
    connector: Arc<dyn Connector>,
    config: RegistryConfig,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new(connector: Arc<dyn Connector>, config: RegistryConfig) -> Self {
        ConnectionRegistry {
            connections: RwLock::new(FxHashMap::default()),
            connector,
            config,
        }
    }

    /// Limits in effect
    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Connection for `address`, created if absent
    ///
    /// # Errors
    /// `InvalidAddress` if a new address does not parse, `TooManyConnections`
    /// if creating it would exceed `max_connections`.
    pub fn get_or_create(&self, address: &str) -> Result<Arc<DelegateConnection>> {
        if let Some(connection) = self.connections.read().get(address) {
            return Ok(Arc::clone(connection));
        }

        let parsed = DelegateAddress::parse(address)?;
        let mut connections = self.connections.write();
        if let Some(connection) = connections.get(address) {
            return Ok(Arc::clone(connection));
        }
        if connections.len() >= self.config.max_connections {
            return Err(EngineError::TooManyConnections {
                limit: self.config.max_connections,
            });
        }
        let connection = Arc::new(DelegateConnection::new(
            parsed,
            Arc::clone(&self.connector),
            self.config.max_pending_per_address,
        ));
        connections.insert(address.to_string(), Arc::clone(&connection));
        debug!(address, total = connections.len(), "Created delegate connection");
        Ok(connection)
    }

    /// Existing connection for `address`
    pub fn get(&self, address: &str) -> Option<Arc<DelegateConnection>> {
        self.connections.read().get(address).cloned()
    }

    /// Number of known addresses
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connection was created yet
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Snapshot of all connections
    pub fn connections(&self) -> Vec<Arc<DelegateConnection>> {
        self.connections.read().values().cloned().collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
