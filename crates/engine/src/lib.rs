//! Delegate-request engine for courier
//!
//! This crate issues outbound HTTP requests to other service instances:
//! - DelegateConnection: FIFO queue and state machine for one address
//! - ConnectionRegistry: create-on-demand map from address to connection
//! - DelegateJob: one request in flight, paired with its connection
//! - EventLoop: single thread multiplexing all exchanges, woken by a channel
//! - Dispatcher: the `send` entry point tying the above together
//! - Connector / Channel: transport seam, HTTP/1.1 over hyper by default

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod event_loop;
pub mod job;
pub mod registry;
pub mod request;
pub mod transport;

pub use address::DelegateAddress;
pub use connection::{ConnectFailure, ConnectionState, DelegateConnection};
pub use dispatcher::Dispatcher;
pub use error::{EngineError, Result};
pub use event_loop::{EventLoop, EventLoopConfig, EventLoopStats, Ticker};
pub use job::DelegateJob;
pub use registry::{ConnectionRegistry, RegistryConfig};
pub use request::DelegateRequest;
pub use transport::{
    Channel, Connector, ExchangeRequest, ExchangeResult, HttpConnector, RawResponse,
};
