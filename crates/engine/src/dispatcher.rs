//! `send` entry point
//!
//! Resolves the connection for an address, queues the request on it, and hands
//! the head job to the event loop when the connection was idle.

use crate::connection::ConnectFailure;
use crate::event_loop::EventLoop;
use crate::registry::ConnectionRegistry;
use crate::request::DelegateRequest;
use courier_core::{Answer, ErrorCode};
use hyper::Method;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes requests from caller threads onto connections and the loop
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    event_loop: Arc<EventLoop>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and a loop
    pub fn new(registry: Arc<ConnectionRegistry>, event_loop: Arc<EventLoop>) -> Self {
        Dispatcher {
            registry,
            event_loop,
        }
    }

    /// Connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Event loop
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.event_loop
    }

    /// Send `body` to `address` and answer through `callback`
    ///
    /// Returns `true` when the callback has been or will be invoked exactly
    /// once. An unparsable method or address, a failed connect and a stopped
    /// loop are all reported through the callback. Returns `false`, without
    /// invoking the callback, only when the registry or the address's queue is
    /// full.
    pub fn send(
        &self,
        address: &str,
        method: &str,
        body: impl Into<bytes::Bytes>,
        callback: impl FnOnce(Answer) + Send + 'static,
    ) -> bool {
        let method = match Method::from_bytes(method.as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                warn!(address, method, "Rejected delegate request with invalid method");
                callback(Answer::failure(
                    ErrorCode::InvalidMethod,
                    format!("invalid request method {:?}", method),
                ));
                return true;
            }
        };
        if self.event_loop.is_stopped() {
            callback(Answer::failure(ErrorCode::Shutdown, "event loop stopped"));
            return true;
        }

        let connection = match self.registry.get_or_create(address) {
            Ok(connection) => connection,
            Err(error) if error.is_exhausted() => {
                warn!(address, error = %error, "Delegate request rejected");
                return false;
            }
            Err(error) => {
                warn!(address, error = %error, "Delegate request failed before dispatch");
                callback(Answer::failure(error.code(), error.to_string()));
                return true;
            }
        };

        match connection.push(DelegateRequest::new(method, body, callback)) {
            Ok(Some(job)) => {
                // A stopped loop aborts the job itself
                self.event_loop.push_job(job);
                true
            }
            Ok(None) => {
                debug!(address, pending = connection.pending(), "Delegate request queued");
                true
            }
            Err(ConnectFailure { error, .. }) if error.is_exhausted() => {
                warn!(address, error = %error, "Delegate request rejected");
                false
            }
            Err(ConnectFailure { request, error }) => {
                request.fail(error.code(), error.to_string());
                true
            }
        }
    }
}
