//! Per-address delegate connection
//!
//! A connection serializes all requests to one address: at most one request is
//! in flight, the rest wait in a FIFO queue and are answered in submission
//! order.
//!
//! ## State machine
//!
//! ```text
//!            push (connect ok)         next_job
//!   Init ───────────────────▶ Connected ─────────▶ Processing
//!    ▲                          ▲                      │
//!    │                          └──── done ────────────┤
//!    │                          ┌─ reconnect ok ───────┘ (exchange failed)
//!    └──── reconnect failed: drop_all_pending_requests
//! ```
//!
//! While a reconnect is running the connection stays in `Processing` without a
//! channel, so new requests queue up behind it.
//!
//! Callbacks are never invoked while the connection lock is held, so a
//! callback may submit further requests to the same address. No connect runs
//! under the lock either.

use crate::address::DelegateAddress;
use crate::error::EngineError;
use crate::job::DelegateJob;
use crate::request::DelegateRequest;
use crate::transport::{Channel, Connector};
use courier_core::ErrorCode;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; the next push connects
    Init,
    /// Transport idle
    Connected,
    /// One request in flight
    Processing,
}

/// Request handed back by [`DelegateConnection::push`] when it could not be
/// queued
#[derive(Debug)]
pub struct ConnectFailure {
    /// The rejected request, callback not yet invoked
    pub request: DelegateRequest,
    /// Why it was rejected
    pub error: EngineError,
}

struct ConnectionInner {
    state: ConnectionState,
    queue: VecDeque<DelegateRequest>,
    channel: Option<Box<dyn Channel>>,
}

/// Request queue and transport state for one delegate address
pub struct DelegateConnection {
    address: DelegateAddress,
    connector: Arc<dyn Connector>,
    max_pending: usize,
    inner: Mutex<ConnectionInner>,
}

impl DelegateConnection {
    /// Create an unconnected connection
    ///
    /// `max_pending` bounds the number of queued (not yet dispatched) requests.
    pub fn new(address: DelegateAddress, connector: Arc<dyn Connector>, max_pending: usize) -> Self {
        DelegateConnection {
            address,
            connector,
            max_pending,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Init,
                queue: VecDeque::new(),
                channel: None,
            }),
        }
    }

    /// Target address
    pub fn address(&self) -> &DelegateAddress {
        &self.address
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Number of queued requests (excluding the one in flight)
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Queue a request
    ///
    /// Connects first, on the calling thread, if the connection is in `Init`.
    /// Returns the head job if the connection was idle; the caller hands it to
    /// the event loop. Otherwise the request waits until the job in flight
    /// completes.
    ///
    /// Two callers racing on an `Init` connection may both connect; the
    /// channel installed first wins and the other is dropped.
    ///
    /// # Errors
    /// The request is handed back untouched if the connect fails or the queue
    /// is full.
    pub fn push(
        self: &Arc<Self>,
        request: DelegateRequest,
    ) -> std::result::Result<Option<DelegateJob>, ConnectFailure> {
        let mut fresh: Option<Box<dyn Channel>> = None;
        loop {
            let mut inner = self.inner.lock();
            if inner.queue.len() >= self.max_pending {
                return Err(ConnectFailure {
                    request,
                    error: EngineError::QueueFull {
                        address: self.address.to_string(),
                        limit: self.max_pending,
                    },
                });
            }
            if inner.state == ConnectionState::Init {
                match fresh.take() {
                    Some(channel) => {
                        inner.channel = Some(channel);
                        inner.state = ConnectionState::Connected;
                    }
                    None => {
                        drop(inner);
                        match self.connector.connect(&self.address) {
                            Ok(channel) => {
                                fresh = Some(channel);
                                continue;
                            }
                            Err(error) => {
                                warn!(address = %self.address, error = %error, "Delegate connect failed");
                                return Err(ConnectFailure { request, error });
                            }
                        }
                    }
                }
            }
            inner.queue.push_back(request);
            return Ok(self.take_job(&mut inner));
        }
    }

    /// Exchange succeeded: `Processing -> Connected`, keep the channel
    pub fn done(&self, channel: Box<dyn Channel>) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Processing {
            inner.channel = Some(channel);
            inner.state = ConnectionState::Connected;
        }
    }

    /// Exchange failed: establish a fresh transport
    ///
    /// Returns a future that connects through
    /// [`Connector::connect_async`]; the event loop drives it alongside the
    /// other exchanges. On connect failure every queued request is answered
    /// with a failure and the connection goes back to `Init`. The future
    /// resolves to whether the connection is usable again.
    pub fn reconnect(self: &Arc<Self>) -> BoxFuture<'static, bool> {
        self.inner.lock().channel = None;
        let connect = self.connector.connect_async(&self.address);
        let connection = Arc::clone(self);
        Box::pin(async move {
            match connect.await {
                Ok(channel) => {
                    {
                        let mut inner = connection.inner.lock();
                        inner.channel = Some(channel);
                        inner.state = ConnectionState::Connected;
                    }
                    debug!(address = %connection.address, "Delegate connection re-established");
                    true
                }
                Err(error) => {
                    warn!(address = %connection.address, error = %error, "Delegate reconnect failed");
                    connection.drop_all_pending_requests(
                        ErrorCode::Dropped,
                        &format!("connection to {} lost: {}", connection.address, error),
                    );
                    false
                }
            }
        })
    }

    /// Dispatch the next queued request if the connection is idle
    pub fn next_job(self: &Arc<Self>) -> Option<DelegateJob> {
        let mut inner = self.inner.lock();
        self.take_job(&mut inner)
    }

    /// Answer every queued request with a failure and reset to `Init`
    ///
    /// Returns the number of requests dropped. Each callback is invoked
    /// exactly once, outside the connection lock.
    pub fn drop_all_pending_requests(&self, code: ErrorCode, message: &str) -> usize {
        let dropped: Vec<DelegateRequest> = {
            let mut inner = self.inner.lock();
            inner.state = ConnectionState::Init;
            inner.channel = None;
            inner.queue.drain(..).collect()
        };
        let count = dropped.len();
        for request in dropped {
            request.fail(code, message);
        }
        if count > 0 {
            warn!(address = %self.address, count, code = %code, "Dropped pending delegate requests");
        }
        count
    }

    fn take_job(self: &Arc<Self>, inner: &mut ConnectionInner) -> Option<DelegateJob> {
        if inner.state != ConnectionState::Connected || inner.queue.is_empty() {
            return None;
        }
        let channel = inner.channel.take()?;
        let request = inner.queue.pop_front()?;
        inner.state = ConnectionState::Processing;
        Some(DelegateJob::new(Arc::clone(self), request, channel))
    }
}

impl fmt::Debug for DelegateConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DelegateConnection")
            .field("address", &self.address.as_str())
            .field("state", &inner.state)
            .field("pending", &inner.queue.len())
            .finish()
    }
}
