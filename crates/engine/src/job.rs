//! Delegate jobs
//!
//! A [`DelegateJob`] is the head request of a connection together with the
//! connection's channel, created when the connection goes from idle to busy.
//! The event loop splits it into the exchange future and an [`InFlightJob`]
//! that keeps the callback until the exchange finishes.
//!
//! ## Completion
//!
//! ```text
//! 1. build the answer (response, or failure synthesized from the error)
//! 2. invoke the callback
//! 3. connection.done() on success, connection.reconnect() on failure
//! 4. connection.next_job() -> re-dispatched by the loop
//! ```
//!
//! A reconnect is a future of its own; the loop runs it next to the other
//! exchanges and takes step 4 once it resolved.

use crate::address::DelegateAddress;
use crate::connection::DelegateConnection;
use crate::request::{deliver, DelegateRequest};
use crate::transport::{Channel, ExchangeRequest, ExchangeResult};
use courier_core::{Answer, AnswerCallback, ErrorCode};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Request ready to be exchanged on its connection's channel
///
/// Dropping a job that was never started answers its request with an
/// internal error, so a callback is never silently lost.
pub struct DelegateJob {
    connection: Arc<DelegateConnection>,
    request: Option<DelegateRequest>,
    channel: Option<Box<dyn Channel>>,
}

impl DelegateJob {
    pub(crate) fn new(
        connection: Arc<DelegateConnection>,
        request: DelegateRequest,
        channel: Box<dyn Channel>,
    ) -> Self {
        DelegateJob {
            connection,
            request: Some(request),
            channel: Some(channel),
        }
    }

    /// Connection the job belongs to
    pub fn connection(&self) -> &Arc<DelegateConnection> {
        &self.connection
    }

    /// Target address
    pub fn address(&self) -> &DelegateAddress {
        self.connection.address()
    }

    /// The request about to be sent
    pub fn request(&self) -> Option<&DelegateRequest> {
        self.request.as_ref()
    }

    /// Fail the job and everything queued behind it
    pub fn abort(mut self, code: ErrorCode, message: &str) {
        if let Some(request) = self.request.take() {
            request.fail(code, message);
        }
        self.channel = None;
        self.connection.drop_all_pending_requests(code, message);
    }

    /// Split into the bookkeeping half and the exchange future
    pub(crate) fn start(mut self) -> Option<(InFlightJob, BoxFuture<'static, ExchangeResult>)> {
        let (request, channel) = match (self.request.take(), self.channel.take()) {
            (Some(request), Some(channel)) => (request, channel),
            (request, _) => {
                if let Some(request) = request {
                    request.fail(ErrorCode::Internal, "delegate job has no channel");
                }
                return None;
            }
        };
        let DelegateRequest {
            method,
            body,
            callback,
        } = request;
        let exchange = channel.exchange(ExchangeRequest { method, body });
        Some((
            InFlightJob {
                connection: Arc::clone(&self.connection),
                callback,
                started: Instant::now(),
            },
            exchange,
        ))
    }
}

impl Drop for DelegateJob {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            warn!(address = %self.connection.address(), "Delegate job dropped before dispatch");
            request.fail(ErrorCode::Internal, "delegate job dropped before dispatch");
        }
    }
}

impl fmt::Debug for DelegateJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateJob")
            .field("address", &self.address().as_str())
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// What the loop does after a job completed
pub(crate) enum Followup {
    /// Connection idle or nothing queued
    Idle,
    /// Next queued request, ready to dispatch
    Dispatch(DelegateJob),
    /// Transport lost; drive the reconnect, then ask for the next job
    Reconnect(Arc<DelegateConnection>),
}

/// Job whose exchange is running on the event loop
pub(crate) struct InFlightJob {
    connection: Arc<DelegateConnection>,
    callback: AnswerCallback,
    started: Instant,
}

impl InFlightJob {
    /// Connection the job belongs to
    pub(crate) fn connection(&self) -> &Arc<DelegateConnection> {
        &self.connection
    }

    /// Deliver the answer, update the connection, and say what comes next
    pub(crate) fn complete(self, result: ExchangeResult) -> Followup {
        let address = self.connection.address();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match result {
            Ok((response, channel)) => {
                debug!(address = %address, status = response.status, elapsed_ms, "Delegate request completed");
                deliver(
                    self.callback,
                    Answer::from_response(
                        response.status,
                        response.content_type.as_deref(),
                        response.body,
                    ),
                );
                self.connection.done(channel);
            }
            Err(error) => {
                warn!(address = %address, error = %error, elapsed_ms, "Delegate request failed");
                deliver(self.callback, Answer::failure(error.code(), error.to_string()));
                return Followup::Reconnect(self.connection);
            }
        }
        match self.connection.next_job() {
            Some(job) => Followup::Dispatch(job),
            None => Followup::Idle,
        }
    }

    /// Fail the job and everything queued behind it
    pub(crate) fn abort(self, code: ErrorCode, message: &str) {
        deliver(self.callback, Answer::failure(code, message));
        self.connection.drop_all_pending_requests(code, message);
    }
}
