//! Queued delegate requests

use bytes::Bytes;
use courier_core::{Answer, AnswerCallback, ErrorCode};
use hyper::Method;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

/// One request waiting in a connection queue
///
/// Owns the caller's callback. Consuming the request through
/// [`DelegateRequest::answer`] or [`DelegateRequest::fail`] is the only way the
/// callback is ever invoked, so each request is answered at most once.
pub struct DelegateRequest {
    pub(crate) method: Method,
    pub(crate) body: Bytes,
    pub(crate) callback: AnswerCallback,
}

impl DelegateRequest {
    /// Create a request
    pub fn new(
        method: Method,
        body: impl Into<Bytes>,
        callback: impl FnOnce(Answer) + Send + 'static,
    ) -> Self {
        DelegateRequest {
            method,
            body: body.into(),
            callback: Box::new(callback),
        }
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Deliver `answer` to the callback
    pub fn answer(self, answer: Answer) {
        deliver(self.callback, answer);
    }

    /// Deliver a synthesized failure answer
    pub fn fail(self, code: ErrorCode, message: impl Into<String>) {
        self.answer(Answer::failure(code, message));
    }
}

impl fmt::Debug for DelegateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateRequest")
            .field("method", &self.method)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// Invoke a callback, containing a panic inside it
///
/// Callbacks run on the event loop thread; one misbehaving caller must not
/// take the loop down.
pub(crate) fn deliver(callback: AnswerCallback, answer: Answer) {
    let status = answer.http_status;
    if catch_unwind(AssertUnwindSafe(move || callback(answer))).is_err() {
        error!(status, "Answer callback panicked");
    }
}
