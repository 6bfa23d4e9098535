//! Delegate request answers
//!
//! Every delegate request submitted to the engine ends in exactly one
//! [`Answer`], handed to the caller's [`AnswerCallback`]. Transport failures
//! never surface as errors to the submitting thread; they are synthesized into
//! a failed answer here.
//!
//! ## Application error codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 Ok | Exchange completed with a 2xx status |
//! | 1 InvalidAddress | Address could not be parsed |
//! | 2 InvalidMethod | HTTP method token invalid |
//! | 3 ConnectFailed | TCP connect or handshake failed |
//! | 4 RequestFailed | I/O failure during the exchange |
//! | 5 Timeout | Exchange exceeded the request timeout |
//! | 6 RemoteError | Peer answered with a non-2xx status |
//! | 7 Dropped | Request dropped after the connection could not recover |
//! | 8 Shutdown | Event loop stopped before the request completed |
//! | 9 Internal | Bug while servicing the request |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Callback receiving the answer of one delegate request.
///
/// Called at most once, from the event loop thread or from the submitting
/// thread when a request is rejected before it is queued.
pub type AnswerCallback = Box<dyn FnOnce(Answer) + Send + 'static>;

/// Application-level error classification carried by an [`Answer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// No error
    Ok = 0,
    /// Delegate address could not be parsed
    InvalidAddress = 1,
    /// HTTP method token invalid
    InvalidMethod = 2,
    /// Connection could not be established
    ConnectFailed = 3,
    /// I/O failure while exchanging the request
    RequestFailed = 4,
    /// Exchange timed out
    Timeout = 5,
    /// Remote answered with an error status
    RemoteError = 6,
    /// Pending request dropped after reconnect failure
    Dropped = 7,
    /// Engine shut down before completion
    Shutdown = 8,
    /// Internal error (bug or invariant violation)
    Internal = 9,
}

impl ErrorCode {
    /// Numeric value of the code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// HTTP status synthesized for a request failing with this code
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::Ok => 200,
            ErrorCode::InvalidAddress | ErrorCode::InvalidMethod => 400,
            ErrorCode::ConnectFailed | ErrorCode::Dropped | ErrorCode::Shutdown => 503,
            ErrorCode::RequestFailed | ErrorCode::RemoteError => 502,
            ErrorCode::Timeout => 504,
            ErrorCode::Internal => 500,
        }
    }

    /// Stable name of the code
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Ok => "Ok",
            ErrorCode::InvalidAddress => "InvalidAddress",
            ErrorCode::InvalidMethod => "InvalidMethod",
            ErrorCode::ConnectFailed => "ConnectFailed",
            ErrorCode::RequestFailed => "RequestFailed",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::RemoteError => "RemoteError",
            ErrorCode::Dropped => "Dropped",
            ErrorCode::Shutdown => "Shutdown",
            ErrorCode::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one delegate request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// True if the exchange completed with a 2xx status
    pub ok: bool,
    /// HTTP status (received or synthesized)
    pub http_status: u16,
    /// Application error code
    pub app_error_code: ErrorCode,
    /// Error description for failed answers
    pub error_message: Option<String>,
    /// Media type of the body without parameters
    pub content_type: Option<String>,
    /// Charset parameter of the content type
    pub charset: Option<String>,
    /// Response body
    pub body: Option<Vec<u8>>,
}

impl Answer {
    /// Answer built from a completed HTTP exchange.
    ///
    /// `content_type_header` is the raw `Content-Type` header value, split
    /// into media type and charset. Non-2xx statuses produce a failed answer
    /// that still carries the body.
    pub fn from_response(
        http_status: u16,
        content_type_header: Option<&str>,
        body: Vec<u8>,
    ) -> Self {
        let (content_type, charset) = match content_type_header {
            Some(header) => split_content_type(header),
            None => (None, None),
        };
        let ok = (200..300).contains(&http_status);
        Answer {
            ok,
            http_status,
            app_error_code: if ok { ErrorCode::Ok } else { ErrorCode::RemoteError },
            error_message: if ok {
                None
            } else {
                Some(format!("delegate request answered with status {}", http_status))
            },
            content_type,
            charset,
            body: if body.is_empty() { None } else { Some(body) },
        }
    }

    /// Synthesized failure answer
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Answer {
            ok: false,
            http_status: code.http_status(),
            app_error_code: code,
            error_message: Some(message.into()),
            content_type: None,
            charset: None,
            body: None,
        }
    }

    /// Body as UTF-8 text, if present and valid
    pub fn body_str(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Split `application/json; charset=UTF-8` into `("application/json", "utf-8")`
fn split_content_type(header: &str) -> (Option<String>, Option<String>) {
    let mut parts = header.split(';');
    let media = parts
        .next()
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty());
    let charset = parts.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    });
    (media, charset)
}
