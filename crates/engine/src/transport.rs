//! Transport seam of the delegate engine
//!
//! A [`Connector`] establishes a [`Channel`] to one address; a channel performs
//! one request/response exchange at a time and hands itself back when the
//! exchange succeeded. The connection object never looks inside either, which
//! is what lets tests replace the network.
//!
//! ## HTTP implementation
//!
//! ```text
//! HttpConnector::connect()          caller thread, blocking, bounded by connect_timeout
//!   └─ std::net::TcpStream
//! HttpConnector::connect_async()    event loop thread, after a failed exchange
//!   └─ lookup_host + tokio TcpStream + handshake, all under connect_timeout
//! HttpChannel::exchange()           event loop thread
//!   ├─ first use: tokio TcpStream + hyper http1 handshake, driver task spawned
//!   ├─ keep-alive closed by peer: async reconnect before sending
//!   └─ send request, collect body
//! ```

use crate::address::DelegateAddress;
use crate::error::{EngineError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Response of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw `Content-Type` header value
    pub content_type: Option<String>,
    /// Full response body
    pub body: Vec<u8>,
}

/// Request handed to a channel
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    /// HTTP method
    pub method: Method,
    /// Request body
    pub body: Bytes,
}

/// Outcome of an exchange: the response plus the channel for reuse
pub type ExchangeResult = Result<(RawResponse, Box<dyn Channel>)>;

/// Established transport to one address
pub trait Channel: Send + 'static {
    /// Perform one exchange
    ///
    /// The returned future runs on the event loop thread. On failure the
    /// channel is consumed and the connection reconnects.
    fn exchange(self: Box<Self>, request: ExchangeRequest) -> BoxFuture<'static, ExchangeResult>;
}

/// Factory for channels
pub trait Connector: Send + Sync + 'static {
    /// Establish a channel, blocking the calling thread for at most the
    /// connector's timeout
    ///
    /// Used when a caller pushes onto a connection without transport.
    fn connect(&self, address: &DelegateAddress) -> Result<Box<dyn Channel>>;

    /// Establish a channel from the event loop
    ///
    /// Must return without blocking; all I/O happens inside the future, which
    /// runs on the loop's runtime.
    fn connect_async(&self, address: &DelegateAddress) -> BoxFuture<'static, Result<Box<dyn Channel>>>;
}

// ============================================================================
// HTTP/1.1 over hyper
// ============================================================================

/// Connector opening plain HTTP/1.1 connections
#[derive(Debug, Clone)]
pub struct HttpConnector {
    connect_timeout: Duration,
    content_type: Option<HeaderValue>,
}

impl HttpConnector {
    /// Create a connector
    ///
    /// `content_type` is sent with every non-empty request body. A value that
    /// is not a valid header is ignored.
    pub fn new(connect_timeout: Duration, content_type: Option<&str>) -> Self {
        HttpConnector {
            connect_timeout,
            content_type: content_type.and_then(|ct| HeaderValue::from_str(ct).ok()),
        }
    }

    fn connect_stream(&self, address: &DelegateAddress) -> Result<TcpStream> {
        let connect_error = |message: String| EngineError::Connect {
            address: address.to_string(),
            message,
        };
        let candidates: Vec<SocketAddr> = (address.host(), address.port())
            .to_socket_addrs()
            .map_err(|e| connect_error(e.to_string()))?
            .collect();

        let mut last_error = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .and_then(|_| stream.set_nonblocking(true))
                        .map_err(|e| connect_error(e.to_string()))?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(connect_error(match last_error {
            Some(e) => e.to_string(),
            None => "host resolved to no addresses".to_string(),
        }))
    }
}

impl Connector for HttpConnector {
    fn connect(&self, address: &DelegateAddress) -> Result<Box<dyn Channel>> {
        let stream = self.connect_stream(address)?;
        debug!(address = %address, "Connected delegate channel");
        Ok(Box::new(HttpChannel {
            address: address.clone(),
            connect_timeout: self.connect_timeout,
            content_type: self.content_type.clone(),
            link: HttpLink::Fresh(stream),
        }))
    }

    fn connect_async(&self, address: &DelegateAddress) -> BoxFuture<'static, Result<Box<dyn Channel>>> {
        let address = address.clone();
        let connect_timeout = self.connect_timeout;
        let content_type = self.content_type.clone();
        Box::pin(async move {
            let sender = open(&address, connect_timeout).await?;
            debug!(address = %address, "Reconnected delegate channel");
            let channel: Box<dyn Channel> = Box::new(HttpChannel {
                address,
                connect_timeout,
                content_type,
                link: HttpLink::Ready(sender),
            });
            Ok(channel)
        })
    }
}

enum HttpLink {
    /// Connected socket, handshake not done yet (needs the loop's runtime)
    Fresh(TcpStream),
    Ready(SendRequest<Full<Bytes>>),
}

struct HttpChannel {
    address: DelegateAddress,
    connect_timeout: Duration,
    content_type: Option<HeaderValue>,
    link: HttpLink,
}

impl Channel for HttpChannel {
    fn exchange(self: Box<Self>, request: ExchangeRequest) -> BoxFuture<'static, ExchangeResult> {
        Box::pin(async move {
            let HttpChannel {
                address,
                connect_timeout,
                content_type,
                link,
            } = *self;

            let mut sender = match link {
                HttpLink::Ready(sender) if !sender.is_closed() => sender,
                HttpLink::Ready(_) => {
                    debug!(address = %address, "Keep-alive connection closed by peer, reconnecting");
                    open(&address, connect_timeout).await?
                }
                HttpLink::Fresh(stream) => {
                    let stream = tokio::net::TcpStream::from_std(stream)
                        .map_err(|e| connect_failed(&address, e))?;
                    handshake(&address, stream).await?
                }
            };

            sender
                .ready()
                .await
                .map_err(|e| EngineError::Request(e.to_string()))?;

            let mut builder = Request::builder()
                .method(request.method)
                .uri(address.path())
                .header(HOST, address.authority());
            if let Some(content_type) = &content_type {
                if !request.body.is_empty() {
                    builder = builder.header(CONTENT_TYPE, content_type.clone());
                }
            }
            let http_request = builder
                .body(Full::new(request.body))
                .map_err(|e| EngineError::Request(e.to_string()))?;

            let response = sender
                .send_request(http_request)
                .await
                .map_err(|e| EngineError::Request(e.to_string()))?;
            let status = response.status().as_u16();
            let content_type_header = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| EngineError::Request(e.to_string()))?
                .to_bytes()
                .to_vec();

            let channel: Box<dyn Channel> = Box::new(HttpChannel {
                address,
                connect_timeout,
                content_type,
                link: HttpLink::Ready(sender),
            });
            Ok((
                RawResponse {
                    status,
                    content_type: content_type_header,
                    body,
                },
                channel,
            ))
        })
    }
}

fn connect_failed(address: &DelegateAddress, error: impl ToString) -> EngineError {
    EngineError::Connect {
        address: address.to_string(),
        message: error.to_string(),
    }
}

/// Resolve, connect and handshake without blocking the runtime thread
async fn open(
    address: &DelegateAddress,
    connect_timeout: Duration,
) -> Result<SendRequest<Full<Bytes>>> {
    let stream = tokio::time::timeout(connect_timeout, async {
        let candidates = tokio::net::lookup_host((address.host(), address.port()))
            .await
            .map_err(|e| connect_failed(address, e))?;
        let mut last_error = None;
        for candidate in candidates {
            match tokio::net::TcpStream::connect(candidate).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => connect_failed(address, e),
            None => connect_failed(address, "host resolved to no addresses"),
        })
    })
    .await
    .map_err(|_| connect_failed(address, "connect timed out"))??;
    stream
        .set_nodelay(true)
        .map_err(|e| connect_failed(address, e))?;
    tokio::time::timeout(connect_timeout, handshake(address, stream))
        .await
        .map_err(|_| connect_failed(address, "handshake timed out"))?
}

async fn handshake(
    address: &DelegateAddress,
    stream: tokio::net::TcpStream,
) -> Result<SendRequest<Full<Bytes>>> {
    let (sender, connection) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| connect_failed(address, e))?;

    let target = address.to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(address = %target, error = %e, "Delegate connection closed with error");
        }
    });
    Ok(sender)
}
