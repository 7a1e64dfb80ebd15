use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use hyper::{Request, Response};
use thiserror::Error;

/// Errors produced while forwarding a request to an upstream endpoint.
///
/// All of these surface as 502 when they occur before response headers have
/// been relayed; a failure mid-body severs the client connection instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The upstream could not be dialed.
    #[error("failed to connect to upstream: {0}")]
    Connect(String),

    /// The upstream accepted the connection but did not return response
    /// headers within the configured read timeout.
    #[error("upstream did not return headers within {0:?}")]
    HeaderTimeout(Duration),

    /// Any other transport-level failure while exchanging the request.
    #[error("upstream i/o error: {0}")]
    Io(String),
}

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// UpstreamTransport defines the port (interface) for the shared outbound
/// HTTP client used to forward rewritten requests.
///
/// The response body is handed back as a stream; the proxy handler relays it
/// without buffering.
#[async_trait]
pub trait UpstreamTransport: Send + Sync + 'static {
    /// Forward a fully rewritten request and return the upstream response.
    async fn forward(&self, req: Request<Body>) -> TransportResult<Response<Body>>;
}
