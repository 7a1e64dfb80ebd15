use async_trait::async_trait;
use axum::body::Body;
use hyper::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::timeout;

use crate::{
    config::RouterConfig,
    ports::upstream::{TransportError, TransportResult, UpstreamTransport},
};

/// Shared outbound HTTP client (HTTP/1.1, plain `http`).
///
/// One instance is built at startup and shared by every request handler.
/// The pool keys connections by authority and reuses idle ones within the
/// configured caps; the response-header deadline is enforced around the
/// request future, after which the body streams without a transport-imposed
/// time bound.
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    read_timeout: std::time::Duration,
}

impl UpstreamClient {
    pub fn new(config: &RouterConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.dial_timeout));
        connector.set_nodelay(true);

        let mut builder = Client::builder(TokioExecutor::new());
        builder
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_conns_per_host)
            .http1_max_buf_size(config.max_header_bytes);

        Self {
            client: builder.build(connector),
            read_timeout: config.read_timeout,
        }
    }
}

#[async_trait]
impl UpstreamTransport for UpstreamClient {
    async fn forward(&self, req: Request<Body>) -> TransportResult<Response<Body>> {
        let response = match timeout(self.read_timeout, self.client.request(req)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) if err.is_connect() => {
                return Err(TransportError::Connect(err.to_string()));
            }
            Ok(Err(err)) => return Err(TransportError::Io(err.to_string())),
            Err(_) => return Err(TransportError::HeaderTimeout(self.read_timeout)),
        };

        // Hand the body back as a stream; hyper re-frames it on the way out.
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_failure_maps_to_connect_error() {
        // Bind a listener to claim a port, then drop it so nothing is there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let config = RouterConfig {
            dial_timeout: std::time::Duration::from_millis(500),
            read_timeout: std::time::Duration::from_secs(1),
            ..RouterConfig::default()
        };
        let transport = UpstreamClient::new(&config);

        let req = Request::builder()
            .uri(format!("http://{addr}/"))
            .body(Body::empty())
            .expect("request");

        match transport.forward(req).await {
            Err(TransportError::Connect(_)) => {}
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
