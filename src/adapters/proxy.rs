//! The proxy request pipeline.
//!
//! Per request: parse the `Host` header into a service selector, resolve it
//! through the cache, pick one endpoint, rewrite the request, forward it over
//! the shared transport and stream the response back. Resolution and
//! selection failures map to client-facing statuses; nothing is retried.
use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::body::Body;
use eyre::{Result, WrapErr};
use hyper::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Request, Response, StatusCode, Uri, Version,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    config::RouterConfig,
    core::{
        endpoint::Endpoint, host::HostError, parse_service_host, resolver::ResolverCache, selector,
    },
    metrics,
    ports::upstream::UpstreamTransport,
    tracing_setup,
};

/// Headers defined as connection-local; they never cross the proxy in either
/// direction (RFC 7230 §6.1).
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// HTTP handler proxying every inbound request to a resolved upstream.
pub struct ProxyHandler {
    resolver: ResolverCache,
    transport: Arc<dyn UpstreamTransport>,
    domain: String,
    prefer: String,
    enable_compression: bool,
}

impl ProxyHandler {
    pub fn new(
        resolver: ResolverCache,
        transport: Arc<dyn UpstreamTransport>,
        config: &RouterConfig,
    ) -> Self {
        Self {
            resolver,
            transport,
            domain: config.domain.clone(),
            prefer: config.prefer.clone(),
            enable_compression: config.enable_compression,
        }
    }

    /// Main request handler. Infallible: every failure mode becomes a status
    /// response so the caller never has to synthesize one.
    pub async fn handle(
        &self,
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Response<Body> {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let request_id = Uuid::new_v4().to_string();
        let client_ip = client_addr.map(|addr| addr.ip().to_string());

        let span = tracing_setup::create_request_span(
            method.as_str(),
            &path,
            &request_id,
            client_ip.as_deref(),
        );

        let response = async {
            let response = self.route(req, client_addr).await;
            let duration = start.elapsed();

            tracing::Span::current().record("http.status_code", response.status().as_u16());
            tracing::Span::current().record("duration_ms", duration.as_millis() as u64);
            tracing::info!(
                status = response.status().as_u16(),
                duration_ms = duration.as_millis() as u64,
                "request completed"
            );

            metrics::increment_request_total(method.as_str(), response.status().as_u16());
            metrics::record_request_duration(method.as_str(), duration);

            response
        }
        .instrument(span)
        .await;

        response
    }

    async fn route(&self, req: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let Some(host) = requested_host(&req) else {
            return status_response(StatusCode::BAD_REQUEST, "missing host");
        };

        let key = match parse_service_host(&host, &self.domain) {
            Ok(key) => key,
            Err(HostError::UnknownDomain { .. }) => {
                return status_response(StatusCode::NOT_FOUND, "unknown domain");
            }
            Err(HostError::InvalidHost { .. }) => {
                return status_response(StatusCode::BAD_REQUEST, "invalid host");
            }
        };
        tracing::Span::current().record("service", tracing::field::display(&key));

        let endpoints = match self.resolver.resolve(&key).await {
            Ok(endpoints) => endpoints,
            Err(err) => {
                tracing::warn!(service = %key, error = %err, "service resolution failed");
                return status_response(StatusCode::BAD_GATEWAY, "service resolution failed");
            }
        };

        let Some(endpoint) = selector::select(&endpoints, &self.prefer).cloned() else {
            return status_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &format!("no healthy endpoints for service {}", key.name),
            );
        };
        tracing::Span::current().record("backend", tracing::field::display(&endpoint));

        let outbound = match self.rewrite(req, &host, &endpoint, client_addr) {
            Ok(outbound) => outbound,
            Err(err) => {
                tracing::error!(backend = %endpoint, error = %err, "failed to rewrite request");
                return status_response(StatusCode::BAD_GATEWAY, "bad upstream address");
            }
        };

        let backend_start = Instant::now();
        match self.transport.forward(outbound).await {
            Ok(mut response) => {
                strip_hop_by_hop(response.headers_mut());
                metrics::increment_backend_request_total(
                    &endpoint.authority(),
                    response.status().as_u16(),
                );
                tracing::debug!(
                    backend = %endpoint,
                    backend_status = response.status().as_u16(),
                    backend_duration_ms = backend_start.elapsed().as_millis() as u64,
                    "backend response"
                );
                response
            }
            Err(err) => {
                metrics::increment_backend_request_total(&endpoint.authority(), 502);
                tracing::error!(
                    backend = %endpoint,
                    error = %err,
                    backend_duration_ms = backend_start.elapsed().as_millis() as u64,
                    "backend request failed"
                );
                status_response(StatusCode::BAD_GATEWAY, "upstream request failed")
            }
        }
    }

    /// Turn the inbound request into the outbound one: new authority, same
    /// path and query, forwarding headers, hop-by-hop headers dropped.
    fn rewrite(
        &self,
        req: Request<Body>,
        inbound_host: &str,
        endpoint: &Endpoint,
        client_addr: Option<SocketAddr>,
    ) -> Result<Request<Body>> {
        let (mut parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let authority = endpoint.authority();
        parts.uri = format!("http://{authority}{path_and_query}")
            .parse::<Uri>()
            .wrap_err("invalid upstream uri")?;
        parts.version = Version::HTTP_11;

        strip_hop_by_hop(&mut parts.headers);

        if let Some(addr) = client_addr {
            append_forwarded_for(&mut parts.headers, addr);
        }
        if !parts.headers.contains_key(X_FORWARDED_HOST) {
            parts.headers.insert(
                X_FORWARDED_HOST,
                HeaderValue::from_str(inbound_host).wrap_err("invalid inbound host")?,
            );
        }
        if !parts.headers.contains_key(X_FORWARDED_PROTO) {
            parts
                .headers
                .insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        }
        if !self.enable_compression {
            parts.headers.remove(header::ACCEPT_ENCODING);
        }

        parts.headers.insert(
            header::HOST,
            HeaderValue::from_str(&authority).wrap_err("invalid upstream authority")?,
        );

        Ok(Request::from_parts(parts, body))
    }
}

/// The hostname the client asked for: the URI authority (HTTP/2) or the
/// `Host` header (HTTP/1.1).
fn requested_host(req: &Request<Body>) -> Option<String> {
    req.uri()
        .authority()
        .map(|authority| authority.to_string())
        .or_else(|| {
            req.headers()
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
}

/// Drop hop-by-hop headers, including anything the `Connection` header names.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let connection_named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in connection_named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Append the inbound peer to `X-Forwarded-For`, preserving any chain an
/// earlier proxy already recorded.
fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

fn status_response(status: StatusCode, message: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(message.to_string()))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = status;
            response
        })
}
