//! rudder - a service-discovery-driven HTTP reverse proxy.
//!
//! rudder accepts HTTP requests on a public listener, interprets the `Host`
//! header as a service identifier scoped to a configured parent domain,
//! resolves that identifier against a Consul agent into a set of healthy
//! endpoints, selects one endpoint per request with a soft tag preference,
//! and forwards the request over a pooled HTTP transport.
//!
//! # Features
//! - `(service, tag)` hostname parsing: `api.example.com` and
//!   `zone-a.api.example.com` address the same service, the latter with an
//!   additional selector
//! - Single-flight resolution cache: a flood of concurrent requests for a
//!   cold hostname costs the catalog agent exactly one lookup
//! - Stale-if-error: an expired endpoint set keeps serving while the catalog
//!   is down
//! - Streaming proxying with hop-by-hop header hygiene and
//!   `X-Forwarded-For` / `X-Forwarded-Host` / `X-Forwarded-Proto`
//! - Graceful draining: the health endpoint flips to 503 before the listener
//!   closes; a second signal forces an immediate stop
//! - Structured tracing via `tracing` and exporter-agnostic `metrics`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use rudder::{
//!     adapters::{ConsulCatalog, ProxyHandler, UpstreamClient},
//!     config::RouterConfig,
//!     core::ResolverCache,
//! };
//!
//! let config = RouterConfig::default();
//! let catalog = Arc::new(ConsulCatalog::new(&config.consul, config.dial_timeout));
//! let resolver = ResolverCache::new(catalog, config.cache_ttl);
//! let transport = Arc::new(UpstreamClient::new(&config));
//! let handler = Arc::new(ProxyHandler::new(resolver, transport, &config));
//! // Wire `handler` into an axum catch-all route (see the binary crate).
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! and keeps the request-independent logic inside `core`. The catalog and the
//! outbound transport are both behind traits so tests can stub them.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the types the binary crate wires together.
pub use crate::{
    adapters::{ConsulCatalog, ProxyHandler, UpstreamClient},
    config::{Args, RouterConfig},
    core::{Endpoint, ResolverCache, ServiceKey},
    utils::{GracefulShutdown, HealthState, ShutdownReason},
};
