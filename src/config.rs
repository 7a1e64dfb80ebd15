//! Process configuration.
//!
//! rudder is configured entirely through command-line flags, one per knob,
//! with defaults chosen for a sidecar deployment next to a local Consul
//! agent. The parsed flags are normalized once into an immutable
//! [`RouterConfig`] that lives for the whole process.
use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

use clap::Parser;
use thiserror::Error;

/// Command-line flags.
#[derive(Parser, Debug)]
#[command(name = "rudder", version, about = "Service-discovery-driven HTTP reverse proxy")]
pub struct Args {
    /// The network address on which the router listens for incoming connections
    #[arg(long = "bind-http", default_value = ":4000")]
    pub bind_http: String,

    /// The network address on which the router listens for health checks
    #[arg(long = "bind-health-check")]
    pub bind_health_check: Option<String>,

    /// The address at which the router can access a consul agent
    #[arg(long = "consul", default_value = "localhost:8500")]
    pub consul: String,

    /// The domain for which the router will accept requests
    #[arg(long = "domain", default_value = "localhost")]
    pub domain: String,

    /// Endpoints with a tag matching the preferred value are favored by the router
    #[arg(long = "prefer", default_value = "")]
    pub prefer: String,

    /// The timeout for cached hostname resolutions
    #[arg(long = "cache-timeout", default_value = "10s", value_parser = humantime::parse_duration)]
    pub cache_timeout: Duration,

    /// The timeout for dialing tcp connections
    #[arg(long = "dial-timeout", default_value = "10s", value_parser = humantime::parse_duration)]
    pub dial_timeout: Duration,

    /// The timeout for reading http response headers
    #[arg(long = "read-timeout", default_value = "30s", value_parser = humantime::parse_duration)]
    pub read_timeout: Duration,

    /// The timeout for writing http requests
    #[arg(long = "write-timeout", default_value = "30s", value_parser = humantime::parse_duration)]
    pub write_timeout: Duration,

    /// The timeout for idle connections
    #[arg(long = "idle-timeout", default_value = "90s", value_parser = humantime::parse_duration)]
    pub idle_timeout: Duration,

    /// The timeout for shutting down the router
    #[arg(long = "shutdown-timeout", default_value = "10s", value_parser = humantime::parse_duration)]
    pub shutdown_timeout: Duration,

    /// The maximum number of idle connections kept
    #[arg(long = "max-idle-conns", default_value_t = 10_000)]
    pub max_idle_conns: usize,

    /// The maximum number of idle connections kept per host
    #[arg(long = "max-idle-conns-per-host", default_value_t = 100)]
    pub max_idle_conns_per_host: usize,

    /// The maximum number of bytes allowed in http headers
    #[arg(long = "max-header-bytes", default_value_t = 65_536)]
    pub max_header_bytes: usize,

    /// When set the router will ask upstreams for compressed payloads
    #[arg(long = "enable-compression")]
    pub enable_compression: bool,
}

/// Configuration errors surfaced at startup; all of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address {address:?}: {reason}")]
    InvalidBindAddress { address: String, reason: String },

    #[error("domain must not be empty")]
    EmptyDomain,
}

/// Immutable router configuration, normalized from [`Args`].
///
/// `domain` always carries a leading `.` so request handling never has to
/// prepend it. `max_idle_conns` documents the intended global idle bound;
/// the underlying pool enforces the per-host cap.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub bind_http: SocketAddr,
    pub bind_health: Option<SocketAddr>,
    pub consul: String,
    pub domain: String,
    pub prefer: String,
    pub cache_ttl: Duration,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub max_idle_conns: usize,
    pub max_idle_conns_per_host: usize,
    pub max_header_bytes: usize,
    pub enable_compression: bool,
}

impl RouterConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if args.domain.is_empty() {
            return Err(ConfigError::EmptyDomain);
        }

        let bind_health = match &args.bind_health_check {
            Some(address) => Some(parse_bind_addr(address)?),
            None => None,
        };

        Ok(Self {
            bind_http: parse_bind_addr(&args.bind_http)?,
            bind_health,
            consul: args.consul,
            domain: normalize_domain(&args.domain),
            prefer: args.prefer.to_ascii_lowercase(),
            cache_ttl: args.cache_timeout,
            dial_timeout: args.dial_timeout,
            read_timeout: args.read_timeout,
            write_timeout: args.write_timeout,
            idle_timeout: args.idle_timeout,
            shutdown_timeout: args.shutdown_timeout,
            max_idle_conns: args.max_idle_conns,
            max_idle_conns_per_host: args.max_idle_conns_per_host,
            max_header_bytes: args.max_header_bytes,
            enable_compression: args.enable_compression,
        })
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind_http: SocketAddr::from(([0, 0, 0, 0], 4000)),
            bind_health: None,
            consul: "localhost:8500".to_string(),
            domain: ".localhost".to_string(),
            prefer: String::new(),
            cache_ttl: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            shutdown_timeout: Duration::from_secs(10),
            max_idle_conns: 10_000,
            max_idle_conns_per_host: 100,
            max_header_bytes: 65_536,
            enable_compression: false,
        }
    }
}

/// Prefix the domain with `.` so it does not have to be done over and over
/// in each request.
fn normalize_domain(domain: &str) -> String {
    let domain = domain.to_ascii_lowercase();
    if domain.starts_with('.') {
        domain
    } else {
        format!(".{domain}")
    }
}

/// Accept `host:port` or the bare `:port` form and resolve to one address.
fn parse_bind_addr(address: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    };

    candidate
        .to_socket_addrs()
        .map_err(|err| ConfigError::InvalidBindAddress {
            address: address.to_string(),
            reason: err.to_string(),
        })?
        .next()
        .ok_or_else(|| ConfigError::InvalidBindAddress {
            address: address.to_string(),
            reason: "resolved to no addresses".to_string(),
        })
}
