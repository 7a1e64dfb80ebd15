pub mod consul;
pub mod http_client;
pub mod proxy;

/// Re-export commonly used types from adapters
pub use consul::ConsulCatalog;
pub use http_client::UpstreamClient;
pub use proxy::ProxyHandler;
