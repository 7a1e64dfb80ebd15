use async_trait::async_trait;
use thiserror::Error;

use crate::core::endpoint::{Endpoint, ServiceKey};

/// Errors produced while querying the service catalog.
///
/// An empty endpoint set is NOT an error: `Ok(vec![])` is the catalog's
/// authoritative "no healthy endpoints" answer and is cached like any other
/// result.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CatalogError {
    /// The catalog agent could not be reached or failed at the transport level.
    #[error("catalog agent unavailable: {0}")]
    Unavailable(String),

    /// The agent answered but the response could not be parsed.
    #[error("catalog response invalid: {0}")]
    Decode(String),
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog defines the port (interface) for resolving a service selector
/// against an external service-discovery agent.
///
/// Implementations are stateless with respect to results: caching and
/// request coalescing live in [`crate::core::resolver::ResolverCache`].
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    /// Return the healthy endpoints of `key.name`, restricted to endpoints
    /// carrying `key.tag` when the tag is non-empty, in the order the
    /// catalog reports them.
    async fn lookup(&self, key: &ServiceKey) -> CatalogResult<Vec<Endpoint>>;
}
