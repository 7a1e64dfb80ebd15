//! Consul catalog adapter.
//!
//! Queries the agent's health-aware endpoint
//! (`/v1/health/service/<name>?passing`) so only instances with passing
//! checks come back. The adapter does not cache; it is the raw lookup behind
//! [`crate::core::resolver::ResolverCache`].
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use http_body_util::BodyExt;
use hyper::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Deserialize;

use crate::{
    core::endpoint::{Endpoint, ServiceKey},
    ports::catalog::{Catalog, CatalogError, CatalogResult},
};

/// Catalog adapter backed by a local Consul agent.
pub struct ConsulCatalog {
    address: String,
    client: Client<HttpConnector, Body>,
}

impl ConsulCatalog {
    /// `address` is the agent's `host:port` (no scheme); the agent speaks
    /// plain HTTP on the loopback in the expected deployment.
    pub fn new(address: &str, dial_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(dial_timeout));
        connector.set_nodelay(true);

        let client: Client<HttpConnector, Body> =
            Client::builder(TokioExecutor::new()).build(connector);

        Self {
            address: address.to_string(),
            client,
        }
    }

    fn lookup_uri(&self, key: &ServiceKey) -> String {
        // Keys are canonicalized DNS labels, safe to splice into the query.
        let mut uri = format!(
            "http://{}/v1/health/service/{}?passing",
            self.address, key.name
        );
        if !key.tag.is_empty() {
            uri.push_str("&tag=");
            uri.push_str(&key.tag);
        }
        uri
    }

    async fn query(&self, key: &ServiceKey) -> CatalogResult<Vec<Endpoint>> {
        let uri = self.lookup_uri(key);

        let request = Request::builder()
            .uri(uri.as_str())
            .body(Body::empty())
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Unavailable(format!(
                "agent returned {status} for {uri}"
            )));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|err| CatalogError::Unavailable(err.to_string()))?
            .to_bytes();

        let entries: Vec<HealthEntry> =
            serde_json::from_slice(&body).map_err(|err| CatalogError::Decode(err.to_string()))?;

        Ok(entries.into_iter().map(HealthEntry::into_endpoint).collect())
    }
}

#[async_trait]
impl Catalog for ConsulCatalog {
    async fn lookup(&self, key: &ServiceKey) -> CatalogResult<Vec<Endpoint>> {
        let result = self.query(key).await;
        match &result {
            Ok(_) => crate::metrics::increment_catalog_lookup("ok"),
            Err(_) => crate::metrics::increment_catalog_lookup("error"),
        }
        result
    }
}

/// One element of the agent's health response. Only the fields the router
/// consumes are modeled; everything else is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    node: NodeEntry,
    service: ServiceEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeEntry {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl HealthEntry {
    fn into_endpoint(self) -> Endpoint {
        // A service registered without its own address inherits the node's.
        let host = if self.service.address.is_empty() {
            self.node.address
        } else {
            self.service.address
        };

        Endpoint {
            host,
            port: self.service.port,
            tags: self.service.tags.unwrap_or_default(),
        }
    }
}
