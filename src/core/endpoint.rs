use std::fmt;

/// A reachable upstream address implementing a service.
///
/// Endpoints are value objects: two endpoints with the same address and tags
/// are interchangeable, and a resolved set is an immutable snapshot of what
/// the catalog returned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tags: Vec<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(host: impl Into<String>, port: u16, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            host: host.into(),
            port,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// The `host:port` form used as the rewritten request authority.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The `(service, tag)` selector used as the resolution cache key.
///
/// An empty tag means "no tag filter". Both fields are canonicalized to
/// lowercase on construction so that `Api.Example.Com` and `api.example.com`
/// share a cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub name: String,
    pub tag: String,
}

impl ServiceKey {
    pub fn new(name: impl AsRef<str>, tag: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().to_ascii_lowercase(),
            tag: tag.as_ref().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.tag, self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_authority() {
        let endpoint = Endpoint::new("10.0.0.7", 8001);
        assert_eq!(endpoint.authority(), "10.0.0.7:8001");
        assert_eq!(endpoint.to_string(), "10.0.0.7:8001");
    }

    #[test]
    fn test_endpoint_tags() {
        let endpoint = Endpoint::with_tags("10.0.0.7", 8001, ["zone-a", "canary"]);
        assert!(endpoint.has_tag("zone-a"));
        assert!(endpoint.has_tag("canary"));
        assert!(!endpoint.has_tag("zone-b"));

        let untagged = Endpoint::new("10.0.0.8", 8002);
        assert!(!untagged.has_tag("zone-a"));
    }

    #[test]
    fn test_service_key_canonicalized() {
        assert_eq!(
            ServiceKey::new("Api", "Zone-A"),
            ServiceKey::new("api", "zone-a")
        );
    }

    #[test]
    fn test_service_key_display() {
        assert_eq!(ServiceKey::new("api", "").to_string(), "api");
        assert_eq!(ServiceKey::new("api", "zone-a").to_string(), "zone-a.api");
    }
}
