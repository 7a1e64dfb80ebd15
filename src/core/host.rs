//! Host header → service selector parsing.
//!
//! The router scopes every inbound hostname to a configured parent domain.
//! Within that domain a single label names a service (`api.example.com`),
//! and a second label refines the selection with a tag
//! (`zone-a.api.example.com`). Deeper label structures are rejected; clients
//! address a flavor of a service, not an arbitrary subtree.
use thiserror::Error;

use crate::core::endpoint::ServiceKey;

/// Errors produced while mapping a `Host` header to a service selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The hostname is not under the domain served by this router.
    #[error("host {host:?} is not under the served domain")]
    UnknownDomain { host: String },

    /// The hostname is under the served domain but does not name a service.
    #[error("host {host:?} does not name a service")]
    InvalidHost { host: String },
}

/// Parse an inbound `Host` header into a [`ServiceKey`].
///
/// `domain` is the normalized parent domain and must carry a leading `.`
/// (see [`crate::config::RouterConfig`]). Any `:port` suffix on the host is
/// ignored and matching is case-insensitive.
pub fn parse_service_host(host: &str, domain: &str) -> Result<ServiceKey, HostError> {
    let name = strip_port(host).to_ascii_lowercase();

    let Some(remainder) = name.strip_suffix(domain) else {
        return Err(HostError::UnknownDomain {
            host: host.to_string(),
        });
    };

    let mut labels = remainder.split('.');
    let invalid = || HostError::InvalidHost {
        host: host.to_string(),
    };

    match (labels.next(), labels.next(), labels.next()) {
        (Some(service), None, None) if !service.is_empty() => Ok(ServiceKey::new(service, "")),
        (Some(tag), Some(service), None) if !tag.is_empty() && !service.is_empty() => {
            Ok(ServiceKey::new(service, tag))
        }
        _ => Err(invalid()),
    }
}

/// Drop a trailing `:port` when the suffix is numeric. Hostnames never
/// contain a colon otherwise, so anything else is left untouched.
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = ".example.com";

    #[test]
    fn test_single_label_is_service_name() {
        assert_eq!(
            parse_service_host("api.example.com", DOMAIN),
            Ok(ServiceKey::new("api", ""))
        );
    }

    #[test]
    fn test_two_labels_are_tag_and_service() {
        assert_eq!(
            parse_service_host("zone-a.api.example.com", DOMAIN),
            Ok(ServiceKey::new("api", "zone-a"))
        );
    }

    #[test]
    fn test_port_suffix_is_ignored() {
        assert_eq!(
            parse_service_host("api.example.com:4000", DOMAIN),
            Ok(ServiceKey::new("api", ""))
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(
            parse_service_host("API.Example.COM", DOMAIN),
            Ok(ServiceKey::new("api", ""))
        );
        assert_eq!(
            parse_service_host("Zone-A.API.example.com", DOMAIN),
            Ok(ServiceKey::new("api", "zone-a"))
        );
    }

    #[test]
    fn test_foreign_domain_is_rejected() {
        assert_eq!(
            parse_service_host("api.other.com", DOMAIN),
            Err(HostError::UnknownDomain {
                host: "api.other.com".to_string()
            })
        );
    }

    #[test]
    fn test_three_labels_are_rejected() {
        assert_eq!(
            parse_service_host("a.b.api.example.com", DOMAIN),
            Err(HostError::InvalidHost {
                host: "a.b.api.example.com".to_string()
            })
        );
    }

    #[test]
    fn test_bare_domain_is_rejected() {
        assert_eq!(
            parse_service_host(".example.com", DOMAIN),
            Err(HostError::InvalidHost {
                host: ".example.com".to_string()
            })
        );
    }

    #[test]
    fn test_empty_labels_are_rejected() {
        assert!(parse_service_host("a..example.com", DOMAIN).is_err());
        assert!(parse_service_host("..example.com", DOMAIN).is_err());
    }

    #[test]
    fn test_domain_suffix_must_be_a_label_boundary() {
        // "notexample.com" must not match ".example.com"
        assert_eq!(
            parse_service_host("api.notexample.com", DOMAIN),
            Err(HostError::UnknownDomain {
                host: "api.notexample.com".to_string()
            })
        );
    }

    #[test]
    fn test_non_numeric_port_suffix_is_kept() {
        // A colon suffix that is not a port number is part of the (invalid) name.
        assert!(parse_service_host("api.example.com:abc", DOMAIN).is_err());
    }
}
