//! Lightweight metrics helpers for rudder.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is embedded:
//! an embedding application (or the binary's operator) installs whatever
//! compatible recorder it wants, and without one these calls are no-ops.
//!
//! Provided metrics:
//! * `rudder_requests_total` (counter; method, status)
//! * `rudder_request_duration_seconds` (histogram; method)
//! * `rudder_backend_requests_total` (counter; backend, status)
//! * `rudder_resolve_cache_total` (counter; outcome = hit|miss|coalesced|stale)
//! * `rudder_catalog_lookups_total` (counter; outcome = ok|error)
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use once_cell::sync::Lazy;

pub const RUDDER_REQUESTS_TOTAL: &str = "rudder_requests_total";
pub const RUDDER_REQUEST_DURATION_SECONDS: &str = "rudder_request_duration_seconds";
pub const RUDDER_BACKEND_REQUESTS_TOTAL: &str = "rudder_backend_requests_total";
pub const RUDDER_RESOLVE_CACHE_TOTAL: &str = "rudder_resolve_cache_total";
pub const RUDDER_CATALOG_LOOKUPS_TOTAL: &str = "rudder_catalog_lookups_total";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        RUDDER_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests handled by the router."
    );
    describe_histogram!(
        RUDDER_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests handled by the router."
    );
    describe_counter!(
        RUDDER_BACKEND_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests forwarded to upstream endpoints."
    );
    describe_counter!(
        RUDDER_RESOLVE_CACHE_TOTAL,
        Unit::Count,
        "Resolution cache operations by outcome (hit, miss, coalesced, stale)."
    );
    describe_counter!(
        RUDDER_CATALOG_LOOKUPS_TOTAL,
        Unit::Count,
        "Catalog agent lookups by outcome."
    );
});

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe() {
    Lazy::force(&DESCRIBED);
}

/// Count one handled inbound request.
pub fn increment_request_total(method: &str, status: u16) {
    counter!(
        RUDDER_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(method: &str, duration: Duration) {
    histogram!(
        RUDDER_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Count one forwarded backend request.
pub fn increment_backend_request_total(backend: &str, status: u16) {
    counter!(
        RUDDER_BACKEND_REQUESTS_TOTAL,
        "backend" => backend.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Count one resolution cache operation by outcome.
pub fn increment_resolve_cache(outcome: &'static str) {
    counter!(RUDDER_RESOLVE_CACHE_TOTAL, "outcome" => outcome).increment(1);
}

/// Count one catalog lookup by outcome.
pub fn increment_catalog_lookup(outcome: &'static str) {
    counter!(RUDDER_CATALOG_LOOKUPS_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_are_safe_without_a_recorder() {
        describe();
        increment_request_total("GET", 200);
        record_request_duration("GET", Duration::from_millis(12));
        increment_backend_request_total("10.0.0.7:8001", 200);
        increment_resolve_cache("hit");
        increment_catalog_lookup("ok");
    }
}
