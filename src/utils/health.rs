//! Process health status.
//!
//! A single atomic carries the HTTP status the health listener serves.
//! The only transition is `200 → 503` when draining begins; the status never
//! goes back, so load balancers that saw 503 can trust the instance is on
//! its way out.
use std::sync::atomic::{AtomicU16, Ordering};

use hyper::StatusCode;

pub struct HealthState {
    status: AtomicU16,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            status: AtomicU16::new(StatusCode::OK.as_u16()),
        }
    }

    /// The status currently served by the health endpoint.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status.load(Ordering::Acquire))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Flip the health status to 503. Called once when shutdown begins;
    /// there is deliberately no way back to 200.
    pub fn set_draining(&self) {
        self.status
            .store(StatusCode::SERVICE_UNAVAILABLE.as_u16(), Ordering::Release);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_healthy() {
        let health = HealthState::new();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[test]
    fn test_draining_is_monotonic() {
        let health = HealthState::new();
        health.set_draining();
        assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);

        // A second drain is a no-op; the status stays 503.
        health.set_draining();
        assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
