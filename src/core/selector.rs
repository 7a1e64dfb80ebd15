//! Endpoint selection with a soft tag preference.
//!
//! Preference is an affinity, not a filter: when no endpoint carries the
//! preferred tag the router still serves from the full set, trading affinity
//! for availability. Selection is uniformly random so a fleet of routers
//! converges to a uniform distribution without any shared state.
use rand::Rng;

use crate::core::endpoint::Endpoint;

/// Pick one endpoint from a resolved set.
///
/// Returns `None` only when `endpoints` is empty. When `prefer` is non-empty
/// and at least one endpoint carries the tag, the draw is restricted to the
/// tagged subset.
pub fn select<'a>(endpoints: &'a [Endpoint], prefer: &str) -> Option<&'a Endpoint> {
    if endpoints.is_empty() {
        return None;
    }

    if !prefer.is_empty() {
        let preferred: Vec<&Endpoint> = endpoints.iter().filter(|e| e.has_tag(prefer)).collect();
        if !preferred.is_empty() {
            let index = rand::rng().random_range(0..preferred.len());
            return Some(preferred[index]);
        }
    }

    let index = rand::rng().random_range(0..endpoints.len());
    Some(&endpoints[index])
}
