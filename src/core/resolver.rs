//! Single-flight, TTL-based resolution cache.
//!
//! The cache memoizes catalog answers by `(service, tag)` key and coalesces
//! concurrent misses for the same key into one in-flight query, so a flood of
//! requests for a cold hostname costs the catalog agent exactly one lookup.
//!
//! Locking discipline: one mutex, held only for map bookkeeping. The catalog
//! query itself runs on a detached task and publishes its outcome through a
//! `watch` channel stored in the entry; every caller (the leader included)
//! awaits that channel. A caller that goes away mid-refresh therefore never
//! cancels the refresh for its peers.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::sync::watch;

use crate::{
    core::endpoint::{Endpoint, ServiceKey},
    metrics,
    ports::catalog::{Catalog, CatalogError},
};

/// Soft cap on cached keys. Overflow drops expired entries first, then the
/// least-recently-resolved ones; entries with an active refresh are never
/// evicted.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Error handed to resolvers when a lookup fails with no stale fallback.
///
/// Cloneable because one refresh outcome fans out to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("catalog agent unavailable: {0}")]
    Unavailable(String),

    #[error("catalog response invalid: {0}")]
    Decode(String),
}

impl From<CatalogError> for ResolveError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Unavailable(msg) => Self::Unavailable(msg),
            CatalogError::Decode(msg) => Self::Decode(msg),
        }
    }
}

type FlightOutcome = Result<Vec<Endpoint>, ResolveError>;
type FlightReceiver = watch::Receiver<Option<FlightOutcome>>;

struct Entry {
    /// `None` until the first successful resolution; `Some(vec![])` is the
    /// authoritative "no healthy endpoints" answer and is served until expiry.
    endpoints: Option<Vec<Endpoint>>,
    deadline: Instant,
    resolved_at: Instant,
    inflight: Option<FlightReceiver>,
}

impl Entry {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            endpoints: None,
            deadline: now,
            resolved_at: now,
            inflight: None,
        }
    }
}

struct Inner {
    catalog: Arc<dyn Catalog>,
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<ServiceKey, Entry>>,
}

/// The resolution cache. Cheap to clone (Arc inside); one instance is shared
/// by every request handler.
#[derive(Clone)]
pub struct ResolverCache {
    inner: Arc<Inner>,
}

impl ResolverCache {
    pub fn new(catalog: Arc<dyn Catalog>, ttl: Duration) -> Self {
        Self::with_capacity(catalog, ttl, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(catalog: Arc<dyn Catalog>, ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                ttl,
                capacity,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Resolve a service selector to its current endpoint set.
    ///
    /// Fresh entries are answered from memory. A miss (or an expired entry)
    /// starts one catalog query; concurrent callers for the same key attach
    /// to it instead of issuing their own. On refresh failure the previous
    /// endpoint set is served when one exists (stale-if-error, deadline left
    /// untouched so the next caller retries); otherwise the error is
    /// returned and nothing is cached.
    pub async fn resolve(&self, key: &ServiceKey) -> Result<Vec<Endpoint>, ResolveError> {
        let mut rx = {
            let mut entries = self.lock_entries();
            let now = Instant::now();
            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);

            if let Some(rx) = &entry.inflight {
                metrics::increment_resolve_cache("coalesced");
                rx.clone()
            } else if entry.deadline > now && entry.endpoints.is_some() {
                metrics::increment_resolve_cache("hit");
                return Ok(entry.endpoints.clone().unwrap_or_default());
            } else {
                metrics::increment_resolve_cache("miss");
                self.begin_refresh(key, entry)
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map(|published| (*published).clone())
            .map_err(|_| {
                ResolveError::Unavailable("resolution task exited before publishing".to_string())
            })?;

        outcome.unwrap_or_else(|| {
            Err(ResolveError::Unavailable(
                "resolution task exited before publishing".to_string(),
            ))
        })
    }

    /// Number of cached keys, including expired and in-flight entries.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install the inflight handle on `entry` and spawn the catalog query on
    /// a detached task. Called with the entries lock held; the lock is not
    /// carried into the query.
    fn begin_refresh(&self, key: &ServiceKey, entry: &mut Entry) -> FlightReceiver {
        let (tx, rx) = watch::channel(None);
        entry.inflight = Some(rx.clone());

        let cache = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let result = cache.inner.catalog.lookup(&key).await;
            let outcome = cache.commit(&key, result);
            let _ = tx.send(Some(outcome));
        });

        rx
    }

    /// Fold a finished catalog query back into the cache and produce the
    /// outcome every waiter receives.
    fn commit(
        &self,
        key: &ServiceKey,
        result: Result<Vec<Endpoint>, CatalogError>,
    ) -> FlightOutcome {
        let mut entries = self.lock_entries();
        let mut drop_entry = false;

        let outcome = match entries.get_mut(key) {
            Some(entry) => {
                entry.inflight = None;
                match result {
                    Ok(endpoints) => {
                        let now = Instant::now();
                        entry.endpoints = Some(endpoints.clone());
                        entry.deadline = now + self.inner.ttl;
                        entry.resolved_at = now;
                        Ok(endpoints)
                    }
                    Err(err) => match entry.endpoints.clone() {
                        Some(prior) => {
                            // Stale-if-error: serve the previous answer but
                            // leave the deadline expired so the next caller
                            // retries the refresh.
                            metrics::increment_resolve_cache("stale");
                            tracing::warn!(
                                service = %key,
                                error = %err,
                                "catalog refresh failed, serving stale endpoints"
                            );
                            Ok(prior)
                        }
                        None => {
                            // No negative caching: the entry goes away and
                            // the next caller queries again.
                            drop_entry = true;
                            Err(err.into())
                        }
                    },
                }
            }
            // The entry vanished while the query ran. Inflight entries are
            // never evicted, so this only happens in teardown races; hand the
            // raw result to the waiters.
            None => result.map_err(ResolveError::from),
        };

        if drop_entry {
            entries.remove(key);
        }
        if entries.len() > self.inner.capacity {
            Self::evict(&mut entries, self.inner.capacity);
        }

        outcome
    }

    fn evict(entries: &mut HashMap<ServiceKey, Entry>, capacity: usize) {
        let now = Instant::now();
        entries.retain(|_, entry| entry.inflight.is_some() || entry.deadline > now);

        while entries.len() > capacity {
            let victim = entries
                .iter()
                .filter(|(_, entry)| entry.inflight.is_none())
                .min_by_key(|(_, entry)| entry.resolved_at)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<ServiceKey, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
