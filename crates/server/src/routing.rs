//! TTL-bound cache in front of tenant endpoint lookups.
//!
//! The cache only ever holds endpoints that resolved successfully. A miss or
//! an expired entry triggers a fresh directory read; a tenant that is
//! missing, disabled or endpoint-less yields `Unresolved` and evicts whatever
//! was cached for it, so routing never outlives a revocation by more than the
//! TTL.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use relay_core::domain::tenant::CustomerId;
use relay_db::RepositoryError;

use crate::directory::TenantDirectory;

/// Time source seam so cache expiry is testable without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteLookup {
    Resolved(String),
    /// No routable endpoint for this tenant right now. Distinguishing the
    /// reasons (missing, disabled, endpoint-less) is the caller's job via
    /// the directory; the cache only knows there is nothing to serve.
    Unresolved,
}

struct CacheEntry {
    endpoint: String,
    cached_at: Instant,
}

pub struct RoutingCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: Box<dyn Clock>,
}

impl RoutingCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Box::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Box<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl, clock }
    }

    pub async fn lookup(
        &self,
        directory: &TenantDirectory,
        customer_id: &CustomerId,
    ) -> Result<RouteLookup, RepositoryError> {
        let now = self.clock.now();
        if let Some(endpoint) = self.cached(&customer_id.0, now) {
            return Ok(RouteLookup::Resolved(endpoint));
        }

        let tenant = match directory.get_tenant(customer_id).await {
            Ok(tenant) => tenant,
            Err(error) => {
                // Directory outage. Serve the last known good endpoint even
                // past its TTL rather than failing every routed request.
                if let Some(endpoint) = self.last_known_good(&customer_id.0) {
                    warn!(
                        event_name = "routing.degraded",
                        customer_id = %customer_id,
                        error = %error,
                        "directory read failed, serving last known good endpoint"
                    );
                    return Ok(RouteLookup::Resolved(endpoint));
                }
                return Err(error);
            }
        };

        let endpoint = tenant
            .filter(|tenant| tenant.enabled)
            .and_then(|tenant| tenant.endpoint);

        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match endpoint {
            Some(endpoint) => {
                debug!(
                    event_name = "routing.cache_fill",
                    customer_id = %customer_id,
                    "cached fresh endpoint for tenant"
                );
                entries.insert(
                    customer_id.0.clone(),
                    CacheEntry { endpoint: endpoint.clone(), cached_at: now },
                );
                Ok(RouteLookup::Resolved(endpoint))
            }
            None => {
                entries.remove(&customer_id.0);
                Ok(RouteLookup::Unresolved)
            }
        }
    }

    fn cached(&self, customer_id: &str, now: Instant) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = entries.get(customer_id)?;
        if now.duration_since(entry.cached_at) < self.ttl {
            Some(entry.endpoint.clone())
        } else {
            None
        }
    }

    fn last_known_good(&self, customer_id: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(customer_id).map(|entry| entry.endpoint.clone())
    }
}
