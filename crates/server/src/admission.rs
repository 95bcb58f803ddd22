//! Per-user sliding-window admission in front of the chat endpoints.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use relay_core::domain::tenant::Tenant;
use relay_db::{RateDecision, RateLimitStore};

pub struct AdmissionController {
    store: Arc<dyn RateLimitStore>,
    default_limit: u32,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn RateLimitStore>, default_limit: u32) -> Self {
        Self { store, default_limit }
    }

    /// Tenant override wins over the process-wide default.
    fn limit_for(&self, tenant: Option<&Tenant>) -> u32 {
        tenant
            .and_then(|tenant| tenant.rate_limit_per_minute)
            .unwrap_or(self.default_limit)
    }

    /// Admission must never take the service down with it: if the store is
    /// unreachable or retries are exhausted, the request is admitted and the
    /// failure is logged loudly enough to be paged on.
    pub async fn admit(&self, user_id: &str, tenant: Option<&Tenant>) -> RateDecision {
        let limit = self.limit_for(tenant);
        match self.store.try_admit(user_id, limit, Utc::now()).await {
            Ok(decision) => {
                if !decision.allowed {
                    info!(
                        event_name = "admission.denied",
                        user_id,
                        limit,
                        "request denied by sliding window"
                    );
                }
                decision
            }
            Err(error) => {
                warn!(
                    event_name = "admission.fail_open",
                    user_id,
                    error = %error,
                    "rate limit store unavailable, admitting request"
                );
                RateDecision { allowed: true, remaining: limit }
            }
        }
    }
}
