//! In-memory repository implementations for tests and single-process
//! development. A real deployment must use the SQL-backed stores: the rate
//! window and tenant directory need cross-instance consistency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use relay_core::domain::principal::UserRecord;
use relay_core::domain::tenant::{CustomerId, Tenant};

use super::{
    RateDecision, RateLimitStore, RepositoryError, TenantRepository, UserRepository,
};

fn simulated_outage() -> RepositoryError {
    RepositoryError::Decode("simulated store outage".to_string())
}

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<String, Tenant>>,
    failing: AtomicBool,
}

impl InMemoryTenantRepository {
    /// Makes every call error, to exercise degraded-mode paths.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(simulated_outage());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn get(&self, id: &CustomerId) -> Result<Option<Tenant>, RepositoryError> {
        self.check_available()?;
        let tenants = self.tenants.read().await;
        Ok(tenants.get(&id.0).cloned())
    }

    async fn put(&self, tenant: Tenant) -> Result<(), RepositoryError> {
        self.check_available()?;
        let mut tenants = self.tenants.write().await;
        tenants.insert(tenant.id.0.clone(), tenant);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Tenant>, RepositoryError> {
        self.check_available()?;
        let tenants = self.tenants.read().await;
        let mut listed: Vec<Tenant> = tenants.values().cloned().collect();
        listed.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(listed)
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, RepositoryError> {
        self.check_available()?;
        let tenants = self.tenants.read().await;
        Ok(tenants.values().find(|tenant| tenant.has_domain(domain)).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Tenant>, RepositoryError> {
        self.check_available()?;
        let tenants = self.tenants.read().await;
        Ok(tenants.values().find(|tenant| tenant.has_email(email)).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, UserRecord>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get(&self, uid: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(uid).cloned())
    }

    async fn upsert_assignment(
        &self,
        uid: &str,
        email: Option<&str>,
        customer_id: &CustomerId,
        auto_assigned: bool,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(
            uid.to_string(),
            UserRecord {
                uid: uid.to_string(),
                email: email.map(str::to_string),
                customer_id: Some(customer_id.clone()),
                auto_assigned,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    failing: AtomicBool,
}

impl InMemoryRateLimitStore {
    /// Makes every call error, to exercise the fail-open admission path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn try_admit(
        &self,
        user_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(simulated_outage());
        }

        let mut windows = self.windows.write().await;
        let window = windows.entry(user_id.to_string()).or_default();

        let cutoff = now - Duration::seconds(60);
        window.retain(|timestamp| *timestamp > cutoff);

        if window.len() as u32 >= limit {
            return Ok(RateDecision { allowed: false, remaining: 0 });
        }

        window.push(now);
        Ok(RateDecision { allowed: true, remaining: limit.saturating_sub(window.len() as u32) })
    }
}
