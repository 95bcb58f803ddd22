use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use relay_core::domain::principal::UserRecord;
use relay_core::domain::tenant::{CustomerId, Tenant};

pub mod memory;
pub mod rate_limit;
pub mod tenant;
pub mod user;

pub use memory::{InMemoryRateLimitStore, InMemoryTenantRepository, InMemoryUserRepository};
pub use rate_limit::SqlRateLimitStore;
pub use tenant::SqlTenantRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("concurrent update conflict after {attempts} attempts")]
    Conflict { attempts: u32 },
}

/// Narrow store boundary for tenant records, so the persistence technology
/// stays swappable. The `find_by_*` lookups return at most one tenant; the
/// at-most-one-owner invariant is enforced by the directory's conflict check
/// before insertion, not by storage-level uniqueness.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn get(&self, id: &CustomerId) -> Result<Option<Tenant>, RepositoryError>;
    async fn put(&self, tenant: Tenant) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<Tenant>, RepositoryError>;
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Tenant>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, uid: &str) -> Result<Option<UserRecord>, RepositoryError>;
    /// Idempotent upsert of a resolved assignment onto the durable record.
    async fn upsert_assignment(
        &self,
        uid: &str,
        email: Option<&str>,
        customer_id: &CustomerId,
        auto_assigned: bool,
    ) -> Result<(), RepositoryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
}

/// Sliding-window admission against the shared store. `try_admit` must be
/// atomic with respect to concurrent calls for the same user: read, prune
/// entries older than 60 seconds, check the bound, and append exactly one
/// timestamp when admitted. A denied call never mutates the stored window.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn try_admit(
        &self,
        user_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, RepositoryError>;
}
