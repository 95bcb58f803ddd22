//! Tenant directory: principal-to-tenant resolution and the administrative
//! mutations that maintain the access rules.
//!
//! Resolution order, first match wins:
//! 1. a persisted `customer_id` on the durable user record (authoritative,
//!    skips all search),
//! 2. exact `allowed_emails` match,
//! 3. `allowed_domains` match on the part after `@`,
//! then the matched assignment is persisted (flagged auto-assigned) so the
//! next resolution is a claim lookup only.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use relay_core::domain::tenant::{
    email_domain, normalize_domain, normalize_email, AccessRuleError, CustomerId, Tenant,
};
use relay_db::{RepositoryError, TenantRepository, UserRepository};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved(CustomerId),
    /// Global-access mode: access granted without a tenant binding.
    Global,
    NotAssigned,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("tenant `{0}` was not found")]
    TenantNotFound(String),
    #[error("tenant `{0}` already exists")]
    TenantExists(String),
    #[error("`{value}` already belongs to tenant `{owner}`")]
    Conflict { value: String, owner: String },
    #[error(transparent)]
    InvalidRule(#[from] AccessRuleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct TenantDirectory {
    tenants: Arc<dyn TenantRepository>,
    users: Arc<dyn UserRepository>,
    global_access: bool,
}

impl TenantDirectory {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        users: Arc<dyn UserRepository>,
        global_access: bool,
    ) -> Self {
        Self { tenants, users, global_access }
    }

    pub async fn resolve(
        &self,
        uid: &str,
        email: Option<&str>,
    ) -> Result<Resolution, RepositoryError> {
        if let Some(record) = self.users.get(uid).await? {
            if let Some(customer_id) = record.customer_id {
                return Ok(Resolution::Resolved(customer_id));
            }
        }

        if self.global_access {
            return Ok(Resolution::Global);
        }

        let Some(email) = email.map(str::to_ascii_lowercase) else {
            return Ok(Resolution::NotAssigned);
        };

        let matched = match self.tenants.find_by_email(&email).await? {
            Some(tenant) => Some(tenant),
            None => match email_domain(&email) {
                Some(domain) => self.tenants.find_by_domain(&domain).await?,
                None => None,
            },
        };

        let Some(tenant) = matched else {
            return Ok(Resolution::NotAssigned);
        };

        self.users.upsert_assignment(uid, Some(&email), &tenant.id, true).await?;
        info!(
            event_name = "directory.auto_assigned",
            user_id = uid,
            customer_id = %tenant.id,
            "principal auto-assigned to tenant by access rule match"
        );
        Ok(Resolution::Resolved(tenant.id))
    }

    pub async fn get_tenant(&self, id: &CustomerId) -> Result<Option<Tenant>, RepositoryError> {
        self.tenants.get(id).await
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>, RepositoryError> {
        self.tenants.list().await
    }

    pub async fn create_tenant(
        &self,
        id: &str,
        name: &str,
        endpoint: Option<String>,
    ) -> Result<Tenant, DirectoryError> {
        let customer_id = CustomerId(id.to_string());
        if self.tenants.get(&customer_id).await?.is_some() {
            return Err(DirectoryError::TenantExists(id.to_string()));
        }

        let mut tenant = Tenant::new(id, name);
        tenant.endpoint = endpoint;
        self.tenants.put(tenant.clone()).await?;
        Ok(tenant)
    }

    pub async fn set_enabled(&self, id: &CustomerId, enabled: bool) -> Result<(), DirectoryError> {
        let mut tenant = self.require(id).await?;
        tenant.enabled = enabled;
        self.tenants.put(tenant).await?;
        Ok(())
    }

    pub async fn set_endpoint(
        &self,
        id: &CustomerId,
        endpoint: Option<String>,
    ) -> Result<(), DirectoryError> {
        let mut tenant = self.require(id).await?;
        tenant.endpoint = endpoint;
        self.tenants.put(tenant).await?;
        Ok(())
    }

    pub async fn set_rate_limit(
        &self,
        id: &CustomerId,
        rate_limit_per_minute: Option<u32>,
    ) -> Result<(), DirectoryError> {
        let mut tenant = self.require(id).await?;
        tenant.rate_limit_per_minute = rate_limit_per_minute;
        self.tenants.put(tenant).await?;
        Ok(())
    }

    pub async fn add_domain(&self, id: &CustomerId, raw: &str) -> Result<String, DirectoryError> {
        let domain = normalize_domain(raw)?;
        self.check_conflict(id, &domain, RuleKind::Domain).await?;

        let mut tenant = self.require(id).await?;
        if !tenant.has_domain(&domain) {
            tenant.allowed_domains.push(domain.clone());
            self.tenants.put(tenant).await?;
        }
        Ok(domain)
    }

    pub async fn add_email(&self, id: &CustomerId, raw: &str) -> Result<String, DirectoryError> {
        let email = normalize_email(raw)?;
        self.check_conflict(id, &email, RuleKind::Email).await?;

        let mut tenant = self.require(id).await?;
        if !tenant.has_email(&email) {
            tenant.allowed_emails.push(email.clone());
            self.tenants.put(tenant).await?;
        }
        Ok(email)
    }

    /// Removal is unconditional and does not retroactively unassign users
    /// who already resolved through the rule. Deliberate policy: existing
    /// bindings are claims, revoking them is a separate administrative act.
    pub async fn remove_domain(&self, id: &CustomerId, raw: &str) -> Result<(), DirectoryError> {
        let domain = normalize_domain(raw)?;
        let mut tenant = self.require(id).await?;
        tenant.allowed_domains.retain(|candidate| candidate != &domain);
        self.tenants.put(tenant).await?;
        Ok(())
    }

    pub async fn remove_email(&self, id: &CustomerId, raw: &str) -> Result<(), DirectoryError> {
        let email = normalize_email(raw)?;
        let mut tenant = self.require(id).await?;
        tenant.allowed_emails.retain(|candidate| candidate != &email);
        self.tenants.put(tenant).await?;
        Ok(())
    }

    /// Manual administrative binding; distinct from auto-assignment in the
    /// audit trail.
    pub async fn assign_user(
        &self,
        uid: &str,
        email: Option<&str>,
        id: &CustomerId,
    ) -> Result<(), DirectoryError> {
        self.require(id).await?;
        self.users.upsert_assignment(uid, email, id, false).await?;
        Ok(())
    }

    async fn require(&self, id: &CustomerId) -> Result<Tenant, DirectoryError> {
        self.tenants
            .get(id)
            .await?
            .ok_or_else(|| DirectoryError::TenantNotFound(id.0.clone()))
    }

    /// A domain or email string may belong to at most one tenant. Scans all
    /// tenants except the target before any insertion.
    async fn check_conflict(
        &self,
        target: &CustomerId,
        value: &str,
        kind: RuleKind,
    ) -> Result<(), DirectoryError> {
        for tenant in self.tenants.list().await? {
            if &tenant.id == target {
                continue;
            }
            let owned = match kind {
                RuleKind::Domain => tenant.has_domain(value),
                RuleKind::Email => tenant.has_email(value),
            };
            if owned {
                return Err(DirectoryError::Conflict {
                    value: value.to_string(),
                    owner: tenant.id.0,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum RuleKind {
    Domain,
    Email,
}
